#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use garde::Validate;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{Driver, RetentionPolicy, RuntimeSettings, Target};

/// Validates a 5-field cron expression; shared with `BackupBatch::schedule`.
pub(crate) fn validate_cron(schedule: &str, _ctx: &()) -> garde::Result {
    crate::cron::parse(schedule)
        .map(|_| ())
        .map_err(|e| garde::Error::new(e.to_string()))
}

/// Declarative intent to back up one target on a schedule.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Validate)]
#[kube(
    group = "stash.appscode.com",
    version = "v1alpha1",
    kind = "BackupConfiguration",
    plural = "backupconfigurations",
    namespaced,
    status = "BackupConfigurationStatus",
    shortname = "bc",
    printcolumn = r#"{"name":"Task", "type":"string", "jsonPath":".spec.target.ref.kind"}"#,
    printcolumn = r#"{"name":"Schedule", "type":"string", "jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"Paused", "type":"boolean", "jsonPath":".spec.paused"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct BackupConfigurationSpec {
    #[garde(dive)]
    pub target: Target,
    pub repository: String,
    #[garde(custom(validate_cron))]
    pub schedule: String,
    #[garde(custom(validate_retention_nonempty))]
    pub retention_policy: RetentionPolicy,
    #[serde(default)]
    #[garde(skip)]
    pub runtime_settings: RuntimeSettings,
    #[serde(default)]
    #[garde(skip)]
    pub driver: Driver,
    #[serde(default)]
    #[garde(skip)]
    pub paused: bool,
    #[serde(default = "default_temp_dir")]
    #[garde(skip)]
    pub temp_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub interim_volume_template: Option<k8s_openapi::api::core::v1::PersistentVolumeClaim>,
}

fn validate_retention_nonempty(policy: &RetentionPolicy, _ctx: &()) -> garde::Result {
    if policy.has_any_clause() {
        Ok(())
    } else {
        Err(garde::Error::new(
            "retentionPolicy must set at least one keep* clause",
        ))
    }
}

fn default_temp_dir() -> String {
    "/tmp".to_owned()
}

/// Status subresource of [`BackupConfiguration`].
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct BackupConfigurationStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A generic status condition, mirroring the Kubernetes `metav1.Condition` shape.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct Condition {
    #[garde(skip)]
    pub type_: String,
    #[garde(skip)]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub last_transition_time: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::v1alpha1::common::{TargetKind, TargetRef};

    fn sample_spec(schedule: &str, keep_last: u32) -> BackupConfigurationSpec {
        BackupConfigurationSpec {
            target: Target {
                ref_: TargetRef {
                    api_version: "apps/v1".to_owned(),
                    kind: TargetKind::Deployment,
                    name: "web".to_owned(),
                },
                paths: vec!["/data".to_owned()],
                mount_path: None,
                volume_mounts: vec![],
            },
            repository: "r".to_owned(),
            schedule: schedule.to_owned(),
            retention_policy: RetentionPolicy {
                name: "default".to_owned(),
                keep_last,
                ..Default::default()
            },
            runtime_settings: RuntimeSettings::default(),
            driver: Driver::Restic,
            paused: false,
            temp_dir: default_temp_dir(),
            interim_volume_template: None,
        }
    }

    #[test]
    fn valid_schedule_and_retention_passes() {
        let spec = sample_spec("*/5 * * * *", 5);
        assert!(Validate::validate(&spec, &()).is_ok());
    }

    #[test]
    fn bad_schedule_is_rejected() {
        let spec = sample_spec("not a cron", 5);
        assert!(Validate::validate(&spec, &())
            .unwrap_err()
            .to_string()
            .contains("schedule"));
    }

    #[test]
    fn empty_retention_is_rejected() {
        let spec = sample_spec("*/5 * * * *", 0);
        assert!(Validate::validate(&spec, &())
            .unwrap_err()
            .to_string()
            .contains("retentionPolicy"));
    }
}
