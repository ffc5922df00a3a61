#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use garde::Validate;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::backup_configuration::{validate_cron, BackupConfigurationStatus};
use super::common::{RetentionPolicy, RuntimeSettings, Target};

/// One member of a `BackupBatch`'s member list: a target plus the retention it uses.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct BatchMember {
    #[garde(dive)]
    pub target: Target,
    pub repository: String,
    #[garde(skip)]
    pub retention_policy: RetentionPolicy,
}

/// An invoker grouping several targets under one schedule and one CronJob, so a
/// single `BackupSession` fans out across all of them (§3 Invoker, §4.F).
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Validate)]
#[kube(
    group = "stash.appscode.com",
    version = "v1alpha1",
    kind = "BackupBatch",
    plural = "backupbatches",
    namespaced,
    status = "BackupConfigurationStatus",
    shortname = "bbatch",
    printcolumn = r#"{"name":"Schedule", "type":"string", "jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"Paused", "type":"boolean", "jsonPath":".spec.paused"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct BackupBatchSpec {
    #[garde(length(min = 1))]
    pub members: Vec<BatchMember>,
    #[garde(custom(validate_cron))]
    pub schedule: String,
    #[serde(default)]
    #[garde(skip)]
    pub runtime_settings: RuntimeSettings,
    #[serde(default)]
    #[garde(skip)]
    pub paused: bool,
}
