#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use garde::Validate;
use k8s_openapi::api::core::v1::{
    PodSecurityContext, ResourceRequirements, Toleration, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Workload kinds the Target Resolver knows how to mutate, plus `AppBinding`
/// and `PersistentVolumeClaim` which route through the job/volume-snapshot models.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub enum TargetKind {
    Deployment,
    DaemonSet,
    StatefulSet,
    ReplicaSet,
    ReplicationController,
    DeploymentConfig,
    PersistentVolumeClaim,
    AppBinding,
}

impl TargetKind {
    /// The lowercased form used to build deterministic blueprint-resolved names.
    #[must_use]
    pub fn lowercase(&self) -> &'static str {
        match *self {
            Self::Deployment => "deployment",
            Self::DaemonSet => "daemonset",
            Self::StatefulSet => "statefulset",
            Self::ReplicaSet => "replicaset",
            Self::ReplicationController => "replicationcontroller",
            Self::DeploymentConfig => "deploymentconfig",
            Self::PersistentVolumeClaim => "persistentvolumeclaim",
            Self::AppBinding => "appbinding",
        }
    }
}

/// A reference to the workload or AppBinding a `BackupConfiguration`/`RestoreSession` targets.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Validate)]
#[schemars(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct TargetRef {
    pub api_version: String,
    pub kind: TargetKind,
    pub name: String,
}

/// Declarative backup target: what to back up, and how to reach the paths.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Validate)]
#[schemars(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct Target {
    #[serde(rename = "ref")]
    #[garde(dive)]
    pub ref_: TargetRef,
    #[garde(length(min = 1))]
    pub paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub mount_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[garde(skip)]
    pub volume_mounts: Vec<VolumeMount>,
}

/// Backup execution driver.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum Driver {
    #[default]
    Restic,
    VolumeSnapshotter,
}

/// Pod/container-level knobs applied to the injected sidecar/init-container and to Jobs.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Validate, Default)]
#[schemars(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct RuntimeSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_security_context: Option<PodSecurityContext>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

/// Pruning policy applied by the Session Controller after a successful backup.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Validate, Default)]
#[schemars(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct RetentionPolicy {
    pub name: String,
    #[serde(default)]
    pub keep_last: u32,
    #[serde(default)]
    pub keep_hourly: u32,
    #[serde(default)]
    pub keep_daily: u32,
    #[serde(default)]
    pub keep_weekly: u32,
    #[serde(default)]
    pub keep_monthly: u32,
    #[serde(default)]
    pub keep_yearly: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keep_tags: Vec<String>,
    #[serde(default)]
    pub prune: bool,
    #[serde(default)]
    pub dry_run: bool,
}

impl RetentionPolicy {
    /// At least one `keep*` clause must be non-zero, per the invariant on `BackupConfiguration`.
    #[must_use]
    pub fn has_any_clause(&self) -> bool {
        self.keep_last > 0
            || self.keep_hourly > 0
            || self.keep_daily > 0
            || self.keep_weekly > 0
            || self.keep_monthly > 0
            || self.keep_yearly > 0
            || !self.keep_tags.is_empty()
    }
}

/// A fixed-point selector used by `BackupBatch` to fan out to many targets; reuses [`LabelSelector`]
/// for workload-set selection in addition to an explicit target list.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Validate, Default)]
#[schemars(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct MemberSelector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
}
