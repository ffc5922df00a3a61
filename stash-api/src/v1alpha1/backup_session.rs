#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use garde::Validate;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of resource that owns (invoked) a `BackupSession`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub enum InvokerKind {
    BackupConfiguration,
    BackupBatch,
}

/// Reference to the invoker; immutable once set (Design Note, §9).
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct Invoker {
    pub kind: InvokerKind,
    pub name: String,
}

/// One scheduled (or ad-hoc) backup execution.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Validate)]
#[kube(
    group = "stash.appscode.com",
    version = "v1alpha1",
    kind = "BackupSession",
    plural = "backupsessions",
    namespaced,
    status = "BackupSessionStatus",
    shortname = "bs",
    printcolumn = r#"{"name":"Invoker-Type", "type":"string", "jsonPath":".spec.invoker.kind"}"#,
    printcolumn = r#"{"name":"Invoker-Name", "type":"string", "jsonPath":".spec.invoker.name"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct BackupSessionSpec {
    #[garde(dive)]
    pub invoker: Invoker,
}

/// Terminal and non-terminal phases of the Session Controller state machine (§4.G).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum SessionPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Unknown,
}

impl SessionPhase {
    /// Terminal phases freeze `status` per invariant 3 (§8).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// One content-addressed snapshot produced by a single host's backup run.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct SnapshotStats {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub uploaded: i64,
    #[serde(default)]
    pub file_stats: Option<FileStats>,
}

/// File counters reported by the engine driver's `backup` JSON summary line.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct FileStats {
    #[serde(default)]
    pub new: i64,
    #[serde(default)]
    pub changed: i64,
    #[serde(default)]
    pub unmodified: i64,
}

/// Per-host outcome, one written by each backup executor (sidecar pod or job pod).
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct HostStatus {
    pub hostname: String,
    #[serde(default)]
    pub phase: SessionPhase,
    #[serde(default)]
    pub snapshots: Vec<SnapshotStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated outcome for one target of the `BackupConfiguration`/`BackupBatch`.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct TargetStatus {
    #[serde(default)]
    pub hosts: Vec<HostStatus>,
}

/// Status subresource of [`BackupSession`].
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct BackupSessionStatus {
    #[serde(default)]
    pub phase: SessionPhase,
    #[serde(default)]
    pub targets: Vec<TargetStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_deadline: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn terminal_phases_are_frozen() {
        assert!(SessionPhase::Succeeded.is_terminal());
        assert!(SessionPhase::Failed.is_terminal());
        assert!(SessionPhase::Skipped.is_terminal());
        assert!(!SessionPhase::Running.is_terminal());
        assert!(!SessionPhase::Pending.is_terminal());
    }
}
