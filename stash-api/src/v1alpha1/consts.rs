//! Annotation and finalizer string constants, bit-exact with the external protocol.

/// Workload/AppBinding annotation naming the `BackupBlueprint` to resolve against.
pub const ANNOTATION_BACKUP_BLUEPRINT: &str = "stash.appscode.com/backup-blueprint";
/// Workload/AppBinding annotation listing backup target paths (comma-separated).
pub const ANNOTATION_TARGET_PATHS: &str = "stash.appscode.com/target-paths";
/// Workload/AppBinding annotation listing extra volume mounts (JSON-encoded).
pub const ANNOTATION_VOLUME_MOUNTS: &str = "stash.appscode.com/volume-mounts";
/// Annotation carrying the last-applied backup configuration, for drift detection.
pub const ANNOTATION_LAST_APPLIED_CONFIGURATION: &str =
    "stash.appscode.com/last-applied-configuration";
/// Annotation carrying the Stash version that last mutated the workload.
pub const ANNOTATION_VERSION: &str = "stash.appscode.com/version";
/// CronJob/Job annotation requesting that the job be deleted once it completes.
pub const ANNOTATION_DELETE_JOB_ON_COMPLETION: &str = "stash.appscode.com/delete-job-on-completion";

/// Finalizer placed on workloads and Stash resources that require teardown before deletion.
pub const FINALIZER: &str = "stash.appscode.com";

/// Name of the fixed backup/restore container/image injected into workloads.
pub const STASH_CONTAINER_NAME: &str = "stash";
/// Name of the scratch `EmptyDir` volume.
pub const SCRATCH_VOLUME_NAME: &str = "stash-scratchdir";
/// Name of the downward-API volume exposing pod labels.
pub const PODINFO_VOLUME_NAME: &str = "stash-podinfo";
/// Name of the volume mounted for a `Local` backend.
pub const LOCAL_VOLUME_NAME: &str = "stash-local";
