use std::time::Duration;

/// The default requeue duration to achieve eventual consistency (§4.I resync).
pub(crate) const DEFAULT_REQUEUE_DURATION: Duration = Duration::from_secs(300);
/// The field manager identifier used for every server-side apply in this crate.
pub(crate) const FIELD_MANAGER: &str = "stash.appscode.com/operator";
/// The image running the `stash-operator create-backupsession` subcommand from a CronJob.
pub(crate) const OPERATOR_IMAGE: &str = "appscode/stash-operator:latest";
/// Label applied to every subresource the operator creates, carrying the owning invoker's name.
pub(crate) const LABEL_INVOKER_NAME: &str = "stash.appscode.com/invoker-name";
/// Label applied to every subresource the operator creates, carrying the owning invoker's kind.
pub(crate) const LABEL_INVOKER_KIND: &str = "stash.appscode.com/invoker-kind";
/// Marks CronJob-spawned Jobs for deletion once they complete (§4.F).
pub(crate) const LABEL_DELETE_JOB_ON_COMPLETION: &str = "stash.appscode.com/delete-job-on-completion";
/// Annotation carrying the name of the `BackupBlueprint` a workload opted into (§4.J).
pub(crate) const ANNOTATION_BACKUP_BLUEPRINT: &str = stash_api::v1alpha1::consts::ANNOTATION_BACKUP_BLUEPRINT;
/// Exponential backoff base for the Reconciler Core (§4.I).
pub(crate) const BACKOFF_BASE: Duration = Duration::from_millis(5);
/// Exponential backoff cap for the Reconciler Core (§4.I).
pub(crate) const BACKOFF_CAP: Duration = Duration::from_secs(1000);
/// Bounded retries before a key is dropped with an event (§4.I `MaxNumRequeues`).
pub(crate) const MAX_NUM_REQUEUES: usize = 5;
/// Default bound on a backup session before it is forced to `Failed` (§4.G).
pub(crate) const DEFAULT_SESSION_DEADLINE: Duration = Duration::from_secs(3600);
/// Default HostLock staleness threshold before a contended lock can be stolen (§3).
pub(crate) const DEFAULT_LOCK_STALE_AFTER: Duration = Duration::from_secs(120);
/// Default HostLock acquire timeout before a session is marked `Skipped` (§4.G).
pub(crate) const DEFAULT_LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
/// Name of the backup-engine binary the Engine Driver shells out to (§4.B, §6).
pub(crate) const ENGINE_BINARY: &str = "restic";
/// Name of the `coordination.k8s.io/v1` `Lease` the controller manager replicas
/// contend for on startup (§4.I leader-election gate).
pub(crate) const LEASE_NAME: &str = "stash-operator-leader";
/// How long a held leader `Lease` is valid without renewal before another
/// replica may take over.
pub(crate) const LEASE_DURATION: Duration = Duration::from_secs(15);
/// How often the leader renews its `Lease` while holding it.
pub(crate) const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(5);
/// How often a non-leader retries acquiring the `Lease`.
pub(crate) const LEASE_RETRY_INTERVAL: Duration = Duration::from_secs(5);
