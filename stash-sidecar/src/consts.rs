use std::time::Duration;

/// Name of the backup-engine binary the Engine Driver shells out to (§4.B, §6),
/// kept identical to the operator's own constant since both invoke the same
/// binary baked into the operator image.
pub(crate) const ENGINE_BINARY: &str = "restic";

/// How often the sidecar polls its namespace for sessions naming its own
/// target (§4.G, §4.H). The sidecar has no watch-based Reconciler Core of its
/// own; a short poll is adequate since a session only ever needs this sidecar
/// to notice it once per backup/restore window.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_secs(15);

/// HostLock tuning shared with the operator's Session Controller expectations.
pub(crate) const LOCK_STALE_AFTER: Duration = Duration::from_secs(300);
pub(crate) const LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Fallback restore target directory when the `RestoreSession`'s target sets
/// neither `mountPath` nor any `paths`, matching the restore `Job`'s own mount
/// path convention in the operator's Restore Controller.
pub(crate) const DEFAULT_RESTORE_TARGET_DIR: &str = "/stash-data";
