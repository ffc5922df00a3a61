/// The §7 error taxonomy shared by the Blob Facade, Engine Driver and HostLock.
pub mod error;

/// The Blob Facade (§4.A): a uniform object-storage client over S3/GCS/Azure/
/// Swift/B2/REST/Local, dialed from a `Backend` and an optional credentials `Secret`.
pub mod blob;

/// HostLock (§3, §5): the ConfigMap-backed per-`(repository, hostname)` mutex.
pub mod lock;

/// The Engine Driver (§4.B): subprocess invocation of the backup engine.
pub mod engine;

/// Shared `Repository` resolution (§4.B, §6), used by both the operator and
/// the sidecar since both invoke the Engine Driver directly.
pub mod repo_creds;

pub use error::{Result, StashError};
