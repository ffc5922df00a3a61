//! The error taxonomy of §7: every fallible operation in the Blob Facade and Engine
//! Driver is classified into one of four kinds so that controllers can decide whether
//! to retry, surface a status condition, or fail the session outright.

use thiserror::Error;

/// A typed error carrying one of the four kinds from §7's taxonomy.
#[derive(Debug, Error)]
pub enum StashError {
    /// Invalid schedule, unresolved template variable, missing secret key, invalid
    /// backend. Surfaced as a status condition and user event; not retried.
    #[error("config error: {0}")]
    Config(String),

    /// API conflict, network blip, engine retriable exit, lock contended. Retried
    /// with backoff; a session may transition to `Skipped` if a lock remains
    /// contended past its deadline.
    #[error("transient error: {0}")]
    Transient(String),

    /// Permission denied, repository corrupt. Surfaced as session `Failed`; the
    /// session is not retried, the operator continues.
    #[error("fatal backend error: {0}")]
    FatalBackend(String),

    /// A workload patch was rejected by admission or reached its retry cap.
    #[error("workload mutation error: {0}")]
    WorkloadMutation(String),
}

impl StashError {
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    #[must_use]
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    #[must_use]
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::FatalBackend(msg.into())
    }

    #[must_use]
    pub fn workload_mutation(msg: impl Into<String>) -> Self {
        Self::WorkloadMutation(msg.into())
    }

    /// Whether the Reconciler Core should requeue this error with backoff (§4.I).
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::WorkloadMutation(_))
    }
}

impl From<kube::Error> for StashError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 409 => Self::transient(err.to_string()),
            _ => Self::transient(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StashError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn transient_and_workload_mutation_are_retriable() {
        assert!(StashError::transient("x").is_retriable());
        assert!(StashError::workload_mutation("x").is_retriable());
        assert!(!StashError::config("x").is_retriable());
        assert!(!StashError::fatal("x").is_retriable());
    }
}
