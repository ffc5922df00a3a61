//! HostLock (§3, §5): a mutex per `(repository, hostname)` implemented as a
//! ConfigMap create-or-fail in the workload namespace, with a heartbeat annotation
//! so a crashed holder's lock can be stolen after it goes stale.
//!
//! Grounded in the original's in-process `locked chan struct{}` single-token
//! channel (`original_source/pkg/scheduler/controller.go`), generalized to a
//! cluster-wide primitive since Stash's engine invocations run in separate
//! pods/processes rather than one goroutine.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Result, StashError};

const HEARTBEAT_ANNOTATION: &str = "stash.appscode.com/lock-heartbeat";
const HOLDER_ANNOTATION: &str = "stash.appscode.com/lock-holder";

/// A held `(repository, hostname)` lock. Dropping it does not release the
/// ConfigMap — callers must `release` explicitly so release can be awaited and
/// its failure observed, including on the panic-unwind path (§3 "released on
/// exit including panic").
pub struct HostLock {
    api: Api<ConfigMap>,
    name: String,
    holder: String,
}

impl HostLock {
    fn lock_name(repository: &str, hostname: &str) -> String {
        format!("stash-lock-{repository}-{hostname}")
    }

    /// Attempts to acquire the lock, retrying until `timeout` elapses. Returns
    /// `StashError::Transient` with a `LockHeld` reason if the timeout is reached
    /// while the lock is held by a live (non-stale) holder — the caller maps this
    /// to the BackupSession `Skipped` phase (§4.B, §4.G).
    pub async fn acquire(
        client: Client,
        namespace: &str,
        repository: &str,
        hostname: &str,
        holder: &str,
        stale_after: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let api: Api<ConfigMap> = Api::namespaced(client, namespace);
        let name = Self::lock_name(repository, hostname);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match Self::try_create(&api, &name, holder).await {
                Ok(()) => {
                    return Ok(Self {
                        api,
                        name,
                        holder: holder.to_owned(),
                    })
                }
                Err(StashError::Transient(_)) if tokio::time::Instant::now() < deadline => {
                    if Self::steal_if_stale(&api, &name, stale_after).await? {
                        continue;
                    }
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                Err(_) => return Err(StashError::transient("LockHeld")),
            }
        }
    }

    async fn try_create(api: &Api<ConfigMap>, name: &str, holder: &str) -> Result<()> {
        let mut annotations = BTreeMap::new();
        annotations.insert(HOLDER_ANNOTATION.to_owned(), holder.to_owned());
        annotations.insert(HEARTBEAT_ANNOTATION.to_owned(), Utc::now().to_rfc3339());

        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                annotations: Some(annotations),
                ..Default::default()
            },
            ..Default::default()
        };
        match api.create(&PostParams::default(), &cm).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 409 => {
                Err(StashError::transient("LockHeld"))
            }
            Err(e) => Err(StashError::from(e)),
        }
    }

    /// Steals a stale lock (heartbeat older than `stale_after`) by deleting it, so
    /// the next `try_create` can succeed. Returns whether a steal happened.
    async fn steal_if_stale(api: &Api<ConfigMap>, name: &str, stale_after: Duration) -> Result<bool> {
        let Ok(cm) = api.get(name).await else {
            return Ok(false);
        };
        let Some(heartbeat) = cm
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(HEARTBEAT_ANNOTATION))
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        else {
            return Ok(false);
        };
        let age = Utc::now().signed_duration_since(heartbeat.with_timezone(&Utc));
        if age.to_std().unwrap_or_default() > stale_after {
            let _ = api.delete(name, &DeleteParams::default()).await;
            return Ok(true);
        }
        Ok(false)
    }

    /// Refreshes the heartbeat annotation; callers on a long-running `backup`/
    /// `forget` invocation should call this periodically so the lock is never
    /// mistaken for stale while legitimately held.
    pub async fn heartbeat(&self) -> Result<()> {
        let patch = serde_json::json!({
            "metadata": {
                "annotations": {
                    HEARTBEAT_ANNOTATION: Utc::now().to_rfc3339(),
                }
            }
        });
        self.api
            .patch(
                &self.name,
                &kube::api::PatchParams::default(),
                &kube::api::Patch::Merge(patch),
            )
            .await
            .map_err(StashError::from)?;
        Ok(())
    }

    /// Releases the lock. Safe to call more than once.
    pub async fn release(self) -> Result<()> {
        match self.api.delete(&self.name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(StashError::from(e)),
        }
    }

    #[must_use]
    pub fn holder(&self) -> &str {
        &self.holder
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lock_name_is_deterministic_per_repo_host() {
        assert_eq!(
            HostLock::lock_name("r1", "h1"),
            HostLock::lock_name("r1", "h1")
        );
        assert_ne!(
            HostLock::lock_name("r1", "h1"),
            HostLock::lock_name("r1", "h2")
        );
    }
}
