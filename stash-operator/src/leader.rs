//! Leader-election gate (§4.I, §8): contends for a `coordination.k8s.io/v1`
//! `Lease` so only one controller-manager replica runs reconcilers at a time;
//! other replicas keep serving the metrics/health surface but not-ready.
//! Grounded in [`stash_operator_api::lock::HostLock`]'s create-or-steal-if-stale
//! pattern, adapted from a ConfigMap to the `Lease` kind k8s leader election
//! actually uses, since unlike `HostLock` this needs periodic renewal rather
//! than a single hold-until-release window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use tracing::{info, warn};

use crate::consts::{FIELD_MANAGER, LEASE_DURATION, LEASE_NAME, LEASE_RENEW_INTERVAL, LEASE_RETRY_INTERVAL};

/// This replica's candidate identity: `POD_NAME` when running in-cluster, a
/// PID-based fallback otherwise so a local run still elects a leader.
fn identity() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| format!("pid-{}", std::process::id()))
}

/// Blocks (retrying every [`LEASE_RETRY_INTERVAL`]) until this replica
/// acquires or takes over the leader `Lease`, flips `ready`, then spawns a
/// background task renewing it every [`LEASE_RENEW_INTERVAL`] for the rest of
/// the process's life. Callers should only start the Reconciler Core tasks
/// after this returns.
pub(crate) async fn acquire(client: Client, namespace: &str, ready: Arc<AtomicBool>) -> Result<()> {
    let api: Api<Lease> = Api::namespaced(client, namespace);
    let holder = identity();

    while !try_acquire_or_renew(&api, &holder).await? {
        tokio::time::sleep(LEASE_RETRY_INTERVAL).await;
    }
    info!(holder = %holder, "acquired leader lease");
    ready.store(true, Ordering::SeqCst);

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
            match try_acquire_or_renew(&api, &holder).await {
                Ok(true) => {}
                Ok(false) => warn!("lost leader lease to another replica"),
                Err(err) => warn!(error = %err, "failed to renew leader lease"),
            }
        }
    });

    Ok(())
}

/// Attempts to take (if absent/expired) or renew (if already ours) the
/// `Lease`. Returns whether this replica holds it afterward.
async fn try_acquire_or_renew(api: &Api<Lease>, holder: &str) -> Result<bool> {
    let now = Utc::now();
    let existing = match api.get(LEASE_NAME).await {
        Ok(lease) => Some(lease),
        Err(kube::Error::Api(resp)) if resp.code == 404 => None,
        Err(err) => return Err(err.into()),
    };

    let spec = existing.and_then(|l| l.spec).unwrap_or_default();
    let is_us = spec.holder_identity.as_deref() == Some(holder);
    let expired = spec
        .renew_time
        .as_ref()
        .map(|t| now.signed_duration_since(t.0) > chrono::Duration::from_std(LEASE_DURATION).unwrap_or_default())
        .unwrap_or(true);

    if !is_us && !expired {
        return Ok(false);
    }

    let transitions = spec.lease_transitions.unwrap_or(0) + i32::from(!is_us);
    let acquire_time = if is_us { spec.acquire_time } else { None }.unwrap_or(MicroTime(now));

    let lease = Lease {
        metadata: ObjectMeta {
            name: Some(LEASE_NAME.to_owned()),
            ..ObjectMeta::default()
        },
        spec: Some(LeaseSpec {
            holder_identity: Some(holder.to_owned()),
            lease_duration_seconds: Some(i32::try_from(LEASE_DURATION.as_secs()).unwrap_or(15)),
            acquire_time: Some(acquire_time),
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(transitions),
            ..LeaseSpec::default()
        }),
    };

    api.patch(LEASE_NAME, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&lease))
        .await?;
    Ok(true)
}
