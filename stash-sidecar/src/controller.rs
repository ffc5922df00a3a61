//! Per-tick backup/restore execution for the one target this sidecar was
//! injected into (§4.G, §4.H). There is no watch or requeue here the way the
//! operator's Reconciler Core has one: each tick lists the namespace's
//! sessions and ignores anything that doesn't name this sidecar's own target.

use std::sync::Arc;

use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::{info, warn};

use stash_api::v1alpha1::common::{Target, TargetKind};
use stash_api::v1alpha1::restore_session::select_rule;
use stash_api::v1alpha1::{
    BackupBatch, BackupConfiguration, BackupSession, HostStatus, InvokerKind, RestoreHostStats, RestorePhase,
    RestoreSession, RestoreSessionStatus, SessionPhase, TargetStatus,
};
use stash_operator_api::engine::EngineDriver;
use stash_operator_api::error::{Result, StashError};
use stash_operator_api::lock::HostLock;
use stash_operator_api::repo_creds;

use crate::consts::{DEFAULT_RESTORE_TARGET_DIR, LOCK_STALE_AFTER, LOCK_TIMEOUT};

/// Resolved backup target position: which `targets[idx]` slot this sidecar
/// owns in the invoking `BackupSession`, plus the paths and repository its
/// invoker configured for that slot.
struct ResolvedTarget {
    idx: usize,
    paths: Vec<String>,
    repository: String,
}

pub(crate) struct Agent {
    client: Client,
    engine: Arc<dyn EngineDriver>,
    namespace: String,
    target_kind: TargetKind,
    target_name: String,
    pod_name: String,
}

impl Agent {
    #[must_use]
    pub(crate) fn new(
        client: Client,
        engine: Arc<dyn EngineDriver>,
        namespace: String,
        target_kind: TargetKind,
        target_name: String,
        pod_name: String,
    ) -> Self {
        Self {
            client,
            engine,
            namespace,
            target_kind,
            target_name,
            pod_name,
        }
    }

    /// One pass over pending `BackupSession`/`RestoreSession` objects that
    /// name this sidecar's target.
    pub(crate) async fn tick(&self) {
        if let Err(err) = self.backup_tick().await {
            warn!(error = %err, "backup tick failed");
        }
        if let Err(err) = self.restore_tick().await {
            warn!(error = %err, "restore tick failed");
        }
    }

    fn is_my_target(&self, target: &Target) -> bool {
        target.ref_.kind == self.target_kind && target.ref_.name == self.target_name
    }

    async fn backup_tick(&self) -> Result<()> {
        let api: Api<BackupSession> = Api::namespaced(self.client.clone(), &self.namespace);
        let sessions = api.list(&Default::default()).await.map_err(StashError::from)?;

        for session in sessions {
            let status = session.status.clone().unwrap_or_default();
            if !matches!(status.phase, SessionPhase::Running) {
                continue;
            }
            let Some(resolved) = self.resolve_backup_target(&session).await? else {
                continue;
            };
            let already_done = status
                .targets
                .get(resolved.idx)
                .is_some_and(|t| t.hosts.iter().any(|h| h.hostname == self.pod_name && h.phase.is_terminal()));
            if already_done {
                continue;
            }
            self.run_backup(&session.name_any(), &resolved).await?;
        }
        Ok(())
    }

    /// Resolves the session's invoker to find this sidecar's position among
    /// its targets, mirroring the operator's own `invoker_targets` (§4.G).
    async fn resolve_backup_target(&self, session: &BackupSession) -> Result<Option<ResolvedTarget>> {
        match &session.spec.invoker.kind {
            InvokerKind::BackupConfiguration => {
                let api: Api<BackupConfiguration> = Api::namespaced(self.client.clone(), &self.namespace);
                let bc = api.get(&session.spec.invoker.name).await.map_err(StashError::from)?;
                Ok(self.is_my_target(&bc.spec.target).then(|| ResolvedTarget {
                    idx: 0,
                    paths: bc.spec.target.paths,
                    repository: bc.spec.repository,
                }))
            }
            InvokerKind::BackupBatch => {
                let api: Api<BackupBatch> = Api::namespaced(self.client.clone(), &self.namespace);
                let mut batch = api.get(&session.spec.invoker.name).await.map_err(StashError::from)?;
                let Some(idx) = batch.spec.members.iter().position(|m| self.is_my_target(&m.target)) else {
                    return Ok(None);
                };
                let member = batch.spec.members.swap_remove(idx);
                Ok(Some(ResolvedTarget {
                    idx,
                    paths: member.target.paths,
                    repository: member.repository,
                }))
            }
        }
    }

    async fn run_backup(&self, session_name: &str, target: &ResolvedTarget) -> Result<()> {
        let lock = match HostLock::acquire(
            self.client.clone(),
            &self.namespace,
            &target.repository,
            &self.pod_name,
            &self.pod_name,
            LOCK_STALE_AFTER,
            LOCK_TIMEOUT,
        )
        .await
        {
            Ok(lock) => lock,
            Err(StashError::Transient(_)) => {
                let host = HostStatus {
                    hostname: self.pod_name.clone(),
                    phase: SessionPhase::Skipped,
                    snapshots: vec![],
                    error: Some("host lock contended past its deadline".to_owned()),
                };
                return self.patch_host_status(session_name, target.idx, host).await;
            }
            Err(err) => return Err(err),
        };

        let (repo_url, password) = repo_creds::load(&self.client, &self.namespace, &target.repository).await?;
        let result = self
            .engine
            .backup(&repo_url, &password, &self.pod_name, &target.paths, &[], &[])
            .await;
        lock.release().await?;

        let host_status = match result {
            Ok(snapshots) => {
                info!(session = %session_name, host = %self.pod_name, "backup succeeded");
                HostStatus {
                    hostname: self.pod_name.clone(),
                    phase: SessionPhase::Succeeded,
                    snapshots,
                    error: None,
                }
            }
            Err(err) => {
                warn!(session = %session_name, host = %self.pod_name, error = %err, "backup failed");
                HostStatus {
                    hostname: self.pod_name.clone(),
                    phase: SessionPhase::Failed,
                    snapshots: vec![],
                    error: Some(err.to_string()),
                }
            }
        };
        self.patch_host_status(session_name, target.idx, host_status).await
    }

    async fn patch_host_status(&self, session_name: &str, idx: usize, host: HostStatus) -> Result<()> {
        let api: Api<BackupSession> = Api::namespaced(self.client.clone(), &self.namespace);
        let current = api.get(session_name).await.map_err(StashError::from)?;
        let mut status = current.status.unwrap_or_default();
        if status.targets.len() <= idx {
            status.targets.resize_with(idx + 1, TargetStatus::default);
        }
        let hosts = &mut status.targets[idx].hosts;
        if let Some(existing) = hosts.iter_mut().find(|h| h.hostname == host.hostname) {
            *existing = host;
        } else {
            hosts.push(host);
        }
        api.patch_status(
            session_name,
            &PatchParams::default(),
            &Patch::Merge(serde_json::json!({ "status": status })),
        )
        .await
        .map_err(StashError::from)?;
        Ok(())
    }

    async fn restore_tick(&self) -> Result<()> {
        let api: Api<RestoreSession> = Api::namespaced(self.client.clone(), &self.namespace);
        let sessions = api.list(&Default::default()).await.map_err(StashError::from)?;

        for session in sessions {
            if !self.is_my_target(&session.spec.target) {
                continue;
            }
            let status = session.status.clone().unwrap_or_default();
            if status.phase.is_terminal() {
                continue;
            }
            self.run_restore(&session, &status).await?;
        }
        Ok(())
    }

    async fn run_restore(&self, session: &RestoreSession, status: &RestoreSessionStatus) -> Result<()> {
        let Some(rule) = select_rule(&session.spec.rules, &self.pod_name) else {
            return Ok(());
        };
        let already_done = status
            .target_status
            .stats
            .iter()
            .any(|s| s.hostname == self.pod_name && s.phase.is_terminal());
        if already_done {
            return Ok(());
        }

        let (repo_url, password) = repo_creds::load(&self.client, &self.namespace, &session.spec.repository).await?;
        let target_dir = session
            .spec
            .target
            .mount_path
            .clone()
            .or_else(|| session.spec.target.paths.first().cloned())
            .unwrap_or_else(|| DEFAULT_RESTORE_TARGET_DIR.to_owned());

        let session_name = session.name_any();
        let result = self
            .engine
            .restore(
                &repo_url,
                &password,
                &self.pod_name,
                rule.source_host.as_deref(),
                &rule.snapshots,
                &rule.paths,
                &target_dir,
            )
            .await;

        let stat = match result {
            Ok(()) => {
                info!(session = %session_name, host = %self.pod_name, "restore succeeded");
                RestoreHostStats {
                    hostname: self.pod_name.clone(),
                    phase: RestorePhase::Succeeded,
                    source_host: rule.source_host.clone(),
                    duration: None,
                    error: None,
                }
            }
            Err(err) => {
                warn!(session = %session_name, host = %self.pod_name, error = %err, "restore failed");
                RestoreHostStats {
                    hostname: self.pod_name.clone(),
                    phase: RestorePhase::Failed,
                    source_host: rule.source_host.clone(),
                    duration: None,
                    error: Some(err.to_string()),
                }
            }
        };
        self.patch_restore_stat(&session_name, stat).await
    }

    async fn patch_restore_stat(&self, session_name: &str, stat: RestoreHostStats) -> Result<()> {
        let api: Api<RestoreSession> = Api::namespaced(self.client.clone(), &self.namespace);
        let current = api.get(session_name).await.map_err(StashError::from)?;
        let mut status = current.status.unwrap_or_default();
        if let Some(existing) = status.target_status.stats.iter_mut().find(|s| s.hostname == stat.hostname) {
            *existing = stat;
        } else {
            status.target_status.stats.push(stat);
        }
        // Overall `status.phase` stays the Restore Controller's own to set; it
        // recomputes it from the full discovered host set on its next pass.
        api.patch_status(
            session_name,
            &PatchParams::default(),
            &Patch::Merge(serde_json::json!({ "status": status })),
        )
        .await
        .map_err(StashError::from)?;
        Ok(())
    }
}
