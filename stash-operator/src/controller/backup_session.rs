//! The Session Controller (§4.G): drives a `BackupSession` from `Pending`
//! through `Running` to a terminal phase, and triggers `engine forget` against
//! each target's retention policy once every host has reported a terminal
//! `HostStatus`. The actual `engine backup` call is made by the sidecar/job
//! container running on each target host, not by the operator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};

use stash_api::v1alpha1::{
    BackupBatch, BackupConfiguration, BackupSession, BackupSessionStatus, InvokerKind, RetentionPolicy,
    SessionPhase,
};
use stash_operator_api::engine::EngineDriver;
use stash_operator_api::error::{Result, StashError};

use super::Reconciler;
use crate::consts::DEFAULT_SESSION_DEADLINE;
use crate::repo_creds;

pub(crate) struct BackupSessionReconciler {
    client: Client,
    engine: Arc<dyn EngineDriver>,
}

impl BackupSessionReconciler {
    #[must_use]
    pub(crate) fn new(client: Client, engine: Arc<dyn EngineDriver>) -> Self {
        Self { client, engine }
    }

    /// Resolves the invoker into one `(repository, retention)` pair per target,
    /// in target order, for forget-on-success.
    async fn invoker_targets(&self, namespace: &str, invoker_kind: &InvokerKind, invoker_name: &str) -> Result<Vec<(String, RetentionPolicy)>> {
        match invoker_kind {
            InvokerKind::BackupConfiguration => {
                let api: Api<BackupConfiguration> = Api::namespaced(self.client.clone(), namespace);
                let bc = api.get(invoker_name).await.map_err(StashError::from)?;
                Ok(vec![(bc.spec.repository, bc.spec.retention_policy)])
            }
            InvokerKind::BackupBatch => {
                let api: Api<BackupBatch> = Api::namespaced(self.client.clone(), namespace);
                let batch = api.get(invoker_name).await.map_err(StashError::from)?;
                Ok(batch
                    .spec
                    .members
                    .into_iter()
                    .map(|m| (m.repository, m.retention_policy))
                    .collect())
            }
        }
    }
}

#[async_trait]
impl Reconciler<BackupSession> for BackupSessionReconciler {
    type Error = StashError;

    async fn reconcile_once(&self, session: Arc<BackupSession>) -> Result<Option<Duration>> {
        let namespace = session.namespace().unwrap_or_default();
        let api: Api<BackupSession> = Api::namespaced(self.client.clone(), &namespace);
        let status = session.status.clone().unwrap_or_default();

        if status.phase.is_terminal() {
            return Ok(None);
        }

        if matches!(status.phase, SessionPhase::Pending) {
            let deadline = Utc::now() + chrono::Duration::from_std(DEFAULT_SESSION_DEADLINE).unwrap_or_default();
            let new_status = BackupSessionStatus {
                phase: SessionPhase::Running,
                targets: status.targets,
                session_deadline: Some(deadline.to_rfc3339()),
            };
            patch_status(&api, &session.name_any(), &new_status).await?;
            return Ok(Some(Duration::from_secs(10)));
        }

        if let Some(deadline) = status
            .session_deadline
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
        {
            if Utc::now() > deadline {
                let new_status = BackupSessionStatus {
                    phase: SessionPhase::Failed,
                    ..status
                };
                patch_status(&api, &session.name_any(), &new_status).await?;
                return Ok(None);
            }
        }

        let targets = self
            .invoker_targets(&namespace, &session.spec.invoker.kind, &session.spec.invoker.name)
            .await?;

        if status.targets.len() < targets.len() || status.targets.iter().any(|t| t.hosts.is_empty()) {
            return Ok(Some(Duration::from_secs(10)));
        }
        let all_terminal = status
            .targets
            .iter()
            .flat_map(|t| &t.hosts)
            .all(|h| h.phase.is_terminal());
        if !all_terminal {
            return Ok(Some(Duration::from_secs(10)));
        }

        let any_failed = status.targets.iter().flat_map(|t| &t.hosts).any(|h| h.phase == SessionPhase::Failed);
        let any_skipped = status.targets.iter().flat_map(|t| &t.hosts).any(|h| h.phase == SessionPhase::Skipped);
        let overall = if any_failed {
            SessionPhase::Failed
        } else if any_skipped {
            SessionPhase::Skipped
        } else {
            SessionPhase::Succeeded
        };

        if overall == SessionPhase::Succeeded {
            for (target_status, (repository, retention)) in status.targets.iter().zip(targets.iter()) {
                let (repo_url, password) = repo_creds::load(&self.client, &namespace, repository).await?;
                for host in &target_status.hosts {
                    self.engine
                        .forget(&repo_url, &password, retention, &host.hostname, &[])
                        .await?;
                }
            }
        }

        let new_status = BackupSessionStatus {
            phase: overall,
            targets: status.targets,
            session_deadline: status.session_deadline,
        };
        patch_status(&api, &session.name_any(), &new_status).await?;
        Ok(None)
    }
}

async fn patch_status(api: &Api<BackupSession>, name: &str, status: &BackupSessionStatus) -> Result<()> {
    api.patch_status(
        name,
        &PatchParams::default(),
        &Patch::Merge(serde_json::json!({ "status": status })),
    )
    .await
    .map_err(StashError::from)?;
    Ok(())
}
