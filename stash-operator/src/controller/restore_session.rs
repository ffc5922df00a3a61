//! The Restore Controller (§4.H): discovers which hosts have snapshots in the
//! target repository, applies §4.H's first-match rule selection
//! ([`select_rule`]) to each, and drives `RestoreSessionStatus` to a terminal
//! phase. For `Sidecar`/`InitContainerCronJob` targets the already-injected
//! sidecar performs the restore in place and reports back; for the `Job`
//! model (bare `PersistentVolumeClaim` targets) the controller runs a
//! standalone one-shot `Job` mounting the claim directly, since a PVC target
//! has no existing pod template to carry the engine's volume mounts.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};

use stash_api::v1alpha1::restore_session::select_rule;
use stash_api::v1alpha1::{
    Driver, RestoreHostStats, RestorePhase, RestoreSession, RestoreSessionStatus, RestoreTargetStatus,
};
use stash_operator_api::engine::EngineDriver;
use stash_operator_api::error::{Result, StashError};

use super::Reconciler;
use crate::consts::{FIELD_MANAGER, OPERATOR_IMAGE};
use crate::target::{self, ExecutionModel};
use crate::repo_creds;

pub(crate) struct RestoreSessionReconciler {
    client: Client,
    engine: Arc<dyn EngineDriver>,
}

impl RestoreSessionReconciler {
    #[must_use]
    pub(crate) fn new(client: Client, engine: Arc<dyn EngineDriver>) -> Self {
        Self { client, engine }
    }

    fn job_name(session_name: &str, hostname: &str) -> String {
        format!("stash-restore-{session_name}-{hostname}")
    }

    async fn ensure_restore_job(
        &self,
        namespace: &str,
        session: &RestoreSession,
        hostname: &str,
        repo_url: &str,
        password: &str,
    ) -> Result<()> {
        let name = Self::job_name(&session.name_any(), hostname);
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        if api.get_opt(&name).await.map_err(StashError::from)?.is_some() {
            return Ok(());
        }

        let container = Container {
            name: "stash-restore".to_owned(),
            image: Some(OPERATOR_IMAGE.to_owned()),
            args: Some(vec![
                "run-restore-job".to_owned(),
                format!("--repository={repo_url}"),
                format!("--host={hostname}"),
                "--target=/stash-data".to_owned(),
            ]),
            env: Some(vec![k8s_openapi::api::core::v1::EnvVar {
                name: "RESTIC_PASSWORD".to_owned(),
                value: Some(password.to_owned()),
                ..Default::default()
            }]),
            volume_mounts: Some(vec![k8s_openapi::api::core::v1::VolumeMount {
                name: "target".to_owned(),
                mount_path: "/stash-data".to_owned(),
                ..Default::default()
            }]),
            ..Container::default()
        };

        let job = Job {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.to_owned()),
                ..ObjectMeta::default()
            },
            spec: Some(JobSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![container],
                        restart_policy: Some("Never".to_owned()),
                        volumes: Some(vec![Volume {
                            name: "target".to_owned(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: session.spec.target.ref_.name.clone(),
                                ..Default::default()
                            }),
                            ..Volume::default()
                        }]),
                        ..PodSpec::default()
                    }),
                    ..PodTemplateSpec::default()
                },
                backoff_limit: Some(2),
                ..JobSpec::default()
            }),
            ..Job::default()
        };

        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&job),
        )
        .await
        .map_err(StashError::from)?;
        Ok(())
    }

    async fn job_phase(&self, namespace: &str, session_name: &str, hostname: &str) -> Result<RestorePhase> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let Some(job) = api
            .get_opt(&Self::job_name(session_name, hostname))
            .await
            .map_err(StashError::from)?
        else {
            return Ok(RestorePhase::Pending);
        };
        let Some(status) = job.status else {
            return Ok(RestorePhase::Running);
        };
        if status.succeeded.unwrap_or(0) > 0 {
            Ok(RestorePhase::Succeeded)
        } else if status.failed.unwrap_or(0) > 0 {
            Ok(RestorePhase::Failed)
        } else {
            Ok(RestorePhase::Running)
        }
    }
}

#[async_trait]
impl Reconciler<RestoreSession> for RestoreSessionReconciler {
    type Error = StashError;

    async fn reconcile_once(&self, session: Arc<RestoreSession>) -> Result<Option<Duration>> {
        let namespace = session.namespace().unwrap_or_default();
        let api: Api<RestoreSession> = Api::namespaced(self.client.clone(), &namespace);
        let status = session.status.clone().unwrap_or_default();

        if status.phase.is_terminal() {
            return Ok(None);
        }

        let model = target::resolve(&session.spec.target.ref_.kind, &Driver::Restic, false);
        if matches!(model, ExecutionModel::VolumeSnapshotter | ExecutionModel::AddonJob) {
            return Err(StashError::config(format!(
                "restore for target kind {} is not implemented by this operator",
                session.spec.target.ref_.kind.lowercase()
            )));
        }

        let (repo_url, password) = repo_creds::load(&self.client, &namespace, &session.spec.repository).await?;

        let snapshots = self
            .engine
            .snapshots(&repo_url, &password, None, &[])
            .await?;
        let hosts: BTreeSet<String> = snapshots.into_iter().map(|s| s.hostname).collect();

        let mut stats = Vec::new();
        for hostname in &hosts {
            let Some(_rule) = select_rule(&session.spec.rules, hostname) else {
                continue;
            };

            let phase = if matches!(model, ExecutionModel::Job) {
                self.ensure_restore_job(&namespace, &session, hostname, &repo_url, &password)
                    .await?;
                self.job_phase(&namespace, &session.name_any(), hostname).await?
            } else {
                status
                    .target_status
                    .stats
                    .iter()
                    .find(|s| &s.hostname == hostname)
                    .map_or(RestorePhase::Pending, |s| s.phase.clone())
            };

            stats.push(RestoreHostStats {
                hostname: hostname.clone(),
                phase,
                source_host: None,
                duration: None,
                error: None,
            });
        }

        let all_terminal = !stats.is_empty() && stats.iter().all(|s| s.phase.is_terminal());
        let overall = if !all_terminal {
            RestorePhase::Running
        } else if stats.iter().any(|s| s.phase == RestorePhase::Failed) {
            RestorePhase::Failed
        } else {
            RestorePhase::Succeeded
        };

        let new_status = RestoreSessionStatus {
            phase: overall,
            target_status: RestoreTargetStatus { stats },
        };
        api.patch_status(
            &session.name_any(),
            &PatchParams::default(),
            &Patch::Merge(serde_json::json!({ "status": new_status })),
        )
        .await
        .map_err(StashError::from)?;

        if all_terminal {
            Ok(None)
        } else {
            Ok(Some(Duration::from_secs(10)))
        }
    }
}
