//! The Schedule Controller half of §4.F for `BackupConfiguration`: ensures the
//! sidecar/init-container injection for sidecar-style targets and the
//! triggering `CronJob`, and tears both down on deletion. The actual backup
//! execution for `Job`/`VolumeSnapshotter`/`AddonJob` targets happens when the
//! Session Controller processes the `BackupSession` the CronJob creates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};

use stash_api::v1alpha1::consts::FINALIZER;
use stash_api::v1alpha1::{BackupConfiguration, BackupConfigurationStatus, Repository};
use stash_operator_api::error::{Result, StashError};

use super::Reconciler;
use crate::consts::FIELD_MANAGER;
use crate::target::{self, ExecutionModel};
use crate::workload::{SidecarSpec, WorkloadMutator};
use crate::{cronjob, VERSION};

pub(crate) struct BackupConfigurationReconciler {
    client: Client,
    mutator: WorkloadMutator,
}

impl BackupConfigurationReconciler {
    #[must_use]
    pub(crate) fn new(client: Client) -> Self {
        Self {
            mutator: WorkloadMutator::new(client.clone()),
            client,
        }
    }

    async fn teardown(&self, bc: &BackupConfiguration, namespace: &str) -> Result<()> {
        let model = target::resolve(&bc.spec.target.ref_.kind, &bc.spec.driver, false);
        if matches!(model, ExecutionModel::Sidecar | ExecutionModel::InitContainerCronJob) {
            self.mutator
                .ensure_sidecar_deleted(namespace, &bc.spec.target.ref_.kind, &bc.spec.target.ref_.name)
                .await?;
        }
        cronjob::delete(&self.client, namespace, "BackupConfiguration", &bc.name_any()).await
    }
}

#[async_trait]
impl Reconciler<BackupConfiguration> for BackupConfigurationReconciler {
    type Error = StashError;

    async fn reconcile_once(&self, bc: Arc<BackupConfiguration>) -> Result<Option<Duration>> {
        let namespace = bc.namespace().unwrap_or_default();
        let api: Api<BackupConfiguration> = Api::namespaced(self.client.clone(), &namespace);

        if bc.metadata.deletion_timestamp.is_some() {
            if !bc
                .metadata
                .finalizers
                .as_ref()
                .is_some_and(|f| f.iter().any(|f| f == FINALIZER))
            {
                return Ok(None);
            }
            self.teardown(&bc, &namespace).await?;
            let finalizers: Vec<String> = bc
                .metadata
                .finalizers
                .iter()
                .flatten()
                .filter(|f| f.as_str() != FINALIZER)
                .cloned()
                .collect();
            api.patch(
                &bc.name_any(),
                &PatchParams::default(),
                &Patch::Merge(serde_json::json!({ "metadata": { "finalizers": finalizers } })),
            )
            .await
            .map_err(StashError::from)?;
            return Ok(None);
        }

        if !bc
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|f| f == FINALIZER))
        {
            api.patch(
                &bc.name_any(),
                &PatchParams::default(),
                &Patch::Merge(serde_json::json!({ "metadata": { "finalizers": [FINALIZER] } })),
            )
            .await
            .map_err(StashError::from)?;
        }

        if self
            .mutator
            .is_replica_set_owned_by_deployment(&namespace, &bc.spec.target.ref_.kind, &bc.spec.target.ref_.name)
            .await?
        {
            return Err(StashError::config(
                "target ReplicaSet is owned by a Deployment; target the Deployment instead",
            ));
        }

        let model = target::resolve(&bc.spec.target.ref_.kind, &bc.spec.driver, false);
        if matches!(model, ExecutionModel::Sidecar | ExecutionModel::InitContainerCronJob) {
            let repo_api: Api<Repository> = Api::namespaced(self.client.clone(), &namespace);
            let repo = repo_api
                .get(&bc.spec.repository)
                .await
                .map_err(StashError::from)?;
            self.mutator
                .ensure_sidecar(
                    &namespace,
                    &SidecarSpec {
                        target: &bc.spec.target,
                        backend: &repo.spec.backend,
                        repository: &bc.spec.repository,
                        operator_image: crate::consts::OPERATOR_IMAGE,
                        version: VERSION,
                        init_container: matches!(model, ExecutionModel::InitContainerCronJob),
                    },
                )
                .await?;
        }

        cronjob::ensure(
            &self.client,
            FIELD_MANAGER,
            &namespace,
            "BackupConfiguration",
            &bc.name_any(),
            &bc.uid().unwrap_or_default(),
            &bc.spec.schedule,
            bc.spec.paused,
        )
        .await?;

        let status = BackupConfigurationStatus {
            observed_generation: bc.metadata.generation.unwrap_or_default(),
            conditions: bc.status.clone().unwrap_or_default().conditions,
        };
        api.patch_status(
            &bc.name_any(),
            &PatchParams::default(),
            &Patch::Merge(serde_json::json!({ "status": status })),
        )
        .await
        .map_err(StashError::from)?;

        Ok(None)
    }
}
