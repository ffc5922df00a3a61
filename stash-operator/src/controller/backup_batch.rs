//! The Schedule Controller half of §4.F for `BackupBatch`: the multi-member
//! counterpart of [`super::backup_configuration`] — one shared schedule and
//! `CronJob`, but each member's target/repository/retention is mutated
//! independently.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};

use stash_api::v1alpha1::consts::FINALIZER;
use stash_api::v1alpha1::{BackupBatch, BackupConfigurationStatus, Repository};
use stash_operator_api::error::{Result, StashError};

use super::Reconciler;
use crate::consts::FIELD_MANAGER;
use crate::target::{self, ExecutionModel};
use crate::workload::{SidecarSpec, WorkloadMutator};
use crate::{cronjob, VERSION};

pub(crate) struct BackupBatchReconciler {
    client: Client,
    mutator: WorkloadMutator,
}

impl BackupBatchReconciler {
    #[must_use]
    pub(crate) fn new(client: Client) -> Self {
        Self {
            mutator: WorkloadMutator::new(client.clone()),
            client,
        }
    }

    async fn teardown(&self, batch: &BackupBatch, namespace: &str) -> Result<()> {
        for member in &batch.spec.members {
            let model = target::resolve(&member.target.ref_.kind, &stash_api::v1alpha1::Driver::Restic, false);
            if matches!(model, ExecutionModel::Sidecar | ExecutionModel::InitContainerCronJob) {
                self.mutator
                    .ensure_sidecar_deleted(namespace, &member.target.ref_.kind, &member.target.ref_.name)
                    .await?;
            }
        }
        cronjob::delete(&self.client, namespace, "BackupBatch", &batch.name_any()).await
    }
}

#[async_trait]
impl Reconciler<BackupBatch> for BackupBatchReconciler {
    type Error = StashError;

    async fn reconcile_once(&self, batch: Arc<BackupBatch>) -> Result<Option<Duration>> {
        let namespace = batch.namespace().unwrap_or_default();
        let api: Api<BackupBatch> = Api::namespaced(self.client.clone(), &namespace);

        if batch.metadata.deletion_timestamp.is_some() {
            if !batch
                .metadata
                .finalizers
                .as_ref()
                .is_some_and(|f| f.iter().any(|f| f == FINALIZER))
            {
                return Ok(None);
            }
            self.teardown(&batch, &namespace).await?;
            let finalizers: Vec<String> = batch
                .metadata
                .finalizers
                .iter()
                .flatten()
                .filter(|f| f.as_str() != FINALIZER)
                .cloned()
                .collect();
            api.patch(
                &batch.name_any(),
                &PatchParams::default(),
                &Patch::Merge(serde_json::json!({ "metadata": { "finalizers": finalizers } })),
            )
            .await
            .map_err(StashError::from)?;
            return Ok(None);
        }

        if !batch
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|f| f == FINALIZER))
        {
            api.patch(
                &batch.name_any(),
                &PatchParams::default(),
                &Patch::Merge(serde_json::json!({ "metadata": { "finalizers": [FINALIZER] } })),
            )
            .await
            .map_err(StashError::from)?;
        }

        for member in &batch.spec.members {
            if self
                .mutator
                .is_replica_set_owned_by_deployment(&namespace, &member.target.ref_.kind, &member.target.ref_.name)
                .await?
            {
                return Err(StashError::config(
                    "target ReplicaSet is owned by a Deployment; target the Deployment instead",
                ));
            }

            let model = target::resolve(&member.target.ref_.kind, &stash_api::v1alpha1::Driver::Restic, false);
            if !matches!(model, ExecutionModel::Sidecar | ExecutionModel::InitContainerCronJob) {
                continue;
            }
            let repo_api: Api<Repository> = Api::namespaced(self.client.clone(), &namespace);
            let repo = repo_api
                .get(&member.repository)
                .await
                .map_err(StashError::from)?;
            self.mutator
                .ensure_sidecar(
                    &namespace,
                    &SidecarSpec {
                        target: &member.target,
                        backend: &repo.spec.backend,
                        repository: &member.repository,
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
            "BackupBatch",
            &batch.name_any(),
            &batch.uid().unwrap_or_default(),
            &batch.spec.schedule,
            batch.spec.paused,
        )
        .await?;

        let status = BackupConfigurationStatus {
            observed_generation: batch.metadata.generation.unwrap_or_default(),
            conditions: batch.status.clone().unwrap_or_default().conditions,
        };
        api.patch_status(
            &batch.name_any(),
            &PatchParams::default(),
            &Patch::Merge(serde_json::json!({ "status": status })),
        )
        .await
        .map_err(StashError::from)?;

        Ok(None)
    }
}
