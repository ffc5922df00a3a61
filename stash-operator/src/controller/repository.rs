//! Repository reconciler: dials the Blob Facade, runs `engine init` exactly
//! once per backend, and keeps `RepositoryStatus` current. Also owns the
//! `wipeOut` teardown path, gated behind [`FINALIZER`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::info;

use stash_api::v1alpha1::consts::FINALIZER;
use stash_api::v1alpha1::repository::{Repository, RepositoryStatus};
use stash_operator_api::blob::{BlobFacade, PASSWORD};
use stash_operator_api::engine::EngineDriver;
use stash_operator_api::error::{Result, StashError};

use super::Reconciler;
use crate::repo_url::repo_url;

const CONFIG_OBJECT_KEY: &str = "config";

pub(crate) struct RepositoryReconciler {
    client: Client,
    engine: Arc<dyn EngineDriver>,
}

impl RepositoryReconciler {
    #[must_use]
    pub(crate) fn new(client: Client, engine: Arc<dyn EngineDriver>) -> Self {
        Self { client, engine }
    }

    async fn storage_secret(&self, namespace: &str, name: Option<&str>) -> Result<Option<Secret>> {
        let Some(name) = name else { return Ok(None) };
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).await.map(Some).map_err(StashError::from)
    }

    async fn wipe_out(&self, facade: &BlobFacade) -> Result<()> {
        let keys = facade.list("").await?;
        for key in keys {
            facade.delete(&key).await?;
        }
        Ok(())
    }

    async fn remove_finalizer(&self, api: &Api<Repository>, repo: &Repository) -> Result<()> {
        let finalizers: Vec<String> = repo
            .metadata
            .finalizers
            .iter()
            .flatten()
            .filter(|f| f.as_str() != FINALIZER)
            .cloned()
            .collect();
        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        api.patch(
            &repo.name_any(),
            &PatchParams::default(),
            &Patch::Merge(patch),
        )
        .await
        .map_err(StashError::from)?;
        Ok(())
    }

    async fn ensure_finalizer(&self, api: &Api<Repository>, repo: &Repository) -> Result<()> {
        if repo
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|f| f == FINALIZER))
        {
            return Ok(());
        }
        let patch = serde_json::json!({ "metadata": { "finalizers": [FINALIZER] } });
        api.patch(
            &repo.name_any(),
            &PatchParams::default(),
            &Patch::Merge(patch),
        )
        .await
        .map_err(StashError::from)?;
        Ok(())
    }
}

#[async_trait]
impl Reconciler<Repository> for RepositoryReconciler {
    type Error = StashError;

    async fn reconcile_once(&self, repo: Arc<Repository>) -> Result<Option<Duration>> {
        let namespace = repo.namespace().unwrap_or_default();
        let api: Api<Repository> = Api::namespaced(self.client.clone(), &namespace);

        if repo.metadata.deletion_timestamp.is_some() {
            if !repo
                .metadata
                .finalizers
                .as_ref()
                .is_some_and(|f| f.iter().any(|f| f == FINALIZER))
            {
                return Ok(None);
            }
            if repo.spec.wipe_out {
                let secret = self
                    .storage_secret(&namespace, repo.spec.storage_secret_name.as_deref())
                    .await?;
                let facade = BlobFacade::dial(&repo.spec.backend, secret.as_ref())?;
                self.wipe_out(&facade).await?;
            }
            self.remove_finalizer(&api, &repo).await?;
            return Ok(None);
        }

        self.ensure_finalizer(&api, &repo).await?;

        let secret = self
            .storage_secret(&namespace, repo.spec.storage_secret_name.as_deref())
            .await?;
        let facade = BlobFacade::dial(&repo.spec.backend, secret.as_ref())?;
        facade.check_bucket_access().await?;

        let password = secret
            .as_ref()
            .and_then(|s| s.data.as_ref())
            .and_then(|d| d.get(PASSWORD))
            .map(|v| String::from_utf8_lossy(&v.0).into_owned())
            .ok_or_else(|| StashError::config("repository secret is missing the password key"))?;

        let url = repo_url(&repo.spec.backend);
        if !facade.head(CONFIG_OBJECT_KEY).await? {
            info!(repository = %repo.name_any(), "initializing new repository");
            self.engine.initialize(&url, &password).await?;
        }

        let integrity = self.engine.check(&url, &password).await?;

        let status = RepositoryStatus {
            observed_generation: repo.metadata.generation.unwrap_or_default(),
            integrity: Some(integrity),
            last_backup_time: Some(Utc::now().to_rfc3339()),
            ..repo.status.clone().unwrap_or_default()
        };
        api.patch_status(
            &repo.name_any(),
            &PatchParams::default(),
            &Patch::Merge(serde_json::json!({ "status": status })),
        )
        .await
        .map_err(StashError::from)?;

        Ok(None)
    }
}
