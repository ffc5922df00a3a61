//! The Blueprint Resolver (§4.C) and the Auto-Backup Watcher (§4.J) that
//! drives it: watches workloads/`AppBinding`s for the backup-blueprint
//! annotation and idempotently materializes a `Repository`+
//! `BackupConfiguration` pair from the named `BackupBlueprint`'s templates.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, ReplicationController, StatefulSet};
use k8s_openapi::api::core::v1::VolumeMount;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;

use stash_api::v1alpha1::consts::{ANNOTATION_BACKUP_BLUEPRINT, ANNOTATION_TARGET_PATHS, ANNOTATION_VOLUME_MOUNTS};
use stash_api::v1alpha1::{
    AppBinding, BackupBlueprint, BackupConfiguration, BackupConfigurationSpec, Repository,
    RepositorySpec, TargetKind,
};
use stash_operator_api::error::{Result, StashError};

use super::Reconciler;
use crate::consts::FIELD_MANAGER;
use crate::template::{self, TemplateInputs};

/// Implemented by every kind the Auto-Backup Watcher can watch. Only metadata
/// (name/namespace/annotations/owner refs) is read, so one generic reconciler
/// covers all of them; `app_version` is the one place a kind's spec matters.
pub(crate) trait AutoBackupTarget:
    Resource<DynamicType = ()> + ResourceExt + Clone + Debug + DeserializeOwned + Send + Sync + 'static
{
    const KIND: TargetKind;

    fn app_version(&self) -> Option<String> {
        None
    }
}

impl AutoBackupTarget for Deployment {
    const KIND: TargetKind = TargetKind::Deployment;
}
impl AutoBackupTarget for DaemonSet {
    const KIND: TargetKind = TargetKind::DaemonSet;
}
impl AutoBackupTarget for StatefulSet {
    const KIND: TargetKind = TargetKind::StatefulSet;
}
impl AutoBackupTarget for ReplicaSet {
    const KIND: TargetKind = TargetKind::ReplicaSet;
}
impl AutoBackupTarget for ReplicationController {
    const KIND: TargetKind = TargetKind::ReplicationController;
}
impl AutoBackupTarget for AppBinding {
    const KIND: TargetKind = TargetKind::AppBinding;

    fn app_version(&self) -> Option<String> {
        self.spec.app_version.clone()
    }
}

pub(crate) struct AutoBackupReconciler<K> {
    client: Client,
    _marker: PhantomData<fn() -> K>,
}

impl<K> AutoBackupReconciler<K> {
    #[must_use]
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            _marker: PhantomData,
        }
    }
}

impl<K: AutoBackupTarget> AutoBackupReconciler<K> {
    async fn delete_backup_configuration(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<BackupConfiguration> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &kube::api::DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(StashError::from(e)),
        }
    }

    async fn apply_repository(&self, namespace: &str, name: &str, spec: RepositorySpec) -> Result<()> {
        let api: Api<Repository> = Api::namespaced(self.client.clone(), namespace);
        let repo = Repository::new(name, spec);
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&repo),
        )
        .await
        .map_err(StashError::from)?;
        Ok(())
    }

    async fn apply_backup_configuration(
        &self,
        namespace: &str,
        name: &str,
        spec: BackupConfigurationSpec,
    ) -> Result<()> {
        let api: Api<BackupConfiguration> = Api::namespaced(self.client.clone(), namespace);
        let bc = BackupConfiguration::new(name, spec);
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&bc),
        )
        .await
        .map_err(StashError::from)?;
        Ok(())
    }
}

#[async_trait]
impl<K: AutoBackupTarget> Reconciler<K> for AutoBackupReconciler<K> {
    type Error = StashError;

    async fn reconcile_once(&self, object: Arc<K>) -> Result<Option<Duration>> {
        if K::KIND == TargetKind::ReplicaSet
            && object
                .owner_references()
                .iter()
                .any(|owner| owner.kind == "Deployment")
        {
            return Ok(None);
        }

        let name = object.name_any();
        let namespace = object.namespace().unwrap_or_default();
        let annotations = object.annotations();
        let backup_config_name = template::resolved_name(K::KIND.lowercase(), &name);

        let Some(blueprint_name) = annotations.get(ANNOTATION_BACKUP_BLUEPRINT) else {
            self.delete_backup_configuration(&namespace, &backup_config_name)
                .await?;
            return Ok(None);
        };

        let blueprint_api: Api<BackupBlueprint> = Api::all(self.client.clone());
        let blueprint = blueprint_api
            .get(blueprint_name)
            .await
            .map_err(StashError::from)?;

        let api_version = <K as Resource>::api_version(&()).into_owned();
        let app_version = object.app_version().unwrap_or_default();
        let inputs = TemplateInputs {
            target_api_version: &api_version,
            target_kind: K::KIND.lowercase(),
            target_name: &name,
            target_namespace: &namespace,
            target_app_version: &app_version,
        };
        let vars = inputs.as_map();

        let resolved_repo = template::resolve(&blueprint.spec.repository_template, &vars)?;
        let repository_spec: RepositorySpec = serde_json::from_value(resolved_repo)
            .map_err(|e| StashError::config(format!("invalid repositoryTemplate after resolution: {e}")))?;

        let repo_name = format!("repo-{name}");
        let paths = annotations
            .get(ANNOTATION_TARGET_PATHS)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let volume_mounts: Vec<VolumeMount> = annotations
            .get(ANNOTATION_VOLUME_MOUNTS)
            .and_then(|v| serde_json::from_str(v).ok())
            .unwrap_or_default();

        let mut resolved_bc = template::resolve(&blueprint.spec.backup_configuration_template, &vars)?;
        inject_target(
            &mut resolved_bc,
            &api_version,
            K::KIND.lowercase(),
            &name,
            paths,
            volume_mounts,
            &repo_name,
        );
        let backup_configuration_spec: BackupConfigurationSpec = serde_json::from_value(resolved_bc)
            .map_err(|e| StashError::config(format!("invalid backupConfigurationTemplate after resolution: {e}")))?;

        self.apply_repository(&namespace, &repo_name, repository_spec)
            .await?;
        self.apply_backup_configuration(&namespace, &backup_config_name, backup_configuration_spec)
            .await?;

        Ok(None)
    }
}

fn inject_target(
    value: &mut serde_json::Value,
    api_version: &str,
    kind_lowercase: &str,
    name: &str,
    paths: Vec<String>,
    volume_mounts: Vec<VolumeMount>,
    repository: &str,
) {
    let serde_json::Value::Object(map) = value else {
        return;
    };
    map.insert(
        "target".to_owned(),
        serde_json::json!({
            "ref": {
                "apiVersion": api_version,
                "kind": titlecase(kind_lowercase),
                "name": name,
            },
            "paths": paths,
            "volumeMounts": volume_mounts,
        }),
    );
    map.insert("repository".to_owned(), serde_json::Value::String(repository.to_owned()));
}

fn titlecase(lowercase_kind: &str) -> &'static str {
    match lowercase_kind {
        "deployment" => "Deployment",
        "daemonset" => "DaemonSet",
        "statefulset" => "StatefulSet",
        "replicaset" => "ReplicaSet",
        "replicationcontroller" => "ReplicationController",
        "appbinding" => "AppBinding",
        _ => "Deployment",
    }
}
