//! The Workload Mutator (§4.E): upserts the backup sidecar/init-container and
//! its two fixed volumes into a workload's pod template, and reverses the
//! change on removal. Grounded on the teacher's own apply-patch style in
//! `controller/cluster/v1alpha.rs` (`Patch::Apply` against a freshly-built
//! object via the crate's field manager), generalized from one hardcoded
//! `StatefulSet` to the four generic pod-template-bearing workload kinds.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{
    Container, DownwardAPIVolumeFile, DownwardAPIVolumeSource, EmptyDirVolumeSource, EnvVar,
    EnvVarSource, ObjectFieldSelector, PodSpec, PodTemplateSpec, ReplicationController, Volume,
    VolumeMount,
};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};

use stash_api::v1alpha1::common::{Target, TargetKind};
use stash_api::v1alpha1::consts::{
    ANNOTATION_LAST_APPLIED_CONFIGURATION, ANNOTATION_VERSION, FINALIZER, LOCAL_VOLUME_NAME,
    PODINFO_VOLUME_NAME, SCRATCH_VOLUME_NAME, STASH_CONTAINER_NAME,
};
use stash_api::v1alpha1::repository::Backend;
use stash_operator_api::error::{Result, StashError};

use crate::consts::FIELD_MANAGER;

/// Everything the mutator needs to build the injected container and volumes.
pub(crate) struct SidecarSpec<'a> {
    pub target: &'a Target,
    pub backend: &'a Backend,
    pub repository: &'a str,
    pub operator_image: &'a str,
    pub version: &'a str,
    pub init_container: bool,
}

/// Bound on how long [`WorkloadMutator::ensure_sidecar`] waits for the
/// mutated workload to roll out and become ready (§4.E) before giving up.
const ROLLOUT_TIMEOUT: Duration = Duration::from_secs(300);
const ROLLOUT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub(crate) struct WorkloadMutator {
    client: Client,
}

impl WorkloadMutator {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    /// `EnsureSidecar`/`EnsureInitContainer` — upserts the container and
    /// volumes, then waits until the workload has observed the patch and its
    /// pods are ready (§4.E) before returning.
    pub(crate) async fn ensure_sidecar(&self, namespace: &str, spec: &SidecarSpec<'_>) -> Result<()> {
        let name = spec.target.ref_.name.clone();
        let container = build_container(spec, namespace);
        let volumes = build_volumes(spec);

        mutate_pod_template(
            &self.client,
            namespace,
            &spec.target.ref_.kind,
            &name,
            |pod_spec| {
                if spec.init_container {
                    let mut init = pod_spec.init_containers.take().unwrap_or_default();
                    upsert_container(&mut init, container.clone());
                    pod_spec.init_containers = Some(init);
                } else {
                    upsert_container(&mut pod_spec.containers, container.clone());
                }
                upsert_volumes(pod_spec, &volumes);
                if pod_spec.image_pull_secrets.is_none() {
                    pod_spec.image_pull_secrets = Some(Vec::new());
                }
            },
            Some(
                last_applied_annotations(spec)
                    .into_iter()
                    .map(|(k, v)| (k, Some(v)))
                    .collect(),
            ),
        )
        .await?;

        if spec.init_container {
            // An init container only runs once per pod creation; there is no
            // steady-state "rollout" to wait for until the CronJob-driven Job
            // actually recreates the pod.
            return Ok(());
        }
        wait_for_rollout(&self.client, namespace, &spec.target.ref_.kind, &name).await
    }

    /// Fetches the live `ReplicaSet` and reports whether it's owned by a
    /// `Deployment` (§4.D: such a ReplicaSet is never itself a target, its
    /// mutation is inherited from the owning Deployment). No-op for any other
    /// kind.
    pub(crate) async fn is_replica_set_owned_by_deployment(
        &self,
        namespace: &str,
        kind: &TargetKind,
        name: &str,
    ) -> Result<bool> {
        if *kind != TargetKind::ReplicaSet {
            return Ok(false);
        }
        let api: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
        let rs = api.get(name).await.map_err(|e| StashError::workload_mutation(e.to_string()))?;
        let owner_kind = rs
            .metadata
            .owner_references
            .as_ref()
            .and_then(|owners| owners.iter().find(|o| o.controller == Some(true)))
            .map(|o| o.kind.as_str());
        Ok(crate::target::is_replica_set_owned_by_deployment(owner_kind))
    }

    /// `EnsureSidecarDeleted` — strips the container, the three volumes and the
    /// two drift-detection annotations.
    pub(crate) async fn ensure_sidecar_deleted(
        &self,
        namespace: &str,
        kind: &TargetKind,
        name: &str,
    ) -> Result<()> {
        mutate_pod_template(
            &self.client,
            namespace,
            kind,
            name,
            |pod_spec| {
                pod_spec
                    .containers
                    .retain(|c| c.name != STASH_CONTAINER_NAME);
                if let Some(init) = pod_spec.init_containers.as_mut() {
                    init.retain(|c| c.name != STASH_CONTAINER_NAME);
                }
                if let Some(volumes) = pod_spec.volumes.as_mut() {
                    volumes.retain(|v| {
                        ![SCRATCH_VOLUME_NAME, PODINFO_VOLUME_NAME, LOCAL_VOLUME_NAME]
                            .contains(&v.name.as_str())
                    });
                }
            },
            Some(BTreeMap::from([
                (ANNOTATION_LAST_APPLIED_CONFIGURATION.to_owned(), None),
                (ANNOTATION_VERSION.to_owned(), None),
            ])),
        )
        .await
    }
}

fn last_applied_annotations(spec: &SidecarSpec<'_>) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    let rendered = serde_json::to_string(spec.target).unwrap_or_default();
    annotations.insert(ANNOTATION_LAST_APPLIED_CONFIGURATION.to_owned(), rendered);
    annotations.insert(ANNOTATION_VERSION.to_owned(), spec.version.to_owned());
    annotations
}

fn build_container(spec: &SidecarSpec<'_>, namespace: &str) -> Container {
    let mut mounts = spec.target.volume_mounts.clone();
    mounts.push(VolumeMount {
        name: SCRATCH_VOLUME_NAME.to_owned(),
        mount_path: stash_util::consts::SCRATCH_DIR.to_owned(),
        ..VolumeMount::default()
    });
    mounts.push(VolumeMount {
        name: PODINFO_VOLUME_NAME.to_owned(),
        mount_path: stash_util::consts::PODINFO_DIR.to_owned(),
        ..VolumeMount::default()
    });
    if matches!(spec.backend, Backend::Local { .. }) {
        mounts.push(VolumeMount {
            name: LOCAL_VOLUME_NAME.to_owned(),
            mount_path: stash_util::consts::LOCAL_BACKEND_DIR.to_owned(),
            ..VolumeMount::default()
        });
    }

    let mut args = vec![
        "run-sidecar".to_owned(),
        format!("--repository={}", spec.repository),
        format!("--target-kind={}", spec.target.ref_.kind.lowercase()),
        format!("--target-name={}", spec.target.ref_.name),
        format!("--namespace={namespace}"),
    ];
    if spec.init_container {
        args.push("--once".to_owned());
    }

    Container {
        name: STASH_CONTAINER_NAME.to_owned(),
        image: Some(spec.operator_image.to_owned()),
        args: Some(args),
        env: Some(vec![EnvVar {
            name: "POD_NAME".to_owned(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.name".to_owned(),
                    ..ObjectFieldSelector::default()
                }),
                ..EnvVarSource::default()
            }),
            ..EnvVar::default()
        }]),
        volume_mounts: Some(mounts),
        ..Container::default()
    }
}

fn build_volumes(spec: &SidecarSpec<'_>) -> Vec<Volume> {
    let mut volumes = vec![
        Volume {
            name: SCRATCH_VOLUME_NAME.to_owned(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Volume::default()
        },
        Volume {
            name: PODINFO_VOLUME_NAME.to_owned(),
            downward_api: Some(DownwardAPIVolumeSource {
                items: Some(vec![DownwardAPIVolumeFile {
                    path: "labels".to_owned(),
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "metadata.labels".to_owned(),
                        ..ObjectFieldSelector::default()
                    }),
                    ..DownwardAPIVolumeFile::default()
                }]),
                ..DownwardAPIVolumeSource::default()
            }),
            ..Volume::default()
        },
    ];
    if let Backend::Local { volume_source, .. } = spec.backend {
        volumes.push(local_volume(volume_source));
    }
    volumes
}

/// `VolumeSource` and `Volume` share an identical field set beyond `name`; a
/// JSON round-trip avoids hand-listing every source kind (`emptyDir`,
/// `hostPath`, `persistentVolumeClaim`, ...).
fn local_volume(source: &k8s_openapi::api::core::v1::VolumeSource) -> Volume {
    let mut value = serde_json::to_value(source).unwrap_or_default();
    if let serde_json::Value::Object(ref mut map) = value {
        map.insert(
            "name".to_owned(),
            serde_json::Value::String(LOCAL_VOLUME_NAME.to_owned()),
        );
    }
    serde_json::from_value(value).unwrap_or_else(|_| Volume {
        name: LOCAL_VOLUME_NAME.to_owned(),
        ..Volume::default()
    })
}

fn upsert_container(containers: &mut Vec<Container>, container: Container) {
    if let Some(existing) = containers.iter_mut().find(|c| c.name == container.name) {
        *existing = container;
    } else {
        containers.push(container);
    }
}

fn upsert_volumes(pod_spec: &mut PodSpec, volumes: &[Volume]) {
    let mut existing = pod_spec.volumes.take().unwrap_or_default();
    for volume in volumes {
        if let Some(slot) = existing.iter_mut().find(|v| v.name == volume.name) {
            *slot = volume.clone();
        } else {
            existing.push(volume.clone());
        }
    }
    pod_spec.volumes = Some(existing);
}

/// Fetches the workload, mutates its `PodSpec` in place via `mutate`, merges in
/// `annotations` when present, and writes back with a JSON merge patch scoped
/// to just `spec.template` and `metadata.{finalizers,annotations}` — so fields
/// owned by other controllers (replica counts managed by an HPA, for instance)
/// are left untouched.
async fn mutate_pod_template(
    client: &Client,
    namespace: &str,
    kind: &TargetKind,
    name: &str,
    mutate: impl FnOnce(&mut PodSpec),
    annotations: Option<BTreeMap<String, Option<String>>>,
) -> Result<()> {
    macro_rules! dispatch {
        ($ty:ty, $template_expr:expr) => {{
            let api: Api<$ty> = Api::namespaced(client.clone(), namespace);
            let mut obj = api
                .get(name)
                .await
                .map_err(|e| StashError::workload_mutation(e.to_string()))?;
            let spec = obj
                .spec
                .as_mut()
                .ok_or_else(|| StashError::workload_mutation("workload has no .spec"))?;
            let template: &mut PodTemplateSpec = $template_expr(spec)
                .ok_or_else(|| StashError::workload_mutation("workload has no pod template"))?;
            if template.spec.is_none() {
                template.spec = Some(PodSpec::default());
            }
            let pod_spec = template.spec.as_mut().unwrap_or_else(|| unreachable!());
            mutate(pod_spec);

            let mut finalizers = obj.metadata.finalizers.take().unwrap_or_default();
            if !finalizers.iter().any(|f| f == FINALIZER) {
                finalizers.push(FINALIZER.to_owned());
            }
            let annotations_patch = annotations
                .clone()
                .map(annotations_to_json)
                .unwrap_or_default();

            let patch = serde_json::json!({
                "metadata": { "finalizers": finalizers, "annotations": annotations_patch },
                "spec": { "template": template },
            });
            api.patch(
                name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Merge(patch),
            )
            .await
            .map_err(|e| StashError::workload_mutation(e.to_string()))?;
            Ok(())
        }};
    }

    match kind {
        TargetKind::Deployment => dispatch!(Deployment, |s: &mut k8s_openapi::api::apps::v1::DeploymentSpec| Some(&mut s.template)),
        TargetKind::DaemonSet => dispatch!(DaemonSet, |s: &mut k8s_openapi::api::apps::v1::DaemonSetSpec| Some(&mut s.template)),
        TargetKind::StatefulSet => dispatch!(StatefulSet, |s: &mut k8s_openapi::api::apps::v1::StatefulSetSpec| Some(&mut s.template)),
        TargetKind::ReplicaSet => dispatch!(ReplicaSet, |s: &mut k8s_openapi::api::apps::v1::ReplicaSetSpec| s.template.as_mut()),
        TargetKind::ReplicationController => dispatch!(ReplicationController, |s: &mut k8s_openapi::api::core::v1::ReplicationControllerSpec| s.template.as_mut()),
        TargetKind::DeploymentConfig => Err(StashError::config(
            "DeploymentConfig is an OpenShift-only kind not exposed by k8s-openapi; unsupported",
        )),
        other => Err(StashError::config(format!(
            "{} is not a pod-template-bearing target kind",
            other.lowercase()
        ))),
    }
}

/// Polls the workload until it has observed the patch (`status.observedGeneration`
/// caught up to `metadata.generation`) and its pods are ready, or
/// [`ROLLOUT_TIMEOUT`] elapses (§4.E).
async fn wait_for_rollout(client: &Client, namespace: &str, kind: &TargetKind, name: &str) -> Result<()> {
    let deadline = tokio::time::Instant::now() + ROLLOUT_TIMEOUT;
    loop {
        if rollout_ready(client, namespace, kind, name).await? {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(StashError::workload_mutation(format!(
                "{} {name} did not roll out within {ROLLOUT_TIMEOUT:?}",
                kind.lowercase()
            )));
        }
        tokio::time::sleep(ROLLOUT_POLL_INTERVAL).await;
    }
}

fn generation_observed(generation: Option<i64>, observed: Option<i64>) -> bool {
    match (generation, observed) {
        (Some(g), Some(o)) => o >= g,
        _ => true,
    }
}

async fn rollout_ready(client: &Client, namespace: &str, kind: &TargetKind, name: &str) -> Result<bool> {
    macro_rules! get {
        ($ty:ty) => {{
            let api: Api<$ty> = Api::namespaced(client.clone(), namespace);
            api.get(name).await.map_err(|e| StashError::workload_mutation(e.to_string()))?
        }};
    }

    match kind {
        TargetKind::Deployment => {
            let obj: Deployment = get!(Deployment);
            let desired = obj.spec.and_then(|s| s.replicas).unwrap_or(1);
            let status = obj.status.unwrap_or_default();
            Ok(generation_observed(obj.metadata.generation, status.observed_generation)
                && status.ready_replicas.unwrap_or(0) >= desired)
        }
        TargetKind::DaemonSet => {
            let obj: DaemonSet = get!(DaemonSet);
            let status = obj.status.unwrap_or_default();
            Ok(generation_observed(obj.metadata.generation, status.observed_generation)
                && status.number_ready >= status.desired_number_scheduled)
        }
        TargetKind::StatefulSet => {
            let obj: StatefulSet = get!(StatefulSet);
            let desired = obj.spec.and_then(|s| s.replicas).unwrap_or(1);
            let status = obj.status.unwrap_or_default();
            Ok(generation_observed(obj.metadata.generation, status.observed_generation)
                && status.ready_replicas.unwrap_or(0) >= desired)
        }
        TargetKind::ReplicaSet => {
            let obj: ReplicaSet = get!(ReplicaSet);
            let desired = obj.spec.and_then(|s| s.replicas).unwrap_or(1);
            let status = obj.status.unwrap_or_default();
            Ok(generation_observed(obj.metadata.generation, status.observed_generation)
                && status.ready_replicas.unwrap_or(0) >= desired)
        }
        TargetKind::ReplicationController => {
            let obj: ReplicationController = get!(ReplicationController);
            let desired = obj.spec.and_then(|s| s.replicas).unwrap_or(1);
            let status = obj.status.unwrap_or_default();
            Ok(generation_observed(obj.metadata.generation, status.observed_generation)
                && status.ready_replicas.unwrap_or(0) >= desired)
        }
        other => Err(StashError::config(format!(
            "{} is not a pod-template-bearing target kind",
            other.lowercase()
        ))),
    }
}

/// `Some(v)` upserts the annotation; `None` emits a JSON-merge-patch null so
/// the key is actually removed from the live object, not merely left absent.
fn annotations_to_json(annotations: BTreeMap<String, Option<String>>) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = annotations
        .into_iter()
        .map(|(k, v)| (k, v.map_or(serde_json::Value::Null, serde_json::Value::String)))
        .collect();
    serde_json::Value::Object(map)
}
