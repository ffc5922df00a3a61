//! The Target Resolver (§4.D): maps a `Target`'s kind (and, for
//! `PersistentVolumeClaim`, whether the backend driver is `VolumeSnapshotter`)
//! onto the execution model the rest of the controllers dispatch on.

use stash_api::v1alpha1::common::{Driver, TargetKind};

/// How a backup/restore is actually carried out for a resolved target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutionModel {
    /// A long-lived sidecar container injected into the workload's pod template.
    Sidecar,
    /// An init-container plus a CronJob-driven trigger (offline backup).
    InitContainerCronJob,
    /// A standalone `Job` mounting the target PVC and the repository secret.
    Job,
    /// `VolumeSnapshot`/PVC-from-snapshot objects, no data-plane container at all.
    VolumeSnapshotter,
    /// A `Job` running an addon function specific to the bound application.
    AddonJob,
}

/// Resolves the decision table of §4.D. `offline` selects the init-container
/// variant of the `Deployment`/`DaemonSet`/`StatefulSet` row; the table's
/// "ReplicaSet not owned by Deployment" rule is enforced by the caller before
/// invoking this (an owned `ReplicaSet` never reaches here, see
/// [`is_replica_set_owned_by_deployment`]).
pub(crate) fn resolve(kind: &TargetKind, driver: &Driver, offline: bool) -> ExecutionModel {
    match (kind, driver) {
        (TargetKind::PersistentVolumeClaim, Driver::VolumeSnapshotter) => {
            ExecutionModel::VolumeSnapshotter
        }
        (TargetKind::PersistentVolumeClaim, Driver::Restic) => ExecutionModel::Job,
        (TargetKind::AppBinding, _) => ExecutionModel::AddonJob,
        (_, _) if offline => ExecutionModel::InitContainerCronJob,
        (_, _) => ExecutionModel::Sidecar,
    }
}

/// A `ReplicaSet` owned by a `Deployment` is never itself a target: the
/// Deployment's own mutation is inherited by its ReplicaSets and pods.
#[must_use]
pub(crate) fn is_replica_set_owned_by_deployment(owner_kind: Option<&str>) -> bool {
    owner_kind == Some("Deployment")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pvc_with_csi_snapshotter_routes_to_volume_snapshotter() {
        assert_eq!(
            resolve(
                &TargetKind::PersistentVolumeClaim,
                &Driver::VolumeSnapshotter,
                false
            ),
            ExecutionModel::VolumeSnapshotter
        );
    }

    #[test]
    fn pvc_with_restic_routes_to_job() {
        assert_eq!(
            resolve(&TargetKind::PersistentVolumeClaim, &Driver::Restic, false),
            ExecutionModel::Job
        );
    }

    #[test]
    fn deployment_is_sidecar_unless_offline() {
        assert_eq!(
            resolve(&TargetKind::Deployment, &Driver::Restic, false),
            ExecutionModel::Sidecar
        );
        assert_eq!(
            resolve(&TargetKind::Deployment, &Driver::Restic, true),
            ExecutionModel::InitContainerCronJob
        );
    }

    #[test]
    fn app_binding_is_always_addon_job() {
        assert_eq!(
            resolve(&TargetKind::AppBinding, &Driver::Restic, false),
            ExecutionModel::AddonJob
        );
    }

    #[test]
    fn owned_replica_set_is_ignored() {
        assert!(is_replica_set_owned_by_deployment(Some("Deployment")));
        assert!(!is_replica_set_owned_by_deployment(Some("StatefulSet")));
        assert!(!is_replica_set_owned_by_deployment(None));
    }
}
