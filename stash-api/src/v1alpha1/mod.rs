pub mod app_binding;
pub mod backup_batch;
pub mod backup_blueprint;
pub mod backup_configuration;
pub mod backup_session;
pub mod common;
pub mod consts;
pub mod repository;
pub mod restore_session;

pub use app_binding::{AppBinding, AppBindingSpec, ClientConfig};
pub use backup_batch::{BackupBatch, BackupBatchSpec, BatchMember};
pub use backup_blueprint::{BackupBlueprint, BackupBlueprintSpec, ResolvedBlueprint};
pub use backup_configuration::{
    BackupConfiguration, BackupConfigurationSpec, BackupConfigurationStatus, Condition,
};
pub use backup_session::{
    BackupSession, BackupSessionSpec, BackupSessionStatus, FileStats, HostStatus, Invoker,
    InvokerKind, SessionPhase, SnapshotStats, TargetStatus,
};
pub use common::{Driver, MemberSelector, RetentionPolicy, RuntimeSettings, Target, TargetKind, TargetRef};
pub use repository::{Backend, Repository, RepositorySpec, RepositoryStatus};
pub use restore_session::{
    select_rule, RestoreHostStats, RestorePhase, RestoreRule, RestoreSession, RestoreSessionSpec,
    RestoreSessionStatus, RestoreTargetStatus,
};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, CustomResourceExt};
use tracing::{debug, info};

const FIELD_MANAGER: &str = "stash.appscode.com/operator";

/// Install (or update) every Stash CRD via server-side apply, then wait for each to
/// report `Established`. Unlike the teacher, this crate carries a single CRD version
/// per kind, so there is no cross-version migration step — see DESIGN.md.
pub async fn install_crds(kube_client: &Client, manage_crd: bool) -> anyhow::Result<()> {
    if !manage_crd {
        info!("CRD management disabled, skipping CRD install");
        return Ok(());
    }

    let crd_api: Api<CustomResourceDefinition> = Api::all(kube_client.clone());

    for definition in all_crds() {
        let name = definition
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| "<unknown>".to_owned());
        debug!(crd = %name, "applying CRD");
        _ = crd_api
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&definition),
            )
            .await?;
        wait_crd_established(&crd_api, &name).await?;
    }
    Ok(())
}

/// Every CRD this crate defines, in install order.
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        Repository::crd(),
        BackupConfiguration::crd(),
        BackupBatch::crd(),
        BackupSession::crd(),
        RestoreSession::crd(),
        BackupBlueprint::crd(),
        AppBinding::crd(),
    ]
}

/// Poll until the named CRD reports the `Established` condition, or give up after
/// a bounded number of attempts.
async fn wait_crd_established(crd_api: &Api<CustomResourceDefinition>, name: &str) -> anyhow::Result<()> {
    use tokio::time::{sleep, Duration};

    for _ in 0..30 {
        let crd = crd_api.get(name).await?;
        let established = crd
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .map(|conds| {
                conds
                    .iter()
                    .any(|c| c.type_ == "Established" && c.status == "True")
            })
            .unwrap_or(false);
        if established {
            debug!(crd = %name, "CRD established");
            return Ok(());
        }
        sleep(Duration::from_millis(200)).await;
    }
    anyhow::bail!("timed out waiting for CRD {name} to become established")
}
