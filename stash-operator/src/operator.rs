//! Wires together CRD installation, the Reconciler Core for every Stash kind,
//! the Auto-Backup Watcher for every workload kind it can target (§4.J), and
//! the metrics/health HTTP server (§8). Also handles the `Crds` and
//! `CreateBackupSession` subcommands, the latter being exactly what the
//! Schedule Controller's `CronJob` runs on each fire (§4.F).

use anyhow::Result;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, ReplicationController, StatefulSet};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::PostParams;
use kube::{Api, Client, Resource};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use stash_api::v1alpha1::{
    AppBinding, BackupBatch, BackupConfiguration, BackupSession, BackupSessionSpec, Invoker, InvokerKind,
    Repository, RestoreSession,
};
use stash_operator_api::engine::{EngineDriver, SubprocessEngine};

use crate::config::{Command, Config, Namespace, RunArgs};
use crate::consts::ENGINE_BINARY;
use crate::controller;
use crate::controller::backup_batch::BackupBatchReconciler;
use crate::controller::backup_configuration::BackupConfigurationReconciler;
use crate::controller::backup_session::BackupSessionReconciler;
use crate::controller::blueprint::AutoBackupReconciler;
use crate::controller::repository::RepositoryReconciler;
use crate::controller::restore_session::RestoreSessionReconciler;

/// The Stash controller manager.
#[derive(Debug)]
pub struct Operator {
    config: Config,
}

impl Operator {
    /// Constructor
    #[inline]
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Dispatches to the subcommand selected on the CLI.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the selected subcommand fails.
    #[inline]
    pub async fn run(&self) -> Result<()> {
        match &self.config.command {
            Command::Crds => print_crds(),
            Command::Run(args) => self.run_manager(args).await,
            Command::CreateBackupSession {
                invokername,
                invokertype,
                namespace,
            } => create_backup_session(invokername, invokertype, namespace).await,
        }
    }

    async fn run_manager(&self, args: &RunArgs) -> Result<()> {
        let client = Client::try_default().await?;
        stash_api::v1alpha1::install_crds(&client, args.manage_crd).await?;
        crate::metrics::init();

        let engine: Arc<dyn EngineDriver> = Arc::new(SubprocessEngine::new(ENGINE_BINARY));
        let workers = usize::from(args.workers_per_kind);

        let ready = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();
        tasks.spawn(crate::router::serve(args.listen_addr.clone(), ready.clone()));

        let own_namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| "default".to_owned());
        info!("contending for leader lease");
        crate::leader::acquire(client.clone(), &own_namespace, ready).await?;

        tasks.spawn(controller::run(
            scoped_api::<Repository>(client.clone(), &args.namespace),
            RepositoryReconciler::new(client.clone(), engine.clone()),
            workers,
        ));
        tasks.spawn(controller::run(
            scoped_api::<BackupConfiguration>(client.clone(), &args.namespace),
            BackupConfigurationReconciler::new(client.clone()),
            workers,
        ));
        tasks.spawn(controller::run(
            scoped_api::<BackupBatch>(client.clone(), &args.namespace),
            BackupBatchReconciler::new(client.clone()),
            workers,
        ));
        tasks.spawn(controller::run(
            scoped_api::<BackupSession>(client.clone(), &args.namespace),
            BackupSessionReconciler::new(client.clone(), engine.clone()),
            workers,
        ));
        tasks.spawn(controller::run(
            scoped_api::<RestoreSession>(client.clone(), &args.namespace),
            RestoreSessionReconciler::new(client.clone(), engine.clone()),
            workers,
        ));

        tasks.spawn(controller::run(
            scoped_api::<Deployment>(client.clone(), &args.namespace),
            AutoBackupReconciler::<Deployment>::new(client.clone()),
            workers,
        ));
        tasks.spawn(controller::run(
            scoped_api::<DaemonSet>(client.clone(), &args.namespace),
            AutoBackupReconciler::<DaemonSet>::new(client.clone()),
            workers,
        ));
        tasks.spawn(controller::run(
            scoped_api::<StatefulSet>(client.clone(), &args.namespace),
            AutoBackupReconciler::<StatefulSet>::new(client.clone()),
            workers,
        ));
        tasks.spawn(controller::run(
            scoped_api::<ReplicaSet>(client.clone(), &args.namespace),
            AutoBackupReconciler::<ReplicaSet>::new(client.clone()),
            workers,
        ));
        tasks.spawn(controller::run(
            scoped_api::<ReplicationController>(client.clone(), &args.namespace),
            AutoBackupReconciler::<ReplicationController>::new(client.clone()),
            workers,
        ));
        tasks.spawn(controller::run(
            scoped_api::<AppBinding>(client.clone(), &args.namespace),
            AutoBackupReconciler::<AppBinding>::new(client.clone()),
            workers,
        ));

        info!("press ctrl+c to shut down");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested, exiting");
            }
            Some(res) = tasks.join_next() => {
                if let Err(err) = res {
                    warn!(error = %err, "a controller task exited unexpectedly");
                }
            }
        }

        Ok(())
    }
}

/// Scopes an `Api<K>` to a single namespace or the whole cluster, per `--namespace` (§4.I).
fn scoped_api<K>(client: Client, namespace: &Namespace) -> Api<K>
where
    K: Resource<DynamicType = ()>,
{
    match namespace {
        Namespace::Single(ns) => Api::namespaced(client, ns),
        Namespace::ClusterWide => Api::all(client),
    }
}

/// Prints every CRD manifest to stdout, mirroring the teacher's `crdgen` binary.
fn print_crds() -> Result<()> {
    for crd in stash_api::v1alpha1::all_crds() {
        println!("{}", serde_yaml::to_string(&crd)?);
        println!("---");
    }
    Ok(())
}

/// Creates a `BackupSession` for the named invoker; this is the command the
/// Schedule Controller's `CronJob` actually runs on each fire (§4.F).
async fn create_backup_session(invokername: &str, invokertype: &str, namespace: &str) -> Result<()> {
    let kind = match invokertype.to_lowercase().as_str() {
        "backupconfiguration" => InvokerKind::BackupConfiguration,
        "backupbatch" => InvokerKind::BackupBatch,
        other => anyhow::bail!("unknown invoker type {other}"),
    };

    let client = Client::try_default().await?;
    let api: Api<BackupSession> = Api::namespaced(client, namespace);
    let session = BackupSession {
        metadata: ObjectMeta {
            generate_name: Some(format!("{invokername}-")),
            namespace: Some(namespace.to_owned()),
            ..ObjectMeta::default()
        },
        spec: BackupSessionSpec {
            invoker: Invoker {
                kind,
                name: invokername.to_owned(),
            },
        },
        status: None,
    };

    let created = api.create(&PostParams::default(), &session).await?;
    info!(name = ?created.metadata.name, invoker = %invokername, "created backup session");
    Ok(())
}
