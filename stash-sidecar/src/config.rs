use clap::{Parser, Subcommand};

use stash_api::v1alpha1::common::TargetKind;

/// Stash sidecar CLI.
#[derive(Debug, Parser)]
#[non_exhaustive]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch and execute backup/restore sessions for one injected target
    /// (§4.E). This is the entrypoint the Workload Mutator injects into a
    /// target's pod template as a sidecar or init container.
    RunSidecar(RunSidecarArgs),
}

#[derive(Debug, Parser)]
#[non_exhaustive]
pub struct RunSidecarArgs {
    /// Workload kind of the pod this sidecar was injected into.
    #[arg(long, value_parser = target_kind_parser)]
    pub target_kind: TargetKind,
    /// Name of the workload this sidecar was injected into.
    #[arg(long)]
    pub target_name: String,
    /// Namespace the workload, its sessions and its `Repository` live in.
    #[arg(long, env = "POD_NAMESPACE")]
    pub namespace: String,
    /// This pod's own name, used as the backup engine's host identity and as
    /// the `HostLock` holder (§3, §5); read from the downward API.
    #[arg(long, env = "POD_NAME")]
    pub pod_name: String,
    /// Run exactly one pass over pending sessions and exit, instead of
    /// polling forever. Set by the Workload Mutator for the
    /// `InitContainerCronJob` model, where this process runs as an init
    /// container that must complete before the application container starts.
    #[arg(long, default_value = "false")]
    pub once: bool,
}

fn target_kind_parser(value: &str) -> Result<TargetKind, String> {
    match value {
        "deployment" => Ok(TargetKind::Deployment),
        "daemonset" => Ok(TargetKind::DaemonSet),
        "statefulset" => Ok(TargetKind::StatefulSet),
        "replicaset" => Ok(TargetKind::ReplicaSet),
        "replicationcontroller" => Ok(TargetKind::ReplicationController),
        "deploymentconfig" => Ok(TargetKind::DeploymentConfig),
        "persistentvolumeclaim" => Ok(TargetKind::PersistentVolumeClaim),
        "appbinding" => Ok(TargetKind::AppBinding),
        other => Err(format!("unknown target kind {other}")),
    }
}
