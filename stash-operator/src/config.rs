use clap::{Parser, Subcommand};

/// Stash operator CLI.
#[derive(Debug, Parser)]
#[non_exhaustive]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the controller manager.
    Run(RunArgs),
    /// Print the CRD manifests to stdout and exit (mirrors the teacher's `crdgen`).
    Crds,
    /// Create a `BackupSession` for the named invoker; this is what the Schedule
    /// Controller's CronJob actually runs (§4.F).
    CreateBackupSession {
        #[arg(long)]
        invokername: String,
        #[arg(long)]
        invokertype: String,
        #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
        namespace: String,
    },
}

#[derive(Debug, Parser)]
#[non_exhaustive]
pub struct RunArgs {
    /// The namespace to watch, default to cluster wide.
    #[arg(long, value_parser = namespace_mode_parser, default_value = "")]
    pub namespace: Namespace,
    /// The address on which the metrics/health HTTP server will listen.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen_addr: String,
    /// Whether the operator should install/update its own CRDs on startup.
    #[arg(long, default_value = "true")]
    pub manage_crd: bool,
    /// Number of concurrent workers per watched kind (§4.I).
    #[arg(long, default_value = "4")]
    pub workers_per_kind: u16,
}

/// The namespace to work, `ClusterWide` means work with all namespaces.
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Debug)]
pub enum Namespace {
    Single(String),
    ClusterWide,
}

#[allow(clippy::unnecessary_wraps)]
fn namespace_mode_parser(value: &str) -> Result<Namespace, String> {
    if value.is_empty() {
        return Ok(Namespace::ClusterWide);
    }
    Ok(Namespace::Single(value.to_owned()))
}
