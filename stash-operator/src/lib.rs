//! The Stash controller manager: the Reconciler Core (§4.I) driving every
//! Stash custom resource, the Blueprint Resolver and Auto-Backup Watcher
//! (§4.C, §4.J), the Workload Mutator (§4.E) and Target Resolver (§4.D) that
//! back the Schedule Controller (§4.F), and the Session/Restore Controllers
//! (§4.G, §4.H).

pub mod config;
pub mod operator;

pub(crate) mod consts;
pub(crate) mod controller;
pub(crate) mod cronjob;
pub(crate) mod leader;
pub(crate) mod metrics;
pub(crate) mod repo_creds;
pub(crate) mod repo_url;
pub(crate) mod router;
pub(crate) mod target;
pub(crate) mod template;
pub(crate) mod workload;

/// Version string stamped onto sidecars/jobs the operator creates, so an
/// injected image tag always matches the operator that injected it.
pub(crate) const VERSION: &str = env!("CARGO_PKG_VERSION");
