//! The Stash sidecar: the backup/restore agent the Workload Mutator injects as
//! a sidecar or init container (§4.E). Unlike the operator it carries no
//! Reconciler Core of its own — it polls its own namespace for sessions
//! naming its injected target and executes them directly through the shared
//! Engine Driver and HostLock (§4.G, §4.H).

pub mod config;
pub mod sidecar;

pub(crate) mod consts;
pub(crate) mod controller;
pub(crate) mod routers;
