//! Wires together the backup/restore [`Agent`](crate::controller::Agent) and,
//! for the long-running sidecar model, a liveness HTTP server (§8).

use std::sync::Arc;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use kube::Client;
use tokio::task::JoinSet;
use tracing::{info, warn};

use stash_operator_api::engine::{EngineDriver, SubprocessEngine};

use crate::config::RunSidecarArgs;
use crate::consts::{ENGINE_BINARY, POLL_INTERVAL};
use crate::controller::Agent;
use crate::routers;

/// The injected backup/restore agent.
pub struct Sidecar {
    args: RunSidecarArgs,
}

impl Sidecar {
    #[must_use]
    #[inline]
    pub fn new(args: RunSidecarArgs) -> Self {
        Self { args }
    }

    /// Runs the agent. Under `--once` (the `InitContainerCronJob` model) this
    /// performs a single pass and returns so the init container completes and
    /// the application container can start; otherwise it polls forever
    /// alongside a liveness HTTP server, until ctrl-c.
    #[inline]
    pub async fn run(&self) -> Result<()> {
        let client = Client::try_default().await?;
        let engine: Arc<dyn EngineDriver> = Arc::new(SubprocessEngine::new(ENGINE_BINARY));
        let agent = Agent::new(
            client,
            engine,
            self.args.namespace.clone(),
            self.args.target_kind.clone(),
            self.args.target_name.clone(),
            self.args.pod_name.clone(),
        );

        if self.args.once {
            agent.tick().await;
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        tasks.spawn(poll_forever(agent));
        tasks.spawn(serve_health());

        info!("press ctrl+c to shut down");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => { info!("shutdown requested, exiting"); }
            Some(res) = tasks.join_next() => {
                if let Err(err) = res { warn!(error = %err, "a sidecar task exited unexpectedly"); }
            }
        }
        Ok(())
    }
}

async fn poll_forever(agent: Agent) {
    let mut tick = tokio::time::interval(POLL_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        agent.tick().await;
    }
}

async fn serve_health() {
    let app = Router::new().route("/healthz", get(routers::health));
    let addr = ([0, 0, 0, 0], 8080).into();
    if let Err(err) = axum::Server::bind(&addr).serve(app.into_make_service()).await {
        warn!(error = %err, "sidecar health server exited with error");
    }
}
