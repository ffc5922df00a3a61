//! The operator's metrics/health HTTP server (§8). Read-only: Prometheus
//! scraping, a liveness probe and a leader-gated readiness probe, unlike the
//! sidecar's heartbeat-reporting surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tracing::error;

use crate::metrics;

pub(crate) async fn serve(listen_addr: String, ready: Arc<AtomicBool>) {
    let app = Router::new()
        .route("/metrics", get(metrics::metrics))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(ready);

    let addr = match listen_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(%listen_addr, error = %err, "invalid listen address");
            return;
        }
    };

    if let Err(err) = axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    {
        error!(error = %err, "metrics server exited with error");
    }
}

#[allow(clippy::unused_async)] // required by axum's handler signature
async fn healthz() -> &'static str {
    "ok"
}

/// Ready only once this replica holds the leader lease (§4.I); non-leaders
/// report `503` so they're pulled out of any load-balanced readiness set.
#[allow(clippy::unused_async)] // required by axum's handler signature
async fn readyz(State(ready): State<Arc<AtomicBool>>) -> (StatusCode, &'static str) {
    if ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not leader")
    }
}
