//! The sidecar's liveness surface (§8): just enough for a k8s liveness probe,
//! unlike the operator's read/write metrics+health server.

use axum::http::StatusCode;

#[allow(clippy::unused_async)] // required by axum's handler signature
pub(crate) async fn health() -> StatusCode {
    StatusCode::OK
}
