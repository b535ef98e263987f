//! Health check endpoint.

use axum::Json;
use serde::Serialize;

use crate::Backend;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Storage backend in use: `memory` or `postgres`.
    pub storage: &'static str,
    pub version: &'static str,
}

/// GET /health — liveness plus the storage backend the server runs on.
pub async fn check<B: Backend>() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        storage: B::NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}
