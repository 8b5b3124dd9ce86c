// Copyright (c) 2026 Sentrybus
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! A small `axum` HTTP server exposing `/metrics` (Prometheus text
//! exposition) and `/livez`/`/readyz` (JSON liveness/readiness probes),
//! shared by both the bus and agent binaries.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;

use super::metrics::Metrics;

/// Evaluates current liveness/readiness, called fresh on every probe so it
/// always reflects the process's actual state rather than a cached flag.
pub trait HealthCheck: Send + Sync + 'static {
    /// Whether the process's background tasks are alive and its durable
    /// storage handle is openable.
    fn is_live(&self) -> bool;
    /// Whether the process should currently receive traffic.
    fn is_ready(&self) -> bool;
}

struct AppState<H: HealthCheck> {
    metrics: Metrics,
    health: H,
}

#[derive(Serialize)]
struct ProbeBody {
    ok: bool,
}

/// Serve the metrics/health endpoint on `addr` until the returned future is
/// dropped or the process exits; intended to be `tokio::spawn`ed alongside
/// the gRPC server or publisher runtime.
pub async fn serve<H: HealthCheck>(addr: SocketAddr, metrics: Metrics, health: H) -> std::io::Result<()> {
    let state = Arc::new(AppState { metrics, health });
    let app = Router::new()
        .route("/metrics", get(metrics_handler::<H>))
        .route("/livez", get(livez_handler::<H>))
        .route("/readyz", get(readyz_handler::<H>))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn metrics_handler<H: HealthCheck>(State(state): State<Arc<AppState<H>>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    (StatusCode::OK, String::from_utf8_lossy(&buf).into_owned())
}

async fn livez_handler<H: HealthCheck>(State(state): State<Arc<AppState<H>>>) -> impl IntoResponse {
    let ok = state.health.is_live();
    let status = if ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(ProbeBody { ok }))
}

async fn readyz_handler<H: HealthCheck>(State(state): State<Arc<AppState<H>>>) -> impl IntoResponse {
    let ok = state.health.is_ready();
    let status = if ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(ProbeBody { ok }))
}
