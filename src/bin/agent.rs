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

//! Agent publisher entrypoint: opens the WAL, connects to the broker, and
//! keeps the drain loop and health endpoint running.

use std::time::Duration;

use ring::signature::Ed25519KeyPair;
use tracing::{info, warn};

use sentrybus::config::AgentConfig;
use sentrybus::monitoring::metrics::Metrics;
use sentrybus::publisher::client::PublisherClient;
use sentrybus::publisher::drain_loop::{spawn_drain_loop, DrainLoopConfig};
use sentrybus::publisher::runtime::PublisherRuntime;

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt().with_target(false).with_level(true).compact().try_init();

    let config_path = env("SENTRYBUS_AGENT_CONFIG", "agent.toml");
    let cfg = match AgentConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load agent config from {config_path}: {e}");
            std::process::exit(1);
        }
    };

    let pkcs8 = match std::fs::read(&cfg.signing_key_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("failed to read signing key {}: {e}", cfg.signing_key_path);
            std::process::exit(1);
        }
    };
    let key = match Ed25519KeyPair::from_pkcs8(&pkcs8) {
        Ok(k) => k,
        Err(e) => {
            eprintln!("invalid signing key: {e}");
            std::process::exit(1);
        }
    };

    let metrics = Metrics::new().expect("metrics init failed");
    let http_addr = cfg.http_addr.parse().expect("invalid http_addr");
    let retry_max_ms = cfg.retry_max_ms;

    let runtime = match PublisherRuntime::new(cfg.clone(), key, metrics.clone()).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("failed to start publisher runtime: {e}");
            std::process::exit(1);
        }
    };

    let wal = runtime.wal();
    let health = runtime.health();
    let max_backlog_bytes = cfg.max_backlog_bytes;
    let readiness_threshold = cfg.readiness_threshold;

    let drain_client = match PublisherClient::connect(
        &cfg.bus_address,
        &cfg.client_cert_path,
        &cfg.client_key_path,
        &cfg.ca_cert_path,
        Duration::from_millis(cfg.publish_deadline_ms),
    )
    .await
    {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to connect drain-loop client to {}: {e}", cfg.bus_address);
            std::process::exit(1);
        }
    };

    info!(bus = %cfg.bus_address, http_addr = %http_addr, mode = ?cfg.mode, "sentrybus-agent starting");

    let (_handle, runtime_task) = runtime.spawn();
    let drain_task = spawn_drain_loop(wal.clone(), drain_client, health.clone(), DrainLoopConfig { retry_max_ms });

    let agent_health = AgentHealth { health, wal, max_backlog_bytes, readiness_threshold };
    let health_task = tokio::spawn(async move {
        if let Err(e) = sentrybus::monitoring::health_http::serve(http_addr, metrics, agent_health).await {
            warn!(error = %e, "health http server exited");
        }
    });

    let _ = runtime_task.await;
    let _ = drain_task.await;
    let _ = health_task.await;
}

struct AgentHealth {
    health: std::sync::Arc<sentrybus::publisher::PublisherHealth>,
    wal: std::sync::Arc<sentrybus::wal::Wal>,
    max_backlog_bytes: u64,
    readiness_threshold: f64,
}

impl sentrybus::monitoring::HealthCheck for AgentHealth {
    fn is_live(&self) -> bool {
        self.health.is_live()
    }
    fn is_ready(&self) -> bool {
        self.health.is_ready(self.wal.backlog_bytes(), self.max_backlog_bytes, self.readiness_threshold)
    }
}
