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

//! EventBus broker entrypoint.

use std::sync::Arc;

use tracing::{info, warn};

use sentrybus::bus::admission::AdmissionGate;
use sentrybus::bus::dedup::DedupCache;
use sentrybus::bus::identity::IdentityTable;
use sentrybus::bus::store::EventStore;
use sentrybus::bus::tls::server_tls_config;
use sentrybus::bus::{EventBusPipeline, EventBusServer};
use sentrybus::config::BusConfig;
use sentrybus::monitoring::metrics::Metrics;

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt().with_target(false).with_level(true).compact().try_init();

    let config_path = env("SENTRYBUS_BUS_CONFIG", "bus.toml");
    let cfg = match BusConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load bus config from {config_path}: {e}");
            std::process::exit(1);
        }
    };

    let metrics = Metrics::new().expect("metrics init failed");

    let identity = IdentityTable::from_config(&cfg.cn_allowlist, &cfg.agent_key_map);
    let admission = AdmissionGate::new(cfg.max_inflight, cfg.overload_mode);
    let dedup = DedupCache::new(cfg.dedup_cache_size);
    let store = match EventStore::open(&cfg.store_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to open event store at {}: {e}", cfg.store_path);
            std::process::exit(1);
        }
    };

    let pipeline = Arc::new(EventBusPipeline::new(
        identity,
        admission,
        dedup,
        store,
        cfg.max_envelope_bytes,
        metrics.clone(),
    ));

    let build_info = format!("sentrybus-bus/{}", env!("CARGO_PKG_VERSION"));
    let service = EventBusServer::new(pipeline.clone(), build_info);

    let tls = match server_tls_config(&cfg.server_cert_path, &cfg.server_key_path, &cfg.ca_cert_path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("failed to build mTLS config: {e}");
            std::process::exit(1);
        }
    };

    let grpc_addr = format!("0.0.0.0:{}", cfg.listen_port).parse().expect("invalid listen port");
    let http_addr = cfg.http_addr.parse().expect("invalid http_addr");

    info!(grpc_addr = %grpc_addr, http_addr = %http_addr, "sentrybus-bus starting");

    let grpc_task = tokio::spawn(async move {
        let result = tonic::transport::Server::builder()
            .tls_config(tls)
            .expect("invalid tls config")
            .add_service(service)
            .serve(grpc_addr)
            .await;
        if let Err(e) = result {
            warn!(error = %e, "grpc server exited");
        }
    });

    let health_task = tokio::spawn(async move {
        let health = BusHealth { pipeline };
        if let Err(e) = sentrybus::monitoring::health_http::serve(http_addr, metrics, health).await {
            warn!(error = %e, "health http server exited");
        }
    });

    let _ = grpc_task.await;
    let _ = health_task.await;
}

struct BusHealth {
    pipeline: Arc<EventBusPipeline>,
}

impl sentrybus::monitoring::HealthCheck for BusHealth {
    fn is_live(&self) -> bool {
        true
    }
    fn is_ready(&self) -> bool {
        !self.pipeline.overload_mode()
    }
}
