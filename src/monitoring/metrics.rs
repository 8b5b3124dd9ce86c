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

//! Prometheus metrics, registered once at process start and handed into
//! components by value (cheap: every field is an `Arc`-backed handle).

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric could not be constructed or registered.
    #[error("prometheus")]
    Prom,
}

/// Every metric this core exposes, named per `spec.md` §6's semantic list
/// with a `sentrybus_` prefix.
#[derive(Clone)]
pub struct Metrics {
    /// Shared registry; scraped by the HTTP health/metrics endpoint.
    pub registry: Registry,

    /// Publish attempts, broker-side.
    pub publish_attempted_total: IntCounter,
    /// Publish acks that were `OK`.
    pub publish_ok_total: IntCounter,
    /// Publish acks that were `RETRY`.
    pub publish_retry_total: IntCounter,
    /// Publish acks that were `INVALID`.
    pub publish_invalid_total: IntCounter,
    /// Publish acks that were `UNAUTHORIZED`.
    pub publish_unauthorized_total: IntCounter,
    /// `Publish` RPC latency, broker-side.
    pub publish_latency_seconds: Histogram,

    /// Current WAL on-disk size, agent-side.
    pub wal_backlog_bytes: IntGauge,
    /// Rows dropped by WAL overflow eviction, agent-side.
    pub wal_overflow_drop_total: IntCounter,

    /// Current in-flight request count, broker-side.
    pub broker_inflight: IntGauge,
    /// Dedup cache hits, broker-side.
    pub broker_dedup_hits_total: IntCounter,
    /// Envelopes newly persisted, broker-side.
    pub broker_persisted_total: IntCounter,
}

macro_rules! register {
    ($registry:expr, $metric:expr) => {
        $registry.register(Box::new($metric.clone())).map_err(|_| MetricsError::Prom)?;
    };
}

impl Metrics {
    /// Create and register every metric. Call once at process start; pass
    /// the resulting handle into every component that needs to record a
    /// metric, never register at import/construction time elsewhere.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let publish_attempted_total =
            IntCounter::new("sentrybus_publish_attempted_total", "Publish attempts")
                .map_err(|_| MetricsError::Prom)?;
        let publish_ok_total = IntCounter::new("sentrybus_publish_ok_total", "Publish acks: OK")
            .map_err(|_| MetricsError::Prom)?;
        let publish_retry_total =
            IntCounter::new("sentrybus_publish_retry_total", "Publish acks: RETRY")
                .map_err(|_| MetricsError::Prom)?;
        let publish_invalid_total =
            IntCounter::new("sentrybus_publish_invalid_total", "Publish acks: INVALID")
                .map_err(|_| MetricsError::Prom)?;
        let publish_unauthorized_total = IntCounter::new(
            "sentrybus_publish_unauthorized_total",
            "Publish acks: UNAUTHORIZED",
        )
        .map_err(|_| MetricsError::Prom)?;
        let publish_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "sentrybus_publish_latency_seconds",
            "Publish RPC latency",
        ))
        .map_err(|_| MetricsError::Prom)?;

        let wal_backlog_bytes =
            IntGauge::new("sentrybus_wal_backlog_bytes", "Current WAL on-disk size")
                .map_err(|_| MetricsError::Prom)?;
        let wal_overflow_drop_total =
            IntCounter::new("sentrybus_wal_overflow_drop_total", "WAL overflow evictions")
                .map_err(|_| MetricsError::Prom)?;

        let broker_inflight = IntGauge::new("sentrybus_broker_inflight", "In-flight requests")
            .map_err(|_| MetricsError::Prom)?;
        let broker_dedup_hits_total =
            IntCounter::new("sentrybus_broker_dedup_hits_total", "Dedup cache hits")
                .map_err(|_| MetricsError::Prom)?;
        let broker_persisted_total =
            IntCounter::new("sentrybus_broker_persisted_total", "Envelopes newly persisted")
                .map_err(|_| MetricsError::Prom)?;

        register!(registry, publish_attempted_total);
        register!(registry, publish_ok_total);
        register!(registry, publish_retry_total);
        register!(registry, publish_invalid_total);
        register!(registry, publish_unauthorized_total);
        register!(registry, publish_latency_seconds);
        register!(registry, wal_backlog_bytes);
        register!(registry, wal_overflow_drop_total);
        register!(registry, broker_inflight);
        register!(registry, broker_dedup_hits_total);
        register!(registry, broker_persisted_total);

        Ok(Self {
            registry,
            publish_attempted_total,
            publish_ok_total,
            publish_retry_total,
            publish_invalid_total,
            publish_unauthorized_total,
            publish_latency_seconds,
            wal_backlog_bytes,
            wal_overflow_drop_total,
            broker_inflight,
            broker_dedup_hits_total,
            broker_persisted_total,
        })
    }
}
