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

//! Typed configuration roots, loaded once at process entry and passed by
//! value into constructors (`BusConfig` into the EventBus, `AgentConfig`
//! into the publisher runtime). No implicit global config.

use std::collections::BTreeMap;
use std::fs;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("read config: {0}")]
    Read(String),
    /// The config file is not valid TOML for the expected shape.
    #[error("parse config: {0}")]
    Parse(String),
}

fn env_override(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

/// EventBus configuration root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BusConfig {
    /// Broker bind port.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Admission threshold before emitting `RETRY`.
    #[serde(default = "default_max_inflight")]
    pub max_inflight: i64,
    /// Operator-toggled flag forcing `RETRY` on every request.
    #[serde(default)]
    pub overload_mode: bool,
    /// Structural size cap in bytes.
    #[serde(default = "default_max_envelope_bytes")]
    pub max_envelope_bytes: usize,
    /// Dedup LRU capacity.
    #[serde(default = "default_dedup_cache_size")]
    pub dedup_cache_size: usize,
    /// Authenticated identities: Subject CN -> agent id.
    #[serde(default)]
    pub cn_allowlist: BTreeMap<String, String>,
    /// Signature verification keys: agent id -> hex-encoded Ed25519 public key.
    #[serde(default)]
    pub agent_key_map: BTreeMap<String, String>,
    /// Path to the CA certificate used to verify client certificates.
    pub ca_cert_path: String,
    /// Path to the broker's own certificate.
    pub server_cert_path: String,
    /// Path to the broker's own private key.
    pub server_key_path: String,
    /// Directory for the durable event store.
    pub store_path: String,
    /// Bind address for the metrics/health HTTP endpoint.
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
}

fn default_listen_port() -> u16 {
    50051
}
fn default_max_inflight() -> i64 {
    500
}
fn default_max_envelope_bytes() -> usize {
    128 * 1024
}
fn default_dedup_cache_size() -> usize {
    100_000
}
fn default_http_addr() -> String {
    "0.0.0.0:9090".to_string()
}

impl BusConfig {
    /// Load from a TOML file, with path-like fields overridable via
    /// `SENTRYBUS_BUS_*` environment variables (mirrors the teacher's
    /// `AMUN_DATA_DIR`-style override pattern for secrets/paths).
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        let mut cfg: BusConfig = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.ca_cert_path = env_override("SENTRYBUS_BUS_CA_CERT_PATH", cfg.ca_cert_path);
        cfg.server_cert_path = env_override("SENTRYBUS_BUS_SERVER_CERT_PATH", cfg.server_cert_path);
        cfg.server_key_path = env_override("SENTRYBUS_BUS_SERVER_KEY_PATH", cfg.server_key_path);
        cfg.store_path = env_override("SENTRYBUS_BUS_STORE_PATH", cfg.store_path);
        Ok(cfg)
    }
}

/// Agent publisher runtime configuration root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    /// `host:port` of the EventBus.
    pub bus_address: String,
    /// Path to this agent's client certificate.
    pub client_cert_path: String,
    /// Path to this agent's client private key.
    pub client_key_path: String,
    /// Path to the CA certificate used to verify the broker's certificate.
    pub ca_cert_path: String,
    /// Path to this agent's WAL database directory.
    pub wal_path: String,
    /// Path to this agent's Ed25519 signing key (PKCS#8), distinct from its
    /// mTLS client identity: key rotation and cert rotation are independent.
    pub signing_key_path: String,
    /// Hard ceiling on WAL on-disk size in bytes.
    #[serde(default = "default_max_backlog_bytes")]
    pub max_backlog_bytes: u64,
    /// Cap on exponential drain backoff, in milliseconds.
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    /// Client-side deadline for a single publish RPC, in milliseconds.
    #[serde(default = "default_publish_deadline_ms")]
    pub publish_deadline_ms: u64,
    /// Delivery mode.
    #[serde(default)]
    pub mode: PublishMode,
    /// Token-bucket send rate; 0 = unlimited.
    #[serde(default)]
    pub send_rate_per_sec: u32,
    /// Bind address for the metrics/health HTTP endpoint.
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    /// Fraction of `max_backlog_bytes` at or above which readiness fails.
    #[serde(default = "default_readiness_threshold")]
    pub readiness_threshold: f64,
}

fn default_max_backlog_bytes() -> u64 {
    64 * 1024 * 1024
}
fn default_retry_max_ms() -> u64 {
    30_000
}
fn default_publish_deadline_ms() -> u64 {
    5_000
}
fn default_readiness_threshold() -> f64 {
    0.5
}

/// Agent delivery mode, per `spec.md` §4.4.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishMode {
    /// Attempt a synchronous publish first; append to the WAL only on a
    /// non-`OK` outcome.
    #[default]
    DirectFirst,
    /// Append to the WAL first, then let the drain loop publish.
    WalFirst,
}

impl AgentConfig {
    /// Load from a TOML file, with path-like fields overridable via
    /// `SENTRYBUS_AGENT_*` environment variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        let mut cfg: AgentConfig = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.client_cert_path = env_override("SENTRYBUS_AGENT_CLIENT_CERT_PATH", cfg.client_cert_path);
        cfg.client_key_path = env_override("SENTRYBUS_AGENT_CLIENT_KEY_PATH", cfg.client_key_path);
        cfg.ca_cert_path = env_override("SENTRYBUS_AGENT_CA_CERT_PATH", cfg.ca_cert_path);
        cfg.wal_path = env_override("SENTRYBUS_AGENT_WAL_PATH", cfg.wal_path);
        cfg.signing_key_path = env_override("SENTRYBUS_AGENT_SIGNING_KEY_PATH", cfg.signing_key_path);
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_config_applies_defaults() {
        let toml = r#"
            ca_cert_path = "/tmp/ca.pem"
            server_cert_path = "/tmp/server.pem"
            server_key_path = "/tmp/server.key"
            store_path = "/tmp/store"
        "#;
        let cfg: BusConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.listen_port, 50051);
        assert_eq!(cfg.max_inflight, 500);
        assert_eq!(cfg.max_envelope_bytes, 128 * 1024);
        assert_eq!(cfg.dedup_cache_size, 100_000);
        assert!(!cfg.overload_mode);
    }

    #[test]
    fn agent_config_default_mode_is_direct_first() {
        let toml = r#"
            bus_address = "127.0.0.1:50051"
            client_cert_path = "/tmp/client.pem"
            client_key_path = "/tmp/client.key"
            ca_cert_path = "/tmp/ca.pem"
            wal_path = "/tmp/wal"
            signing_key_path = "/tmp/agent.key"
        "#;
        let cfg: AgentConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.mode, PublishMode::DirectFirst);
        assert_eq!(cfg.max_backlog_bytes, 64 * 1024 * 1024);
    }
}
