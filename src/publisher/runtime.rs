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

//! The agent-side publisher runtime: sign, attempt/append per the
//! configured delivery mode, and expose a cloneable, channel-backed
//! [`PublisherHandle`] so several collector tasks can share one runtime
//! without touching the WAL's single-writer file handle directly.
//!
//! Grounded on the teacher's async task-per-subsystem shape
//! (`networking::p2p::spawn_p2p`: channels in, a background task owning
//! the resource, a join handle returned to the caller).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ring::signature::{Ed25519KeyPair, KeyPair};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::ack::Ack;
use crate::config::{AgentConfig, PublishMode};
use crate::envelope::signing::finalize;
use crate::envelope::{AgentId, Envelope, Payload};
use crate::monitoring::metrics::Metrics;
use crate::publisher::client::{ClientError, PublisherClient};
use crate::publisher::health::PublisherHealth;
use crate::publisher::rate_limit::RateLimiter;
use crate::wal::{AppendOutcome, Wal, WalError};

/// Publisher runtime errors.
#[derive(Debug, Error)]
pub enum PublisherError {
    /// The WAL could not be opened.
    #[error("wal: {0}")]
    Wal(#[from] WalError),
    /// The gRPC client could not be established.
    #[error("client: {0}")]
    Client(#[from] ClientError),
    /// The runtime has already shut down.
    #[error("publisher runtime is shut down")]
    ShuttingDown,
}

struct PublishRequest {
    payload: Payload,
    responder: oneshot::Sender<Ack>,
}

/// A cloneable front for [`PublisherRuntime`]. Every clone shares the same
/// background task and the same WAL; only the channel sender is cloned.
#[derive(Clone)]
pub struct PublisherHandle {
    tx: mpsc::Sender<PublishRequest>,
}

impl PublisherHandle {
    /// Hand a payload to the runtime: sign it, attempt delivery per the
    /// configured mode, and report the resulting ack once known. An
    /// `INVALID`/`UNAUTHORIZED` ack means the envelope was logged and
    /// dropped; `OK` means acknowledged or durably queued.
    pub async fn publish(&self, payload: Payload) -> Result<Ack, PublisherError> {
        let (responder, rx) = oneshot::channel();
        self.tx
            .send(PublishRequest { payload, responder })
            .await
            .map_err(|_| PublisherError::ShuttingDown)?;
        rx.await.map_err(|_| PublisherError::ShuttingDown)
    }
}

/// The owning runtime: one WAL, one signing key, one gRPC client template.
pub struct PublisherRuntime {
    wal: Arc<Wal>,
    key: Ed25519KeyPair,
    producer: AgentId,
    client: PublisherClient,
    config: AgentConfig,
    metrics: Metrics,
    health: Arc<PublisherHealth>,
    rate_limiter: RateLimiter,
    shutting_down: AtomicBool,
}

impl PublisherRuntime {
    /// Build the runtime's state without starting its background task; use
    /// [`spawn`] to start processing.
    pub async fn new(
        config: AgentConfig,
        key: Ed25519KeyPair,
        metrics: Metrics,
    ) -> Result<Self, PublisherError> {
        let producer = AgentId(key.public_key().as_ref().to_vec());
        let wal = Wal::open(&config.wal_path, config.max_backlog_bytes)?;
        let client = PublisherClient::connect(
            &config.bus_address,
            &config.client_cert_path,
            &config.client_key_path,
            &config.ca_cert_path,
            std::time::Duration::from_millis(config.publish_deadline_ms),
        )
        .await?;
        let rate_limiter = RateLimiter::new(config.send_rate_per_sec);
        Ok(Self {
            wal: Arc::new(wal),
            key,
            producer,
            client,
            config,
            metrics,
            health: Arc::new(PublisherHealth::new()),
            rate_limiter,
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Shared WAL handle, for the drain loop task.
    pub fn wal(&self) -> Arc<Wal> {
        self.wal.clone()
    }

    /// Shared health state, for the HTTP health endpoint and the drain loop.
    pub fn health(&self) -> Arc<PublisherHealth> {
        self.health.clone()
    }

    /// Readiness per `spec.md` §4.4.
    pub fn is_ready(&self) -> bool {
        self.health.is_ready(
            self.wal.backlog_bytes(),
            self.config.max_backlog_bytes,
            self.config.readiness_threshold,
        )
    }

    fn now_ns(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
    }

    fn sign(&self, payload: Payload) -> Result<Envelope, PublisherError> {
        let mut envelope = Envelope::unsigned(self.now_ns(), payload, self.producer.clone());
        finalize(&mut envelope, &self.key).map_err(|_| PublisherError::ShuttingDown)?;
        Ok(envelope)
    }

    /// Attempt delivery of one signed envelope directly, without touching
    /// the WAL. Returns `None` on a transport/RPC failure ("no ack").
    async fn attempt_direct(&mut self, envelope: Envelope) -> Option<Ack> {
        match self.client.publish(envelope).await {
            Ok(ack) => Some(ack),
            Err(e) => {
                warn!(error = %e, "publish rpc failed; no ack");
                None
            }
        }
    }

    async fn publish_one(&mut self, payload: Payload) -> Ack {
        self.metrics.publish_attempted_total.inc();
        let envelope = match self.sign(payload) {
            Ok(e) => e,
            Err(_) => {
                self.metrics.publish_invalid_total.inc();
                return Ack::Invalid;
            }
        };

        match self.config.mode {
            PublishMode::WalFirst => self.publish_wal_first(envelope).await,
            PublishMode::DirectFirst => self.publish_direct_first(envelope).await,
        }
    }

    async fn publish_wal_first(&mut self, envelope: Envelope) -> Ack {
        match self.wal.append(&envelope) {
            Ok(result) => {
                self.metrics.wal_overflow_drop_total.inc_by(result.overflow_dropped);
                self.metrics.wal_backlog_bytes.set(self.wal.backlog_bytes() as i64);
                Ack::Ok
            }
            Err(e) => {
                warn!(error = %e, "wal append failed");
                self.health.mark_wal_unusable();
                Ack::retry()
            }
        }
    }

    async fn publish_direct_first(&mut self, envelope: Envelope) -> Ack {
        if !self.rate_limiter.try_acquire() {
            // Rate-limited sends are enqueued, never dropped.
            return self.publish_wal_first(envelope).await;
        }

        match self.attempt_direct(envelope.clone()).await {
            Some(Ack::Ok) => {
                self.metrics.publish_ok_total.inc();
                Ack::Ok
            }
            Some(ack @ Ack::Invalid) | Some(ack @ Ack::Unauthorized) => {
                // Poison: logged and dropped, never written to the WAL.
                warn!(?ack, "envelope rejected; dropping");
                if matches!(ack, Ack::Invalid) {
                    self.metrics.publish_invalid_total.inc();
                } else {
                    self.metrics.publish_unauthorized_total.inc();
                }
                ack
            }
            Some(Ack::Retry { .. }) | None => {
                self.metrics.publish_retry_total.inc();
                match self.wal.append(&envelope) {
                    Ok(result) => {
                        if result.outcome == AppendOutcome::Duplicate {
                            info!("retry target already durably queued");
                        }
                        self.metrics.wal_overflow_drop_total.inc_by(result.overflow_dropped);
                        self.metrics.wal_backlog_bytes.set(self.wal.backlog_bytes() as i64);
                        Ack::Ok
                    }
                    Err(e) => {
                        warn!(error = %e, "wal append failed after retry ack");
                        self.health.mark_wal_unusable();
                        Ack::retry()
                    }
                }
            }
        }
    }

    /// Start the background task that owns this runtime and processes
    /// publish requests from cloneable handles. Returns a handle and the
    /// task's join handle, mirroring the teacher's `spawn_p2p` shape.
    pub fn spawn(mut self) -> (PublisherHandle, tokio::task::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<PublishRequest>(1024);
        let join = tokio::spawn(async move {
            while let Some(req) = rx.recv().await {
                if self.shutting_down.load(Ordering::SeqCst) {
                    let _ = req.responder.send(Ack::retry());
                    continue;
                }
                let ack = self.publish_one(req.payload).await;
                let _ = req.responder.send(ack);
            }
            info!("publisher runtime channel closed");
        });
        (PublisherHandle { tx }, join)
    }
}
