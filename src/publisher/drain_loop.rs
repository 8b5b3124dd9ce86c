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

//! The background task that repeatedly drains a publisher's WAL against a
//! live EventBus connection, backing off with full jitter whenever a batch
//! stops early on `RETRY`/no-ack.
//!
//! Grounded on the teacher's long-lived background task shape
//! (`networking::p2p::spawn_p2p`'s `tokio::spawn` loop), with the backoff
//! policy taken from `spec.md` §4.4: exponential with full jitter, capped at
//! `retry_max_ms`, reset to the idle poll interval after a batch drains
//! cleanly with no stall.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::ack::Ack;
use crate::envelope::Envelope;
use crate::publisher::client::PublisherClient;
use crate::publisher::health::PublisherHealth;
use crate::wal::{DrainOutcome, Wal};

const IDLE_POLL_MS: u64 = 200;
const DRAIN_BATCH_LIMIT: usize = 256;

fn ack_to_drain_outcome(ack: Option<Ack>) -> DrainOutcome {
    match ack {
        Some(Ack::Ok) => DrainOutcome::Ok,
        Some(Ack::Invalid) | Some(Ack::Unauthorized) => DrainOutcome::Poison,
        Some(Ack::Retry { .. }) => DrainOutcome::Retry,
        None => DrainOutcome::NoAck,
    }
}

/// Drain loop parameters carried from [`crate::config::AgentConfig`].
pub struct DrainLoopConfig {
    /// Cap on exponential backoff, in milliseconds.
    pub retry_max_ms: u64,
}

/// Spawn the drain loop as a background task. Runs until the process exits;
/// there is no graceful-stop handle because the teacher's equivalent
/// long-lived tasks (`p2p`'s event loop) are likewise run-to-process-exit.
pub fn spawn_drain_loop(
    wal: Arc<Wal>,
    mut client: PublisherClient,
    health: Arc<PublisherHealth>,
    config: DrainLoopConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let backoff_ms = AtomicU64::new(IDLE_POLL_MS);
        loop {
            let deleted = wal
                .drain(DRAIN_BATCH_LIMIT, |envelope: Envelope| {
                    let client = &mut client;
                    async move {
                        let ack = client.publish(envelope).await.ok();
                        ack_to_drain_outcome(ack)
                    }
                })
                .await;

            let stalled = match deleted {
                Ok(n) => {
                    if n > 0 {
                        debug!(rows = n, "drain batch completed");
                    }
                    // A batch that deleted fewer than the whole backlog
                    // because it hit RETRY/NoAck is a stall; drain() doesn't
                    // report why it stopped short, so re-check via health.
                    health.record_drain_rpc_error(false);
                    n == 0 && wal.len() > 0
                }
                Err(crate::wal::WalError::ConcurrentDrain) => {
                    // Another drain call is already running; back off quietly.
                    true
                }
                Err(e) => {
                    warn!(error = %e, "drain failed");
                    health.record_drain_rpc_error(true);
                    true
                }
            };

            let wait_ms = if stalled {
                let prev = backoff_ms.load(Ordering::SeqCst);
                let next = (prev.saturating_mul(2)).min(config.retry_max_ms).max(IDLE_POLL_MS);
                backoff_ms.store(next, Ordering::SeqCst);
                rand::thread_rng().gen_range(0..=next)
            } else {
                backoff_ms.store(IDLE_POLL_MS, Ordering::SeqCst);
                IDLE_POLL_MS
            };
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }
    })
}
