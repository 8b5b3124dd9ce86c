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

//! The EventBus's request pipeline, exposed as a plain struct independent
//! of the gRPC transport so it can be driven directly in tests (per
//! `spec.md` §8's testing strategy) without a live mTLS socket.
//!
//! `RECEIVED -> AUTHED -> ADMITTED -> VALIDATED -> VERIFIED -> DEDUPED ->
//! PERSISTED -> ACK(OK)`, with every stage able to exit early to
//! `ACK(RETRY|INVALID|UNAUTHORIZED)`; no other transitions are legal.

use crate::ack::Ack;
use crate::bus::admission::AdmissionGate;
use crate::bus::dedup::DedupCache;
use crate::bus::identity::IdentityTable;
use crate::bus::store::{EventStore, PersistOutcome, StoreError};
use crate::envelope::codec::encode_wire;
use crate::envelope::signing::verify;
use crate::envelope::{Envelope, Payload, SIGNATURE_LEN};
use crate::monitoring::metrics::Metrics;

/// The full set of collaborators one `Publish` call touches, wired together
/// once at startup and shared (by reference) across every request.
pub struct EventBusPipeline {
    identity: IdentityTable,
    admission: AdmissionGate,
    dedup: DedupCache,
    store: EventStore,
    max_envelope_bytes: usize,
    metrics: Metrics,
}

impl EventBusPipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        identity: IdentityTable,
        admission: AdmissionGate,
        dedup: DedupCache,
        store: EventStore,
        max_envelope_bytes: usize,
        metrics: Metrics,
    ) -> Self {
        Self { identity, admission, dedup, store, max_envelope_bytes, metrics }
    }

    /// Run the full pipeline for one envelope arriving from the given
    /// authenticated peer CN (extracted from the mTLS peer certificate by
    /// the transport layer before this is called).
    pub async fn handle(&self, peer_cn: &str, envelope: Envelope) -> Ack {
        let timer = self.metrics.publish_latency_seconds.start_timer();
        let ack = self.handle_inner(peer_cn, envelope).await;
        timer.observe_duration();
        ack
    }

    async fn handle_inner(&self, peer_cn: &str, envelope: Envelope) -> Ack {
        self.metrics.publish_attempted_total.inc();

        // 1. Authentication.
        let Some(agent_id) = self.identity.agent_id_for_cn(peer_cn) else {
            self.metrics.publish_unauthorized_total.inc();
            return Ack::Unauthorized;
        };

        // 2. Admission control.
        let ticket = match self.admission.try_enter() {
            Ok(t) => t,
            Err(backoff_hint_ms) => {
                self.metrics.publish_retry_total.inc();
                return Ack::Retry { backoff_hint_ms };
            }
        };
        self.metrics.broker_inflight.set(self.admission.in_flight());

        // 3. Size & structural validation.
        if !self.is_structurally_valid(&envelope) {
            self.metrics.publish_invalid_total.inc();
            drop(ticket);
            return Ack::Invalid;
        }

        // 4. Signature verification. The CN-to-key map is independent of
        // the CN allowlist so a key rotation never needs an allowlist edit.
        let Some(signing_key) = self.identity.signing_key_for_agent(agent_id) else {
            self.metrics.publish_unauthorized_total.inc();
            drop(ticket);
            return Ack::Unauthorized;
        };
        if !verify(&envelope, signing_key) {
            self.metrics.publish_invalid_total.inc();
            drop(ticket);
            return Ack::Invalid;
        }

        // 5. Deduplication. Insert before persisting so a duplicate arriving
        // mid-persist cannot cause a double-write; rolled back below if
        // persistence fails transiently.
        let key = envelope.idempotency_key;
        if self.dedup.check_and_insert(key) {
            self.metrics.broker_dedup_hits_total.inc();
            self.metrics.publish_ok_total.inc();
            drop(ticket);
            return Ack::Ok;
        }

        // 6. Persistence.
        let ack = match self.store.persist(&envelope) {
            Ok(PersistOutcome::Stored) => {
                self.metrics.broker_persisted_total.inc();
                self.metrics.publish_ok_total.inc();
                Ack::Ok
            }
            Ok(PersistOutcome::AlreadyStored) => {
                self.metrics.broker_dedup_hits_total.inc();
                self.metrics.publish_ok_total.inc();
                Ack::Ok
            }
            Err(StoreError::DbIo) => {
                // Transient: roll back the speculative dedup insert so a
                // client-side retry of the same bytes can still succeed.
                self.dedup.remove(&key);
                self.metrics.publish_retry_total.inc();
                Ack::retry()
            }
            Err(StoreError::Codec(_)) | Err(StoreError::DbOpen) => {
                self.dedup.remove(&key);
                self.metrics.publish_invalid_total.inc();
                Ack::Invalid
            }
        };
        drop(ticket);
        ack
    }

    /// Whether operator-driven overload mode is currently forcing `RETRY`
    /// on every request; surfaced for the `Health` RPC's readiness bit.
    pub fn overload_mode(&self) -> bool {
        self.admission.overload_mode()
    }

    /// Toggle operator-driven overload mode.
    pub fn set_overload_mode(&self, on: bool) {
        self.admission.set_overload_mode(on);
    }

    fn is_structurally_valid(&self, envelope: &Envelope) -> bool {
        let Ok(bytes) = encode_wire(envelope) else { return false };
        if bytes.len() > self.max_envelope_bytes {
            return false;
        }
        if !envelope.version.is_supported_major() {
            return false;
        }
        if envelope.sig.0.len() != SIGNATURE_LEN {
            return false;
        }
        is_known_payload(&envelope.payload)
    }
}

fn is_known_payload(payload: &Payload) -> bool {
    match payload {
        Payload::Flow(_) | Payload::Process(_) | Payload::Device(_) => true,
        // An empty batch is still exactly one well-formed variant; a
        // collector tick that observed nothing is not a malformed envelope.
        Payload::Batch(_) => true,
    }
}
