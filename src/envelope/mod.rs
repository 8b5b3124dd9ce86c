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

//! Envelope data model, canonical/wire codec, and Ed25519 signing.

/// Canonical and wire encoding.
pub mod codec;
/// Signing, verification, and idempotency key derivation.
pub mod signing;
/// Envelope and payload types.
pub mod types;

pub use types::{
    AgentId, DeviceTelemetry, Envelope, EnvelopeSignature, EnvelopeVersion, FlowEvent,
    IdempotencyKey, LeafPayload, Payload, ProcessEvent, MAX_ENVELOPE_BYTES, SIGNATURE_LEN,
};
