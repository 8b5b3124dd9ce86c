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

//! Canonical and wire encoding for [`Envelope`].
//!
//! Canonical bytes are the input to both signing and idempotency hashing:
//! a deterministic bincode encoding (fixed-width integers, no trailing
//! bytes accepted on decode) of the envelope with `sig` cleared. Wire bytes
//! are the same codec applied to the full, signed envelope, with a hard size
//! cap enforced both before and during decode.

use bincode::Options;
use thiserror::Error;

use super::types::{Envelope, EnvelopeSignature, IdempotencyKey, MAX_ENVELOPE_BYTES};

/// Codec error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Serialization failed (should not happen for well-formed in-memory
    /// values; surfaced rather than panicking).
    #[error("serialization")]
    Serialize,
    /// Deserialization failed: malformed bytes, unknown/trailing data, or a
    /// decoded value exceeding internal limits.
    #[error("deserialization")]
    Deserialize,
    /// Encoded length exceeds [`MAX_ENVELOPE_BYTES`].
    #[error("size limit exceeded")]
    TooLarge,
}

/// Deterministic bincode options: fixed-width integers, no trailing bytes.
fn bincode_opts() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Serialize a value with the deterministic rules shared by signing,
/// hashing, and wire transmission.
fn encode<T: serde::Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    bincode_opts().serialize(v).map_err(|_| CodecError::Serialize)
}

/// Deserialize with a hard size cap on both the raw input and the decoder's
/// internal allocation budget (defends against container-length bombs).
fn decode_limited<T: serde::de::DeserializeOwned>(bytes: &[u8], max: usize) -> Result<T, CodecError> {
    if bytes.len() > max {
        return Err(CodecError::TooLarge);
    }
    bincode_opts()
        .with_limit(max as u64)
        .deserialize(bytes)
        .map_err(|_| CodecError::Deserialize)
}

/// Canonical bytes: the envelope with `sig` and `idempotency_key` cleared,
/// encoded deterministically.
///
/// This is the byte sequence both signed and hashed for the idempotency key,
/// so `sign` and `idempotency_of` always agree on what they operate over;
/// clearing `idempotency_key` here too means the bytes hashed to produce it
/// are the same bytes later signed.
pub fn canonical_bytes(env: &Envelope) -> Result<Vec<u8>, CodecError> {
    let mut cleared = env.clone();
    cleared.sig = EnvelopeSignature::empty();
    cleared.idempotency_key = IdempotencyKey([0u8; 32]);
    encode(&cleared)
}

/// Encode the full (signed) envelope for the wire or for WAL/store persistence.
/// Rejects envelopes already over [`MAX_ENVELOPE_BYTES`].
pub fn encode_wire(env: &Envelope) -> Result<Vec<u8>, CodecError> {
    let bytes = encode(env)?;
    if bytes.len() > MAX_ENVELOPE_BYTES {
        return Err(CodecError::TooLarge);
    }
    Ok(bytes)
}

/// Decode a wire/stored envelope, enforcing the same size cap.
pub fn decode_wire(bytes: &[u8]) -> Result<Envelope, CodecError> {
    decode_limited(bytes, MAX_ENVELOPE_BYTES)
}

/// Encode an arbitrary value with this crate's deterministic bincode rules.
/// Used by the gRPC transport codec to frame both envelopes and acks on the
/// same wire encoder the signer and the WAL use.
pub fn encode_bincode<T: serde::Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    encode(v)
}

/// Decode an arbitrary value with a hard size cap, mirroring
/// [`decode_wire`]'s defenses for non-`Envelope` wire messages (e.g. `Ack`).
pub fn decode_bincode_limited<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
    max: usize,
) -> Result<T, CodecError> {
    decode_limited(bytes, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::types::{AgentId, FlowEvent, Payload};

    fn sample() -> Envelope {
        Envelope::unsigned(
            1,
            Payload::Flow(FlowEvent {
                src_ip: "10.0.0.1".into(),
                dst_ip: "10.0.0.2".into(),
                src_port: 0,
                dst_port: 0,
                bytes_sent: 100,
                bytes_recv: 0,
                protocol: 6,
            }),
            AgentId(vec![7u8; 32]),
        )
    }

    #[test]
    fn canonical_is_stable_across_sig_contents() {
        let mut a = sample();
        let mut b = sample();
        a.sig = EnvelopeSignature(vec![1u8; 64]);
        b.sig = EnvelopeSignature(vec![2u8; 64]);
        assert_eq!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
    }

    #[test]
    fn wire_round_trips() {
        let env = sample();
        let bytes = encode_wire(&env).unwrap();
        let back = decode_wire(&bytes).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn oversize_envelope_rejected() {
        let mut env = sample();
        env.payload = Payload::Device(crate::envelope::types::DeviceTelemetry {
            device_id: "d".into(),
            metric: "m".into(),
            value: "x".repeat(MAX_ENVELOPE_BYTES + 16),
        });
        assert_eq!(encode_wire(&env), Err(CodecError::TooLarge));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let env = sample();
        let mut bytes = encode_wire(&env).unwrap();
        bytes.push(0xFF);
        assert_eq!(decode_wire(&bytes), Err(CodecError::Deserialize));
    }
}
