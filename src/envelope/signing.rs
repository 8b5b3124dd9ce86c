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

//! Sign, verify, and derive the idempotency key of an [`Envelope`].
//!
//! Signature failures are never exceptions: `verify` returns `bool`, `sign`
//! returns `Result` only for the codec error that can precede it (a
//! malformed in-memory value), and a malformed signature or wrong-length key
//! is simply `false`, matching the "never raises" contract in `spec.md` §4.1.

use ring::signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519};
use thiserror::Error;

use super::codec::{canonical_bytes, CodecError};
use super::types::{Envelope, EnvelopeSignature, IdempotencyKey, SIGNATURE_LEN};

/// Signing error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningError {
    /// The envelope could not be canonicalized.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
}

/// `SHA-256(canonical(envelope))`, lowercase hex on the wire.
///
/// This must be fed the exact same bytes `sign` signs over, so producers and
/// the bus always agree on what a given envelope's dedup key is.
pub fn idempotency_of(env: &Envelope) -> Result<IdempotencyKey, SigningError> {
    let bytes = canonical_bytes(env)?;
    Ok(IdempotencyKey(sha256(&bytes)))
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let digest = ring::digest::digest(&ring::digest::SHA256, bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_ref());
    out
}

/// Sign `env` in place: computes and sets `idempotency_key`, then sets `sig`
/// to `Ed25519(canonical(env))`. Deterministic: identical envelopes (modulo
/// `sig`/`idempotency_key`) yield byte-identical signatures.
pub fn finalize(env: &mut Envelope, key: &Ed25519KeyPair) -> Result<(), SigningError> {
    env.sig = EnvelopeSignature::empty();
    env.idempotency_key = idempotency_of(env)?;
    let bytes = canonical_bytes(env)?;
    let sig = key.sign(&bytes);
    env.sig = EnvelopeSignature(sig.as_ref().to_vec());
    Ok(())
}

/// Recompute `canonical(envelope)` (with `sig` cleared) and check whether
/// `sig` is a valid Ed25519 signature under `public_key`. Never panics; a
/// malformed signature, wrong-length key, or codec failure is `false`.
pub fn verify(env: &Envelope, public_key: &[u8]) -> bool {
    if env.sig.0.len() != SIGNATURE_LEN {
        return false;
    }
    let Ok(bytes) = canonical_bytes(env) else {
        return false;
    };
    let pk = UnparsedPublicKey::new(&ED25519, public_key);
    pk.verify(&bytes, &env.sig.0).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::types::{AgentId, FlowEvent, Payload};
    use ring::rand::SystemRandom;

    fn keypair() -> Ed25519KeyPair {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap()
    }

    fn sample(producer: AgentId) -> Envelope {
        Envelope::unsigned(
            42,
            Payload::Flow(FlowEvent {
                src_ip: "10.0.0.1".into(),
                dst_ip: "10.0.0.2".into(),
                src_port: 0,
                dst_port: 0,
                bytes_sent: 100,
                bytes_recv: 0,
                protocol: 6,
            }),
            producer,
        )
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let kp = keypair();
        let pk = kp.public_key().as_ref().to_vec();
        let mut env = sample(AgentId(pk.clone()));
        finalize(&mut env, &kp).unwrap();
        assert!(verify(&env, &pk));
    }

    #[test]
    fn wrong_key_fails_verify() {
        let kp = keypair();
        let other = keypair();
        let pk = kp.public_key().as_ref().to_vec();
        let mut env = sample(AgentId(pk));
        finalize(&mut env, &kp).unwrap();
        assert!(!verify(&env, other.public_key().as_ref()));
    }

    #[test]
    fn identical_payloads_share_idempotency_key() {
        let kp = keypair();
        let pk = kp.public_key().as_ref().to_vec();
        let mut a = sample(AgentId(pk.clone()));
        let mut b = sample(AgentId(pk));
        finalize(&mut a, &kp).unwrap();
        finalize(&mut b, &kp).unwrap();
        assert_eq!(a.idempotency_key, b.idempotency_key);
    }

    #[test]
    fn malformed_signature_never_panics() {
        let kp = keypair();
        let pk = kp.public_key().as_ref().to_vec();
        let mut env = sample(AgentId(pk.clone()));
        finalize(&mut env, &kp).unwrap();
        env.sig = EnvelopeSignature(vec![0u8; 63]);
        assert!(!verify(&env, &pk));
        env.sig = EnvelopeSignature(vec![0u8; 65]);
        assert!(!verify(&env, &pk));
    }
}
