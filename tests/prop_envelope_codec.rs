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

//! Property tests for signing determinism and idempotency-key sensitivity,
//! the two invariants the rest of the crate (dedup, WAL replay) depends on.

use proptest::prelude::*;
use ring::signature::{Ed25519KeyPair, KeyPair};

use sentrybus::envelope::signing::{finalize, idempotency_of};
use sentrybus::envelope::{AgentId, Envelope, FlowEvent, Payload};

fn keypair() -> Ed25519KeyPair {
    let rng = ring::rand::SystemRandom::new();
    let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
    Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap()
}

fn flow_envelope(key: &Ed25519KeyPair, bytes_sent: u64, ts_ns: u64) -> Envelope {
    let payload = Payload::Flow(FlowEvent {
        src_ip: "10.0.0.1".to_string(),
        dst_ip: "10.0.0.2".to_string(),
        src_port: 0,
        dst_port: 0,
        bytes_sent,
        bytes_recv: 0,
        protocol: 6,
    });
    let producer = AgentId(key.public_key().as_ref().to_vec());
    Envelope::unsigned(ts_ns, payload, producer)
}

proptest! {
    #[test]
    fn signing_is_deterministic(bytes_sent in any::<u64>(), ts_ns in any::<u64>()) {
        let key = keypair();
        let mut a = flow_envelope(&key, bytes_sent, ts_ns);
        let mut b = a.clone();
        finalize(&mut a, &key).unwrap();
        finalize(&mut b, &key).unwrap();
        prop_assert_eq!(a.sig, b.sig);
        prop_assert_eq!(a.idempotency_key, b.idempotency_key);
    }

    #[test]
    fn idempotency_key_changes_with_payload(a_bytes in any::<u64>(), b_bytes in any::<u64>()) {
        prop_assume!(a_bytes != b_bytes);
        let key = keypair();
        let a = flow_envelope(&key, a_bytes, 1);
        let b = flow_envelope(&key, b_bytes, 1);
        let ka = idempotency_of(&a).unwrap();
        let kb = idempotency_of(&b).unwrap();
        prop_assert_ne!(ka, kb);
    }

    #[test]
    fn idempotency_key_is_stable_across_ts_ns(ts_a in any::<u64>(), ts_b in any::<u64>()) {
        // ts_ns is not part of the dedup surface a producer controls for
        // retries; only the payload and producer identity matter here
        // because a real retry resends bit-identical bytes including ts_ns,
        // so this checks the key is a pure function of the full envelope,
        // not that ts_ns is excluded.
        let key = keypair();
        let a = flow_envelope(&key, 42, ts_a);
        let b = flow_envelope(&key, 42, ts_b);
        let ka = idempotency_of(&a).unwrap();
        let kb = idempotency_of(&b).unwrap();
        if ts_a == ts_b {
            prop_assert_eq!(ka, kb);
        } else {
            prop_assert_ne!(ka, kb);
        }
    }
}
