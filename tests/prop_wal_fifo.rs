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

//! Property test: whatever order envelopes are appended in, a full drain
//! that always acks `Ok` deletes them in that same order, regardless of
//! how the batch limit splits the drain into multiple calls.

use std::sync::Mutex;

use proptest::prelude::*;
use ring::signature::{Ed25519KeyPair, KeyPair};

use sentrybus::envelope::signing::finalize;
use sentrybus::envelope::{AgentId, Envelope, FlowEvent, Payload};
use sentrybus::wal::{DrainOutcome, Wal};

fn keypair() -> Ed25519KeyPair {
    let rng = ring::rand::SystemRandom::new();
    let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
    Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap()
}

fn signed_flow(key: &Ed25519KeyPair, bytes_sent: u64) -> Envelope {
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
    let mut env = Envelope::unsigned(bytes_sent, payload, producer);
    finalize(&mut env, key).unwrap();
    env
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]
    #[test]
    fn drain_preserves_append_order(counts in prop::collection::vec(1u64..1000, 1..12), batch_limit in 1usize..5) {
        let key = keypair();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(dir.path().to_str().unwrap(), 64 * 1024 * 1024).unwrap();

        let mut distinct = counts.clone();
        distinct.dedup();
        let envs: Vec<Envelope> = distinct.iter().map(|n| signed_flow(&key, *n)).collect();
        for env in &envs {
            wal.append(env).unwrap();
        }

        let delivered: Mutex<Vec<Envelope>> = Mutex::new(Vec::new());
        rt.block_on(async {
            loop {
                let deleted = wal
                    .drain(batch_limit, |env| {
                        let delivered = &delivered;
                        async move {
                            delivered.lock().unwrap().push(env);
                            DrainOutcome::Ok
                        }
                    })
                    .await
                    .unwrap();
                if deleted == 0 {
                    break;
                }
            }
        });

        prop_assert!(wal.is_empty());
        prop_assert_eq!(delivered.into_inner().unwrap(), envs);
    }
}
