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

//! End-to-end scenarios against [`EventBusPipeline`] directly, without a
//! live mTLS socket, plus the agent-side WAL crash-recovery path.

use std::collections::BTreeMap;

use ring::signature::{Ed25519KeyPair, KeyPair};

use sentrybus::ack::Ack;
use sentrybus::bus::admission::AdmissionGate;
use sentrybus::bus::dedup::DedupCache;
use sentrybus::bus::identity::IdentityTable;
use sentrybus::bus::store::EventStore;
use sentrybus::bus::EventBusPipeline;
use sentrybus::envelope::signing::finalize;
use sentrybus::envelope::{AgentId, Envelope, EnvelopeSignature, FlowEvent, Payload};
use sentrybus::monitoring::metrics::Metrics;
use sentrybus::wal::{DrainOutcome, Wal};

const PEER_CN: &str = "agent-1.internal";
const AGENT_ID: &str = "agent-1";

fn keypair() -> Ed25519KeyPair {
    let rng = ring::rand::SystemRandom::new();
    let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
    Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap()
}

fn flow(src: &str, dst: &str, bytes_sent: u64) -> Payload {
    Payload::Flow(FlowEvent {
        src_ip: src.to_string(),
        dst_ip: dst.to_string(),
        src_port: 0,
        dst_port: 0,
        bytes_sent,
        bytes_recv: 0,
        protocol: 6,
    })
}

fn signed_envelope(key: &Ed25519KeyPair, payload: Payload) -> Envelope {
    let producer = AgentId(key.public_key().as_ref().to_vec());
    let mut env = Envelope::unsigned(1, payload, producer);
    finalize(&mut env, key).unwrap();
    env
}

fn pipeline(dir: &std::path::Path, key: &Ed25519KeyPair, max_inflight: i64, overload: bool) -> EventBusPipeline {
    let mut cn = BTreeMap::new();
    cn.insert(PEER_CN.to_string(), AGENT_ID.to_string());
    let mut keys = BTreeMap::new();
    keys.insert(AGENT_ID.to_string(), hex::encode(key.public_key().as_ref()));
    let identity = IdentityTable::from_config(&cn, &keys);
    let admission = AdmissionGate::new(max_inflight, overload);
    let dedup = DedupCache::new(1024);
    let store = EventStore::open(dir.to_str().unwrap()).unwrap();
    EventBusPipeline::new(identity, admission, dedup, store, 128 * 1024, Metrics::new().unwrap())
}

#[tokio::test]
async fn happy_path() {
    let dir = tempfile::tempdir().unwrap();
    let key = keypair();
    let pipeline = pipeline(dir.path(), &key, 500, false);

    let env = signed_envelope(&key, flow("10.0.0.1", "10.0.0.2", 100));
    let ack = pipeline.handle(PEER_CN, env).await;
    assert_eq!(ack, Ack::Ok);
}

#[tokio::test]
async fn overload_then_drain_delivers_all() {
    let dir = tempfile::tempdir().unwrap();
    let key = keypair();
    let wal_dir = tempfile::tempdir().unwrap();
    let wal = Wal::open(wal_dir.path().to_str().unwrap(), 64 * 1024 * 1024).unwrap();

    let overloaded = pipeline(dir.path(), &key, 500, true);
    let mut envs = Vec::new();
    for i in 0..3u64 {
        let env = signed_envelope(&key, flow("10.0.0.1", "10.0.0.2", 100 + i));
        let ack = overloaded.handle(PEER_CN, env.clone()).await;
        assert!(matches!(ack, Ack::Retry { .. }));
        wal.append(&env).unwrap();
        envs.push(env);
    }
    assert_eq!(wal.len(), 3);

    let ready = pipeline(dir.path(), &key, 500, false);
    let delivered: std::sync::Mutex<Vec<Envelope>> = std::sync::Mutex::new(Vec::new());
    let deleted = wal
        .drain(10, |env| {
            let ready = &ready;
            let delivered = &delivered;
            async move {
                let ack = ready.handle(PEER_CN, env.clone()).await;
                delivered.lock().unwrap().push(env);
                match ack {
                    Ack::Ok => DrainOutcome::Ok,
                    _ => DrainOutcome::Retry,
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(deleted, 3);
    assert!(wal.is_empty());
    let delivered = delivered.into_inner().unwrap();
    assert_eq!(delivered.len(), 3);
    assert_eq!(delivered, envs);
}

#[tokio::test]
async fn duplicate_publish_is_noop_second_time() {
    let dir = tempfile::tempdir().unwrap();
    let key = keypair();
    let pipeline = pipeline(dir.path(), &key, 500, false);

    let env = signed_envelope(&key, flow("10.0.0.1", "10.0.0.2", 100));
    assert_eq!(pipeline.handle(PEER_CN, env.clone()).await, Ack::Ok);
    assert_eq!(pipeline.handle(PEER_CN, env).await, Ack::Ok);
}

#[tokio::test]
async fn poison_envelope_is_invalid_direct_and_via_wal() {
    let dir = tempfile::tempdir().unwrap();
    let key = keypair();
    let pipeline = pipeline(dir.path(), &key, 500, false);

    let mut env = signed_envelope(&key, flow("10.0.0.1", "10.0.0.2", 100));
    env.sig = EnvelopeSignature(vec![0u8; 64]);
    assert_eq!(pipeline.handle(PEER_CN, env.clone()).await, Ack::Invalid);

    let wal_dir = tempfile::tempdir().unwrap();
    let wal = Wal::open(wal_dir.path().to_str().unwrap(), 64 * 1024 * 1024).unwrap();
    wal.append(&env).unwrap();
    assert_eq!(wal.len(), 1);

    let deleted = wal
        .drain(10, |env| {
            let pipeline = &pipeline;
            async move {
                let ack = pipeline.handle(PEER_CN, env).await;
                if ack.is_poison() {
                    DrainOutcome::Poison
                } else {
                    DrainOutcome::Retry
                }
            }
        })
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(wal.is_empty());
}

#[tokio::test]
async fn empty_batch_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let key = keypair();
    let pipeline = pipeline(dir.path(), &key, 500, false);

    let env = signed_envelope(&key, Payload::Batch(Vec::new()));
    let ack = pipeline.handle(PEER_CN, env).await;
    assert_eq!(ack, Ack::Ok);
}

#[tokio::test]
async fn unknown_cn_is_unauthorized() {
    let dir = tempfile::tempdir().unwrap();
    let key = keypair();
    let pipeline = pipeline(dir.path(), &key, 500, false);

    let env = signed_envelope(&key, flow("10.0.0.1", "10.0.0.2", 100));
    let ack = pipeline.handle("unknown.internal", env).await;
    assert_eq!(ack, Ack::Unauthorized);
}

#[tokio::test]
async fn crash_recovery_drains_backlog_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let key = keypair();
    let wal_dir = tempfile::tempdir().unwrap();

    let mut envs = Vec::new();
    {
        // Simulates the agent process: append 10 envelopes while the broker
        // is unreachable, then "crash" (drop the handle without draining).
        let wal = Wal::open(wal_dir.path().to_str().unwrap(), 64 * 1024 * 1024).unwrap();
        for i in 0..10u64 {
            let env = signed_envelope(&key, flow("10.0.0.1", "10.0.0.2", i));
            wal.append(&env).unwrap();
            envs.push(env);
        }
        assert_eq!(wal.len(), 10);
    }

    // Restart: reopen the same WAL directory, bring the broker up, drain.
    let wal = Wal::open(wal_dir.path().to_str().unwrap(), 64 * 1024 * 1024).unwrap();
    let pipeline = pipeline(dir.path(), &key, 500, false);
    let delivered: std::sync::Mutex<Vec<Envelope>> = std::sync::Mutex::new(Vec::new());
    let deleted = wal
        .drain(20, |env| {
            let pipeline = &pipeline;
            let delivered = &delivered;
            async move {
                let ack = pipeline.handle(PEER_CN, env.clone()).await;
                delivered.lock().unwrap().push(env);
                assert_eq!(ack, Ack::Ok);
                DrainOutcome::Ok
            }
        })
        .await
        .unwrap();

    assert_eq!(deleted, 10);
    assert!(wal.is_empty());
    assert_eq!(delivered.into_inner().unwrap(), envs);
}
