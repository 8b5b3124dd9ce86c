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

//! The broker's durable event store: an append-only log of accepted
//! envelopes, indexed by ingestion order and by idempotency key.
//!
//! Grounded on the same `sled`-transaction pattern as
//! [`crate::wal::store`] (itself grounded on the teacher's
//! `PersistentState`): two trees, `records` (ingestion id -> bytes) and
//! `by_key` (idempotency key -> ingestion id), updated atomically so a
//! crash between them is impossible. Unlike the WAL, rows are never
//! deleted; this store is the broker's permanent record.

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use thiserror::Error;

use crate::envelope::codec::{encode_wire, CodecError};
use crate::envelope::{Envelope, IdempotencyKey};

/// Durable store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened.
    #[error("store db open")]
    DbOpen,
    /// A read or write against the database failed.
    #[error("store db io")]
    DbIo,
    /// The envelope could not be encoded for storage.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
}

/// Outcome of [`EventStore::persist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Newly written.
    Stored,
    /// Already present under this idempotency key; not re-written.
    AlreadyStored,
}

/// The broker's append-only, idempotent durable event store.
pub struct EventStore {
    db: sled::Db,
    records: sled::Tree,
    by_key: sled::Tree,
}

impl EventStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|_| StoreError::DbOpen)?;
        let records = db.open_tree("records").map_err(|_| StoreError::DbOpen)?;
        let by_key = db.open_tree("by_key").map_err(|_| StoreError::DbOpen)?;
        Ok(Self { db, records, by_key })
    }

    /// Number of records persisted.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether an idempotency key has already been persisted.
    pub fn contains_key(&self, key: &IdempotencyKey) -> Result<bool, StoreError> {
        Ok(self.by_key.contains_key(key.0).map_err(|_| StoreError::DbIo)?)
    }

    /// Persist `envelope`, or no-op if its idempotency key is already
    /// stored. This is the broker-side half of the at-most-once-persist
    /// guarantee in `spec.md` §4.3's tie-break rule; the LRU dedup cache
    /// handles the fast path, this is the durable fallback.
    pub fn persist(&self, envelope: &Envelope) -> Result<PersistOutcome, StoreError> {
        let key = envelope.idempotency_key.0;
        let bytes = encode_wire(envelope)?;
        let record_id = self.db.generate_id().map_err(|_| StoreError::DbIo)?;
        let record_id_be = record_id.to_be_bytes();

        let res: Result<bool, TransactionError<StoreError>> =
            (&self.records, &self.by_key).transaction(|(records, by_key)| {
                let exists = by_key
                    .get(key)
                    .map_err(|_| ConflictableTransactionError::Abort(StoreError::DbIo))?
                    .is_some();
                if exists {
                    return Ok(false);
                }
                records
                    .insert(&record_id_be, bytes.as_slice())
                    .map_err(|_| ConflictableTransactionError::Abort(StoreError::DbIo))?;
                by_key
                    .insert(&key, &record_id_be)
                    .map_err(|_| ConflictableTransactionError::Abort(StoreError::DbIo))?;
                Ok(true)
            });

        match res {
            Ok(true) => Ok(PersistOutcome::Stored),
            Ok(false) => Ok(PersistOutcome::AlreadyStored),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(_)) => Err(StoreError::DbIo),
        }
    }

    /// Iterate stored envelopes in ingestion order. Intended for downstream
    /// readers and for tests; this core makes no promise about their
    /// snapshot isolation beyond what `sled` itself provides.
    pub fn iter_in_order(&self) -> impl Iterator<Item = Result<Envelope, StoreError>> + '_ {
        self.records.iter().map(|item| {
            let (_id, bytes) = item.map_err(|_| StoreError::DbIo)?;
            crate::envelope::codec::decode_wire(&bytes).map_err(StoreError::from)
        })
    }

    /// Flush to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(|_| StoreError::DbIo)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{AgentId, FlowEvent, Payload};
    use tempfile::tempdir;

    fn sample(ts_ns: u64, key_byte: u8) -> Envelope {
        let mut env = Envelope::unsigned(
            ts_ns,
            Payload::Flow(FlowEvent {
                src_ip: "10.0.0.1".into(),
                dst_ip: "10.0.0.2".into(),
                src_port: 0,
                dst_port: 0,
                bytes_sent: 1,
                bytes_recv: 0,
                protocol: 6,
            }),
            AgentId(vec![1u8; 32]),
        );
        env.idempotency_key = IdempotencyKey([key_byte; 32]);
        env
    }

    #[test]
    fn persist_then_duplicate_is_noop() {
        let dir = tempdir().unwrap();
        let store = EventStore::open(dir.path().join("store").to_str().unwrap()).unwrap();
        let env = sample(1, 9);
        assert_eq!(store.persist(&env).unwrap(), PersistOutcome::Stored);
        assert_eq!(store.persist(&env).unwrap(), PersistOutcome::AlreadyStored);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn iterates_in_ingestion_order() {
        let dir = tempdir().unwrap();
        let store = EventStore::open(dir.path().join("store").to_str().unwrap()).unwrap();
        for i in 0..5u8 {
            store.persist(&sample(i as u64, i)).unwrap();
        }
        let ts: Vec<u64> = store.iter_in_order().map(|r| r.unwrap().ts_ns).collect();
        assert_eq!(ts, vec![0, 1, 2, 3, 4]);
    }
}
