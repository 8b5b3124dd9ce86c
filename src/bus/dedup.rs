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

//! Process-local, bounded LRU of recently-seen idempotency keys.
//!
//! This is a throughput optimization, not a correctness primitive: durable
//! dedup is the persistent event store's own key index (see
//! [`crate::bus::store`]). The mutex here is held only across the O(1) LRU
//! operation, never across I/O, the same rule the teacher applies to its
//! `PeerScore` guard.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::envelope::IdempotencyKey;

/// Bounded dedup cache.
pub struct DedupCache {
    inner: Mutex<LruCache<IdempotencyKey, ()>>,
}

impl DedupCache {
    /// Build a cache with the given capacity (target 100,000 per `spec.md`
    /// §4.3, or an equivalent memory budget).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self { inner: Mutex::new(LruCache::new(cap)) }
    }

    /// Insert a key if absent. Returns `true` if the key was already
    /// present (a dedup hit), `false` if it was newly inserted.
    pub fn check_and_insert(&self, key: IdempotencyKey) -> bool {
        let mut cache = self.inner.lock().expect("dedup cache lock poisoned");
        if cache.contains(&key) {
            cache.promote(&key);
            true
        } else {
            cache.put(key, ());
            false
        }
    }

    /// Remove a key. Used to roll back a speculative insert when persistence
    /// fails transiently, per `spec.md` §4.3's tie-break rule, so a retried
    /// duplicate can still succeed.
    pub fn remove(&self, key: &IdempotencyKey) {
        let mut cache = self.inner.lock().expect("dedup cache lock poisoned");
        cache.pop(key);
    }
}
