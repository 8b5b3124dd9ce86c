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

//! The publisher runtime's liveness/readiness contract, per `spec.md`
//! §4.4: liveness is "tasks scheduled and WAL openable"; readiness is "last
//! drain didn't end in an RPC error and backlog is under threshold".

use std::sync::atomic::{AtomicBool, Ordering};

/// Shared health state, updated by the drain loop and read by the HTTP
/// health endpoint and by [`crate::publisher::runtime::PublisherRuntime`]
/// itself.
#[derive(Default)]
pub struct PublisherHealth {
    wal_openable: AtomicBool,
    last_drain_had_rpc_error: AtomicBool,
}

impl PublisherHealth {
    /// Build health state for a freshly-opened WAL.
    pub fn new() -> Self {
        Self { wal_openable: AtomicBool::new(true), last_drain_had_rpc_error: AtomicBool::new(false) }
    }

    /// Record that the WAL failed to open or has become unusable (e.g. a
    /// checksum-corrupt row); this is the fatal producer-side error class
    /// that flips readiness rather than crashing the process.
    pub fn mark_wal_unusable(&self) {
        self.wal_openable.store(false, Ordering::SeqCst);
    }

    /// Record the outcome of the most recent drain attempt.
    pub fn record_drain_rpc_error(&self, had_error: bool) {
        self.last_drain_had_rpc_error.store(had_error, Ordering::SeqCst);
    }

    /// Liveness: the WAL file handle is usable. Tasks being scheduled is
    /// implicit in this being callable at all from within the runtime.
    pub fn is_live(&self) -> bool {
        self.wal_openable.load(Ordering::SeqCst)
    }

    /// Readiness: live, the last drain attempt did not end in an RPC error,
    /// and the backlog is under `readiness_threshold` of `max_backlog_bytes`.
    pub fn is_ready(&self, backlog_bytes: u64, max_backlog_bytes: u64, readiness_threshold: f64) -> bool {
        if !self.is_live() || self.last_drain_had_rpc_error.load(Ordering::SeqCst) {
            return false;
        }
        if max_backlog_bytes == 0 {
            return true;
        }
        (backlog_bytes as f64) < (max_backlog_bytes as f64) * readiness_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_when_healthy_and_under_threshold() {
        let h = PublisherHealth::new();
        assert!(h.is_ready(10, 100, 0.5));
    }

    #[test]
    fn not_ready_over_threshold() {
        let h = PublisherHealth::new();
        assert!(!h.is_ready(60, 100, 0.5));
    }

    #[test]
    fn not_ready_after_rpc_error() {
        let h = PublisherHealth::new();
        h.record_drain_rpc_error(true);
        assert!(!h.is_ready(0, 100, 0.5));
    }

    #[test]
    fn not_live_after_wal_marked_unusable() {
        let h = PublisherHealth::new();
        h.mark_wal_unusable();
        assert!(!h.is_live());
        assert!(!h.is_ready(0, 100, 0.5));
    }
}
