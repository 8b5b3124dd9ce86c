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

//! Broker-side admission control: a bounded concurrency gate plus an
//! operator-toggled overload switch, per `spec.md` §4.3 step 2.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// In-flight request counter and overload toggle, cheap enough to check on
/// every request without contention (no lock, two atomics).
pub struct AdmissionGate {
    in_flight: AtomicI64,
    max_inflight: i64,
    overload_mode: AtomicBool,
}

/// Guard returned by a successful [`AdmissionGate::try_enter`]; decrements
/// the in-flight counter on drop so every exit path (including early
/// returns and panics unwound through `?`) releases its slot.
pub struct AdmissionTicket<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for AdmissionTicket<'_> {
    fn drop(&mut self) {
        self.gate.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AdmissionGate {
    /// Build a gate with the given concurrency ceiling.
    pub fn new(max_inflight: i64, overload_mode: bool) -> Self {
        Self {
            in_flight: AtomicI64::new(0),
            max_inflight,
            overload_mode: AtomicBool::new(overload_mode),
        }
    }

    /// Current in-flight request count.
    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Set operator-driven overload mode, which forces `RETRY` on every
    /// request regardless of the in-flight count.
    pub fn set_overload_mode(&self, on: bool) {
        self.overload_mode.store(on, Ordering::SeqCst);
    }

    /// Whether overload mode is currently on.
    pub fn overload_mode(&self) -> bool {
        self.overload_mode.load(Ordering::SeqCst)
    }

    /// Attempt to admit one request. Returns a ticket that releases the slot
    /// on drop, or a backoff hint in milliseconds if the request should be
    /// rejected with `RETRY`.
    pub fn try_enter(&self) -> Result<AdmissionTicket<'_>, u32> {
        if self.overload_mode() {
            return Err(backoff_hint_ms(self.max_inflight, self.max_inflight));
        }
        let prior = self.in_flight.fetch_add(1, Ordering::SeqCst);
        if prior >= self.max_inflight {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(backoff_hint_ms(prior, self.max_inflight));
        }
        Ok(AdmissionTicket { gate: self })
    }
}

/// Backoff proportional to how far over the ceiling the request arrived,
/// bounded so a pathological overage does not suggest an hour-long sleep.
fn backoff_hint_ms(in_flight: i64, max_inflight: i64) -> u32 {
    let overage = (in_flight - max_inflight).max(0) as u32;
    (50 + overage * 10).min(5_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_ceiling() {
        let gate = AdmissionGate::new(2, false);
        let a = gate.try_enter().unwrap();
        let b = gate.try_enter().unwrap();
        assert!(gate.try_enter().is_err());
        drop(a);
        assert!(gate.try_enter().is_ok());
        drop(b);
    }

    #[test]
    fn overload_mode_rejects_even_when_idle() {
        let gate = AdmissionGate::new(500, true);
        assert!(gate.try_enter().is_err());
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn ticket_drop_releases_slot() {
        let gate = AdmissionGate::new(1, false);
        {
            let _t = gate.try_enter().unwrap();
            assert_eq!(gate.in_flight(), 1);
        }
        assert_eq!(gate.in_flight(), 0);
    }
}
