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

//! The four-kind ack taxonomy returned by the EventBus's `Publish` RPC.
//!
//! Modeled as a closed tagged union rather than a runtime integer status
//! code: every call site matches it exhaustively, so adding a fifth ack kind
//! is a compile error everywhere it matters instead of a silently-ignored
//! default branch.

use serde::{Deserialize, Serialize};

/// Result of a `Publish` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ack {
    /// Accepted and durably stored (or recognized as an already-stored
    /// duplicate).
    Ok,
    /// Temporary backpressure; the producer should back off and retry,
    /// ideally from the WAL. `backoff_hint_ms` may suggest a delay.
    Retry {
        /// Suggested backoff before retrying, in milliseconds.
        backoff_hint_ms: u32,
    },
    /// The envelope violates a structural, size, signature, or schema
    /// invariant. The producer must not retry without modification.
    Invalid,
    /// The TLS peer identity is not in the allowlist, or no signing key is
    /// registered for it. The producer must not retry without
    /// recredentialing.
    Unauthorized,
}

impl Ack {
    /// A `Retry` with no particular backoff hint.
    pub fn retry() -> Ack {
        Ack::Retry { backoff_hint_ms: 0 }
    }

    /// Whether this ack is terminal-poison: retrying it from the WAL can
    /// never succeed.
    pub fn is_poison(&self) -> bool {
        matches!(self, Ack::Invalid | Ack::Unauthorized)
    }

    /// Whether this ack means the envelope should be left in the WAL for a
    /// later drain attempt.
    pub fn should_retry(&self) -> bool {
        matches!(self, Ack::Retry { .. })
    }
}
