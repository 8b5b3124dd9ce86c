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

//! The agent publisher: a signed-envelope client, a token bucket, a WAL
//! drain loop, and the runtime that ties them together.

/// The gRPC client to one EventBus endpoint.
pub mod client;
/// The WAL drain background task.
pub mod drain_loop;
/// Liveness/readiness state.
pub mod health;
/// Token bucket rate limiting before a direct send.
pub mod rate_limit;
/// The owning runtime and its cloneable handle.
pub mod runtime;

pub use client::{ClientError, PublisherClient};
pub use health::PublisherHealth;
pub use runtime::{PublisherError, PublisherHandle, PublisherRuntime};
