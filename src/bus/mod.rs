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

//! The EventBus: broker-side admission, validation, dedup, and persistence
//! of signed envelopes, served over mTLS gRPC.

/// Broker-side admission control (in-flight gate, overload mode).
pub mod admission;
/// Non-protobuf tonic wire codec built on the canonical bincode encoder.
pub mod codec;
/// Process-local bounded dedup cache.
pub mod dedup;
/// CN allowlist and agent signing-key lookups.
pub mod identity;
/// The transport-independent request pipeline.
pub mod pipeline;
/// The gRPC service wiring the pipeline to `tonic`.
pub mod service;
/// The durable, idempotent event store.
pub mod store;
/// mTLS server configuration and CN extraction.
pub mod tls;

pub use pipeline::EventBusPipeline;
pub use service::EventBusServer;
