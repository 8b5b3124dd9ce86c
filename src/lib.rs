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

//! Sentrybus telemetry ingestion core.
//!
//! This crate provides:
//! - A signed, canonically-encoded event envelope shared by every producer
//!   and the broker (`envelope`)
//! - A four-kind ack taxonomy returned by every publish attempt (`ack`)
//! - An EventBus broker: mTLS-authenticated gRPC admission, validation,
//!   signature verification, dedup, and durable persistence (`bus`)
//! - An agent publisher runtime with a crash-safe write-ahead log and a
//!   draining background task (`publisher`, `wal`)
//! - Typed configuration roots for both processes (`config`)
//! - Prometheus metrics and an HTTP health/readiness endpoint (`monitoring`)

/// The four-kind publish acknowledgement.
pub mod ack;
/// The EventBus broker.
pub mod bus;
/// Typed configuration roots.
pub mod config;
/// Envelope data model, codec, and signing.
pub mod envelope;
/// Metrics and HTTP health endpoint.
pub mod monitoring;
/// The agent publisher runtime.
pub mod publisher;
/// The agent's write-ahead log.
pub mod wal;
