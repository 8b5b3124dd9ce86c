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

//! Observability: Prometheus metrics and the HTTP health/metrics endpoint.

/// HTTP liveness/readiness/metrics endpoint.
pub mod health_http;
/// Metric definitions and registration.
pub mod metrics;

pub use health_http::HealthCheck;
pub use metrics::Metrics;
