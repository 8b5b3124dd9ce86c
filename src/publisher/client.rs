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

//! The agent-side gRPC client, hand-wired against
//! [`crate::bus::codec::BincodeCodec`] the same way the broker's service is
//! hand-wired against it — one codec, both directions.

use std::time::Duration;

use thiserror::Error;
use tonic::client::Grpc;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tonic::Request;

use crate::ack::Ack;
use crate::bus::codec::BincodeCodec;
use crate::bus::service::{HealthRequest, HealthResponse};
use crate::envelope::Envelope;

/// Client errors. A `Transport`/`Rpc` failure is exactly the "no ack" case
/// in `spec.md` §4.4 — the publisher treats it as transient.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The TLS material could not be read or is malformed.
    #[error("tls setup: {0}")]
    Tls(String),
    /// The channel could not be established.
    #[error("transport: {0}")]
    Transport(String),
    /// The RPC itself failed or timed out.
    #[error("rpc: {0}")]
    Rpc(#[from] tonic::Status),
}

/// A connected client to one EventBus endpoint.
#[derive(Clone)]
pub struct PublisherClient {
    grpc: Grpc<Channel>,
    publish_deadline: Duration,
}

impl PublisherClient {
    /// Dial `bus_address` with the given mTLS material.
    pub async fn connect(
        bus_address: &str,
        client_cert_path: &str,
        client_key_path: &str,
        ca_cert_path: &str,
        publish_deadline: Duration,
    ) -> Result<Self, ClientError> {
        let cert = std::fs::read(client_cert_path).map_err(|e| ClientError::Tls(e.to_string()))?;
        let key = std::fs::read(client_key_path).map_err(|e| ClientError::Tls(e.to_string()))?;
        let ca = std::fs::read(ca_cert_path).map_err(|e| ClientError::Tls(e.to_string()))?;

        let tls = ClientTlsConfig::new().identity(Identity::from_pem(cert, key)).ca_certificate(Certificate::from_pem(ca));

        let endpoint = Endpoint::from_shared(format!("https://{bus_address}"))
            .map_err(|e| ClientError::Transport(e.to_string()))?
            .tls_config(tls)
            .map_err(|e| ClientError::Transport(e.to_string()))?
            .timeout(publish_deadline);

        let channel = endpoint.connect().await.map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self { grpc: Grpc::new(channel), publish_deadline })
    }

    /// Call `Publish(envelope)`, returning the ack or a transport/RPC error
    /// (the publisher's "no ack" case).
    pub async fn publish(&mut self, envelope: Envelope) -> Result<Ack, ClientError> {
        self.grpc.ready().await.map_err(|e| ClientError::Transport(e.to_string()))?;
        let path = http::uri::PathAndQuery::from_static("/sentrybus.EventBus/Publish");
        let mut request = Request::new(envelope);
        request.set_timeout(self.publish_deadline);
        let response = self.grpc.unary(request, path, BincodeCodec::<Envelope, Ack>::default()).await?;
        Ok(response.into_inner())
    }

    /// Call `Health()`.
    pub async fn health(&mut self) -> Result<HealthResponse, ClientError> {
        self.grpc.ready().await.map_err(|e| ClientError::Transport(e.to_string()))?;
        let path = http::uri::PathAndQuery::from_static("/sentrybus.EventBus/Health");
        let request = Request::new(HealthRequest);
        let response =
            self.grpc.unary(request, path, BincodeCodec::<HealthRequest, HealthResponse>::default()).await?;
        Ok(response.into_inner())
    }
}
