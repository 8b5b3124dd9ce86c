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

//! The EventBus gRPC service: two unary RPCs, `Publish` and `Health`,
//! registered against [`crate::bus::codec::BincodeCodec`] using
//! `tonic::server::Grpc`/`UnaryService` directly rather than
//! `tonic-build`-generated stubs (see `codec` module docs for why).

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Future;
use serde::{Deserialize, Serialize};
use tonic::body::BoxBody;
use tonic::server::{Grpc, UnaryService};
use tonic::transport::server::{TcpConnectInfo, TlsConnectInfo};
use tonic::{Request, Response, Status};
use tower::Service;

use crate::ack::Ack;
use crate::bus::codec::BincodeCodec;
use crate::bus::pipeline::EventBusPipeline;
use crate::bus::tls::peer_common_name;
use crate::envelope::Envelope;

/// `Health` RPC request; empty, mirrors a Kubernetes-style probe body.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HealthRequest;

/// `Health` RPC response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Whether the broker is ready to accept `Publish` calls.
    pub ready: bool,
    /// Build/version string, surfaced for operators.
    pub build_info: String,
}

const PUBLISH_PATH: &str = "/sentrybus.EventBus/Publish";
const HEALTH_PATH: &str = "/sentrybus.EventBus/Health";

/// Tower service implementing the `EventBus` gRPC service over HTTP/2.
#[derive(Clone)]
pub struct EventBusServer {
    pipeline: Arc<EventBusPipeline>,
    build_info: String,
}

impl EventBusServer {
    /// Wrap a pipeline as a servable gRPC service.
    pub fn new(pipeline: Arc<EventBusPipeline>, build_info: String) -> Self {
        Self { pipeline, build_info }
    }
}

impl tonic::server::NamedService for EventBusServer {
    const NAME: &'static str = "sentrybus.EventBus";
}

struct PublishSvc(Arc<EventBusPipeline>);

impl UnaryService<Envelope> for PublishSvc {
    type Response = Ack;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Ack>, Status>> + Send>>;

    fn call(&mut self, request: Request<Envelope>) -> Self::Future {
        let pipeline = self.0.clone();
        Box::pin(async move {
            let cn = peer_common_name_from_request(&request)
                .ok_or_else(|| Status::unauthenticated("no client certificate"))?;
            let envelope = request.into_inner();
            let ack = pipeline.handle(&cn, envelope).await;
            Ok(Response::new(ack))
        })
    }
}

struct HealthSvc {
    ready: bool,
    build_info: String,
}

impl UnaryService<HealthRequest> for HealthSvc {
    type Response = HealthResponse;
    type Future = Pin<Box<dyn Future<Output = Result<Response<HealthResponse>, Status>> + Send>>;

    fn call(&mut self, _request: Request<HealthRequest>) -> Self::Future {
        let response = HealthResponse { ready: self.ready, build_info: self.build_info.clone() };
        Box::pin(async move { Ok(Response::new(response)) })
    }
}

/// Extract the mTLS peer's Subject CN from a request's connection info, set
/// by the transport once `ServerTlsConfig::client_ca_root` is configured.
fn peer_common_name_from_request<T>(request: &Request<T>) -> Option<String> {
    let tls_info = request.extensions().get::<TlsConnectInfo<TcpConnectInfo>>()?;
    let certs = tls_info.peer_certs()?;
    let leaf = certs.first()?;
    peer_common_name(leaf.as_ref())
}

impl Service<http::Request<BoxBody>> for EventBusServer {
    type Response = http::Response<BoxBody>;
    type Error = std::convert::Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<BoxBody>) -> Self::Future {
        match req.uri().path() {
            PUBLISH_PATH => {
                let pipeline = self.pipeline.clone();
                Box::pin(async move {
                    let mut grpc = Grpc::new(BincodeCodec::<Ack, Envelope>::default());
                    Ok(grpc.unary(PublishSvc(pipeline), req).await)
                })
            }
            HEALTH_PATH => {
                // Readiness mirrors the agent-side contract's spirit: the
                // broker reports ready unless it is deliberately shedding
                // load via overload mode.
                let ready = !self.pipeline.overload_mode();
                let build_info = self.build_info.clone();
                Box::pin(async move {
                    let mut grpc = Grpc::new(BincodeCodec::<HealthResponse, HealthRequest>::default());
                    Ok(grpc.unary(HealthSvc { ready, build_info }, req).await)
                })
            }
            _ => Box::pin(async move {
                Ok(http::Response::builder()
                    .status(200)
                    .header("grpc-status", "12")
                    .header("content-type", "application/grpc")
                    .body(tonic::body::empty_body())
                    .unwrap())
            }),
        }
    }
}
