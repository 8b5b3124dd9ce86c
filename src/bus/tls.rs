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

//! Mutual TLS server configuration and Subject CN extraction.
//!
//! Mutual TLS is mandatory: [`server_tls_config`] always configures a
//! client CA root, so an unauthenticated connection never completes the
//! handshake. Once connected, the peer's leaf certificate is available off
//! `tonic::transport::server::TlsConnectInfo`; [`peer_common_name`] parses
//! its Subject Common Name with `x509-parser`.

use thiserror::Error;
use tonic::transport::{Certificate, Identity, ServerTlsConfig};
use x509_parser::prelude::{FromDer, X509Certificate};

/// TLS configuration errors.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A certificate or key file could not be read.
    #[error("read tls material: {0}")]
    Read(String),
    /// The certificate chain or key could not be parsed by the TLS stack.
    #[error("invalid tls material")]
    Invalid,
}

/// Build the server's mTLS configuration: its own identity plus the CA root
/// client certificates must chain to.
pub fn server_tls_config(
    server_cert_path: &str,
    server_key_path: &str,
    ca_cert_path: &str,
) -> Result<ServerTlsConfig, TlsError> {
    let cert = std::fs::read(server_cert_path).map_err(|e| TlsError::Read(e.to_string()))?;
    let key = std::fs::read(server_key_path).map_err(|e| TlsError::Read(e.to_string()))?;
    let ca = std::fs::read(ca_cert_path).map_err(|e| TlsError::Read(e.to_string()))?;

    let identity = Identity::from_pem(cert, key);
    let client_ca = Certificate::from_pem(ca);

    Ok(ServerTlsConfig::new().identity(identity).client_ca_root(client_ca))
}

/// Extract the Subject Common Name from a peer's DER-encoded leaf
/// certificate. Returns `None` on any parse failure or absent CN rather
/// than raising — a missing/unparseable CN is simply treated as
/// `UNAUTHORIZED` by the caller, never a crash.
pub fn peer_common_name(der: &[u8]) -> Option<String> {
    let (_, cert) = X509Certificate::from_der(der).ok()?;
    let name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(|s| s.to_string());
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType};

    fn self_signed_with_cn(cn: &str) -> Vec<u8> {
        let mut params = CertificateParams::new(vec!["localhost".to_string()]);
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;
        let cert = rcgen::Certificate::from_params(params).unwrap();
        cert.serialize_der().unwrap()
    }

    #[test]
    fn extracts_common_name_from_self_signed_cert() {
        let der = self_signed_with_cn("agent-17.fleet.internal");
        assert_eq!(peer_common_name(&der).as_deref(), Some("agent-17.fleet.internal"));
    }

    #[test]
    fn malformed_der_yields_none_not_panic() {
        assert_eq!(peer_common_name(&[0xDE, 0xAD, 0xBE, 0xEF]), None);
    }
}
