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

//! Wire/data types for telemetry envelopes.
//!
//! An [`Envelope`] is the unit of transmission between an agent and the bus,
//! and the unit of persistence in both the agent's WAL and the bus's durable
//! event store. It is a tagged union over a closed set of payload variants —
//! "exactly one payload variant is set" is a static property of the Rust
//! enum, not a runtime check.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `serde(with = ...)` support for `Option<[u8; 64]>`: serde's built-in
/// array impls only cover lengths up to 32, so `prev_sig` needs this helper
/// to (de)serialize as the same fixed-size tuple serde would emit natively.
mod prev_sig_serde {
    use serde::de::{Error as DeError, SeqAccess, Visitor};
    use serde::ser::SerializeTuple;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(value: &Option<[u8; 64]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => {
                let mut tup = serializer.serialize_tuple(64)?;
                for b in bytes {
                    tup.serialize_element(b)?;
                }
                tup.end()
            }
            None => serializer.serialize_none(),
        }
    }

    struct ArrayVisitor;

    impl<'de> Visitor<'de> for ArrayVisitor {
        type Value = [u8; 64];

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "an array of 64 bytes")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut out = [0u8; 64];
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = seq
                    .next_element()?
                    .ok_or_else(|| DeError::invalid_length(i, &self))?;
            }
            Ok(out)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 64]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OptionVisitor;

        impl<'de> Visitor<'de> for OptionVisitor {
            type Value = Option<[u8; 64]>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "an optional array of 64 bytes")
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: DeError,
            {
                Ok(None)
            }

            fn visit_some<D2>(self, deserializer: D2) -> Result<Self::Value, D2::Error>
            where
                D2: Deserializer<'de>,
            {
                deserializer.deserialize_tuple(64, ArrayVisitor).map(Some)
            }
        }

        deserializer.deserialize_option(OptionVisitor)
    }
}

/// Maximum serialized envelope size, enforced at producer and broker.
pub const MAX_ENVELOPE_BYTES: usize = 128 * 1024;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Major protocol version this build understands.
pub const CURRENT_MAJOR: u16 = 1;

/// `{major}.{minor}` envelope version. Only `major` gates rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeVersion {
    /// Major version. Consumers reject unknown majors.
    pub major: u16,
    /// Minor version. Informational only.
    pub minor: u16,
}

impl EnvelopeVersion {
    /// The version this build produces.
    pub const CURRENT: EnvelopeVersion = EnvelopeVersion { major: CURRENT_MAJOR, minor: 0 };

    /// Whether this version's major is one this build accepts.
    pub fn is_supported_major(&self) -> bool {
        self.major == CURRENT_MAJOR
    }
}

impl fmt::Display for EnvelopeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// SHA-256 of an envelope's canonical bytes, lowercase hex on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(pub [u8; 32]);

impl IdempotencyKey {
    /// Hex-encode.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-char lowercase hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let bytes = hex::decode(s).ok()?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Some(Self(out))
    }
}

impl fmt::Debug for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdempotencyKey({})", self.to_hex())
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A 64-byte Ed25519 signature, or empty prior to signing.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EnvelopeSignature(pub Vec<u8>);

impl EnvelopeSignature {
    /// Empty (pre-signing) signature.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// `sig` length is 0 (pre-signing) or exactly [`SIGNATURE_LEN`]; anything
    /// else is structurally invalid.
    pub fn is_well_formed(&self) -> bool {
        self.0.is_empty() || self.0.len() == SIGNATURE_LEN
    }
}

impl fmt::Debug for EnvelopeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnvelopeSignature({} bytes)", self.0.len())
    }
}

/// Agent/validator identity: an Ed25519 public key, expected 32 bytes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub Vec<u8>);

impl AgentId {
    /// Interpret as Ed25519 public key bytes if the length is 32.
    pub fn as_public_key_bytes(&self) -> Option<[u8; 32]> {
        if self.0.len() != 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.0);
        Some(out)
    }
}

/// Host network flow telemetry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    /// Source IP (textual, v4 or v6).
    pub src_ip: String,
    /// Destination IP (textual, v4 or v6).
    pub dst_ip: String,
    /// Source port, if known.
    #[serde(default)]
    pub src_port: u16,
    /// Destination port, if known.
    #[serde(default)]
    pub dst_port: u16,
    /// Bytes observed flowing src -> dst.
    pub bytes_sent: u64,
    /// Bytes observed flowing dst -> src.
    #[serde(default)]
    pub bytes_recv: u64,
    /// IANA protocol number (6 = TCP, 17 = UDP, ...).
    #[serde(default)]
    pub protocol: u8,
}

/// Host process lifecycle telemetry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessEvent {
    /// Process id.
    pub pid: u32,
    /// Parent process id, if known.
    #[serde(default)]
    pub ppid: Option<u32>,
    /// Effective uid.
    pub uid: u32,
    /// Executable path.
    pub exe_path: String,
    /// Command-line arguments, if captured.
    #[serde(default)]
    pub argv: Option<String>,
    /// SHA-256 of the executable, if computed.
    #[serde(default)]
    pub exe_sha256: Option<String>,
}

/// SNMP / peripheral device telemetry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceTelemetry {
    /// Device identifier (serial, OID-derived id, or bus path).
    pub device_id: String,
    /// Free-form metric name (e.g. "ifInOctets.3", "usb.vendor_id").
    pub metric: String,
    /// Metric value. Stored as a string to admit both numeric and
    /// enumerated SNMP values without a second payload shape.
    pub value: String,
}

/// The closed set of envelope payload variants. `TelemetryBatch` is
/// restricted to the three leaf variants by construction, so a batch cannot
/// itself contain a nested batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// A single flow record.
    Flow(FlowEvent),
    /// A single process record.
    Process(ProcessEvent),
    /// A single device telemetry sample.
    Device(DeviceTelemetry),
    /// A batch of leaf-variant payloads from one collector tick.
    Batch(Vec<LeafPayload>),
}

/// The leaf payload variants a [`Payload::Batch`] may contain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LeafPayload {
    /// A single flow record.
    Flow(FlowEvent),
    /// A single process record.
    Process(ProcessEvent),
    /// A single device telemetry sample.
    Device(DeviceTelemetry),
}

/// The signed, versioned unit of telemetry transmitted from an agent to the
/// bus and persisted by both sides.
///
/// Envelopes are immutable after [`crate::envelope::signing::sign`] sets
/// `sig`; every field that participates in canonicalization is `pub` only
/// within this crate's construction helpers to keep that invariant local.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version.
    pub version: EnvelopeVersion,
    /// Producer-assigned nanosecond timestamp. Monotonicity is not required.
    pub ts_ns: u64,
    /// Deterministic function of the payload; see
    /// [`crate::envelope::signing::idempotency_of`].
    pub idempotency_key: IdempotencyKey,
    /// Exactly one payload variant.
    pub payload: Payload,
    /// Ed25519 signature over canonical bytes with `sig` cleared.
    pub sig: EnvelopeSignature,
    /// Reserved hash-chain link to a prior envelope. Not enforced by this
    /// core.
    #[serde(default, with = "prev_sig_serde")]
    pub prev_sig: Option<[u8; 64]>,
    /// Producer identity. Not itself part of the canonical signing bytes'
    /// trust boundary — the bus derives identity from the mTLS peer, not
    /// from this field — but carried so a single agent process can multiplex
    /// several collector identities onto one WAL.
    pub producer: AgentId,
}

impl Envelope {
    /// Build an unsigned envelope (idempotency key and signature are not yet
    /// computed; call [`crate::envelope::signing::finalize`]).
    pub fn unsigned(ts_ns: u64, payload: Payload, producer: AgentId) -> Envelope {
        Envelope {
            version: EnvelopeVersion::CURRENT,
            ts_ns,
            idempotency_key: IdempotencyKey([0u8; 32]),
            payload,
            sig: EnvelopeSignature::empty(),
            prev_sig: None,
            producer,
        }
    }
}
