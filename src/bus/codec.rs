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

//! A non-protobuf `tonic` wire codec built on the same canonical bincode
//! encoder the envelope signer and the WAL use.
//!
//! The service's message set is small, fixed, and internal, so this avoids
//! pulling in a `prost`/`build.rs` protobuf toolchain purely to re-encode
//! the same bytes a second time. The two unary RPCs are registered by hand
//! against this codec using `tonic::server::Grpc`/`UnaryService`, the same
//! low-level API `tonic-build`'s generated code uses internally — the wire
//! is still real gRPC over HTTP/2 over mTLS, only the message framing's
//! serializer differs from protobuf.

use std::marker::PhantomData;

use bytes::{Buf, BufMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

use crate::envelope::codec::{decode_bincode_limited, encode_bincode, CodecError};
use crate::envelope::MAX_ENVELOPE_BYTES;

fn codec_error_to_status(e: CodecError) -> Status {
    Status::internal(format!("bincode codec: {e}"))
}

/// A `tonic` codec that encodes `Enc` and decodes `Dec` with the crate's
/// canonical, deterministic bincode options. The two type parameters are
/// independent because every RPC here has distinct request/response types
/// (e.g. `Publish` is `Envelope -> Ack`).
#[derive(Debug, Clone, Default)]
pub struct BincodeCodec<Enc, Dec> {
    _marker: PhantomData<(Enc, Dec)>,
}

impl<Enc, Dec> Encoder for BincodeCodec<Enc, Dec>
where
    Enc: Serialize + Send + 'static,
{
    type Item = Enc;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        let bytes = encode_bincode(&item).map_err(codec_error_to_status)?;
        dst.put_slice(&bytes);
        Ok(())
    }
}

impl<Enc, Dec> Decoder for BincodeCodec<Enc, Dec>
where
    Dec: DeserializeOwned + Send + 'static,
{
    type Item = Dec;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        if !src.has_remaining() {
            return Ok(None);
        }
        let remaining = src.remaining();
        let mut buf = vec![0u8; remaining];
        src.copy_to_slice(&mut buf);
        let value = decode_bincode_limited(&buf, MAX_ENVELOPE_BYTES).map_err(codec_error_to_status)?;
        Ok(Some(value))
    }
}

impl<Enc, Dec> Codec for BincodeCodec<Enc, Dec>
where
    Enc: Serialize + Send + 'static,
    Dec: DeserializeOwned + Send + 'static,
{
    type Encode = Enc;
    type Decode = Dec;
    type Encoder = BincodeCodec<Enc, Dec>;
    type Decoder = BincodeCodec<Enc, Dec>;

    fn encoder(&mut self) -> Self::Encoder {
        BincodeCodec { _marker: PhantomData }
    }

    fn decoder(&mut self) -> Self::Decoder {
        BincodeCodec { _marker: PhantomData }
    }
}
