// Copyright (c) 2026 Sentrybus
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Best-effort: wire-decoding an envelope must never panic on untrusted
    // bytes, regardless of whether it succeeds.
    let _ = sentrybus::envelope::codec::decode_wire(data);
});
