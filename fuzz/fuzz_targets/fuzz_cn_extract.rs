// Copyright (c) 2026 Sentrybus
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Best-effort: malformed DER from a misbehaving or malicious mTLS peer
    // must yield `None`, never panic the EventBus's request path.
    let _ = sentrybus::bus::tls::peer_common_name(data);
});
