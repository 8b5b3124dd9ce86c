// Copyright (c) 2026 Sentrybus
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Best-effort: a corrupt on-disk WAL row (bit rot, truncated write) must
    // be rejected, never panic the drain loop.
    let _ = sentrybus::wal::decode_stored_row(data);
});
