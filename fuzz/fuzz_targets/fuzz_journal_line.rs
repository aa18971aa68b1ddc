//! Fuzz target: journal line decoder
//!
//! Replay must never panic on a corrupted ledger line, and anything it
//! accepts must encode back to a line it accepts again.
//!
//! cargo fuzz run fuzz_journal_line

#![no_main]

use aidguard::journal::file::decode_line;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(entry) = decode_line(line) {
        let Ok(encoded) = serde_json::to_string(&entry) else {
            return;
        };
        let again = decode_line(&encoded).ok();
        assert_eq!(again.map(|e| e.seq), Some(entry.seq));
    }
});
