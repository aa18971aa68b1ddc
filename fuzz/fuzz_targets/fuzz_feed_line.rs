//! Fuzz target: glucose feed records
//!
//! Feeds arbitrary text through `parse_line` and `parse_reading` and checks:
//! - No panics on any input
//! - Every accepted reading is finite and non-negative
//!
//! cargo fuzz run fuzz_feed_line

#![no_main]

use aidguard::adapters::feed::parse_line;
use aidguard::monitor::parse_reading;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    for line in text.lines() {
        let Some(raw) = parse_line(line) else {
            continue;
        };
        if let Ok(reading) = parse_reading(&raw) {
            assert!(reading.value.is_finite());
            assert!(reading.value >= 0.0);
        }
    }
});
