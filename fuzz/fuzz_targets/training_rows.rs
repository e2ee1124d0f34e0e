#![no_main]

use libfuzzer_sys::fuzz_target;
use icsguard_detector::model::rows::parse_training_rows;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        let _ = parse_training_rows(content, "fuzz/rows.json");
    }
});
