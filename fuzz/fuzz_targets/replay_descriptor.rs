#![no_main]

use libfuzzer_sys::fuzz_target;
use icsguard_core::types::RawPacket;
use icsguard_detector::FeatureExtractor;

fuzz_target!(|data: &[u8]| {
    let Ok(content) = std::str::from_utf8(data) else {
        return;
    };
    let extractor = FeatureExtractor::new();
    for line in content.lines() {
        if let Ok(packet) = serde_json::from_str::<RawPacket>(line) {
            let _ = extractor.extract_vector(&packet);
        }
    }
});
