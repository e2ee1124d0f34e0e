#![no_main]

use libfuzzer_sys::fuzz_target;
use icsguard_detector::FeatureExtractor;
use icsguard_detector::decode::{decode_ethernet, decode_ip};

fuzz_target!(|data: &[u8]| {
    let extractor = FeatureExtractor::new();
    for packet in [decode_ethernet(data, 0.0), decode_ip(data, 0.0)] {
        assert_eq!(packet.length, data.len());
        let features = extractor.extract(&packet);
        assert_eq!(features.packet_size, data.len() as u64);
    }
});
