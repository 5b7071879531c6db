#![no_main]

use libfuzzer_sys::fuzz_target;
use memindex::index::features::{decode_features, encode_features};
use memindex::index::DocIdAndFeatures;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must decode to Some or None, never panic
    if let Some(elements) = decode_features(data) {
        // Whatever decodes must survive a re-encode unchanged
        let features = DocIdAndFeatures {
            elements,
            ..Default::default()
        };
        let mut buf = Vec::new();
        encode_features(&features, &mut buf);
        assert_eq!(decode_features(&buf), Some(features.elements));
    }
});
