//! Fuzz target: `ActivityEstimator::estimate`
//!
//! Reinterprets the input as a stream of raw f32 feature quadruples (NaN,
//! infinities and negatives included) and asserts that H never leaves
//! [0, 1] and a good frame always clears the degraded streak.
//!
//! cargo fuzz run fuzz_estimator

#![no_main]

use aquafeed::config::EngineConfig;
use aquafeed::sensors::FeatureVector;
use aquafeed::sensors::activity::ActivityEstimator;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut estimator = ActivityEstimator::new(&EngineConfig::default());

    for (i, chunk) in data.chunks_exact(16).enumerate() {
        let f = |n: usize| f32::from_le_bytes([chunk[n], chunk[n + 1], chunk[n + 2], chunk[n + 3]]);
        let fv = FeatureVector::new(f(0), f(4), f(8), f(12), i as u64);

        let est = estimator.estimate(&fv);
        assert!((0.0..=1.0).contains(&est.h), "H out of range: {}", est.h);
        if !est.is_degraded() {
            assert_eq!(estimator.degraded_streak(), 0);
        }
    }
});
