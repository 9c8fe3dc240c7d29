//! Fuzz target: config decoding + validation
//!
//! Feeds arbitrary bytes to both persisted encodings (postcard blob and
//! JSON file).  Decoding may fail, but anything that decodes must either
//! validate and build an engine or be rejected with a typed error.
//!
//! cargo fuzz run fuzz_config

#![no_main]

use aquafeed::app::service::Orchestrator;
use aquafeed::config::{ConfigPatch, EngineConfig};
use libfuzzer_sys::fuzz_target;

fn check(config: EngineConfig) {
    match config.validate() {
        Ok(()) => assert!(Orchestrator::new(config).is_ok()),
        Err(_) => assert!(Orchestrator::new(config).is_err()),
    }
}

fuzz_target!(|data: &[u8]| {
    if let Ok(config) = postcard::from_bytes::<EngineConfig>(data) {
        check(config);
    }
    if let Ok(config) = serde_json::from_slice::<EngineConfig>(data) {
        check(config);
    }
    if let Ok(patch) = serde_json::from_slice::<ConfigPatch>(data) {
        check(EngineConfig::default().merged(&patch));
    }
});
