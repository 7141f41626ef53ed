//! Integration test for share processor configuration parsing
//!
//! Verifies that the example config files deserialize into
//! `ShareProcessorConfig` with the expected store settings.

use ext_config::{Config, File, FileFormat};
use share_processor::config::{BackendKind, ShareProcessorConfig};

fn load_config(path: &str) -> ShareProcessorConfig {
    let settings = Config::builder()
        .add_source(File::new(path, FileFormat::Toml))
        .build()
        .expect("Failed to build config");
    settings.try_deserialize().expect("Failed to parse config")
}

#[test]
fn test_parse_redis_example_config() {
    let config = load_config("config-examples/share-processor-config-example.toml");

    assert_eq!(config.coin, "ravencoin");
    assert_eq!(config.store.backend, BackendKind::Redis);
    assert_eq!(config.store.host, "127.0.0.1");
    assert_eq!(config.store.port, 6379);
    assert!(config.log_file().is_none());
}

#[test]
fn test_parse_memory_example_config() {
    let config = load_config("config-examples/share-processor-config-memory-example.toml");

    assert_eq!(config.coin, "ravencoin");
    assert_eq!(config.store.backend, BackendKind::Memory);
    assert_eq!(config.store.port, 6379, "port should default to 6379");
}

#[test]
fn test_example_share_events_parse() {
    let events = std::fs::read_to_string("config-examples/shares-example.jsonl")
        .expect("Failed to read shares-example.jsonl");

    let mut blocks = 0;
    for line in events.lines() {
        let event: serde_json::Value = serde_json::from_str(line).expect("Invalid JSON line");
        let share: share_processor::ShareData =
            serde_json::from_value(event["share"].clone()).expect("Invalid share");
        assert!(share.block_diff > 0.0);
        if event["is_valid_block"].as_bool() == Some(true) {
            assert!(share.block_hash.is_some());
            blocks += 1;
        }
    }
    assert_eq!(blocks, 1);
}
