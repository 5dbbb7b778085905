// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Configuration system integration tests

use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use stream_recorder::config::{load_config, ConfigLoader, RecorderConfig};
use stream_recorder::{AgentConfig, CompressionType, RecordFormat};
use tempfile::TempDir;

#[test]
fn test_load_default_config() {
    let config_path = PathBuf::from("config/default.yaml");

    if config_path.exists() {
        let result = load_config(&config_path);
        assert!(result.is_ok(), "Failed to load default config: {:?}", result.err());

        let config = result.unwrap();

        assert_eq!(config.zenoh.mode, "peer");
        assert_eq!(config.record.format, RecordFormat::Mcap);
        assert_eq!(config.record.segment_duration_seconds, 3600);
        assert_eq!(config.record.part_duration_ms, Some(1000));
        assert_eq!(config.record.compression.r#type, CompressionType::Zstd);
        assert_eq!(config.streams.len(), 1);
        assert_eq!(config.streams[0].path_name, "cam1");
        assert_eq!(config.logging.level, "info");
    }
}

#[test]
fn test_config_with_env_vars() {
    let temp_config = r#"
zenoh:
  mode: ${CFG_TEST_ZENOH_MODE:-client}

record:
  path_format: ${CFG_TEST_RECORD_DIR}/%path/%Y-%m-%d_%H-%M-%S-%6f
  segment_duration_seconds: 60

streams:
  - path_name: cam1
    key_expr: camera/front/**

logging:
  level: debug
  format: text
"#;

    let dir = TempDir::new().unwrap();
    let temp_path = dir.path().join("config.yaml");
    fs::write(&temp_path, temp_config).expect("Failed to write temp config");

    std::env::set_var("CFG_TEST_RECORD_DIR", "/data/rec");
    std::env::remove_var("CFG_TEST_ZENOH_MODE");

    let result = load_config(&temp_path);
    assert!(result.is_ok(), "Failed to load config with env vars: {:?}", result.err());

    let config = result.unwrap();
    assert_eq!(config.zenoh.mode, "client"); // Uses default
    assert_eq!(
        config.record.path_format,
        "/data/rec/%path/%Y-%m-%d_%H-%M-%S-%6f"
    );
    assert_eq!(config.logging.level, "debug");

    std::env::remove_var("CFG_TEST_RECORD_DIR");
}

#[test]
fn test_minimal_config_gets_defaults() {
    let config = ConfigLoader::load_str("streams: []\n").unwrap();

    assert_eq!(config.zenoh.mode, "peer");
    assert_eq!(config.record.segment_duration_seconds, 3600);
    assert_eq!(config.record.write_queue_size, 512);
    assert_eq!(config.record.push_timeout_ms, 500);
    assert_eq!(config.record.restart_pause_ms, 2000);
    assert!(config.record.playlist);
    assert_eq!(config.record.part_duration_ms, None);
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_invalid_path_format_rejected() {
    let yaml = r#"
record:
  path_format: ./recordings/%Y-%m-%d
"#;
    let err = ConfigLoader::load_str(yaml).unwrap_err();
    assert!(format!("{:#}", err).contains("path_format"));
}

#[test]
fn test_unknown_format_rejected() {
    let yaml = r#"
record:
  format: mpegts
"#;
    assert!(ConfigLoader::load_str(yaml).is_err());
}

#[test]
fn test_framed_format_with_lz4() {
    let yaml = r#"
record:
  format: framed
  compression:
    type: lz4
    level: 0
"#;
    let config = ConfigLoader::load_str(yaml).unwrap();
    assert_eq!(config.record.format, RecordFormat::Framed);
    assert_eq!(config.record.compression.r#type, CompressionType::Lz4);
    assert_eq!(config.record.compression.level, 0);
}

#[test]
fn test_agent_config_from_settings() {
    let yaml = r#"
record:
  segment_duration_seconds: 10
  part_duration_ms: 500
  write_queue_size: 8
  push_timeout_ms: 20
  restart_pause_ms: 100
  playlist: false
"#;
    let config: RecorderConfig = ConfigLoader::load_str(yaml).unwrap();
    let agent = AgentConfig::from_settings("cam1", &config.record).unwrap();

    assert_eq!(agent.path_name, "cam1");
    assert_eq!(agent.segment_duration, Duration::from_secs(10));
    assert_eq!(agent.part_duration, Some(Duration::from_millis(500)));
    assert_eq!(agent.write_queue_size, 8);
    assert_eq!(agent.push_timeout, Duration::from_millis(20));
    assert_eq!(agent.restart_pause, Some(Duration::from_millis(100)));
    assert!(!agent.playlist);
}

#[test]
fn test_missing_config_file() {
    let result = load_config("/nonexistent/stream-recorder.yaml");
    assert!(result.is_err());
}
