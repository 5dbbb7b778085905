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

// Configuration types for stream-recorder

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::path_format::DEFAULT_PATH_FORMAT;
use crate::protocol::{CompressionType, RecordFormat};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecorderConfig {
    #[serde(default)]
    pub zenoh: ZenohConfig,
    #[serde(default)]
    pub record: RecordSettings,
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Zenoh configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZenohConfig {
    #[serde(default = "default_mode")]
    pub mode: String, // "peer", "client", or "router"

    #[serde(default)]
    pub connect: Option<ConnectConfig>,

    #[serde(default)]
    pub listen: Option<ListenConfig>,
}

impl Default for ZenohConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            connect: None,
            listen: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectConfig {
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    pub endpoints: Vec<String>,
}

/// Settings shared by every recorded stream
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordSettings {
    #[serde(default = "default_path_format")]
    pub path_format: String,

    #[serde(default)]
    pub format: RecordFormat,

    /// Part interval; formats without parts ignore it
    #[serde(default)]
    pub part_duration_ms: Option<u64>,

    #[serde(default = "default_segment_duration")]
    pub segment_duration_seconds: u64,

    #[serde(default = "default_write_queue_size")]
    pub write_queue_size: usize,

    #[serde(default = "default_push_timeout")]
    pub push_timeout_ms: u64,

    #[serde(default = "default_restart_pause")]
    pub restart_pause_ms: u64,

    #[serde(default = "default_playlist")]
    pub playlist: bool,

    #[serde(default)]
    pub compression: CompressionConfig,
}

impl Default for RecordSettings {
    fn default() -> Self {
        Self {
            path_format: default_path_format(),
            format: RecordFormat::default(),
            part_duration_ms: None,
            segment_duration_seconds: default_segment_duration(),
            write_queue_size: default_write_queue_size(),
            push_timeout_ms: default_push_timeout(),
            restart_pause_ms: default_restart_pause(),
            playlist: default_playlist(),
            compression: CompressionConfig::default(),
        }
    }
}

impl RecordSettings {
    pub fn segment_duration(&self) -> Duration {
        Duration::from_secs(self.segment_duration_seconds)
    }

    pub fn part_duration(&self) -> Option<Duration> {
        self.part_duration_ms.map(Duration::from_millis)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn restart_pause(&self) -> Duration {
        Duration::from_millis(self.restart_pause_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompressionConfig {
    #[serde(default)]
    pub r#type: CompressionType,
    #[serde(default = "default_compression_level")]
    pub level: u8, // 0-4
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            r#type: CompressionType::default(),
            level: default_compression_level(),
        }
    }
}

/// One stream to record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StreamConfig {
    pub path_name: String,
    pub key_expr: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String, // "text", "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_mode() -> String { "peer".to_string() }
fn default_path_format() -> String { DEFAULT_PATH_FORMAT.to_string() }
fn default_segment_duration() -> u64 { 3600 }
fn default_write_queue_size() -> usize { 512 }
fn default_push_timeout() -> u64 { 500 }
fn default_restart_pause() -> u64 { 2000 }
fn default_playlist() -> bool { true }
fn default_compression_level() -> u8 { 2 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
