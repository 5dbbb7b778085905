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

// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

use crate::path_format::PathFormat;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RecorderConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        Self::load_str(&content)
    }

    /// Parse and validate configuration text
    pub fn load_str(content: &str) -> Result<RecorderConfig> {
        let content = Self::substitute_env_vars(content)?;

        let config: RecorderConfig =
            serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${RECORD_DIR:-./recordings} -> ./recordings (if RECORD_DIR not set)
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}")
            .context("Invalid substitution pattern")?;

        let output = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    // Keep original if no default and var not found
                    None => format!("${{{}}}", var_name),
                },
            }
        });

        Ok(output.to_string())
    }

    /// Validate configuration
    pub fn validate(config: &RecorderConfig) -> Result<()> {
        let record = &config.record;

        if record.segment_duration_seconds == 0 {
            bail!("record.segment_duration_seconds must be > 0");
        }

        if let Some(part) = record.part_duration_ms {
            if part == 0 || part >= record.segment_duration_seconds.saturating_mul(1000) {
                bail!("record.part_duration_ms must be > 0 and shorter than the segment duration");
            }
        }

        if record.write_queue_size == 0 {
            bail!("record.write_queue_size must be > 0");
        }

        if record.compression.level > 4 {
            bail!("record.compression.level must be 0-4");
        }

        PathFormat::parse(&record.path_format)
            .with_context(|| format!("record.path_format '{}' is invalid", record.path_format))?;

        match config.zenoh.mode.as_str() {
            "peer" | "client" | "router" => {}
            unknown => bail!("Unknown zenoh.mode: '{}'. Supported: peer, client, router", unknown),
        }

        match config.logging.format.as_str() {
            "text" | "json" => {}
            unknown => bail!("Unknown logging.format: '{}'. Supported: text, json", unknown),
        }

        let mut names = HashSet::new();
        for stream in &config.streams {
            if stream.path_name.is_empty() {
                bail!("streams[].path_name cannot be empty");
            }
            if stream.key_expr.is_empty() {
                bail!("streams[{}].key_expr cannot be empty", stream.path_name);
            }
            if !names.insert(stream.path_name.as_str()) {
                bail!("streams[].path_name '{}' is used twice", stream.path_name);
            }
        }

        Ok(())
    }
}
