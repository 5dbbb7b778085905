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

use anyhow::{bail, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use crate::agent::{Agent, AgentConfig, AgentStats};
use crate::config::RecordSettings;
use crate::source::StreamSource;
use crate::LOG_TARGET;

/// Owns one Agent per recorded stream, keyed by path name
pub struct RecorderManager {
    settings: RecordSettings,
    agents: DashMap<String, Agent>,
}

impl RecorderManager {
    pub fn new(settings: RecordSettings) -> Self {
        Self {
            settings,
            agents: DashMap::new(),
        }
    }

    /// Start recording `path_name` with the shared record settings
    pub fn start_stream(&self, path_name: &str, source: Arc<dyn StreamSource>) -> Result<()> {
        let config = AgentConfig::from_settings(path_name, &self.settings)?;
        self.start_with_config(config, source)
    }

    /// Start recording with a fully custom configuration
    pub fn start_with_config(&self, config: AgentConfig, source: Arc<dyn StreamSource>) -> Result<()> {
        match self.agents.entry(config.path_name.clone()) {
            Entry::Occupied(_) => bail!("stream '{}' is already being recorded", config.path_name),
            Entry::Vacant(slot) => {
                info!(
                    target: LOG_TARGET,
                    "Recording '{}' from {}",
                    config.path_name,
                    source.describe()
                );
                slot.insert(Agent::initialize(config, source)?);
                Ok(())
            }
        }
    }

    /// Stop one stream; returns false if it was not being recorded
    pub async fn stop_stream(&self, path_name: &str) -> bool {
        // Removed before awaiting so no map shard lock is held across close
        match self.agents.remove(path_name) {
            Some((_, agent)) => {
                agent.close().await;
                true
            }
            None => false,
        }
    }

    pub fn active_streams(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn stats(&self, path_name: &str) -> Option<AgentStats> {
        self.agents.get(path_name).map(|agent| agent.stats())
    }

    /// Close every Agent
    pub async fn shutdown(&self) -> Result<()> {
        let names = self.active_streams();
        info!(target: LOG_TARGET, "Shutting down {} recordings", names.len());

        for name in names {
            self.stop_stream(&name).await;
        }
        Ok(())
    }
}
