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

// Recording supervisor
//
// An Agent keeps exactly one recording instance alive for a stream. When the
// instance ends for any reason other than `close()`, the Agent waits for the
// restart pause and starts a fresh one. It never gives up on its own.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

use crate::config::RecordSettings;
use crate::instance::{InstanceEnd, InstanceSettings, RecordingInstance};
use crate::mux::MuxerOptions;
use crate::path_format::{PathFormat, DEFAULT_PATH_FORMAT};
use crate::playlist::PlaylistMaintainer;
use crate::protocol::{CompressionLevel, CompressionType, RecordFormat};
use crate::segment::{CompletedSegment, OnSegmentComplete, OnSegmentCreate, SegmentWriterSettings};
use crate::source::StreamSource;
use crate::storage::{FilesystemStorage, SegmentStorage};
use crate::LOG_TARGET;

pub const DEFAULT_RESTART_PAUSE: Duration = Duration::from_secs(2);
pub const DEFAULT_SEGMENT_DURATION: Duration = Duration::from_secs(3600);
pub const DEFAULT_WRITE_QUEUE_SIZE: usize = 512;
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Configuration of one recorded stream
///
/// Optional fields are filled with defaults by [`Agent::initialize`].
#[derive(Clone)]
pub struct AgentConfig {
    pub path_name: String,
    pub path_format: String,
    pub format: RecordFormat,
    pub part_duration: Option<Duration>,
    pub segment_duration: Duration,
    pub write_queue_size: usize,
    pub push_timeout: Duration,
    pub restart_pause: Option<Duration>,
    pub compression: CompressionType,
    pub compression_level: CompressionLevel,
    pub playlist: bool,
    pub on_segment_create: Option<OnSegmentCreate>,
    pub on_segment_complete: Option<OnSegmentComplete>,
    pub storage: Option<Arc<dyn SegmentStorage>>,
}

impl AgentConfig {
    pub fn new(path_name: impl Into<String>) -> Self {
        Self {
            path_name: path_name.into(),
            path_format: DEFAULT_PATH_FORMAT.to_string(),
            format: RecordFormat::default(),
            part_duration: None,
            segment_duration: DEFAULT_SEGMENT_DURATION,
            write_queue_size: DEFAULT_WRITE_QUEUE_SIZE,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            restart_pause: None,
            compression: CompressionType::default(),
            compression_level: CompressionLevel::default(),
            playlist: true,
            on_segment_create: None,
            on_segment_complete: None,
            storage: None,
        }
    }

    /// Build from the `record` section of the configuration file
    pub fn from_settings(path_name: impl Into<String>, settings: &RecordSettings) -> Result<Self> {
        let compression_level = CompressionLevel::from_u8(settings.compression.level)
            .with_context(|| format!("invalid compression level {}", settings.compression.level))?;

        Ok(Self {
            path_format: settings.path_format.clone(),
            format: settings.format,
            part_duration: settings.part_duration(),
            segment_duration: settings.segment_duration(),
            write_queue_size: settings.write_queue_size,
            push_timeout: settings.push_timeout(),
            restart_pause: Some(settings.restart_pause()),
            compression: settings.compression.r#type,
            compression_level,
            playlist: settings.playlist,
            ..Self::new(path_name)
        })
    }

    pub fn with_path_format(mut self, path_format: impl Into<String>) -> Self {
        self.path_format = path_format.into();
        self
    }

    pub fn with_format(mut self, format: RecordFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_segment_duration(mut self, duration: Duration) -> Self {
        self.segment_duration = duration;
        self
    }

    pub fn with_part_duration(mut self, duration: Duration) -> Self {
        self.part_duration = Some(duration);
        self
    }

    pub fn with_write_queue_size(mut self, size: usize) -> Self {
        self.write_queue_size = size;
        self
    }

    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    pub fn with_restart_pause(mut self, pause: Duration) -> Self {
        self.restart_pause = Some(pause);
        self
    }

    pub fn with_compression(mut self, compression: CompressionType, level: CompressionLevel) -> Self {
        self.compression = compression;
        self.compression_level = level;
        self
    }

    pub fn with_playlist(mut self, enabled: bool) -> Self {
        self.playlist = enabled;
        self
    }

    pub fn on_segment_create(mut self, callback: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.on_segment_create = Some(Arc::new(callback));
        self
    }

    pub fn on_segment_complete(
        mut self,
        callback: impl Fn(&CompletedSegment) + Send + Sync + 'static,
    ) -> Self {
        self.on_segment_complete = Some(Arc::new(callback));
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn SegmentStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    fn validate(&self) -> Result<PathFormat> {
        if self.path_name.is_empty() {
            bail!("path name cannot be empty");
        }
        if self.segment_duration.is_zero() {
            bail!("segment duration must be > 0");
        }
        if self.write_queue_size == 0 {
            bail!("write queue size must be > 0");
        }
        if let Some(part) = self.part_duration {
            if part.is_zero() || part >= self.segment_duration {
                bail!("part duration must be > 0 and shorter than the segment duration");
            }
        }
        PathFormat::parse(&self.path_format).context("invalid path format")
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("path_name", &self.path_name)
            .field("path_format", &self.path_format)
            .field("format", &self.format)
            .field("part_duration", &self.part_duration)
            .field("segment_duration", &self.segment_duration)
            .field("write_queue_size", &self.write_queue_size)
            .field("push_timeout", &self.push_timeout)
            .field("restart_pause", &self.restart_pause)
            .field("compression", &self.compression)
            .field("playlist", &self.playlist)
            .finish_non_exhaustive()
    }
}

/// Counters describing an Agent's life so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub instances_started: u64,
    pub restarts: u64,
    pub failures: u64,
    pub segments_completed: u64,
    pub units_dropped: u64,
}

#[derive(Default)]
struct AgentCounters {
    instances_started: AtomicU64,
    restarts: AtomicU64,
    failures: AtomicU64,
    segments_completed: AtomicU64,
    units_dropped: AtomicU64,
}

impl AgentCounters {
    fn snapshot(&self) -> AgentStats {
        AgentStats {
            instances_started: self.instances_started.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            segments_completed: self.segments_completed.load(Ordering::Relaxed),
            units_dropped: self.units_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Supervises recording instances of one stream until closed
pub struct Agent {
    path_name: String,
    terminate: oneshot::Sender<()>,
    supervisor: JoinHandle<()>,
    counters: Arc<AgentCounters>,
}

impl Agent {
    /// Fill defaults, start the first instance and the supervising loop
    ///
    /// Must be called within a tokio runtime.
    pub fn initialize(config: AgentConfig, source: Arc<dyn StreamSource>) -> Result<Self> {
        let path_format = config.validate()?;
        let counters = Arc::new(AgentCounters::default());

        let on_segment_create = config
            .on_segment_create
            .clone()
            .unwrap_or_else(|| Arc::new(|_: &Path| {}) as OnSegmentCreate);
        let on_segment_complete = {
            let user = config.on_segment_complete.clone();
            let counters = counters.clone();
            Arc::new(move |segment: &CompletedSegment| {
                counters.segments_completed.fetch_add(1, Ordering::Relaxed);
                if let Some(user) = &user {
                    user(segment);
                }
            }) as OnSegmentComplete
        };

        let writer = SegmentWriterSettings {
            path_name: config.path_name.clone(),
            path_format,
            muxer: MuxerOptions {
                format: config.format,
                compression: config.compression,
                compression_level: config.compression_level,
                parts: config.part_duration.is_some() && config.format.supports_parts(),
                path_name: config.path_name.clone(),
            },
            segment_duration: config.segment_duration,
            part_duration: config.part_duration,
            storage: config
                .storage
                .clone()
                .unwrap_or_else(|| Arc::new(FilesystemStorage::new()) as Arc<dyn SegmentStorage>),
            on_segment_create,
            on_segment_complete,
            playlist: config
                .playlist
                .then(|| PlaylistMaintainer::new(config.segment_duration)),
        };

        let settings = InstanceSettings {
            writer: Arc::new(writer),
            write_queue_size: config.write_queue_size,
            push_timeout: config.push_timeout,
            source,
        };
        // A zero pause counts as unset
        let restart_pause = config
            .restart_pause
            .filter(|pause| !pause.is_zero())
            .unwrap_or(DEFAULT_RESTART_PAUSE);

        let span = info_span!(target: LOG_TARGET, "record", path = %config.path_name);
        counters.instances_started.fetch_add(1, Ordering::Relaxed);
        let first = span.in_scope(|| RecordingInstance::start(&settings, None));

        let (terminate, terminate_rx) = oneshot::channel();
        let supervisor = tokio::spawn(
            supervise(settings, restart_pause, first, terminate_rx, counters.clone()).instrument(span),
        );

        Ok(Self {
            path_name: config.path_name,
            terminate,
            supervisor,
            counters,
        })
    }

    pub fn path_name(&self) -> &str {
        &self.path_name
    }

    pub fn stats(&self) -> AgentStats {
        self.counters.snapshot()
    }

    /// Stop recording and wait until the current instance is fully closed
    pub async fn close(self) {
        info!(target: LOG_TARGET, path = %self.path_name, "recording stopped");
        let _ = self.terminate.send(());
        if let Err(e) = self.supervisor.await {
            warn!(
                target: LOG_TARGET,
                "Supervisor of '{}' exited abnormally: {}", self.path_name, e
            );
        }
    }
}

enum SupervisorEvent {
    InstanceDone,
    Terminate,
}

/// The only place the current instance is replaced
async fn supervise(
    settings: InstanceSettings,
    restart_pause: Duration,
    mut current: RecordingInstance,
    mut terminate: oneshot::Receiver<()>,
    counters: Arc<AgentCounters>,
) {
    loop {
        // A dropped Agent counts as a stop request too
        let event = tokio::select! {
            _ = current.wait_done() => SupervisorEvent::InstanceDone,
            _ = &mut terminate => SupervisorEvent::Terminate,
        };

        let outcome = current.close().await;
        counters
            .units_dropped
            .fetch_add(outcome.units_dropped, Ordering::Relaxed);
        if outcome.is_failed() {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }

        if let SupervisorEvent::Terminate = event {
            return;
        }

        match &outcome.end {
            InstanceEnd::Failed(reason) => warn!(
                target: LOG_TARGET,
                "Recording failed ({}), restarting in {:?}", reason, restart_pause
            ),
            _ => info!(
                target: LOG_TARGET,
                "Recording ended, restarting in {:?}", restart_pause
            ),
        }

        tokio::select! {
            _ = tokio::time::sleep(restart_pause) => {}
            _ = &mut terminate => return,
        }

        counters.restarts.fetch_add(1, Ordering::Relaxed);
        counters.instances_started.fetch_add(1, Ordering::Relaxed);
        current = RecordingInstance::start(&settings, outcome.last_sample);
    }
}
