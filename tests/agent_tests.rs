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

// Supervisor behaviour against scripted stream sources

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use stream_recorder::config::RecordSettings;
use stream_recorder::playlist::{parse_playlist, PLAYLIST_HEADER};
use stream_recorder::storage::{FilesystemStorage, SegmentFile, SegmentStorage};
use stream_recorder::{
    Agent, AgentConfig, CompletedSegment, RecordFormat, RecorderManager, StreamSource,
    StreamSubscription, StreamUnit,
};
use tempfile::TempDir;

enum Ending {
    /// The subscription reports end of stream
    End,
    /// The subscription stays open without producing anything
    Hang,
}

struct Attempt {
    units: Vec<StreamUnit>,
    ending: Ending,
}

fn data_units(count: u64, step_ms: u64) -> Vec<StreamUnit> {
    (0..count)
        .map(|i| {
            StreamUnit::data(
                "telemetry",
                Duration::from_millis(i * step_ms),
                Bytes::from_static(b"sample"),
            )
        })
        .collect()
}

/// Plays one scripted attempt per subscription; later subscriptions hang
#[derive(Default)]
struct ScriptedSource {
    attempts: Mutex<VecDeque<Attempt>>,
    subscriptions: AtomicUsize,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(attempts: Vec<Attempt>) -> Arc<Self> {
        Arc::new(Self {
            attempts: Mutex::new(attempts.into()),
            ..Default::default()
        })
    }

    fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamSource for ScriptedSource {
    async fn subscribe(&self) -> Result<Box<dyn StreamSubscription>> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let attempt = self.attempts.lock().unwrap().pop_front().unwrap_or(Attempt {
            units: Vec::new(),
            ending: Ending::Hang,
        });

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        Ok(Box::new(ScriptedSubscription {
            units: attempt.units.into(),
            ending: attempt.ending,
            active: self.active.clone(),
        }))
    }

    fn describe(&self) -> String {
        "scripted source".to_string()
    }
}

struct ScriptedSubscription {
    units: VecDeque<StreamUnit>,
    ending: Ending,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl StreamSubscription for ScriptedSubscription {
    async fn recv(&mut self) -> Option<StreamUnit> {
        if let Some(unit) = self.units.pop_front() {
            return Some(unit);
        }
        match self.ending {
            Ending::End => None,
            Ending::Hang => std::future::pending().await,
        }
    }
}

impl Drop for ScriptedSubscription {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// First segment file fails once `limit` bytes were written; later ones work
struct FailFirstStorage {
    limit: usize,
    failed: AtomicBool,
}

struct LimitedFile {
    inner: Box<dyn SegmentFile>,
    remaining: usize,
}

impl Write for LimitedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() > self.remaining {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write error"));
        }
        self.remaining -= buf.len();
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for LimitedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl SegmentStorage for FailFirstStorage {
    fn create_segment(&self, path: &Path) -> io::Result<Box<dyn SegmentFile>> {
        let inner = FilesystemStorage::new().create_segment(path)?;
        if self.failed.swap(true, Ordering::SeqCst) {
            return Ok(inner);
        }
        Ok(Box::new(LimitedFile {
            inner,
            remaining: self.limit,
        }))
    }

    fn backend_type(&self) -> &str {
        "fail-first"
    }
}

struct Recorded {
    created: Arc<Mutex<Vec<PathBuf>>>,
    completed: Arc<Mutex<Vec<CompletedSegment>>>,
}

impl Recorded {
    fn created(&self) -> Vec<PathBuf> {
        self.created.lock().unwrap().clone()
    }

    fn completed(&self) -> Vec<CompletedSegment> {
        self.completed.lock().unwrap().clone()
    }
}

fn config(dir: &TempDir, segment: Duration, restart_pause: Duration) -> (AgentConfig, Recorded) {
    let recorded = Recorded {
        created: Arc::new(Mutex::new(Vec::new())),
        completed: Arc::new(Mutex::new(Vec::new())),
    };
    let created = recorded.created.clone();
    let completed = recorded.completed.clone();

    let config = AgentConfig::new("cam1")
        .with_path_format(format!(
            "{}/%path/%Y-%m-%d_%H-%M-%S-%6f",
            dir.path().display()
        ))
        .with_segment_duration(segment)
        .with_restart_pause(restart_pause)
        .on_segment_create(move |path| created.lock().unwrap().push(path.to_path_buf()))
        .on_segment_complete(move |segment| completed.lock().unwrap().push(segment.clone()));

    (config, recorded)
}

async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_continuous_stream_yields_three_segments() {
    let dir = TempDir::new().unwrap();
    let (config, recorded) = config(&dir, Duration::from_secs(10), Duration::from_secs(30));
    let source = ScriptedSource::new(vec![Attempt {
        units: data_units(250, 100),
        ending: Ending::End,
    }]);

    let agent = Agent::initialize(config, source.clone()).unwrap();
    assert!(wait_until(Duration::from_secs(5), || recorded.completed().len() == 3).await);
    agent.close().await;

    let completed = recorded.completed();
    assert_eq!(completed.len(), 3);
    assert_eq!(completed[0].duration, Duration::from_secs(10));
    assert_eq!(completed[1].duration, Duration::from_secs(10));
    assert_eq!(completed[2].duration, Duration::from_millis(4900));
    assert!(completed.windows(2).all(|w| w[0].path < w[1].path));
    assert_eq!(source.subscriptions(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ended_stream_is_restarted_after_pause() {
    let dir = TempDir::new().unwrap();
    let (config, _recorded) = config(&dir, Duration::from_secs(10), Duration::from_millis(100));
    let source = ScriptedSource::new(vec![
        Attempt { units: data_units(5, 100), ending: Ending::End },
        Attempt { units: data_units(5, 100), ending: Ending::End },
    ]);

    let started = Instant::now();
    let agent = Agent::initialize(config, source.clone()).unwrap();
    assert!(wait_until(Duration::from_secs(5), || source.subscriptions() >= 3).await);

    // Two pauses must have elapsed before the third subscription, and not much more
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(700), "third subscription after {:?}", elapsed);

    let stats = agent.stats();
    assert!(stats.restarts >= 2);
    assert_eq!(stats.instances_started, stats.restarts + 1);
    assert_eq!(stats.failures, 0);

    agent.close().await;
    assert_eq!(source.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_error_restarts_with_fresh_segment() {
    let dir = TempDir::new().unwrap();
    let (config, recorded) = config(&dir, Duration::from_secs(10), Duration::from_millis(100));
    let config = config.with_format(RecordFormat::Framed).with_storage(Arc::new(FailFirstStorage {
        limit: 1024,
        failed: AtomicBool::new(false),
    }));
    let source = ScriptedSource::new(vec![
        Attempt { units: data_units(200, 10), ending: Ending::Hang },
        Attempt { units: data_units(20, 10), ending: Ending::Hang },
    ]);

    let agent = Agent::initialize(config, source.clone()).unwrap();
    assert!(wait_until(Duration::from_secs(5), || recorded.created().len() >= 2).await);

    let stats = agent.stats();
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.restarts, 1);

    // Let the second instance queue all of its units
    tokio::time::sleep(Duration::from_millis(100)).await;
    agent.close().await;

    let created = recorded.created();
    assert_eq!(created.len(), 2);
    assert!(created[1] > created[0]);

    // Only the second segment was finalized
    let completed = recorded.completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].path, created[1]);
    assert_eq!(completed[0].units, 20);
    assert_eq!(source.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_during_pause_prevents_restart() {
    let dir = TempDir::new().unwrap();
    let (config, recorded) = config(&dir, Duration::from_secs(10), Duration::from_secs(30));
    let source = ScriptedSource::new(vec![Attempt {
        units: data_units(10, 100),
        ending: Ending::End,
    }]);

    let agent = Agent::initialize(config, source.clone()).unwrap();
    assert!(wait_until(Duration::from_secs(5), || recorded.completed().len() == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let closed = tokio::time::timeout(Duration::from_secs(2), agent.close()).await;
    assert!(closed.is_ok(), "close() waited for the restart pause");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(recorded.created().len(), 1);
    assert_eq!(source.subscriptions(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_finalizes_open_segment() {
    let dir = TempDir::new().unwrap();
    let (config, recorded) = config(&dir, Duration::from_secs(10), Duration::from_millis(100));
    let source = ScriptedSource::new(vec![Attempt {
        units: data_units(30, 100),
        ending: Ending::Hang,
    }]);

    let agent = Agent::initialize(config, source.clone()).unwrap();
    assert!(wait_until(Duration::from_secs(5), || recorded.created().len() == 1).await);
    // Let the writer drain the queue
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(recorded.completed().is_empty());

    agent.close().await;

    // close() returns only after the instance has fully closed
    let completed = recorded.completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].units, 30);
    assert_eq!(source.active.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_playlist_keeps_existing_entries() {
    let dir = TempDir::new().unwrap();
    let stream_dir = dir.path().join("cam1");
    std::fs::create_dir_all(&stream_dir).unwrap();
    let playlist = stream_dir.join("cam1.m3u8");
    let existing = format!("{}#EXTINF:10s,\nearlier.mcap\n", PLAYLIST_HEADER);
    std::fs::write(&playlist, &existing).unwrap();

    let (config, recorded) = config(&dir, Duration::from_secs(10), Duration::from_secs(30));
    let source = ScriptedSource::new(vec![Attempt {
        units: data_units(20, 100),
        ending: Ending::End,
    }]);

    let agent = Agent::initialize(config, source).unwrap();
    assert!(wait_until(Duration::from_secs(5), || recorded.completed().len() == 1).await);
    agent.close().await;

    let content = std::fs::read_to_string(&playlist).unwrap();
    assert!(content.starts_with(&existing));

    let entries = parse_playlist(&content).unwrap();
    assert_eq!(entries.len(), 2);
    let segment = &recorded.completed()[0];
    assert_eq!(
        entries[1].file_name,
        segment.path.file_name().unwrap().to_string_lossy()
    );
}

/// Every subscription attempt fails
struct FlakySource {
    calls: AtomicUsize,
}

#[async_trait]
impl StreamSource for FlakySource {
    async fn subscribe(&self) -> Result<Box<dyn StreamSubscription>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("publisher not ready")
    }

    fn describe(&self) -> String {
        "flaky source".to_string()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscribe_failure_is_retried() {
    let dir = TempDir::new().unwrap();
    let (config, recorded) = config(&dir, Duration::from_secs(10), Duration::from_millis(50));
    let source = Arc::new(FlakySource {
        calls: AtomicUsize::new(0),
    });

    let agent = Agent::initialize(config, source.clone()).unwrap();
    assert!(wait_until(Duration::from_secs(5), || source.calls.load(Ordering::SeqCst) >= 3).await);

    let stats = agent.stats();
    assert!(stats.failures >= 2);
    agent.close().await;
    assert!(recorded.created().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zero_restart_pause_falls_back_to_default() {
    let dir = TempDir::new().unwrap();
    let settings = RecordSettings {
        path_format: format!("{}/%path/%Y-%m-%d_%H-%M-%S-%6f", dir.path().display()),
        restart_pause_ms: 0,
        ..Default::default()
    };
    let config = AgentConfig::from_settings("cam1", &settings).unwrap();
    let source = Arc::new(FlakySource {
        calls: AtomicUsize::new(0),
    });

    let agent = Agent::initialize(config, source.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Still inside the default 2s pause after the first failure
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    let stats = agent.stats();
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.restarts, 0);
    agent.close().await;

    let config = AgentConfig::new("cam1")
        .with_path_format(format!("{}/%path/%Y", dir.path().display()))
        .with_restart_pause(Duration::ZERO);
    let source = Arc::new(FlakySource {
        calls: AtomicUsize::new(0),
    });
    let agent = Agent::initialize(config, source.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    agent.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_config_is_rejected() {
    let source = ScriptedSource::new(Vec::new());

    let missing_path = AgentConfig::new("cam1").with_path_format("./recordings/%Y");
    assert!(Agent::initialize(missing_path, source.clone()).is_err());

    let zero_segment = AgentConfig::new("cam1").with_segment_duration(Duration::ZERO);
    assert!(Agent::initialize(zero_segment, source.clone()).is_err());

    assert_eq!(source.subscriptions(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_manager_runs_one_agent_per_stream() {
    let dir = TempDir::new().unwrap();
    let (config, _recorded) = config(&dir, Duration::from_secs(10), Duration::from_secs(30));
    let manager = RecorderManager::new(Default::default());

    manager
        .start_with_config(config.clone(), ScriptedSource::new(Vec::new()))
        .unwrap();
    assert!(manager
        .start_with_config(config, ScriptedSource::new(Vec::new()))
        .is_err());
    assert_eq!(manager.active_streams(), vec!["cam1".to_string()]);
    assert_eq!(manager.stats("cam1").unwrap().instances_started, 1);

    assert!(manager.stop_stream("cam1").await);
    assert!(!manager.stop_stream("cam1").await);
    manager.shutdown().await.unwrap();
    assert!(manager.active_streams().is_empty());
}
