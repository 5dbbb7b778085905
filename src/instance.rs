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

// One recording attempt: stream subscription -> write queue -> segment writer
//
// Three tasks cooperate:
// - reader (async): subscribes, pulls units and pushes them into the queue
// - writer (blocking thread): pops units and does all disk I/O
// - monitor (async): waits for the writer and raises `done` exactly once

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::SegmentError;
use crate::protocol::StreamUnit;
use crate::segment::{SegmentWriter, SegmentWriterSettings};
use crate::source::StreamSource;
use crate::write_queue::WriteQueue;
use crate::LOG_TARGET;

/// Everything an instance needs, frozen by the supervisor
#[derive(Clone)]
pub struct InstanceSettings {
    pub writer: Arc<SegmentWriterSettings>,
    pub write_queue_size: usize,
    pub push_timeout: Duration,
    pub source: Arc<dyn StreamSource>,
}

impl fmt::Debug for InstanceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceSettings")
            .field("writer", &self.writer)
            .field("write_queue_size", &self.write_queue_size)
            .field("push_timeout", &self.push_timeout)
            .field("source", &self.source.describe())
            .finish()
    }
}

/// Why an instance ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceEnd {
    /// The upstream stream closed
    StreamEnded,
    /// Subscribing or writing failed
    Failed(String),
    /// `close()` was requested
    Stopped,
}

/// Final report of an instance
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceOutcome {
    pub end: InstanceEnd,
    /// Wall-clock time of the last unit written to disk
    pub last_sample: Option<DateTime<Utc>>,
    pub segments_completed: u64,
    pub units_written: u64,
    pub units_dropped: u64,
}

impl InstanceOutcome {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            end: InstanceEnd::Failed(reason.into()),
            last_sample: None,
            segments_completed: 0,
            units_written: 0,
            units_dropped: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.end, InstanceEnd::Failed(_))
    }
}

enum ReaderExit {
    EndOfStream,
    Stopped,
    SubscribeFailed(String),
}

struct WriterReport {
    error: Option<SegmentError>,
    last_sample: Option<DateTime<Utc>>,
    segments_completed: u64,
    units_written: u64,
}

/// Handle to a running recording attempt
pub struct RecordingInstance {
    id: Uuid,
    queue: Arc<WriteQueue<StreamUnit>>,
    terminate: Option<oneshot::Sender<()>>,
    done: watch::Receiver<Option<InstanceOutcome>>,
    reader: JoinHandle<()>,
    monitor: JoinHandle<()>,
}

impl RecordingInstance {
    /// Start recording; returns as soon as the background tasks are spawned
    ///
    /// Segment start times are kept strictly after `after`, the last sample
    /// written by the previous instance. Must be called within a tokio runtime.
    pub fn start(settings: &InstanceSettings, after: Option<DateTime<Utc>>) -> Self {
        let id = Uuid::new_v4();
        let span = info_span!(target: LOG_TARGET, "instance", id = %id);

        let now = Utc::now();
        let wall_origin = match after {
            Some(last) => now.max(last + chrono::Duration::microseconds(1)),
            None => now,
        };

        let queue = Arc::new(WriteQueue::new(
            settings.write_queue_size,
            settings.push_timeout,
        ));
        let (terminate_tx, terminate_rx) = oneshot::channel();
        let (done_tx, done_rx) = watch::channel(None);
        let (exit_tx, exit_rx) = oneshot::channel();

        span.in_scope(|| {
            info!(
                target: LOG_TARGET,
                "Starting recording instance from {}",
                settings.source.describe()
            )
        });

        let reader = tokio::spawn(
            read_stream(settings.source.clone(), queue.clone(), terminate_rx, exit_tx)
                .instrument(span.clone()),
        );

        let writer = {
            let handle = Handle::current();
            let queue = queue.clone();
            let segment_writer = SegmentWriter::new(settings.writer.clone(), wall_origin);
            let span = span.clone();
            tokio::task::spawn_blocking(move || {
                let _entered = span.enter();
                write_segments(handle, queue, segment_writer)
            })
        };

        let monitor = tokio::spawn(
            monitor(writer, exit_rx, queue.clone(), done_tx).instrument(span),
        );

        Self {
            id,
            queue,
            terminate: Some(terminate_tx),
            done: done_rx,
            reader,
            monitor,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Outcome, once `done` has been raised
    pub fn outcome(&self) -> Option<InstanceOutcome> {
        self.done.borrow().clone()
    }

    /// Wait until the instance has ended on its own or been closed
    pub async fn wait_done(&mut self) -> InstanceOutcome {
        match self.done.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => outcome
                .clone()
                .unwrap_or_else(|| InstanceOutcome::failed("instance ended without outcome")),
            Err(_) => InstanceOutcome::failed("instance monitor exited"),
        }
    }

    /// Stop accepting units, finalize the open segment and release everything
    pub async fn close(mut self) -> InstanceOutcome {
        if let Some(terminate) = self.terminate.take() {
            let _ = terminate.send(());
        }
        self.queue.close();

        if let Err(e) = (&mut self.reader).await {
            warn!(target: LOG_TARGET, "Reader task of instance {} aborted: {}", self.id, e);
        }
        if let Err(e) = (&mut self.monitor).await {
            warn!(target: LOG_TARGET, "Monitor task of instance {} aborted: {}", self.id, e);
        }

        self.outcome()
            .unwrap_or_else(|| InstanceOutcome::failed("instance ended without outcome"))
    }
}

async fn read_stream(
    source: Arc<dyn StreamSource>,
    queue: Arc<WriteQueue<StreamUnit>>,
    mut terminate: oneshot::Receiver<()>,
    exit: oneshot::Sender<ReaderExit>,
) {
    let reason = pump_units(source.as_ref(), &queue, &mut terminate).await;
    queue.close();
    let _ = exit.send(reason);
}

async fn pump_units(
    source: &dyn StreamSource,
    queue: &WriteQueue<StreamUnit>,
    terminate: &mut oneshot::Receiver<()>,
) -> ReaderExit {
    let mut subscription = tokio::select! {
        biased;
        _ = &mut *terminate => return ReaderExit::Stopped,
        result = source.subscribe() => match result {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(target: LOG_TARGET, "Failed to subscribe to {}: {:#}", source.describe(), e);
                return ReaderExit::SubscribeFailed(format!("{:#}", e));
            }
        },
    };

    loop {
        let unit = tokio::select! {
            biased;
            _ = &mut *terminate => return ReaderExit::Stopped,
            unit = subscription.recv() => unit,
        };

        let Some(unit) = unit else {
            info!(target: LOG_TARGET, "Stream {} ended", source.describe());
            return ReaderExit::EndOfStream;
        };

        // Closed means the writer is gone or we are shutting down
        if queue.push(unit).await.is_err() {
            return ReaderExit::Stopped;
        }
    }
}

fn write_segments(
    handle: Handle,
    queue: Arc<WriteQueue<StreamUnit>>,
    mut writer: SegmentWriter,
) -> WriterReport {
    let error = loop {
        match handle.block_on(queue.pop()) {
            Some(unit) => {
                if let Err(e) = writer.write(&unit) {
                    queue.close();
                    break Some(e);
                }
            }
            None => break writer.close().err(),
        }
    };

    WriterReport {
        error,
        last_sample: writer.last_sample(),
        segments_completed: writer.segments_completed(),
        units_written: writer.units_written(),
    }
}

async fn monitor(
    writer: JoinHandle<WriterReport>,
    reader_exit: oneshot::Receiver<ReaderExit>,
    queue: Arc<WriteQueue<StreamUnit>>,
    done: watch::Sender<Option<InstanceOutcome>>,
) {
    let report = match writer.await {
        Ok(report) => report,
        Err(e) => {
            queue.close();
            WriterReport {
                error: Some(SegmentError::Io(std::io::Error::other(format!(
                    "writer task aborted: {}",
                    e
                )))),
                last_sample: None,
                segments_completed: 0,
                units_written: 0,
            }
        }
    };

    let end = match report.error {
        Some(e) => InstanceEnd::Failed(e.to_string()),
        None => match reader_exit.await {
            Ok(ReaderExit::EndOfStream) => InstanceEnd::StreamEnded,
            Ok(ReaderExit::SubscribeFailed(reason)) => InstanceEnd::Failed(reason),
            Ok(ReaderExit::Stopped) | Err(_) => InstanceEnd::Stopped,
        },
    };

    let outcome = InstanceOutcome {
        end,
        last_sample: report.last_sample,
        segments_completed: report.segments_completed,
        units_written: report.units_written,
        units_dropped: queue.stats().dropped,
    };

    match &outcome.end {
        InstanceEnd::Failed(reason) => error!(
            target: LOG_TARGET,
            "Recording instance failed after {} segments: {}", outcome.segments_completed, reason
        ),
        end => info!(
            target: LOG_TARGET,
            "Recording instance finished ({:?}, {} segments, {} units)",
            end,
            outcome.segments_completed,
            outcome.units_written
        ),
    }

    done.send_replace(Some(outcome));
}
