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

// Segment writer and rotation state machine
//
//   Idle -> Open -> Closing -> Complete -> (Open ...)
//            \________________\-> Failed
//
// Durations are measured on unit timestamps, from the first unit written
// into a segment (or part), never from when rotation was requested.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::SegmentError;
use crate::mux::{create_muxer, MuxerOptions, SegmentMuxer};
use crate::path_format::PathFormat;
use crate::playlist::PlaylistMaintainer;
use crate::protocol::StreamUnit;
use crate::storage::SegmentStorage;
use crate::LOG_TARGET;

/// Invoked right after a segment file has been opened
pub type OnSegmentCreate = Arc<dyn Fn(&Path) + Send + Sync>;

/// Invoked right after a segment has been finalized
pub type OnSegmentComplete = Arc<dyn Fn(&CompletedSegment) + Send + Sync>;

/// A finalized segment
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSegment {
    pub path: PathBuf,
    /// Wall-clock time of the segment's first unit
    pub start: DateTime<Utc>,
    pub duration: Duration,
    pub units: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Idle,
    Open,
    Closing,
    Complete,
    Failed,
}

/// Settings frozen when a recording instance is created
#[derive(Clone)]
pub struct SegmentWriterSettings {
    pub path_name: String,
    pub path_format: PathFormat,
    pub muxer: MuxerOptions,
    pub segment_duration: Duration,
    /// Part interval; ignored by formats without parts
    pub part_duration: Option<Duration>,
    pub storage: Arc<dyn SegmentStorage>,
    pub on_segment_create: OnSegmentCreate,
    pub on_segment_complete: OnSegmentComplete,
    pub playlist: Option<PlaylistMaintainer>,
}

impl fmt::Debug for SegmentWriterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentWriterSettings")
            .field("path_name", &self.path_name)
            .field("path_format", &self.path_format)
            .field("muxer", &self.muxer)
            .field("segment_duration", &self.segment_duration)
            .field("part_duration", &self.part_duration)
            .field("storage", &self.storage.backend_type())
            .field("playlist", &self.playlist.is_some())
            .finish()
    }
}

struct OpenSegment {
    path: PathBuf,
    muxer: Box<dyn SegmentMuxer>,
    start: DateTime<Utc>,
    start_pts: Duration,
    part_start_pts: Duration,
    last_pts: Duration,
    units: u64,
}

/// Writes units into a sequence of segment files
///
/// Owned by one recording instance and driven from its blocking writer
/// thread, so none of this needs to be `Sync`.
pub struct SegmentWriter {
    settings: Arc<SegmentWriterSettings>,
    state: SegmentState,
    current: Option<OpenSegment>,

    // Wall-clock anchor: the first unit of the instance maps to `wall_origin`
    wall_origin: DateTime<Utc>,
    first_pts: Option<Duration>,

    last_sample: Option<DateTime<Utc>>,
    segments_completed: u64,
    units_written: u64,
}

impl SegmentWriter {
    pub fn new(settings: Arc<SegmentWriterSettings>, wall_origin: DateTime<Utc>) -> Self {
        Self {
            settings,
            state: SegmentState::Idle,
            current: None,
            wall_origin,
            first_pts: None,
            last_sample: None,
            segments_completed: 0,
            units_written: 0,
        }
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    /// Path of the open segment, if any
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|s| s.path.as_path())
    }

    /// Wall-clock time of the last unit written
    pub fn last_sample(&self) -> Option<DateTime<Utc>> {
        self.last_sample
    }

    pub fn segments_completed(&self) -> u64 {
        self.segments_completed
    }

    pub fn units_written(&self) -> u64 {
        self.units_written
    }

    /// Write one unit, rotating segments and parts as needed
    ///
    /// Any error leaves the writer Failed with the file handle released.
    pub fn write(&mut self, unit: &StreamUnit) -> Result<(), SegmentError> {
        if self.state == SegmentState::Failed {
            return Err(SegmentError::WriterFailed);
        }

        let wall = self.wall_time(unit.pts);

        let rotate = self.current.as_ref().is_some_and(|segment| {
            unit.pts.saturating_sub(segment.start_pts) >= self.settings.segment_duration
                && unit.is_random_access()
        });
        if rotate {
            self.complete_current(Some(unit.pts))?;
        }

        if self.current.is_none() {
            let result = self.open_segment(unit.pts, wall);
            self.check(result)?;
        }

        let result = self.write_to_current(unit, wall);
        self.check(result)?;

        self.units_written += 1;
        self.last_sample = Some(wall);
        Ok(())
    }

    /// Finalize the open segment, if there is one
    pub fn close(&mut self) -> Result<Option<CompletedSegment>, SegmentError> {
        if self.current.is_none() {
            return Ok(None);
        }
        self.complete_current(None).map(Some)
    }

    fn wall_time(&mut self, pts: Duration) -> DateTime<Utc> {
        let first = *self.first_pts.get_or_insert(pts);
        let offset = chrono::Duration::from_std(pts.saturating_sub(first))
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + offset
    }

    fn open_segment(&mut self, pts: Duration, start: DateTime<Utc>) -> Result<(), SegmentError> {
        let settings = &self.settings;
        let path = settings
            .path_format
            .render(&settings.path_name, start, settings.muxer.format)?;

        info!(target: LOG_TARGET, "Creating segment {}", path.display());

        let file = settings
            .storage
            .create_segment(&path)
            .map_err(|source| SegmentError::Create {
                path: path.clone(),
                source,
            })?;
        let muxer = create_muxer(file, &settings.muxer, start)?;

        self.current = Some(OpenSegment {
            path,
            muxer,
            start,
            start_pts: pts,
            part_start_pts: pts,
            last_pts: pts,
            units: 0,
        });
        self.state = SegmentState::Open;

        if let Some(segment) = &self.current {
            (self.settings.on_segment_create)(&segment.path);
        }
        Ok(())
    }

    fn write_to_current(&mut self, unit: &StreamUnit, wall: DateTime<Utc>) -> Result<(), SegmentError> {
        let part_duration = self.settings.part_duration;
        let Some(segment) = self.current.as_mut() else {
            return Err(SegmentError::WriterFailed);
        };

        if let Some(part_duration) = part_duration {
            if segment.muxer.supports_parts()
                && unit.pts.saturating_sub(segment.part_start_pts) >= part_duration
            {
                segment.muxer.flush_part()?;
                debug!(
                    target: LOG_TARGET,
                    "Flushed part of {} at {:?}",
                    segment.path.display(),
                    unit.pts
                );
                segment.part_start_pts = unit.pts;
            }
        }

        let log_time_ns = wall.timestamp_nanos_opt().unwrap_or_default().max(0) as u64;
        segment.muxer.write_unit(unit, log_time_ns)?;
        segment.last_pts = unit.pts;
        segment.units += 1;
        Ok(())
    }

    /// Open -> Closing -> Complete, or Failed if the file cannot be finalized
    fn complete_current(&mut self, end_pts: Option<Duration>) -> Result<CompletedSegment, SegmentError> {
        let Some(segment) = self.current.take() else {
            return Err(SegmentError::WriterFailed);
        };
        self.state = SegmentState::Closing;

        let end = end_pts.unwrap_or(segment.last_pts);
        let bytes = match segment.muxer.finish() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.state = SegmentState::Failed;
                error!(
                    target: LOG_TARGET,
                    "Failed to finalize segment {}: {}",
                    segment.path.display(),
                    e
                );
                return Err(e);
            }
        };

        let completed = CompletedSegment {
            path: segment.path,
            start: segment.start,
            duration: end.saturating_sub(segment.start_pts),
            units: segment.units,
            bytes,
        };
        self.state = SegmentState::Complete;
        self.segments_completed += 1;

        info!(
            target: LOG_TARGET,
            "Segment complete {} ({:?}, {} units, {} bytes)",
            completed.path.display(),
            completed.duration,
            completed.units,
            completed.bytes
        );

        (self.settings.on_segment_complete)(&completed);
        if let Some(playlist) = &self.settings.playlist {
            playlist.append(&completed.path);
        }

        Ok(completed)
    }

    /// Move to Failed on error, releasing the open file without finalizing it
    fn check<T>(&mut self, result: Result<T, SegmentError>) -> Result<T, SegmentError> {
        if let Err(e) = &result {
            self.state = SegmentState::Failed;
            match self.current.take() {
                Some(segment) => {
                    error!(
                        target: LOG_TARGET,
                        "Segment {} failed: {}",
                        segment.path.display(),
                        e
                    );
                    segment.muxer.abort();
                }
                None => error!(target: LOG_TARGET, "Cannot open segment: {}", e),
            }
        }
        result
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if let Some(segment) = self.current.take() {
            debug!(
                target: LOG_TARGET,
                "Segment writer dropped with {} open",
                segment.path.display()
            );
            segment.muxer.abort();
        }
    }
}
