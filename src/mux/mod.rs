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

// Container formats for segment files
//
// Each open segment owns one muxer. The segment writer decides when parts
// and segments end; the muxer only knows how to lay units out on disk.

pub mod framed;
pub mod mcap;

pub use self::framed::{FrameRecord, FramedHeader, FramedMuxer};
pub use self::mcap::McapMuxer;

use chrono::{DateTime, Utc};
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::SegmentError;
use crate::protocol::{CompressionLevel, CompressionType, RecordFormat, StreamUnit};
use crate::storage::SegmentFile;

/// Serializes stream units into one segment file
pub trait SegmentMuxer: Send {
    /// Append one unit; `log_time_ns` is its wall-clock time in ns since the epoch
    fn write_unit(&mut self, unit: &StreamUnit, log_time_ns: u64) -> Result<(), SegmentError>;

    /// Whether `flush_part` produces a real sub-segment boundary
    fn supports_parts(&self) -> bool {
        false
    }

    /// Make everything written so far readable without closing the file
    fn flush_part(&mut self) -> Result<(), SegmentError> {
        Ok(())
    }

    /// Finalize the file; returns its size in bytes
    fn finish(self: Box<Self>) -> Result<u64, SegmentError>;

    /// Release the file after a failure without finalizing it
    fn abort(self: Box<Self>) {}
}

/// Format settings shared by every segment of a recording
#[derive(Debug, Clone)]
pub struct MuxerOptions {
    pub format: RecordFormat,
    pub compression: CompressionType,
    pub compression_level: CompressionLevel,
    /// Parts are requested; only formats supporting them act on it
    pub parts: bool,
    pub path_name: String,
}

/// Create the muxer for a freshly created segment file
pub fn create_muxer(
    file: Box<dyn SegmentFile>,
    options: &MuxerOptions,
    segment_start: DateTime<Utc>,
) -> Result<Box<dyn SegmentMuxer>, SegmentError> {
    let file = CountingFile::new(file);
    match options.format {
        RecordFormat::Mcap => Ok(Box::new(McapMuxer::new(file, options)?)),
        RecordFormat::Framed => Ok(Box::new(FramedMuxer::new(file, options, segment_start)?)),
    }
}

/// File wrapper that remembers how far the file extends
///
/// Muxers hand the file to encoders that consume it, so the size is kept
/// in a shared counter that outlives them.
pub struct CountingFile {
    inner: Box<dyn SegmentFile>,
    position: u64,
    size: Arc<AtomicU64>,
    discard: Arc<AtomicBool>,
}

impl CountingFile {
    pub fn new(inner: Box<dyn SegmentFile>) -> Self {
        Self {
            inner,
            position: 0,
            size: Arc::new(AtomicU64::new(0)),
            discard: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn size_handle(&self) -> Arc<AtomicU64> {
        self.size.clone()
    }

    /// Once set, writes and seeks are accepted and ignored
    pub fn discard_handle(&self) -> Arc<AtomicBool> {
        self.discard.clone()
    }

    fn discarding(&self) -> bool {
        self.discard.load(Ordering::Relaxed)
    }
}

impl Write for CountingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.discarding() {
            return Ok(buf.len());
        }
        let written = self.inner.write(buf)?;
        self.position += written as u64;
        self.size.fetch_max(self.position, Ordering::Relaxed);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.discarding() {
            return Ok(());
        }
        self.inner.flush()
    }
}

impl Seek for CountingFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.discarding() {
            return Ok(self.position);
        }
        self.position = self.inner.seek(pos)?;
        Ok(self.position)
    }
}
