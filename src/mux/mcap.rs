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

use ::mcap::records::MessageHeader;
use ::mcap::{Compression, WriteOptions, Writer};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::{CountingFile, MuxerOptions, SegmentMuxer};
use crate::error::SegmentError;
use crate::protocol::{CompressionType, StreamUnit};
use crate::LOG_TARGET;

/// MCAP segment muxer
///
/// Every track becomes an MCAP channel, registered the first time one of its
/// units shows up. Units are written as schemaless messages whose log time is
/// the unit's wall-clock time.
///
/// # Parts
///
/// When parts are requested, automatic size-based chunking is turned off and
/// every part boundary closes the current chunk, so a streaming reader can
/// consume the file up to the last finished part while it is still growing.
pub struct McapMuxer {
    writer: Writer<CountingFile>,
    channels: HashMap<String, u16>,
    sequence: u32,
    parts: bool,
    size: Arc<AtomicU64>,
    discard: Arc<AtomicBool>,
}

impl McapMuxer {
    pub fn new(file: CountingFile, options: &MuxerOptions) -> Result<Self, SegmentError> {
        let size = file.size_handle();
        let discard = file.discard_handle();

        let compression = match options.compression {
            CompressionType::None => None,
            CompressionType::Lz4 => Some(Compression::Lz4),
            CompressionType::Zstd => Some(Compression::Zstd),
        };

        let mut write_options = WriteOptions::new()
            .compression(compression)
            .profile("stream-recorder");
        if options.parts {
            write_options = write_options.chunk_size(None);
        }

        let writer = write_options.create(file)?;

        Ok(Self {
            writer,
            channels: HashMap::new(),
            sequence: 0,
            parts: options.parts,
            size,
            discard,
        })
    }

    fn channel_for(&mut self, unit: &StreamUnit) -> Result<u16, SegmentError> {
        if let Some(id) = self.channels.get(&unit.track) {
            return Ok(*id);
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("kind".to_string(), unit.kind.as_str().to_string());

        let id = self.writer.add_channel(0, &unit.track, "raw", &metadata)?;
        debug!(
            target: LOG_TARGET,
            "Registered MCAP channel {} for track '{}'", id, unit.track
        );
        self.channels.insert(unit.track.clone(), id);
        Ok(id)
    }
}

impl SegmentMuxer for McapMuxer {
    fn write_unit(&mut self, unit: &StreamUnit, log_time_ns: u64) -> Result<(), SegmentError> {
        let channel_id = self.channel_for(unit)?;
        self.sequence = self.sequence.wrapping_add(1);

        let header = MessageHeader {
            channel_id,
            sequence: self.sequence,
            log_time: log_time_ns,
            publish_time: log_time_ns,
        };
        self.writer.write_to_known_channel(&header, &unit.payload)?;
        Ok(())
    }

    fn supports_parts(&self) -> bool {
        self.parts
    }

    fn flush_part(&mut self) -> Result<(), SegmentError> {
        if self.parts {
            self.writer.flush()?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64, SegmentError> {
        if let Err(e) = self.writer.finish() {
            self.discard.store(true, Ordering::Relaxed);
            return Err(e.into());
        }
        Ok(self.size.load(Ordering::Relaxed))
    }

    fn abort(self: Box<Self>) {
        // The MCAP writer finalizes itself on drop; nothing may reach the
        // file after a failure
        self.discard.store(true, Ordering::Relaxed);
    }
}
