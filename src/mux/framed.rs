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

/// Length-prefixed protobuf segment muxer
///
/// # Format Structure
///
/// ```text
/// {"format":"frames","version":1,...}\n      <- JSON header, never compressed
/// [u32 LE length][FrameRecord protobuf]      <- repeated, optionally wrapped
/// [u32 LE length][FrameRecord protobuf]         in an LZ4 or Zstd stream
/// ```
///
/// The format has no sub-segment parts: a compressed stream is only
/// decodable once its encoder has been finished.
use chrono::{DateTime, SecondsFormat, Utc};
use prost::Message;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{CountingFile, MuxerOptions, SegmentMuxer};
use crate::error::SegmentError;
use crate::protocol::{CompressionType, StreamUnit};

pub const FRAMED_FORMAT_VERSION: u32 = 1;

/// One stream unit as stored on disk
#[derive(Clone, PartialEq, Message)]
pub struct FrameRecord {
    #[prost(string, tag = "1")]
    pub track: String,
    #[prost(uint32, tag = "2")]
    pub kind: u32,
    #[prost(uint64, tag = "3")]
    pub pts_ns: u64,
    #[prost(uint64, tag = "4")]
    pub log_time_ns: u64,
    #[prost(bool, tag = "5")]
    pub key_frame: bool,
    #[prost(bytes = "vec", tag = "6")]
    pub payload: Vec<u8>,
}

/// First line of every framed segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramedHeader {
    pub format: String,
    pub version: u32,
    pub path_name: String,
    pub segment_start: String,
    pub compression: CompressionType,
}

enum FrameSink {
    Plain(CountingFile),
    Lz4(lz4::Encoder<CountingFile>),
    Zstd(zstd::stream::write::Encoder<'static, CountingFile>),
}

impl FrameSink {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            FrameSink::Plain(w) => w,
            FrameSink::Lz4(w) => w,
            FrameSink::Zstd(w) => w,
        }
    }

    fn finish(self) -> std::io::Result<()> {
        let mut file = match self {
            FrameSink::Plain(w) => w,
            FrameSink::Lz4(encoder) => {
                let (file, result) = encoder.finish();
                result?;
                file
            }
            FrameSink::Zstd(encoder) => encoder.finish()?,
        };
        file.flush()
    }
}

pub struct FramedMuxer {
    sink: FrameSink,
    scratch: Vec<u8>,
    size: Arc<AtomicU64>,
}

impl FramedMuxer {
    pub fn new(
        mut file: CountingFile,
        options: &MuxerOptions,
        segment_start: DateTime<Utc>,
    ) -> Result<Self, SegmentError> {
        let size = file.size_handle();

        let header = FramedHeader {
            format: options.format.extension().to_string(),
            version: FRAMED_FORMAT_VERSION,
            path_name: options.path_name.clone(),
            segment_start: segment_start.to_rfc3339_opts(SecondsFormat::Micros, true),
            compression: options.compression,
        };
        serde_json::to_writer(&mut file, &header)?;
        file.write_all(b"\n")?;

        let sink = match options.compression {
            CompressionType::None => FrameSink::Plain(file),
            CompressionType::Lz4 => FrameSink::Lz4(
                lz4::EncoderBuilder::new()
                    .level(options.compression_level.to_lz4_level())
                    .build(file)?,
            ),
            CompressionType::Zstd => FrameSink::Zstd(zstd::stream::write::Encoder::new(
                file,
                options.compression_level.to_zstd_level(),
            )?),
        };

        Ok(Self {
            sink,
            scratch: Vec::with_capacity(4096),
            size,
        })
    }
}

impl SegmentMuxer for FramedMuxer {
    fn write_unit(&mut self, unit: &StreamUnit, log_time_ns: u64) -> Result<(), SegmentError> {
        let record = FrameRecord {
            track: unit.track.clone(),
            kind: unit.kind.to_wire(),
            pts_ns: unit.pts.as_nanos() as u64,
            log_time_ns,
            key_frame: unit.key_frame,
            payload: unit.payload.to_vec(),
        };

        self.scratch.clear();
        record.encode(&mut self.scratch)?;

        let len = frame_length(self.scratch.len())?;
        let writer = self.sink.writer();
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&self.scratch)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<u64, SegmentError> {
        let size = self.size.clone();
        self.sink.finish()?;
        Ok(size.load(Ordering::Relaxed))
    }
}

fn frame_length(len: usize) -> Result<u32, SegmentError> {
    u32::try_from(len).map_err(|_| SegmentError::RecordTooLarge(len))
}

/// Decode the records of an uncompressed framed segment
pub fn read_frames(bytes: &[u8]) -> Result<(FramedHeader, Vec<FrameRecord>), SegmentError> {
    let newline = bytes
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| SegmentError::Io(std::io::ErrorKind::UnexpectedEof.into()))?;
    let header: FramedHeader = serde_json::from_slice(&bytes[..newline])?;

    let mut records = Vec::new();
    let mut rest = &bytes[newline + 1..];
    while rest.len() >= 4 {
        let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        if rest.len() < 4 + len {
            return Err(SegmentError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        let record = FrameRecord::decode(&rest[4..4 + len])
            .map_err(|e| SegmentError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        records.push(record);
        rest = &rest[4 + len..];
    }

    Ok((header, records))
}
