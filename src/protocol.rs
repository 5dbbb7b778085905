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

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of media carried by a stream unit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Video,
    Audio,
    Data,
}

impl UnitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::Video => "video",
            UnitKind::Audio => "audio",
            UnitKind::Data => "data",
        }
    }

    pub fn to_wire(self) -> u32 {
        match self {
            UnitKind::Video => 0,
            UnitKind::Audio => 1,
            UnitKind::Data => 2,
        }
    }
}

/// One access unit delivered by a stream subscription
///
/// `pts` is relative to the start of the subscription and never decreases
/// within one subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamUnit {
    pub track: String,
    pub kind: UnitKind,
    pub pts: Duration,
    pub key_frame: bool,
    pub payload: Bytes,
}

impl StreamUnit {
    /// Video access unit; only key frames are rotation points
    pub fn video(track: impl Into<String>, pts: Duration, key_frame: bool, payload: Bytes) -> Self {
        Self {
            track: track.into(),
            kind: UnitKind::Video,
            pts,
            key_frame,
            payload,
        }
    }

    pub fn audio(track: impl Into<String>, pts: Duration, payload: Bytes) -> Self {
        Self {
            track: track.into(),
            kind: UnitKind::Audio,
            pts,
            key_frame: true,
            payload,
        }
    }

    pub fn data(track: impl Into<String>, pts: Duration, payload: Bytes) -> Self {
        Self {
            track: track.into(),
            kind: UnitKind::Data,
            pts,
            key_frame: true,
            payload,
        }
    }

    /// Whether a new segment may start at this unit
    pub fn is_random_access(&self) -> bool {
        match self.kind {
            UnitKind::Video => self.key_frame,
            UnitKind::Audio | UnitKind::Data => true,
        }
    }
}

/// Container format of recorded segments
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    #[default]
    Mcap,
    Framed,
}

impl RecordFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RecordFormat::Mcap => "mcap",
            RecordFormat::Framed => "frames",
        }
    }

    /// Whether the format can flush sub-segment parts
    pub fn supports_parts(self) -> bool {
        matches!(self, RecordFormat::Mcap)
    }
}

/// Compression level (0-4)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    Fastest = 0,
    Fast = 1,
    #[default]
    Default = 2,
    Slow = 3,
    Slowest = 4,
}

impl CompressionLevel {
    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            0 => Some(CompressionLevel::Fastest),
            1 => Some(CompressionLevel::Fast),
            2 => Some(CompressionLevel::Default),
            3 => Some(CompressionLevel::Slow),
            4 => Some(CompressionLevel::Slowest),
            _ => None,
        }
    }

    pub fn to_zstd_level(self) -> i32 {
        match self {
            CompressionLevel::Fastest => 1,
            CompressionLevel::Fast => 3,
            CompressionLevel::Default => 5,
            CompressionLevel::Slow => 10,
            CompressionLevel::Slowest => 19,
        }
    }

    pub fn to_lz4_level(self) -> u32 {
        match self {
            CompressionLevel::Fastest => 1,
            CompressionLevel::Fast => 3,
            CompressionLevel::Default => 5,
            CompressionLevel::Slow => 9,
            CompressionLevel::Slowest => 12,
        }
    }
}

/// Compression type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    #[default]
    None,
    Lz4,
    Zstd,
}
