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

// Segmented stream recorder
//
// Records live streams to disk as a sequence of time-bounded segment files:
// - One supervising Agent per stream, restarting recording after failures
// - Bounded write queue between the network reader and disk I/O
// - Segment rotation on unit timestamps, with optional parts (MCAP)
// - Append-only M3U8 playlist of completed segments

pub mod agent;
pub mod config;
pub mod error;
pub mod instance;
pub mod manager;
pub mod mux;
pub mod path_format;
pub mod playlist;
pub mod protocol;
pub mod segment;
pub mod source;
pub mod storage;
pub mod write_queue;

/// Component tag carried by every recording log line
pub const LOG_TARGET: &str = "record";

// Re-export main types
pub use agent::{Agent, AgentConfig, AgentStats};
pub use config::{load_config, load_config_with_env, RecorderConfig};
pub use error::{QueueError, SegmentError};
pub use instance::{InstanceEnd, InstanceOutcome, RecordingInstance};
pub use manager::RecorderManager;
pub use path_format::PathFormat;
pub use playlist::{parse_playlist, PlaylistEntry, PlaylistMaintainer};
pub use protocol::{CompressionLevel, CompressionType, RecordFormat, StreamUnit, UnitKind};
pub use segment::{CompletedSegment, SegmentState, SegmentWriter, SegmentWriterSettings};
pub use source::{StreamSource, StreamSubscription, ZenohSource};
pub use storage::{FilesystemStorage, SegmentStorage};
pub use write_queue::{PushOutcome, WriteQueue};
