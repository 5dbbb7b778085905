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

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while a segment is open
///
/// Any of these moves the open segment to Failed and ends the instance.
#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("failed to create segment {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on segment: {0}")]
    Io(#[from] std::io::Error),

    #[error("MCAP error: {0}")]
    Mcap(#[from] mcap::McapError),

    #[error("encode error: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("header error: {0}")]
    Header(#[from] serde_json::Error),

    #[error("record of {0} bytes does not fit a u32 length prefix")]
    RecordTooLarge(usize),

    #[error("invalid path format: {0}")]
    PathFormat(String),

    #[error("segment writer already failed")]
    WriterFailed,
}

/// Write queue errors
#[derive(Error, Debug)]
pub enum QueueError<T> {
    /// The queue no longer accepts items; the rejected item is handed back
    #[error("write queue closed")]
    Closed(T),
}
