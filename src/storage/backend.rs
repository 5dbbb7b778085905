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

// Storage trait for segment files

use std::io::{self, Seek, Write};
use std::path::Path;

/// Writable, seekable handle to one segment file
pub trait SegmentFile: Write + Seek + Send {}

impl<T: Write + Seek + Send> SegmentFile for T {}

/// Storage that segment files are created in
///
/// Implementations are called from the segment writer's blocking thread,
/// so plain synchronous I/O is expected.
pub trait SegmentStorage: Send + Sync {
    /// Create a new segment file at `path`
    ///
    /// Must fail rather than overwrite an existing recording.
    fn create_segment(&self, path: &Path) -> io::Result<Box<dyn SegmentFile>>;

    /// Get backend type identifier
    fn backend_type(&self) -> &str;
}
