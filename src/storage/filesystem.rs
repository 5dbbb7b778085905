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

// Filesystem storage implementation

use super::backend::{SegmentFile, SegmentStorage};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use tracing::debug;

use crate::LOG_TARGET;

/// Local disk storage for segment files
#[derive(Debug, Default, Clone)]
pub struct FilesystemStorage;

impl FilesystemStorage {
    pub fn new() -> Self {
        Self
    }

    /// Ensure the segment's directory exists
    fn ensure_parent_directory(path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(
                    target: LOG_TARGET,
                    "Creating segment directory: {}",
                    parent.display()
                );
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

impl SegmentStorage for FilesystemStorage {
    fn create_segment(&self, path: &Path) -> io::Result<Box<dyn SegmentFile>> {
        Self::ensure_parent_directory(path)?;

        let file = OpenOptions::new()
            .write(true)
            .read(true)
            .create_new(true)
            .open(path)?;

        debug!(target: LOG_TARGET, "Created segment file {}", path.display());
        Ok(Box::new(file))
    }

    fn backend_type(&self) -> &str {
        "filesystem"
    }
}
