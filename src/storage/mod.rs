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

// Segment storage module
//
// Provides a trait-based abstraction for where segment bytes end up,
// so the segment writer does not care whether it writes to a local disk
// or to something that wraps it (tests inject failing storage here).

pub mod backend;
pub mod filesystem;

pub use backend::{SegmentFile, SegmentStorage};
pub use filesystem::FilesystemStorage;
