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

// Append-only M3U8 index of completed segments
//
// The playlist of a stream lives in the directory holding its segments and
// is named after that directory: `recordings/cam1/cam1.m3u8`. Entries are
// only ever appended; nothing here rewrites or finalizes the file.

use anyhow::{bail, Context, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error};

use crate::LOG_TARGET;

pub const PLAYLIST_EXTENSION: &str = "m3u8";
pub const PLAYLIST_HEADER: &str = "#EXTM3U\n#EXT-X-VERSION:3\n";

const EXTINF_PREFIX: &str = "#EXTINF:";

/// One completed segment listed in a playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub duration: String,
    pub file_name: String,
}

/// Appends completed segments to their stream's playlist
#[derive(Debug, Clone)]
pub struct PlaylistMaintainer {
    entry_duration: String,
}

impl PlaylistMaintainer {
    pub fn new(segment_duration: Duration) -> Self {
        Self {
            entry_duration: format_duration(segment_duration),
        }
    }

    /// Playlist file a segment belongs to
    pub fn playlist_path(segment_path: &Path) -> Option<PathBuf> {
        let dir = segment_path.parent()?;
        let name = dir.file_name()?;
        let mut file_name = name.to_os_string();
        file_name.push(".");
        file_name.push(PLAYLIST_EXTENSION);
        Some(dir.join(file_name))
    }

    /// Best-effort append; failures are logged and the entry is skipped
    pub fn append(&self, segment_path: &Path) {
        match self.try_append(segment_path) {
            Ok(playlist) => debug!(
                target: LOG_TARGET,
                "Appended {} to playlist {}",
                segment_path.display(),
                playlist.display()
            ),
            Err(e) => error!(
                target: LOG_TARGET,
                "Failed to update playlist for {}: {:#}",
                segment_path.display(),
                e
            ),
        }
    }

    /// Append an entry for `segment_path`, creating the playlist if needed
    pub fn try_append(&self, segment_path: &Path) -> Result<PathBuf> {
        let playlist = Self::playlist_path(segment_path).with_context(|| {
            format!("no playlist location for {}", segment_path.display())
        })?;
        let file_name = segment_path
            .file_name()
            .with_context(|| format!("segment path {} has no file name", segment_path.display()))?
            .to_string_lossy();

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&playlist) {
            Ok(mut file) => {
                file.write_all(PLAYLIST_HEADER.as_bytes())
                    .with_context(|| format!("failed to write header to {}", playlist.display()))?;
                file
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => OpenOptions::new()
                .append(true)
                .open(&playlist)
                .with_context(|| format!("failed to open {}", playlist.display()))?,
            Err(e) => {
                return Err(e).with_context(|| format!("failed to create {}", playlist.display()))
            }
        };

        let entry = format!("{}{},\n{}\n", EXTINF_PREFIX, self.entry_duration, file_name);
        file.write_all(entry.as_bytes())
            .with_context(|| format!("failed to append to {}", playlist.display()))?;

        Ok(playlist)
    }
}

/// Parse a playlist written by [`PlaylistMaintainer`]
///
/// Rejects anything but the fixed header followed by whole entries.
pub fn parse_playlist(content: &str) -> Result<Vec<PlaylistEntry>> {
    if !content.starts_with(PLAYLIST_HEADER) {
        bail!("playlist does not start with the M3U8 header");
    }

    let body = &content[PLAYLIST_HEADER.len()..];
    if !body.is_empty() && !body.ends_with('\n') {
        bail!("playlist ends with a partial line");
    }

    let lines: Vec<&str> = body.lines().collect();
    if lines.len() % 2 != 0 {
        bail!("playlist has {} entry lines, expected pairs", lines.len());
    }

    lines
        .chunks(2)
        .map(|pair| {
            let duration = pair[0]
                .strip_prefix(EXTINF_PREFIX)
                .and_then(|rest| rest.strip_suffix(','))
                .with_context(|| format!("malformed entry line '{}'", pair[0]))?;
            if pair[1].is_empty() || pair[1].starts_with('#') {
                bail!("malformed segment line '{}'", pair[1]);
            }
            Ok(PlaylistEntry {
                duration: duration.to_string(),
                file_name: pair[1].to_string(),
            })
        })
        .collect()
}

/// Render a duration the way Go prints one: `1h0m0s`, `10s`, `1.5s`, `250ms`
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }

    if nanos < 1_000 {
        return format!("{}ns", nanos);
    }
    if nanos < 1_000_000 {
        return format!("{}µs", with_fraction(nanos, 1_000, 3));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", with_fraction(nanos, 1_000_000, 6));
    }

    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs / 60) % 60;
    let seconds = with_fraction(
        u128::from(total_secs % 60) * 1_000_000_000 + u128::from(duration.subsec_nanos()),
        1_000_000_000,
        9,
    );

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

fn with_fraction(value: u128, unit: u128, digits: usize) -> String {
    let whole = value / unit;
    let fraction = value % unit;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{:0width$}", fraction, width = digits);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}
