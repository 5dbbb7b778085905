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

// Segment path templates
//
// `%path` is replaced by the stream path name; every other `%` token is a
// chrono strftime specifier evaluated on the segment start time (UTC).

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::error::SegmentError;
use crate::protocol::RecordFormat;

const PATH_TOKEN: &str = "%path";

pub const DEFAULT_PATH_FORMAT: &str = "./recordings/%path/%Y-%m-%d_%H-%M-%S-%6f";

/// Validated segment path template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFormat {
    template: String,
}

impl PathFormat {
    /// Parse and validate a template
    ///
    /// The template must name the stream (`%path`) and contain at least one
    /// time specifier, otherwise consecutive segments would collide.
    pub fn parse(template: &str) -> Result<Self, SegmentError> {
        if !template.contains(PATH_TOKEN) {
            return Err(SegmentError::PathFormat(format!(
                "'{}' does not contain {}",
                template, PATH_TOKEN
            )));
        }

        let mut has_time_token = false;
        for piece in template.split(PATH_TOKEN) {
            for item in StrftimeItems::new(piece) {
                match item {
                    Item::Error => {
                        return Err(SegmentError::PathFormat(format!(
                            "'{}' contains an invalid time specifier",
                            template
                        )))
                    }
                    Item::Numeric(..) | Item::Fixed(..) => has_time_token = true,
                    _ => {}
                }
            }
        }

        if !has_time_token {
            return Err(SegmentError::PathFormat(format!(
                "'{}' does not contain a time specifier",
                template
            )));
        }

        Ok(Self {
            template: template.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Resolve the path of a segment starting at `start`
    pub fn render(
        &self,
        path_name: &str,
        start: DateTime<Utc>,
        format: RecordFormat,
    ) -> Result<PathBuf, SegmentError> {
        let mut rendered = String::with_capacity(self.template.len() + path_name.len() + 16);

        for (i, piece) in self.template.split(PATH_TOKEN).enumerate() {
            if i > 0 {
                rendered.push_str(path_name);
            }
            write!(rendered, "{}", start.format(piece)).map_err(|_| {
                SegmentError::PathFormat(format!("cannot render '{}'", self.template))
            })?;
        }

        rendered.push('.');
        rendered.push_str(format.extension());
        Ok(PathBuf::from(rendered))
    }
}

impl Default for PathFormat {
    fn default() -> Self {
        Self {
            template: DEFAULT_PATH_FORMAT.to_string(),
        }
    }
}
