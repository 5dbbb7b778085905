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

// Live stream sources
//
// A recording instance holds exactly one subscription for its whole life and
// drops it when it ends, so a source only ever sees one subscriber per stream
// at a time.

pub mod zenoh;

pub use self::zenoh::ZenohSource;

use anyhow::Result;
use async_trait::async_trait;

use crate::protocol::StreamUnit;

/// A live stream that can be subscribed to
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Start receiving units from the live stream
    async fn subscribe(&self) -> Result<Box<dyn StreamSubscription>>;

    /// Human readable description for logs
    fn describe(&self) -> String;
}

/// Ordered units of one subscription
#[async_trait]
pub trait StreamSubscription: Send {
    /// Next unit, or `None` once the stream has ended
    async fn recv(&mut self) -> Option<StreamUnit>;
}
