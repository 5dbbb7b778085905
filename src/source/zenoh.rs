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

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Instant;
use tracing::{debug, info};
use ::zenoh::handlers::FifoChannelHandler;
use ::zenoh::pubsub::Subscriber;
use ::zenoh::sample::Sample;
use ::zenoh::Session;

use super::{StreamSource, StreamSubscription};
use crate::protocol::StreamUnit;
use crate::LOG_TARGET;

/// Records every sample published under a key expression
///
/// Each sample becomes a data unit on a track named after the sample's key,
/// timestamped with the time elapsed since the subscriber was declared.
pub struct ZenohSource {
    session: Session,
    key_expr: String,
}

impl ZenohSource {
    pub fn new(session: Session, key_expr: impl Into<String>) -> Self {
        Self {
            session,
            key_expr: key_expr.into(),
        }
    }

    pub fn key_expr(&self) -> &str {
        &self.key_expr
    }
}

#[async_trait]
impl StreamSource for ZenohSource {
    async fn subscribe(&self) -> Result<Box<dyn StreamSubscription>> {
        let subscriber = self
            .session
            .declare_subscriber(self.key_expr.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to subscribe to '{}': {}", self.key_expr, e))?;

        info!(target: LOG_TARGET, "Subscribed to '{}'", self.key_expr);

        Ok(Box::new(ZenohSubscription {
            subscriber,
            started: Instant::now(),
        }))
    }

    fn describe(&self) -> String {
        format!("zenoh:{}", self.key_expr)
    }
}

struct ZenohSubscription {
    subscriber: Subscriber<FifoChannelHandler<Sample>>,
    started: Instant,
}

#[async_trait]
impl StreamSubscription for ZenohSubscription {
    async fn recv(&mut self) -> Option<StreamUnit> {
        match self.subscriber.recv_async().await {
            Ok(sample) => Some(sample_to_unit(&sample, self.started.elapsed())),
            Err(e) => {
                debug!(target: LOG_TARGET, "Subscriber channel closed: {}", e);
                None
            }
        }
    }
}

fn sample_to_unit(sample: &Sample, pts: std::time::Duration) -> StreamUnit {
    let payload = Bytes::from(sample.payload().to_bytes().into_owned());
    StreamUnit::data(sample.key_expr().as_str(), pts, payload)
}
