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

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::QueueError;
use crate::LOG_TARGET;

/// What happened to a pushed item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Stored without loss
    Queued,
    /// Stored after evicting the oldest queued item
    EvictedOldest,
}

/// Counters describing queue activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub len: usize,
    pub pushed: u64,
    pub popped: u64,
    pub dropped: u64,
}

/// Bounded FIFO between the stream reader and the segment writer
///
/// A full queue makes the producer wait up to `push_timeout` for the writer
/// to make room. If the writer is still behind after that, the oldest queued
/// item is evicted so the live stream keeps flowing; each eviction is counted.
/// Items that survive are always popped in push order.
pub struct WriteQueue<T> {
    items: ArrayQueue<T>,
    push_timeout: Duration,
    closed: AtomicBool,

    // Wakeups for the single consumer and the single producer
    item_available: Notify,
    space_available: Notify,

    // Statistics
    pushed: AtomicU64,
    popped: AtomicU64,
    dropped: AtomicU64,
}

impl<T> WriteQueue<T> {
    /// `capacity` must be non-zero
    pub fn new(capacity: usize, push_timeout: Duration) -> Self {
        Self {
            items: ArrayQueue::new(capacity),
            push_timeout,
            closed: AtomicBool::new(false),
            item_available: Notify::new(),
            space_available: Notify::new(),
            pushed: AtomicU64::new(0),
            popped: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Push an item at the tail
    pub async fn push(&self, item: T) -> Result<PushOutcome, QueueError<T>> {
        let deadline = Instant::now() + self.push_timeout;
        let mut item = item;

        loop {
            if self.is_closed() {
                return Err(QueueError::Closed(item));
            }

            match self.items.push(item) {
                Ok(()) => {
                    self.pushed.fetch_add(1, Ordering::Relaxed);
                    self.item_available.notify_one();
                    return Ok(PushOutcome::Queued);
                }
                Err(rejected) => item = rejected,
            }

            if tokio::time::timeout_at(deadline, self.space_available.notified())
                .await
                .is_err()
            {
                break;
            }
        }

        if self.is_closed() {
            return Err(QueueError::Closed(item));
        }

        let outcome = match self.items.force_push(item) {
            Some(_evicted) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    target: LOG_TARGET,
                    "Write queue full for {:?}, dropped oldest item ({} dropped so far)",
                    self.push_timeout, dropped
                );
                PushOutcome::EvictedOldest
            }
            // The consumer made room between the timeout and now
            None => PushOutcome::Queued,
        };
        self.pushed.fetch_add(1, Ordering::Relaxed);
        self.item_available.notify_one();
        Ok(outcome)
    }

    /// Pop the head item, waiting while the queue is empty
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            if let Some(item) = self.items.pop() {
                self.popped.fetch_add(1, Ordering::Relaxed);
                self.space_available.notify_one();
                return Some(item);
            }

            if self.is_closed() {
                // A push may have landed right before close
                let item = self.items.pop();
                if item.is_some() {
                    self.popped.fetch_add(1, Ordering::Relaxed);
                }
                return item;
            }

            self.item_available.notified().await;
        }
    }

    /// Stop accepting items; queued items stay available to `pop`
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(
                target: LOG_TARGET,
                "Write queue closed with {} items pending",
                self.items.len()
            );
        }
        self.item_available.notify_one();
        self.space_available.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            len: self.items.len(),
            pushed: self.pushed.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
