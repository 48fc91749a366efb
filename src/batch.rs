// Copyright (c) 2025 Sean McNamara <smcnam@gmail.com>
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

//! Size-or-time batching of dequeued lines.

use std::time::{Duration, Instant};

/// Accumulates items until the batch is full or the flush interval passes.
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    items: Vec<T>,
    max_count: usize,
    flush_interval: Duration,
    last_flush: Instant,
}

impl<T> BatchAccumulator<T> {
    pub fn new(max_count: usize, flush_interval: Duration) -> Self {
        let max_count = max_count.max(1);
        Self {
            items: Vec::with_capacity(max_count.min(1024)),
            max_count,
            flush_interval,
            last_flush: Instant::now(),
        }
    }

    /// The first item into an empty batch starts the flush clock.
    pub fn push(&mut self, item: T) {
        if self.items.is_empty() {
            self.last_flush = Instant::now();
        }
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_count
    }

    /// Whether the time trigger has fired, regardless of content.
    pub fn interval_elapsed(&self, now: Instant) -> bool {
        now.duration_since(self.last_flush) >= self.flush_interval
    }

    /// Size trigger, time trigger or explicit request, and only when non-empty.
    pub fn should_flush(&self, now: Instant, requested: bool) -> bool {
        !self.is_empty() && (requested || self.is_full() || self.interval_elapsed(now))
    }

    /// How long the consumer may wait before the time trigger is due.
    pub fn time_until_due(&self, now: Instant) -> Duration {
        match self.last_flush.checked_add(self.flush_interval) {
            Some(due) => due.saturating_duration_since(now),
            None => Duration::MAX,
        }
    }

    /// Take up to `max_count` items in order and restart the flush clock.
    pub fn take_chunk(&mut self) -> Vec<T> {
        let count = self.items.len().min(self.max_count);
        let rest = self.items.split_off(count);
        self.last_flush = Instant::now();
        std::mem::replace(&mut self.items, rest)
    }
}
