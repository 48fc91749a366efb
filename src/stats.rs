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

//! Per-provider delivery counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a provider's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProviderStats {
    /// Entries accepted by the queue.
    pub enqueued: u64,
    /// Entries rejected because the queue stayed full.
    pub dropped_full: u64,
    /// Entries rejected because the provider was shut down.
    pub dropped_closed: u64,
    pub flushed_batches: u64,
    pub flushed_entries: u64,
    /// Batches the sink failed to deliver.
    pub failed_batches: u64,
    /// Entries lost with those batches.
    pub lost_entries: u64,
}

impl ProviderStats {
    /// Entries that were accepted but have not reached a flush outcome yet.
    pub fn in_flight(&self) -> u64 {
        self.enqueued
            .saturating_sub(self.flushed_entries)
            .saturating_sub(self.lost_entries)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    enqueued: AtomicU64,
    dropped_full: AtomicU64,
    dropped_closed: AtomicU64,
    flushed_batches: AtomicU64,
    flushed_entries: AtomicU64,
    failed_batches: AtomicU64,
    lost_entries: AtomicU64,
}

impl Counters {
    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_full(&self) {
        self.dropped_full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_closed(&self) {
        self.dropped_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flushed(&self, entries: usize) {
        self.flushed_batches.fetch_add(1, Ordering::Relaxed);
        self.flushed_entries
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self, entries: usize) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.lost_entries.fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ProviderStats {
        ProviderStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            dropped_closed: self.dropped_closed.load(Ordering::Relaxed),
            flushed_batches: self.flushed_batches.load(Ordering::Relaxed),
            flushed_entries: self.flushed_entries.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            lost_entries: self.lost_entries.load(Ordering::Relaxed),
        }
    }
}
