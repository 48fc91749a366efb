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

//! Producer-facing provider handle.
//!
//! An `AsyncProvider` owns one bounded queue and one worker thread. Producers
//! only format and enqueue; everything slow happens on the worker.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::batch::BatchAccumulator;
use crate::config::EngineConfig;
use crate::entry::LogEntry;
use crate::error::LogError;
use crate::queue::BoundedQueue;
use crate::sink::{Detach, Sink};
use crate::stats::ProviderStats;
use crate::worker::{WorkerLoop, WorkerShared, WorkerState};

/// What the dispatcher needs from every registered destination.
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Enqueue one entry. Never blocks longer than the push timeout.
    fn log(&self, entry: &LogEntry) -> Result<(), LogError>;

    /// Deliver everything logged so far. Returns `false` if that took too long.
    fn flush(&self) -> bool;

    /// Drain and stop. Blocks until the worker has exited; safe to call twice.
    fn shutdown(&self);

    fn stats(&self) -> ProviderStats;
}

pub struct AsyncProvider<S: Sink> {
    name: String,
    queue: Arc<BoundedQueue<String>>,
    shared: Arc<WorkerShared>,
    push_timeout: Duration,
    flush_timeout: Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
    detacher: Option<Arc<dyn Detach>>,
    _sink: PhantomData<fn() -> S>,
}

impl<S: Sink> AsyncProvider<S> {
    /// Start the worker thread for `sink` and return the producer handle.
    pub fn start(name: impl Into<String>, sink: S, config: &EngineConfig) -> Result<Self, LogError> {
        let name = name.into();
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let shared = Arc::new(WorkerShared::new());
        let detacher = sink.detacher();

        let worker = WorkerLoop::new(
            name.clone(),
            queue.clone(),
            BatchAccumulator::new(config.max_batch_count, config.flush_interval),
            sink,
            shared.clone(),
            config.poll_interval,
        )
        .spawn()?;

        Ok(Self {
            name,
            queue,
            shared,
            push_timeout: config.push_timeout,
            flush_timeout: config.flush_timeout,
            worker: Mutex::new(Some(worker)),
            detacher,
            _sink: PhantomData,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }
}

impl<S: Sink> Provider for AsyncProvider<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn log(&self, entry: &LogEntry) -> Result<(), LogError> {
        let line = S::format(entry);
        let counters = &self.shared.counters;

        match self.queue.push(line, self.push_timeout) {
            Ok(()) => {
                counters.record_enqueued();
                Ok(())
            }
            Err(LogError::QueueFull) => {
                counters.record_dropped_full();
                Err(LogError::QueueFull)
            }
            Err(e) => {
                counters.record_dropped_closed();
                Err(e)
            }
        }
    }

    fn flush(&self) -> bool {
        let Some(ticket) = self.shared.flush.request() else {
            return true;
        };
        self.queue.interrupt();
        self.shared.flush.wait(ticket, self.flush_timeout)
    }

    fn shutdown(&self) {
        // Cut the external target first so nothing races its teardown.
        if let Some(detacher) = &self.detacher {
            detacher.detach();
        }
        self.queue.close();

        // Held across the join so a concurrent second caller also waits.
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                tracing::warn!(provider = %self.name, "worker thread panicked");
            }
            let stats = self.shared.counters.snapshot();
            tracing::debug!(
                provider = %self.name,
                flushed = stats.flushed_entries,
                lost = stats.lost_entries,
                dropped = stats.dropped_full + stats.dropped_closed,
                "provider shut down"
            );
        }
    }

    fn stats(&self) -> ProviderStats {
        self.shared.counters.snapshot()
    }
}

impl<S: Sink> Drop for AsyncProvider<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
