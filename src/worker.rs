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

//! The consumer side of a provider: one thread that drains the queue into
//! batches and hands them to the sink.
//!
//! State machine: `Running` until the queue reports `Abandoned` (closed and
//! empty), then `Draining` for the final unconditional flush and sink close,
//! then `Stopped`. Only this thread ever touches the batch or the sink, so
//! flushes are strictly sequential.

use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::batch::BatchAccumulator;
use crate::error::{LogError, SinkError};
use crate::queue::{BoundedQueue, PopResult};
use crate::sink::Sink;
use crate::stats::Counters;

/// Lifecycle of a provider's worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    Running,
    Draining,
    Stopped,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Running,
            1 => WorkerState::Draining,
            _ => WorkerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Running => 0,
            WorkerState::Draining => 1,
            WorkerState::Stopped => 2,
        }
    }
}

#[derive(Debug, Default)]
struct FlushTickets {
    requested: u64,
    completed: u64,
    stopped: bool,
}

/// Explicit flush requests from producers, acknowledged by the worker.
#[derive(Debug, Default)]
pub(crate) struct FlushControl {
    tickets: Mutex<FlushTickets>,
    condvar: Condvar,
}

impl FlushControl {
    /// Register a request; returns its ticket, or `None` if the worker is gone.
    pub(crate) fn request(&self) -> Option<u64> {
        let mut tickets = self.tickets.lock().unwrap_or_else(PoisonError::into_inner);
        if tickets.stopped {
            return None;
        }
        tickets.requested += 1;
        Some(tickets.requested)
    }

    fn pending(&self) -> Option<u64> {
        let tickets = self.tickets.lock().unwrap_or_else(PoisonError::into_inner);
        (tickets.requested > tickets.completed).then_some(tickets.requested)
    }

    fn complete(&self, ticket: u64) {
        let mut tickets = self.tickets.lock().unwrap_or_else(PoisonError::into_inner);
        tickets.completed = tickets.completed.max(ticket);
        self.condvar.notify_all();
    }

    /// The final drain covers every outstanding request.
    fn finish(&self) {
        let mut tickets = self.tickets.lock().unwrap_or_else(PoisonError::into_inner);
        tickets.completed = tickets.requested;
        tickets.stopped = true;
        self.condvar.notify_all();
    }

    /// Wait until `ticket` is served. Returns `false` on timeout.
    pub(crate) fn wait(&self, ticket: u64, timeout: Duration) -> bool {
        let start = Instant::now();
        let mut tickets = self.tickets.lock().unwrap_or_else(PoisonError::into_inner);

        while tickets.completed < ticket {
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return false;
            }
            tickets = self
                .condvar
                .wait_timeout(tickets, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        true
    }
}

/// State shared between a provider handle and its worker.
#[derive(Debug)]
pub(crate) struct WorkerShared {
    state: AtomicU8,
    pub(crate) flush: FlushControl,
    pub(crate) counters: Counters,
}

impl WorkerShared {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Running.as_u8()),
            flush: FlushControl::default(),
            counters: Counters::default(),
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

pub(crate) struct WorkerLoop<S: Sink> {
    name: String,
    queue: Arc<BoundedQueue<String>>,
    batch: BatchAccumulator<String>,
    sink: S,
    shared: Arc<WorkerShared>,
    poll_interval: Duration,
}

impl<S: Sink> WorkerLoop<S> {
    pub(crate) fn new(
        name: String,
        queue: Arc<BoundedQueue<String>>,
        batch: BatchAccumulator<String>,
        sink: S,
        shared: Arc<WorkerShared>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name,
            queue,
            batch,
            sink,
            shared,
            poll_interval,
        }
    }

    pub(crate) fn spawn(self) -> Result<JoinHandle<()>, LogError> {
        let provider = self.name.clone();
        thread::Builder::new()
            .name(format!("drainlog-{}", provider))
            .spawn(move || self.run())
            .map_err(|e| LogError::Spawn {
                provider,
                reason: e.to_string(),
            })
    }

    fn run(mut self) {
        tracing::debug!(provider = %self.name, "worker started");

        loop {
            let wait = if self.batch.is_empty() {
                self.poll_interval
            } else {
                self.poll_interval
                    .min(self.batch.time_until_due(Instant::now()))
            };

            match self.queue.pop(wait) {
                PopResult::Item(line) => self.batch.push(line),
                PopResult::TimedOut => {}
                PopResult::Abandoned => break,
            }

            if let Some(ticket) = self.shared.flush.pending() {
                self.serve_flush_request(ticket);
            } else if self.batch.should_flush(Instant::now(), false) {
                self.flush_chunk();
            }
        }

        self.drain();
    }

    /// Pull in everything queued so far, deliver it all, then acknowledge.
    fn serve_flush_request(&mut self, ticket: u64) {
        let queued = self.queue.len();
        for _ in 0..queued {
            match self.queue.try_pop() {
                Some(line) => self.batch.push(line),
                None => break,
            }
        }
        while !self.batch.is_empty() {
            self.flush_chunk();
        }
        self.shared.flush.complete(ticket);
    }

    fn drain(&mut self) {
        self.shared.set_state(WorkerState::Draining);

        while let Some(line) = self.queue.try_pop() {
            self.batch.push(line);
        }
        while !self.batch.is_empty() {
            self.flush_chunk();
        }

        let sink = &mut self.sink;
        match panic::catch_unwind(AssertUnwindSafe(|| sink.close())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(provider = %self.name, error = %e, "sink close failed"),
            Err(payload) => tracing::warn!(
                provider = %self.name,
                error = %panic_message(payload.as_ref()),
                "sink panicked on close"
            ),
        }

        self.shared.set_state(WorkerState::Stopped);
        self.shared.flush.finish();
        tracing::debug!(provider = %self.name, "worker stopped");
    }

    fn flush_chunk(&mut self) {
        let chunk = self.batch.take_chunk();
        if chunk.is_empty() {
            return;
        }

        let sink = &mut self.sink;
        let result = panic::catch_unwind(AssertUnwindSafe(|| sink.flush(&chunk)))
            .unwrap_or_else(|payload| Err(SinkError::Panicked(panic_message(payload.as_ref()))));

        match result {
            Ok(()) => self.shared.counters.record_flushed(chunk.len()),
            Err(e) => {
                self.shared.counters.record_failed(chunk.len());
                if e.is_quiet() {
                    tracing::debug!(provider = %self.name, entries = chunk.len(), error = %e, "batch abandoned");
                } else {
                    tracing::warn!(provider = %self.name, entries = chunk.len(), error = %e, "batch lost");
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::LogEntry;

    struct VecSink {
        batches: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl Sink for VecSink {
        fn format(entry: &LogEntry) -> String {
            entry.message().to_string()
        }

        fn flush(&mut self, lines: &[String]) -> Result<(), SinkError> {
            self.batches.lock().unwrap().push(lines.to_vec());
            Ok(())
        }
    }

    fn start(
        max_count: usize,
        interval: Duration,
    ) -> (
        Arc<BoundedQueue<String>>,
        Arc<WorkerShared>,
        Arc<Mutex<Vec<Vec<String>>>>,
        JoinHandle<()>,
    ) {
        let queue = Arc::new(BoundedQueue::new(64));
        let shared = Arc::new(WorkerShared::new());
        let batches = Arc::new(Mutex::new(Vec::new()));
        let worker = WorkerLoop::new(
            "test".to_string(),
            queue.clone(),
            BatchAccumulator::new(max_count, interval),
            VecSink {
                batches: batches.clone(),
            },
            shared.clone(),
            Duration::from_millis(10),
        );
        let handle = worker.spawn().unwrap();
        (queue, shared, batches, handle)
    }

    #[test]
    fn test_drain_flushes_partial_batch() {
        let (queue, shared, batches, handle) = start(100, Duration::from_secs(3600));
        for i in 0..7 {
            queue.push(i.to_string(), Duration::ZERO).unwrap();
        }
        queue.close();
        handle.join().unwrap();

        assert_eq!(shared.state(), WorkerState::Stopped);
        let flat: Vec<String> = batches.lock().unwrap().concat();
        assert_eq!(flat, (0..7).map(|i| i.to_string()).collect::<Vec<_>>());
        assert_eq!(shared.counters.snapshot().flushed_entries, 7);
    }

    #[test]
    fn test_flush_request_is_acknowledged() {
        let (queue, shared, batches, handle) = start(3, Duration::from_secs(3600));
        for i in 0..8 {
            queue.push(i.to_string(), Duration::ZERO).unwrap();
        }

        let ticket = shared.flush.request().unwrap();
        queue.interrupt();
        assert!(shared.flush.wait(ticket, Duration::from_secs(5)));

        let sizes: Vec<usize> = batches.lock().unwrap().iter().map(Vec::len).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 8);
        assert!(sizes.iter().all(|&n| n <= 3));

        queue.close();
        handle.join().unwrap();
        assert!(shared.flush.request().is_none());
    }

    #[test]
    fn test_flush_request_on_empty_returns_quickly() {
        let (queue, shared, _batches, handle) = start(3, Duration::from_secs(3600));

        let start = Instant::now();
        let ticket = shared.flush.request().unwrap();
        queue.interrupt();
        assert!(shared.flush.wait(ticket, Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));

        queue.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
