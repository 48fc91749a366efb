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

use drainlog::{
    AsyncProvider, Dispatcher, EngineConfig, FileSink, FileSinkConfig, InsertMode, Level,
    LogEntry, LogError, Provider, Sink, SinkError, UiSink, WorkerState,
};
use std::collections::HashSet;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

type Batches = Arc<Mutex<Vec<Vec<String>>>>;

struct RecordingSink {
    batches: Batches,
    closed: Arc<AtomicBool>,
}

impl RecordingSink {
    fn new() -> (Self, Batches, Arc<AtomicBool>) {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let sink = Self {
            batches: batches.clone(),
            closed: closed.clone(),
        };
        (sink, batches, closed)
    }
}

impl Sink for RecordingSink {
    fn format(entry: &LogEntry) -> String {
        entry.message().to_string()
    }

    fn flush(&mut self, lines: &[String]) -> Result<(), SinkError> {
        if lines.iter().any(|line| line == "boom") {
            panic!("sink exploded");
        }
        if lines.iter().any(|line| line == "bad") {
            return Err(SinkError::Status {
                status: 500,
                body: "collector down".to_string(),
            });
        }
        self.batches.lock().unwrap().push(lines.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Blocks inside `flush` until the gate opens.
struct GatedSink {
    entered: Sender<()>,
    gate: Arc<(Mutex<bool>, Condvar)>,
    delivered: Arc<Mutex<Vec<String>>>,
}

impl Sink for GatedSink {
    fn format(entry: &LogEntry) -> String {
        entry.message().to_string()
    }

    fn flush(&mut self, lines: &[String]) -> Result<(), SinkError> {
        let _ = self.entered.send(());
        let (lock, cvar) = &*self.gate;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
        self.delivered.lock().unwrap().extend(lines.iter().cloned());
        Ok(())
    }
}

fn engine(max_batch_count: usize, flush_interval: Duration) -> EngineConfig {
    EngineConfig {
        queue_capacity: 1024,
        push_timeout: Duration::from_secs(5),
        max_batch_count,
        flush_interval,
        poll_interval: Duration::from_millis(10),
        flush_timeout: Duration::from_secs(5),
    }
}

fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn flattened(batches: &Batches) -> Vec<String> {
    batches.lock().unwrap().iter().flatten().cloned().collect()
}

#[test]
fn single_producer_order_is_preserved() {
    let (sink, batches, _) = RecordingSink::new();
    let provider = AsyncProvider::start("rec", sink, &engine(7, Duration::from_millis(20))).unwrap();

    for i in 0..100 {
        provider.log(&LogEntry::new(Level::Info, format!("m{}", i))).unwrap();
    }
    provider.shutdown();

    let expected: Vec<String> = (0..100).map(|i| format!("m{}", i)).collect();
    assert_eq!(flattened(&batches), expected);
}

#[test]
fn size_trigger_flushes_full_batch() {
    let (sink, batches, _) = RecordingSink::new();
    let provider = AsyncProvider::start("rec", sink, &engine(5, Duration::from_secs(60))).unwrap();

    for i in 0..5 {
        provider.log(&LogEntry::new(Level::Info, format!("m{}", i))).unwrap();
    }

    assert!(wait_for(Duration::from_secs(2), || !batches.lock().unwrap().is_empty()));
    assert_eq!(batches.lock().unwrap()[0].len(), 5);
    provider.shutdown();
}

#[test]
fn time_trigger_flushes_partial_batch() {
    let (sink, batches, _) = RecordingSink::new();
    let provider =
        AsyncProvider::start("rec", sink, &engine(100, Duration::from_millis(50))).unwrap();

    for i in 0..3 {
        provider.log(&LogEntry::new(Level::Info, format!("m{}", i))).unwrap();
    }

    assert!(wait_for(Duration::from_secs(2), || !batches.lock().unwrap().is_empty()));
    assert_eq!(batches.lock().unwrap()[0], vec!["m0", "m1", "m2"]);
    provider.shutdown();
}

#[test]
fn shutdown_drains_everything_and_closes_sink() {
    let (sink, batches, closed) = RecordingSink::new();
    let provider = AsyncProvider::start("rec", sink, &engine(10, Duration::from_secs(60))).unwrap();

    for i in 0..25 {
        provider.log(&LogEntry::new(Level::Info, format!("m{}", i))).unwrap();
    }
    provider.shutdown();

    let recorded = batches.lock().unwrap().clone();
    assert!(recorded.len() >= 3);
    assert!(recorded.iter().all(|batch| batch.len() <= 10));
    let expected: Vec<String> = (0..25).map(|i| format!("m{}", i)).collect();
    assert_eq!(recorded.concat(), expected);

    assert_eq!(provider.state(), WorkerState::Stopped);
    assert!(closed.load(Ordering::SeqCst));

    let stats = provider.stats();
    assert_eq!(stats.enqueued, 25);
    assert_eq!(stats.flushed_entries, 25);
    assert_eq!(stats.in_flight(), 0);
}

#[test]
fn burst_after_idle_batches_ten_ten_five() {
    let (sink, batches, _) = RecordingSink::new();
    let mut config = engine(10, Duration::from_millis(100));
    config.poll_interval = Duration::from_millis(100);
    let provider = AsyncProvider::start("rec", sink, &config).unwrap();

    // Idle for longer than the flush interval before the burst arrives.
    thread::sleep(Duration::from_millis(250));
    for i in 0..25 {
        provider.log(&LogEntry::new(Level::Info, format!("m{}", i))).unwrap();
    }
    provider.shutdown();

    let recorded = batches.lock().unwrap().clone();
    let sizes: Vec<usize> = recorded.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    let expected: Vec<String> = (0..25).map(|i| format!("m{}", i)).collect();
    assert_eq!(recorded.concat(), expected);
}

#[test]
fn concurrent_producers_deliver_each_entry_once() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 500;

    let (sink, batches, _) = RecordingSink::new();
    let provider = AsyncProvider::start("rec", sink, &engine(64, Duration::from_millis(20))).unwrap();
    let dispatcher = Arc::new(Dispatcher::new(Level::Trace).with_provider(provider));

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    assert_eq!(dispatcher.log_message(Level::Info, format!("{}:{}", p, i)), 1);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    dispatcher.shutdown();

    let lines = flattened(&batches);
    assert_eq!(lines.len(), PRODUCERS * PER_PRODUCER);
    let unique: HashSet<&String> = lines.iter().collect();
    assert_eq!(unique.len(), lines.len());

    // Each producer's own entries stay in the order it logged them.
    let mut next = vec![0usize; PRODUCERS];
    for line in &lines {
        let (p, i) = line.split_once(':').unwrap();
        let p: usize = p.parse().unwrap();
        let i: usize = i.parse().unwrap();
        assert_eq!(i, next[p]);
        next[p] += 1;
    }
}

#[test]
fn shutdown_is_idempotent_and_rejects_later_logs() {
    let (sink, batches, _) = RecordingSink::new();
    let provider = AsyncProvider::start("rec", sink, &engine(10, Duration::from_millis(20))).unwrap();

    provider.log(&LogEntry::new(Level::Info, "before")).unwrap();
    provider.shutdown();
    provider.shutdown();

    assert_eq!(
        provider.log(&LogEntry::new(Level::Info, "after")),
        Err(LogError::QueueClosed)
    );
    assert_eq!(flattened(&batches), vec!["before"]);
    assert_eq!(provider.stats().dropped_closed, 1);
    assert!(provider.flush());
}

#[test]
fn concurrent_shutdown_callers_both_wait() {
    let (sink, batches, _) = RecordingSink::new();
    let provider = Arc::new(
        AsyncProvider::start("rec", sink, &engine(10, Duration::from_secs(60))).unwrap(),
    );
    for i in 0..50 {
        provider.log(&LogEntry::new(Level::Info, format!("m{}", i))).unwrap();
    }

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let provider = provider.clone();
            let batches = batches.clone();
            thread::spawn(move || {
                provider.shutdown();
                assert_eq!(provider.state(), WorkerState::Stopped);
                assert_eq!(flattened(&batches).len(), 50);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn flush_delivers_pending_entries() {
    let (sink, batches, _) = RecordingSink::new();
    let provider = AsyncProvider::start("rec", sink, &engine(100, Duration::from_secs(60))).unwrap();

    for i in 0..5 {
        provider.log(&LogEntry::new(Level::Info, format!("m{}", i))).unwrap();
    }
    assert!(provider.flush());
    assert_eq!(flattened(&batches).len(), 5);
    assert_eq!(provider.state(), WorkerState::Running);
    provider.shutdown();
}

#[test]
fn flush_with_nothing_queued_returns_promptly() {
    let (sink, _, _) = RecordingSink::new();
    let mut config = engine(100, Duration::from_secs(60));
    config.poll_interval = Duration::from_secs(2);
    let provider = AsyncProvider::start("rec", sink, &config).unwrap();

    let start = Instant::now();
    assert!(provider.flush());
    assert!(start.elapsed() < Duration::from_secs(1));
    provider.shutdown();
}

#[test]
fn failing_batch_is_counted_and_worker_continues() {
    let (sink, batches, _) = RecordingSink::new();
    let provider = AsyncProvider::start("rec", sink, &engine(1, Duration::from_secs(60))).unwrap();

    provider.log(&LogEntry::new(Level::Error, "bad")).unwrap();
    assert!(provider.flush());
    provider.log(&LogEntry::new(Level::Info, "good")).unwrap();
    provider.shutdown();

    assert_eq!(flattened(&batches), vec!["good"]);
    let stats = provider.stats();
    assert_eq!(stats.failed_batches, 1);
    assert_eq!(stats.lost_entries, 1);
    assert_eq!(stats.flushed_entries, 1);
}

#[test]
fn panicking_sink_does_not_kill_worker() {
    let (sink, batches, closed) = RecordingSink::new();
    let provider = AsyncProvider::start("rec", sink, &engine(1, Duration::from_secs(60))).unwrap();

    provider.log(&LogEntry::new(Level::Info, "boom")).unwrap();
    assert!(provider.flush());
    provider.log(&LogEntry::new(Level::Info, "still here")).unwrap();
    assert!(provider.flush());
    assert_eq!(provider.state(), WorkerState::Running);
    provider.shutdown();

    assert_eq!(flattened(&batches), vec!["still here"]);
    assert_eq!(provider.stats().failed_batches, 1);
    assert!(closed.load(Ordering::SeqCst));
}

#[test]
fn full_queue_rejects_without_blocking() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let gate = Arc::new((Mutex::new(false), Condvar::new()));
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = GatedSink {
        entered: entered_tx,
        gate: gate.clone(),
        delivered: delivered.clone(),
    };

    let mut config = engine(1, Duration::from_secs(60));
    config.queue_capacity = 2;
    config.push_timeout = Duration::ZERO;
    let provider = AsyncProvider::start("gated", sink, &config).unwrap();

    provider.log(&LogEntry::new(Level::Info, "first")).unwrap();
    entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    provider.log(&LogEntry::new(Level::Info, "second")).unwrap();
    provider.log(&LogEntry::new(Level::Info, "third")).unwrap();
    let start = Instant::now();
    assert_eq!(
        provider.log(&LogEntry::new(Level::Info, "fourth")),
        Err(LogError::QueueFull)
    );
    assert!(start.elapsed() < Duration::from_millis(500));

    {
        let (lock, cvar) = &*gate;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }
    provider.shutdown();

    assert_eq!(*delivered.lock().unwrap(), vec!["first", "second", "third"]);
    let stats = provider.stats();
    assert_eq!(stats.dropped_full, 1);
    assert_eq!(stats.enqueued, 3);
}

#[test]
fn dispatcher_filters_below_min_level() {
    let (sink, batches, _) = RecordingSink::new();
    let provider = AsyncProvider::start("rec", sink, &engine(10, Duration::from_millis(20))).unwrap();
    let dispatcher = Dispatcher::new(Level::Warn).with_provider(provider);

    assert_eq!(dispatcher.log_message(Level::Debug, "quiet"), 0);
    assert_eq!(dispatcher.log_message(Level::Error, "loud"), 1);
    dispatcher.shutdown();

    assert_eq!(flattened(&batches), vec!["loud"]);
}

#[test]
fn ui_provider_posts_batches_and_detaches_on_shutdown() {
    let (sink, rx) = UiSink::channel(InsertMode::Prepend);
    let connection = sink.connection();
    let provider = AsyncProvider::start("ui", sink, &engine(10, Duration::from_secs(60))).unwrap();

    provider.log(&LogEntry::new(Level::Warn, "shown")).unwrap();
    assert!(provider.flush());

    let batch = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(batch.mode, InsertMode::Prepend);
    assert_eq!(batch.lines.len(), 1);
    assert!(batch.lines[0].contains("shown"));

    assert!(connection.is_connected());
    provider.shutdown();
    assert!(!connection.is_connected());
    assert_eq!(provider.state(), WorkerState::Stopped);
}

#[test]
fn file_provider_rotates_and_keeps_every_line() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("app.log");
    let sink = FileSink::open(&FileSinkConfig::new(&path).with_max_size(200)).unwrap();
    let provider = AsyncProvider::start("file", sink, &engine(1, Duration::from_secs(60))).unwrap();

    for i in 0..20 {
        provider
            .log(&LogEntry::new(Level::Info, format!("entry-{:02}", i)))
            .unwrap();
    }
    provider.shutdown();

    let files: Vec<_> = fs::read_dir(temp.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert!(files.len() > 1, "expected rotated backups, got {:?}", files);

    let mut seen = Vec::new();
    for file in &files {
        for line in fs::read_to_string(file).unwrap().lines() {
            assert!(line.contains("[INFO]"));
            let tag = line.rsplit(' ').next().unwrap().to_string();
            seen.push(tag);
        }
    }
    seen.sort();
    let expected: Vec<String> = (0..20).map(|i| format!("entry-{:02}", i)).collect();
    assert_eq!(seen, expected);
}
