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

//! UI sink: hands each batch to whatever thread owns the UI surface.
//!
//! The worker never touches UI state. It posts a `UiBatch` message through a
//! `UiTarget` (an `mpsc::Sender` by default) and the UI thread applies it to
//! a `UiLogView` on its own schedule. The provider disconnects the target
//! before joining the worker, so no new update starts once a window is being
//! torn down.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::entry::LogEntry;
use crate::error::SinkError;
use crate::sink::{Detach, Sink};

/// Where a batch goes in the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// After existing lines (oldest at the top).
    Append,
    /// Before existing lines (newest group at the top, in order within the group).
    Prepend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiBatch {
    pub lines: Vec<String>,
    pub mode: InsertMode,
}

/// Cross-thread hop into the UI execution context.
///
/// `post` runs on the worker thread without any lock held, so a target may
/// block (a full `SyncSender`, say) without stalling `disconnect`.
pub trait UiTarget: Send + Sync {
    fn post(&self, batch: UiBatch) -> Result<(), SinkError>;
}

impl UiTarget for Sender<UiBatch> {
    fn post(&self, batch: UiBatch) -> Result<(), SinkError> {
        self.send(batch).map_err(|_| SinkError::TargetUnavailable)
    }
}

impl UiTarget for SyncSender<UiBatch> {
    fn post(&self, batch: UiBatch) -> Result<(), SinkError> {
        self.send(batch).map_err(|_| SinkError::TargetUnavailable)
    }
}

/// Shared, disconnectable reference to the UI target.
#[derive(Clone)]
pub struct UiConnection {
    target: Arc<Mutex<Option<Arc<dyn UiTarget>>>>,
}

impl UiConnection {
    pub fn new(target: impl UiTarget + 'static) -> Self {
        Self {
            target: Arc::new(Mutex::new(Some(Arc::new(target)))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<dyn UiTarget>>> {
        self.target.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the target. A post already in progress still completes, but no
    /// new one starts.
    pub fn disconnect(&self) {
        self.lock().take();
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    fn post(&self, batch: UiBatch) -> Result<(), SinkError> {
        let Some(current) = self.lock().clone() else {
            return Err(SinkError::TargetUnavailable);
        };
        let result = current.post(batch);
        if result.is_err() {
            // The receiving side is gone for good.
            self.lock().take();
        }
        result
    }
}

impl Detach for UiConnection {
    fn detach(&self) {
        self.disconnect();
    }
}

pub struct UiSink {
    connection: UiConnection,
    mode: InsertMode,
}

impl UiSink {
    pub fn new(target: impl UiTarget + 'static, mode: InsertMode) -> Self {
        Self {
            connection: UiConnection::new(target),
            mode,
        }
    }

    /// Sink plus the receiver the UI thread drains.
    pub fn channel(mode: InsertMode) -> (Self, Receiver<UiBatch>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx, mode), rx)
    }

    pub fn connection(&self) -> UiConnection {
        self.connection.clone()
    }
}

impl Sink for UiSink {
    fn format(entry: &LogEntry) -> String {
        entry.to_text_line()
    }

    fn flush(&mut self, lines: &[String]) -> Result<(), SinkError> {
        self.connection.post(UiBatch {
            lines: lines.to_vec(),
            mode: self.mode,
        })
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.connection.disconnect();
        Ok(())
    }

    fn detacher(&self) -> Option<Arc<dyn Detach>> {
        Some(Arc::new(self.connection.clone()))
    }
}

/// Line buffer living on the UI thread, capped at `max_lines`.
#[derive(Debug)]
pub struct UiLogView {
    lines: VecDeque<String>,
    max_lines: usize,
}

impl UiLogView {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines: max_lines.max(1),
        }
    }

    pub fn apply(&mut self, batch: UiBatch) {
        match batch.mode {
            InsertMode::Append => {
                self.lines.extend(batch.lines);
                while self.lines.len() > self.max_lines {
                    self.lines.pop_front();
                }
            }
            InsertMode::Prepend => {
                for line in batch.lines.into_iter().rev() {
                    self.lines.push_front(line);
                }
                while self.lines.len() > self.max_lines {
                    self.lines.pop_back();
                }
            }
        }
    }

    /// Apply every batch already waiting on `rx`; returns the number of lines received.
    pub fn drain_from(&mut self, rx: &Receiver<UiBatch>) -> usize {
        let mut received = 0;
        for batch in rx.try_iter() {
            received += batch.lines.len();
            self.apply(batch);
        }
        received
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
