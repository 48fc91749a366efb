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

//! Sink adapters: the slow side of a provider.
//!
//! A sink is owned by its provider's worker thread. `format` runs on the
//! producer thread when an entry is logged; `flush` and `close` only ever run
//! on the worker, one call at a time.

pub mod file;
pub mod remote;
pub mod ui;

use std::sync::Arc;

use crate::entry::LogEntry;
use crate::error::SinkError;

pub use file::FileSink;
pub use remote::RemoteSink;
pub use ui::{InsertMode, UiBatch, UiConnection, UiLogView, UiSink, UiTarget};

/// Cuts a sink off from an external target from outside the worker thread.
pub trait Detach: Send + Sync {
    fn detach(&self);
}

pub trait Sink: Send + 'static {
    /// Render one entry as the line this sink stores or ships.
    fn format(entry: &LogEntry) -> String
    where
        Self: Sized;

    /// Deliver one batch, in order. A failed batch is not retried by the caller.
    fn flush(&mut self, lines: &[String]) -> Result<(), SinkError>;

    /// Release resources after the final drain flush.
    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Handle used at shutdown to disconnect the target before joining the worker.
    fn detacher(&self) -> Option<Arc<dyn Detach>> {
        None
    }
}
