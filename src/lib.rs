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

//! Asynchronous batching log providers.
//!
//! Producers call [`Dispatcher::log`]; each registered [`AsyncProvider`]
//! formats the entry, pushes it onto its own bounded queue and returns. A
//! dedicated worker thread per provider batches the queued lines by size or
//! time and hands them to a [`Sink`]: a rotating file, a UI view fed over a
//! channel, or an HTTP collector.
//!
//! ```no_run
//! use drainlog::{AsyncProvider, Dispatcher, EngineConfig, FileSink, FileSinkConfig, Level};
//!
//! fn main() -> anyhow::Result<()> {
//!     let engine = EngineConfig::default();
//!     let sink = FileSink::open(&FileSinkConfig::new("logs/app.log").with_max_size(1 << 20))?;
//!
//!     let mut dispatcher = Dispatcher::new(Level::Info);
//!     dispatcher.add(AsyncProvider::start("file", sink, &engine)?);
//!
//!     dispatcher.log_message(Level::Info, "service started");
//!     dispatcher.shutdown();
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod entry;
pub mod error;
pub mod provider;
pub mod queue;
pub mod rotation;
pub mod sink;
pub mod stats;
pub mod worker;

pub use config::{Config, EngineConfig, FileSinkConfig, RemoteSinkConfig};
pub use dispatcher::Dispatcher;
pub use entry::{Level, LogEntry};
pub use error::{LogError, SinkError};
pub use provider::{AsyncProvider, Provider};
pub use queue::{BoundedQueue, PopResult};
pub use rotation::{FileRotationManager, RotationState};
pub use sink::{FileSink, InsertMode, RemoteSink, Sink, UiBatch, UiLogView, UiSink};
pub use stats::ProviderStats;
pub use worker::WorkerState;
