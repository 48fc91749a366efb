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

//! Error types for the logging engine.

use std::path::PathBuf;
use thiserror::Error;

/// Producer-facing errors. None of these are fatal; the entry is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    /// The queue stayed full for the whole push timeout
    #[error("queue full: entry dropped")]
    QueueFull,

    /// The provider is shut down (or shutting down)
    #[error("queue closed: entry dropped")]
    QueueClosed,

    /// The worker thread could not be started
    #[error("failed to spawn worker thread for {provider}: {reason}")]
    Spawn { provider: String, reason: String },
}

/// Worker-local errors raised by a sink while flushing a batch.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Open/write/rename failure on the file sink
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every candidate backup name is already taken
    #[error("rotation refused: no free backup name for {0}")]
    RotationCollision(PathBuf),

    /// Transport failure talking to the remote collector
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote collector answered with a non-success status
    #[error("remote collector returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The UI target was disconnected or its receiver went away
    #[error("UI target unavailable")]
    TargetUnavailable,

    /// Write attempted after the sink was closed
    #[error("sink is closed")]
    Closed,

    /// The sink panicked during flush; the worker survived it
    #[error("sink panicked: {0}")]
    Panicked(String),
}

impl SinkError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SinkError::Io {
            path: path.into(),
            source,
        }
    }

    /// Expected while tearing down a UI; not worth a warning.
    pub fn is_quiet(&self) -> bool {
        matches!(self, SinkError::TargetUnavailable)
    }
}
