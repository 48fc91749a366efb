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

//! Log entry record and the line formats derived from it.

use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: Cell<u64> = const { Cell::new(0) };
}

/// Small process-unique id for the calling thread, assigned on first use.
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| {
        if id.get() == 0 {
            id.set(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
        }
        id.get()
    })
}

/// Severity of a log entry, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Upper-case label used in file lines.
    pub fn label(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }

    /// Level name understood by CLEF collectors.
    pub fn clef_name(&self) -> &'static str {
        match self {
            Level::Trace => "Verbose",
            Level::Debug => "Debug",
            Level::Info => "Information",
            Level::Warn => "Warning",
            Level::Error => "Error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" | "verbose" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" | "information" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("Invalid log level: {}", other)),
        }
    }
}

/// A single log record. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    timestamp: DateTime<Local>,
    level: Level,
    thread_id: u64,
    message: String,
}

impl LogEntry {
    /// Stamp a new entry with the current time and calling thread.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self::at(Local::now(), level, current_thread_id(), message)
    }

    pub fn at(
        timestamp: DateTime<Local>,
        level: Level,
        thread_id: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            level,
            thread_id,
            message: message.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `[yyyy-mm-dd hh:mm:ss.fff] [LEVEL] [Thread:id] message`, no newline.
    pub fn to_text_line(&self) -> String {
        format!(
            "[{}] [{}] [Thread:{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level.label(),
            self.thread_id,
            self.message
        )
    }

    /// One compact CLEF JSON object, no newline.
    pub fn to_clef_line(&self) -> String {
        let event = ClefEvent {
            timestamp: self
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, false),
            level: self.level.clef_name(),
            message_template: escape_template(&self.message),
            properties: ClefProperties {
                thread_id: self.thread_id,
            },
        };
        // Only strings and integers go in, so serialization cannot fail.
        serde_json::to_string(&event).unwrap_or_default()
    }
}

#[derive(Serialize)]
struct ClefEvent<'a> {
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Level")]
    level: &'a str,
    #[serde(rename = "MessageTemplate")]
    message_template: String,
    #[serde(rename = "Properties")]
    properties: ClefProperties,
}

#[derive(Serialize)]
struct ClefProperties {
    #[serde(rename = "ThreadId")]
    thread_id: u64,
}

/// Double braces so collectors treat the message as literal text.
fn escape_template(message: &str) -> String {
    message.replace('{', "{{").replace('}', "}}")
}
