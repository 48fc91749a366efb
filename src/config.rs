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

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::entry::Level;

/// Configuration file structure
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Maximum number of formatted entries waiting per provider
    pub queue_capacity: Option<usize>,

    /// How long a producer may wait on a full queue (0 = drop immediately)
    pub push_timeout_ms: Option<u64>,

    /// Flush once this many entries are batched
    pub max_batch_count: Option<usize>,

    /// Flush at least this often while entries are waiting
    pub flush_interval_ms: Option<u64>,

    /// Worker wake-up granularity
    pub poll_interval_ms: Option<u64>,

    /// Upper bound on an explicit flush() wait
    pub flush_timeout_ms: Option<u64>,

    /// Entries below this level are not dispatched
    pub min_level: Option<Level>,

    /// Level used for piped lines when the CLI does not set one
    pub default_level: Option<Level>,

    /// Echo flushed lines to stdout through the UI sink
    pub echo: Option<bool>,

    pub file: Option<FileSection>,

    pub remote: Option<RemoteSection>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileSection {
    /// Active log file; rotated backups are written next to it
    pub path: Option<PathBuf>,

    /// Rotate once the active file reaches this many bytes (0 = never)
    pub max_size: Option<u64>,

    /// Keep at most this many rotated backups
    pub max_backups: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct RemoteSection {
    /// Collector endpoint receiving newline-delimited CLEF
    pub url: Option<String>,

    pub api_key: Option<String>,

    /// Attempts per batch before it is dropped (1 = no retry)
    pub max_attempts: Option<u32>,

    pub retry_backoff_ms: Option<u64>,

    pub timeout_ms: Option<u64>,
}

/// Immutable engine settings shared by every provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub queue_capacity: usize,
    pub push_timeout: Duration,
    pub max_batch_count: usize,
    pub flush_interval: Duration,
    pub poll_interval: Duration,
    pub flush_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            push_timeout: Duration::from_millis(DEFAULT_PUSH_TIMEOUT_MS),
            max_batch_count: DEFAULT_MAX_BATCH_COUNT,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            flush_timeout: Duration::from_millis(DEFAULT_FLUSH_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSinkConfig {
    pub path: PathBuf,
    pub max_size: u64,
    pub max_backups: Option<usize>,
}

impl FileSinkConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size: DEFAULT_MAX_FILE_SIZE,
            max_backups: None,
        }
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_max_backups(mut self, max_backups: Option<usize>) -> Self {
        self.max_backups = max_backups;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSinkConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub timeout: Duration,
}

impl RemoteSinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            max_attempts: DEFAULT_REMOTE_MAX_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_REMOTE_RETRY_BACKOFF_MS),
            timeout: Duration::from_millis(DEFAULT_REMOTE_TIMEOUT_MS),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }
}

impl Config {
    /// Load config from a file, or return default if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Merge this config with CLI args, where CLI args take precedence
    pub fn merge_with_cli<T>(&self, cli_value: T, config_value: Option<T>, default_value: T) -> T
    where
        T: PartialEq + Clone,
    {
        if cli_value != default_value {
            cli_value
        } else if let Some(config_val) = config_value {
            config_val
        } else {
            default_value
        }
    }

    /// Validate and freeze the engine settings.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            push_timeout: self
                .push_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.push_timeout),
            max_batch_count: self.max_batch_count.unwrap_or(defaults.max_batch_count),
            flush_interval: self
                .flush_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.flush_interval),
            poll_interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            flush_timeout: self
                .flush_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.flush_timeout),
        };

        if engine.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be at least 1");
        }
        if engine.max_batch_count == 0 {
            anyhow::bail!("max_batch_count must be at least 1");
        }
        if engine.poll_interval.is_zero() {
            anyhow::bail!("poll_interval_ms must be greater than 0");
        }

        Ok(engine)
    }

    /// File sink settings, if a target path is configured.
    pub fn file_sink(&self) -> Option<FileSinkConfig> {
        let section = self.file.as_ref()?;
        let path = section.path.clone()?;
        Some(
            FileSinkConfig::new(path)
                .with_max_size(section.max_size.unwrap_or(DEFAULT_MAX_FILE_SIZE))
                .with_max_backups(section.max_backups),
        )
    }

    /// Remote sink settings, if an endpoint is configured.
    pub fn remote_sink(&self) -> Result<Option<RemoteSinkConfig>> {
        let Some(section) = self.remote.as_ref() else {
            return Ok(None);
        };
        let Some(url) = section.url.clone() else {
            return Ok(None);
        };

        let max_attempts = section.max_attempts.unwrap_or(DEFAULT_REMOTE_MAX_ATTEMPTS);
        if max_attempts == 0 {
            anyhow::bail!("remote.max_attempts must be at least 1");
        }

        let mut remote = RemoteSinkConfig::new(url)
            .with_api_key(section.api_key.clone())
            .with_max_attempts(max_attempts);
        if let Some(ms) = section.retry_backoff_ms {
            remote = remote.with_retry_backoff(Duration::from_millis(ms));
        }
        if let Some(ms) = section.timeout_ms {
            remote.timeout = Duration::from_millis(ms);
        }
        Ok(Some(remote))
    }

    pub fn min_level(&self) -> Level {
        self.min_level.unwrap_or(Level::Trace)
    }

    /// Mutable access to the file section, creating it on first use.
    pub fn file_section_mut(&mut self) -> &mut FileSection {
        self.file.get_or_insert_with(FileSection::default)
    }

    /// Mutable access to the remote section, creating it on first use.
    pub fn remote_section_mut(&mut self) -> &mut RemoteSection {
        self.remote.get_or_insert_with(RemoteSection::default)
    }
}
