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

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use drainlog::Level;

#[derive(Parser)]
#[command(name = "drainlog")]
#[command(about = "Batching log shipper: rotating files, stdout echo and HTTP collectors")]
#[command(version)]
pub struct Cli {
    /// Path to config file (defaults to drainlog.toml in current directory if it exists)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Sink and engine overrides shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct SinkArgs {
    /// Write entries to this file, rotating it by size
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Rotate the file once it reaches this many bytes (0 disables rotation)
    #[arg(long)]
    pub max_size: Option<u64>,

    /// Keep at most this many rotated backups
    #[arg(long)]
    pub max_backups: Option<usize>,

    /// POST batches as newline-delimited CLEF to this collector URL
    #[arg(long)]
    pub remote: Option<String>,

    /// API key sent to the collector
    #[arg(long)]
    pub api_key: Option<String>,

    /// Attempts per remote batch before it is dropped
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Echo flushed lines to stdout
    #[arg(long)]
    pub echo: bool,

    /// Entries per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Flush interval in milliseconds
    #[arg(long)]
    pub flush_interval_ms: Option<u64>,

    /// Queue capacity per provider
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// How long a producer waits on a full queue, in milliseconds
    #[arg(long)]
    pub push_timeout_ms: Option<u64>,

    /// Entries below this level are discarded
    #[arg(long)]
    pub min_level: Option<Level>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read lines from stdin and log each one
    Pipe {
        /// Level assigned to every piped line
        #[arg(long, default_value = "info")]
        level: Level,

        #[command(flatten)]
        sinks: SinkArgs,
    },

    /// Generate synthetic entries from several threads and report delivery stats
    Emit {
        /// Number of producer threads
        #[arg(long, default_value_t = 4)]
        producers: usize,

        /// Entries per producer
        #[arg(long, default_value_t = 1000)]
        count: usize,

        /// Level of the generated entries
        #[arg(long, default_value = "info")]
        level: Level,

        /// Message prefix of the generated entries
        #[arg(long, default_value = "synthetic entry")]
        message: String,

        #[command(flatten)]
        sinks: SinkArgs,
    },
}
