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

pub const DEFAULT_CONFIG_FILE: &str = "drainlog.toml";

pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_PUSH_TIMEOUT_MS: u64 = 0;
pub const DEFAULT_MAX_BATCH_COUNT: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Highest `.<n>` suffix tried when a backup name is already taken.
pub const MAX_BACKUP_SUFFIX: u32 = 999;

pub const DEFAULT_REMOTE_MAX_ATTEMPTS: u32 = 1;
pub const DEFAULT_REMOTE_RETRY_BACKOFF_MS: u64 = 500;
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;

pub const CLEF_CONTENT_TYPE: &str = "application/vnd.serilog.clef";
pub const API_KEY_HEADER: &str = "X-Seq-ApiKey";
pub const API_KEY_ENV: &str = "DRAINLOG_REMOTE_API_KEY";

pub const DIAGNOSTICS_ENV: &str = "DRAINLOG_DIAG";
