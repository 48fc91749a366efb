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

//! Size-based rotation of the active log file.
//!
//! The manager is `Open` while it accepts writes. When an evaluation finds
//! the file at or above `max_size` it moves to `Rotating`, renames the file
//! to `<stem>.<yyyyMMdd-HHmmss><ext>` next to it, reopens a fresh file at the
//! original path and returns to `Open`. Evaluation happens after writes, so a
//! file may end up slightly larger than `max_size`.
//!
//! Two rotations in the same second would produce the same backup name; the
//! second one gets a `.<n>` suffix instead of overwriting the first.

use chrono::{DateTime, Local};
use fs2::FileExt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::FileSinkConfig;
use crate::constants::MAX_BACKUP_SUFFIX;
use crate::error::SinkError;

// Matches the part of a backup name between `<stem>.` and `<ext>`.
static BACKUP_STAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{8}-\d{6})(?:\.(\d+))?$").expect("valid backup stamp pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    Open,
    Rotating,
    Closed,
}

pub struct FileRotationManager {
    path: PathBuf,
    max_size: u64,
    max_backups: Option<usize>,
    current_size: u64,
    writer: Option<BufWriter<File>>,
    state: RotationState,
}

impl FileRotationManager {
    /// Open (or create) the active file and pick up its current size.
    pub fn open(config: &FileSinkConfig) -> Result<Self, SinkError> {
        let mut manager = Self {
            path: config.path.clone(),
            max_size: config.max_size,
            max_backups: config.max_backups,
            current_size: 0,
            writer: None,
            state: RotationState::Open,
        };
        manager.reopen()?;
        Ok(manager)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> RotationState {
        self.state
    }

    /// Bytes written to the active file, including what was there at open.
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    fn reopen(&mut self) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| SinkError::io(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SinkError::io(&self.path, e))?;
        file.try_lock_exclusive()
            .map_err(|e| SinkError::io(&self.path, e))?;
        let size = file
            .metadata()
            .map_err(|e| SinkError::io(&self.path, e))?
            .len();

        self.writer = Some(BufWriter::with_capacity(8192, file));
        self.current_size = size;
        Ok(())
    }

    /// Append `line` plus a newline.
    pub fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        if self.state == RotationState::Closed {
            return Err(SinkError::Closed);
        }
        if self.writer.is_none() {
            self.reopen()?;
        }

        let Some(writer) = self.writer.as_mut() else {
            return Err(SinkError::Closed);
        };
        let written = writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"));

        match written {
            Ok(()) => {
                self.current_size += line.len() as u64 + 1;
                Ok(())
            }
            Err(e) => {
                // The next write reopens and re-measures.
                self.discard_writer();
                Err(SinkError::io(&self.path, e))
            }
        }
    }

    /// Release the handle without writing out whatever is still buffered, so a
    /// failed write never leaves a partial line behind.
    fn discard_writer(&mut self) {
        if let Some(writer) = self.writer.take() {
            let (_file, _unwritten) = writer.into_parts();
        }
    }

    /// Push buffered bytes to the OS.
    pub fn flush(&mut self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                self.discard_writer();
                return Err(SinkError::io(&self.path, e));
            }
        }
        Ok(())
    }

    /// Rotate if the active file has reached `max_size`. Returns the backup path.
    pub fn evaluate_rotation(&mut self) -> Result<Option<PathBuf>, SinkError> {
        self.evaluate_rotation_at(Local::now())
    }

    pub fn evaluate_rotation_at(
        &mut self,
        now: DateTime<Local>,
    ) -> Result<Option<PathBuf>, SinkError> {
        if self.state != RotationState::Open
            || self.max_size == 0
            || self.current_size < self.max_size
        {
            return Ok(None);
        }

        // Resolve the name first so a collision leaves the active file alone.
        let backup = self.backup_path_at(now)?;
        self.rotate_to(&backup)?;

        tracing::info!(
            active = %self.path.display(),
            backup = %backup.display(),
            "rotated log file"
        );
        self.prune_backups();
        Ok(Some(backup))
    }

    /// Move the active file to `backup` and start a fresh one. If the rename
    /// fails the original file is reopened; if the reopen fails the next
    /// write retries it.
    fn rotate_to(&mut self, backup: &Path) -> Result<(), SinkError> {
        self.state = RotationState::Rotating;
        let flushed = self.flush();
        self.discard_writer();

        let renamed = match flushed {
            Ok(()) => fs::rename(&self.path, backup).map_err(|e| SinkError::io(backup, e)),
            Err(e) => Err(e),
        };
        let reopened = self.reopen();
        self.state = RotationState::Open;

        renamed?;
        reopened
    }

    /// First free backup name for a rotation at `now`.
    pub fn backup_path_at(&self, now: DateTime<Local>) -> Result<PathBuf, SinkError> {
        let (stem, ext) = split_name(&self.path);
        let stamp = now.format("%Y%m%d-%H%M%S");
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));

        let candidate = dir.join(format!("{}.{}{}", stem, stamp, ext));
        if !candidate.exists() {
            return Ok(candidate);
        }
        for n in 1..=MAX_BACKUP_SUFFIX {
            let candidate = dir.join(format!("{}.{}.{}{}", stem, stamp, n, ext));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }

        Err(SinkError::RotationCollision(self.path.clone()))
    }

    /// Existing backups of this file, oldest first.
    pub fn list_backups(&self) -> Vec<PathBuf> {
        let (stem, ext) = split_name(&self.path);
        let prefix = format!("{}.", stem);
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut backups: Vec<(String, u32, PathBuf)> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?;
                let middle = name.strip_prefix(&prefix)?.strip_suffix(ext.as_str())?;
                let captures = BACKUP_STAMP.captures(middle)?;
                let stamp = captures.get(1)?.as_str().to_string();
                let n = captures
                    .get(2)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(0);
                Some((stamp, n, entry.into_path()))
            })
            .collect();

        backups.sort();
        backups.into_iter().map(|(_, _, path)| path).collect()
    }

    fn prune_backups(&self) {
        let Some(keep) = self.max_backups else {
            return;
        };

        let backups = self.list_backups();
        let excess = backups.len().saturating_sub(keep);
        for old in backups.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&old) {
                tracing::warn!(backup = %old.display(), error = %e, "failed to remove old backup");
            }
        }
    }

    /// Flush and release the handle. Further writes fail with `Closed`.
    pub fn close(&mut self) -> Result<(), SinkError> {
        if self.state == RotationState::Closed {
            return Ok(());
        }
        let flushed = self.flush();
        self.writer = None;
        self.state = RotationState::Closed;
        flushed
    }
}

/// `logs/app.log` -> (`app`, `.log`); `logs/app` -> (`app`, ``).
fn split_name(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}
