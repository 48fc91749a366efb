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

//! Rotating text file sink.

use crate::config::FileSinkConfig;
use crate::entry::LogEntry;
use crate::error::SinkError;
use crate::rotation::FileRotationManager;
use crate::sink::Sink;

pub struct FileSink {
    rotation: FileRotationManager,
}

impl FileSink {
    pub fn open(config: &FileSinkConfig) -> Result<Self, SinkError> {
        Ok(Self {
            rotation: FileRotationManager::open(config)?,
        })
    }

    pub fn rotation(&self) -> &FileRotationManager {
        &self.rotation
    }
}

impl Sink for FileSink {
    fn format(entry: &LogEntry) -> String {
        entry.to_text_line()
    }

    fn flush(&mut self, lines: &[String]) -> Result<(), SinkError> {
        for line in lines {
            self.rotation.write_line(line)?;
        }
        self.rotation.flush()?;

        // The batch is on disk at this point; a refused rotation is retried
        // on the next flush and must not count the batch as lost.
        if let Err(e) = self.rotation.evaluate_rotation() {
            tracing::warn!(
                file = %self.rotation.path().display(),
                error = %e,
                "log rotation failed"
            );
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.rotation.close()
    }
}
