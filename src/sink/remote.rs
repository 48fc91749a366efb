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

//! HTTP collector sink: one blocking POST of newline-delimited CLEF per batch.
//!
//! A failed batch is retried up to `max_attempts` times in total (default 1,
//! i.e. no retry) with a fixed backoff, then dropped.

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::thread;
use std::time::Duration;

use crate::config::RemoteSinkConfig;
use crate::constants::{API_KEY_HEADER, CLEF_CONTENT_TYPE};
use crate::entry::LogEntry;
use crate::error::SinkError;
use crate::sink::Sink;

pub struct RemoteSink {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl RemoteSink {
    pub fn new(config: &RemoteSinkConfig) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.url.clone(),
            api_key: config.api_key.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: config.retry_backoff,
        })
    }

    fn post(&self, body: &str) -> Result<(), SinkError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, CLEF_CONTENT_TYPE)
            .body(body.to_owned());
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send()?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(SinkError::Status { status, body });
        }

        Ok(())
    }
}

impl Sink for RemoteSink {
    fn format(entry: &LogEntry) -> String {
        entry.to_clef_line()
    }

    fn flush(&mut self, lines: &[String]) -> Result<(), SinkError> {
        let mut body = lines.join("\n");
        body.push('\n');

        let mut attempt = 1;
        loop {
            match self.post(&body) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_attempts => {
                    tracing::debug!(
                        endpoint = %self.endpoint,
                        attempt,
                        error = %e,
                        "remote flush failed, retrying"
                    );
                    attempt += 1;
                    thread::sleep(self.retry_backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
