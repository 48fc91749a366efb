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

//! Broadcast facade over the registered providers.

use crate::entry::{Level, LogEntry};
use crate::provider::Provider;
use crate::stats::ProviderStats;

/// Fans each entry out to every provider. Build it at startup, then share it
/// (`Arc<Dispatcher>`) with producer threads.
pub struct Dispatcher {
    providers: Vec<Box<dyn Provider>>,
    min_level: Level,
}

impl Dispatcher {
    pub fn new(min_level: Level) -> Self {
        Self {
            providers: Vec::new(),
            min_level,
        }
    }

    pub fn add(&mut self, provider: impl Provider + 'static) {
        self.providers.push(Box::new(provider));
    }

    pub fn with_provider(mut self, provider: impl Provider + 'static) -> Self {
        self.add(provider);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn min_level(&self) -> Level {
        self.min_level
    }

    /// Hand `entry` to every provider. Returns how many accepted it; a
    /// rejection only means that provider dropped the entry.
    pub fn log(&self, entry: &LogEntry) -> usize {
        if entry.level() < self.min_level {
            return 0;
        }
        self.providers
            .iter()
            .filter(|provider| provider.log(entry).is_ok())
            .count()
    }

    pub fn log_message(&self, level: Level, message: impl Into<String>) -> usize {
        if level < self.min_level {
            return 0;
        }
        self.log(&LogEntry::new(level, message))
    }

    /// Flush every provider; `true` only if all of them finished in time.
    pub fn flush(&self) -> bool {
        self.providers
            .iter()
            .fold(true, |all, provider| provider.flush() && all)
    }

    /// Drain and stop every provider, in registration order.
    pub fn shutdown(&self) {
        for provider in &self.providers {
            provider.shutdown();
        }
    }

    pub fn stats(&self) -> Vec<(String, ProviderStats)> {
        self.providers
            .iter()
            .map(|provider| (provider.name().to_string(), provider.stats()))
            .collect()
    }
}
