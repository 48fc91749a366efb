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

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use drainlog::constants::{API_KEY_ENV, DEFAULT_CONFIG_FILE, DIAGNOSTICS_ENV};
use drainlog::{
    AsyncProvider, Config, Dispatcher, FileSink, InsertMode, Level, LogEntry, ProviderStats,
    RemoteSink, UiBatch, UiSink,
};

use crate::cli::{Cli, Commands, SinkArgs};

const PUMP_INTERVAL: Duration = Duration::from_millis(50);

/// Providers wired up from the merged config, plus the echo receiver if any.
struct Pipeline {
    dispatcher: Arc<Dispatcher>,
    echo: Option<Receiver<UiBatch>>,
}

#[derive(Serialize)]
struct EmitReport {
    producers: usize,
    per_producer: usize,
    accepted: usize,
    elapsed_ms: u128,
    providers: BTreeMap<String, ProviderStats>,
}

fn init_diagnostics() {
    let filter =
        EnvFilter::try_from_env(DIAGNOSTICS_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// CLI values win over the config file.
fn apply_sink_args(config: &mut Config, args: &SinkArgs) {
    if let Some(path) = &args.file {
        config.file_section_mut().path = Some(path.clone());
    }
    if let Some(max_size) = args.max_size {
        config.file_section_mut().max_size = Some(max_size);
    }
    if let Some(max_backups) = args.max_backups {
        config.file_section_mut().max_backups = Some(max_backups);
    }
    if let Some(url) = &args.remote {
        config.remote_section_mut().url = Some(url.clone());
    }
    if let Some(api_key) = &args.api_key {
        config.remote_section_mut().api_key = Some(api_key.clone());
    }
    if let Some(max_attempts) = args.max_attempts {
        config.remote_section_mut().max_attempts = Some(max_attempts);
    }

    config.max_batch_count = args.batch_size.or(config.max_batch_count);
    config.flush_interval_ms = args.flush_interval_ms.or(config.flush_interval_ms);
    config.queue_capacity = args.queue_capacity.or(config.queue_capacity);
    config.push_timeout_ms = args.push_timeout_ms.or(config.push_timeout_ms);
    config.min_level = args.min_level.or(config.min_level);
    config.echo = Some(config.merge_with_cli(args.echo, config.echo, false));

    let remote_wants_key = config
        .remote
        .as_ref()
        .is_some_and(|remote| remote.url.is_some() && remote.api_key.is_none());
    if remote_wants_key {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            config.remote_section_mut().api_key = Some(key);
        }
    }
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let engine = config.engine_config()?;
    let mut dispatcher = Dispatcher::new(config.min_level());

    if let Some(file) = config.file_sink() {
        let sink = FileSink::open(&file)
            .with_context(|| format!("Failed to open log file: {}", file.path.display()))?;
        dispatcher.add(AsyncProvider::start("file", sink, &engine)?);
    }

    if let Some(remote) = config.remote_sink()? {
        let sink = RemoteSink::new(&remote).context("Failed to build HTTP client")?;
        dispatcher.add(AsyncProvider::start("remote", sink, &engine)?);
    }

    let echo = if config.echo.unwrap_or(false) {
        let (sink, rx) = UiSink::channel(InsertMode::Append);
        dispatcher.add(AsyncProvider::start("echo", sink, &engine)?);
        Some(rx)
    } else {
        None
    };

    if dispatcher.is_empty() {
        anyhow::bail!(
            "No sinks configured: pass --file, --remote or --echo, or set them in the config file"
        );
    }

    Ok(Pipeline {
        dispatcher: Arc::new(dispatcher),
        echo,
    })
}

fn print_echo(rx: &Receiver<UiBatch>) {
    for batch in rx.try_iter() {
        for line in batch.lines {
            println!("{}", line);
        }
    }
}

/// Act as the echo "UI thread" until `done` reports true or Ctrl+C arrives.
fn pump_until(pipeline: &Pipeline, shutdown_flag: &AtomicBool, mut done: impl FnMut() -> bool) {
    loop {
        match &pipeline.echo {
            Some(rx) => match rx.recv_timeout(PUMP_INTERVAL) {
                Ok(batch) => {
                    for line in batch.lines {
                        println!("{}", line);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
            },
            None => thread::sleep(PUMP_INTERVAL),
        }

        if done() {
            break;
        }
        if shutdown_flag.load(Ordering::Relaxed) {
            eprintln!("Interrupted. Draining queued entries...");
            break;
        }
    }
}

/// Flush, show the last echoed lines, then drain and stop every provider.
fn finish(pipeline: &Pipeline) {
    if !pipeline.dispatcher.flush() {
        eprintln!("Warning: flush timed out; remaining entries are delivered during shutdown");
    }
    if let Some(rx) = &pipeline.echo {
        print_echo(rx);
    }
    pipeline.dispatcher.shutdown();

    for (name, stats) in pipeline.dispatcher.stats() {
        let dropped = stats.dropped_full + stats.dropped_closed;
        if dropped > 0 || stats.lost_entries > 0 {
            eprintln!(
                "Warning: provider {} dropped {} and lost {} entries",
                name, dropped, stats.lost_entries
            );
        }
    }
}

fn cmd_pipe(pipeline: Pipeline, level: Level, shutdown_flag: &AtomicBool) -> Result<()> {
    let dispatcher = pipeline.dispatcher.clone();
    let (done_tx, done_rx) = mpsc::channel::<usize>();

    thread::Builder::new()
        .name("drainlog-stdin".to_string())
        .spawn(move || {
            let mut count = 0;
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                dispatcher.log(&LogEntry::new(level, line));
                count += 1;
            }
            let _ = done_tx.send(count);
        })
        .context("Failed to spawn stdin reader")?;

    pump_until(&pipeline, shutdown_flag, || done_rx.try_recv().is_ok());
    finish(&pipeline);
    Ok(())
}

fn cmd_emit(
    pipeline: Pipeline,
    producers: usize,
    count: usize,
    level: Level,
    message: String,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<()> {
    let start = Instant::now();
    let mut handles = Vec::with_capacity(producers);

    for producer in 0..producers {
        let dispatcher = pipeline.dispatcher.clone();
        let message = message.clone();
        let shutdown_flag = shutdown_flag.clone();
        handles.push(thread::spawn(move || {
            let mut accepted = 0;
            for seq in 0..count {
                if shutdown_flag.load(Ordering::Relaxed) {
                    break;
                }
                accepted += dispatcher.log(&LogEntry::new(
                    level,
                    format!("{} producer={} seq={}", message, producer, seq),
                ));
            }
            accepted
        }));
    }

    pump_until(&pipeline, &shutdown_flag, || {
        handles.iter().all(|handle| handle.is_finished())
    });

    let mut accepted = 0;
    for handle in handles {
        match handle.join() {
            Ok(n) => accepted += n,
            Err(_) => eprintln!("Producer thread panicked"),
        }
    }

    finish(&pipeline);

    let report = EmitReport {
        producers,
        per_producer: count,
        accepted,
        elapsed_ms: start.elapsed().as_millis(),
        providers: pipeline.dispatcher.stats().into_iter().collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> Result<()> {
    init_diagnostics();

    // Ctrl+C stops producers; whatever is already queued is still drained.
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown_flag.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .context("Error setting Ctrl-C handler")?;
    }

    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = Config::load(&config_path)?;

    match cli.command {
        Commands::Pipe { level, sinks } => {
            apply_sink_args(&mut config, &sinks);
            let level = config.merge_with_cli(level, config.default_level, Level::Info);
            let pipeline = build_pipeline(&config)?;
            cmd_pipe(pipeline, level, &shutdown_flag)
        }
        Commands::Emit {
            producers,
            count,
            level,
            message,
            sinks,
        } => {
            apply_sink_args(&mut config, &sinks);
            let pipeline = build_pipeline(&config)?;
            cmd_emit(pipeline, producers, count, level, message, shutdown_flag)
        }
    }
}
