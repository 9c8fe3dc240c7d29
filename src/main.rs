//! AquaFeed host runner.
//!
//! Reads feature vectors (one JSON object per line) from stdin, runs the
//! control tick at `tick_interval_ms`, writes one JSON tick record per line
//! to stdout and logs to stderr.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  stdin reader ──▶ FeatureMailbox ─┐      ┌─▶ LogEventSink     │
//! │               └─▶ CommandQueue ───┤      ├─▶ JsonLinesSink    │
//! │                                   ▼      │                     │
//! │  ──────────────── Port Trait Boundary ───┼──────────────       │
//! │                                          │                     │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │             Orchestrator (pure logic)                  │    │
//! │  │  Estimator · FSM · PI · Monitor · Validation           │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                          │                                     │
//! │                          ▼ SimActuator                         │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Input lines are either a feature vector
//! (`{"ME":0.1,"RSI":0.6,"POP":0.4,"FLOW":0.5}`) or a command
//! (`{"command":"Reset"}`, `{"command":{"UpdateConfig":{"kp":10.0}}}`).
//! EOF on stdin stops the engine and exits.
//!
//! Usage: `aquafeed [config.json]`. `RUST_LOG` sets the log level and
//! `LOG_FORMAT=json` switches stderr logs to JSON.
#![deny(unused_must_use)]

use std::io::BufRead;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use aquafeed::adapters::config_store::JsonConfigFile;
use aquafeed::adapters::host::HostIo;
use aquafeed::adapters::json_sink::JsonLinesSink;
use aquafeed::adapters::log_sink::LogEventSink;
use aquafeed::adapters::mailbox::{CommandQueue, FeatureMailbox};
use aquafeed::adapters::sim::SimActuator;
use aquafeed::adapters::time::MonotonicClock;
use aquafeed::app::commands::EngineCommand;
use aquafeed::app::service::Orchestrator;
use aquafeed::config::EngineConfig;
use aquafeed::sensors::FeatureVector;

const STATUS_INTERVAL_US: u64 = 10_000_000;

#[derive(Deserialize)]
#[serde(untagged)]
enum InputLine {
    Command { command: EngineCommand },
    Features(FeatureVector),
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = std::env::var("LOG_FORMAT").unwrap_or_default();

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))
}

fn spawn_stdin_reader(
    mailbox: FeatureMailbox,
    commands: CommandQueue,
    clock: MonotonicClock,
) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("stdin-features".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        warn!("stdin: read failed ({e}), closing intake");
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<InputLine>(line) {
                    Ok(InputLine::Features(mut fv)) => {
                        // Freshness is judged on the engine clock.
                        fv.timestamp_us = clock.now_us();
                        mailbox.publish(fv);
                    }
                    Ok(InputLine::Command { command }) => {
                        if let Err(cmd) = commands.try_send(command) {
                            warn!("stdin: command queue full, dropping {cmd:?}");
                        }
                    }
                    Err(e) => warn!("stdin: unparseable line ({e})"),
                }
            }
            mailbox.close();
        })
        .context("spawning stdin reader")
}

fn main() -> Result<()> {
    init_tracing()?;

    info!("AquaFeed v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Config (refuse to start on invalid) ────────────────
    let config_file = std::env::args().nth(1).map(JsonConfigFile::new);
    let mut engine = match &config_file {
        Some(file) => Orchestrator::from_store(file)
            .with_context(|| format!("config {} rejected, refusing to start", file.path().display()))?,
        None => {
            info!("No config path given, using defaults");
            Orchestrator::new(EngineConfig::default()).context("default configuration rejected")?
        }
    };
    let tick = Duration::from_millis(u64::from(engine.config().tick_interval_ms));

    // ── 2. Adapters ───────────────────────────────────────────
    let clock = MonotonicClock::new();
    let mailbox = FeatureMailbox::new();
    let commands = CommandQueue::new();
    let _reader = spawn_stdin_reader(mailbox.clone(), commands.clone(), clock)?;

    let mut io = HostIo::new(mailbox.clone(), SimActuator::new());
    let mut sink = (LogEventSink::new(), JsonLinesSink::new(std::io::stdout().lock()));

    engine.start(clock.now_us(), &mut io, &mut sink);

    // ── 3. Control loop ───────────────────────────────────────
    let mut next_status_us = clock.now_us() + STATUS_INTERVAL_US;
    loop {
        let started = clock.now_us();

        while let Some(cmd) = commands.try_receive() {
            if let Err(e) = engine.handle_command(cmd, clock.now_us(), &mut io, &mut sink) {
                warn!("Command rejected: {e}");
            }
        }

        if mailbox.is_closed() {
            info!("Feature stream closed, stopping");
            if let Err(e) = engine.handle_command(EngineCommand::Stop, clock.now_us(), &mut io, &mut sink) {
                warn!("Stop failed: {e}");
            }
            break;
        }

        engine.tick(clock.now_us(), &mut io, &mut sink);

        let now = clock.now_us();
        if now >= next_status_us {
            let snap = engine.snapshot();
            info!(
                "STATUS | state={:?} | H={:.3} | pwm={:.1}% | fps={} | {}",
                snap.state,
                snap.h,
                snap.pwm,
                snap.frame_rate_hz.map_or("-".into(), |hz| format!("{hz:.1}")),
                snap.counters
            );
            next_status_us = now + STATUS_INTERVAL_US;
        }

        let elapsed = Duration::from_micros(clock.now_us().saturating_sub(started));
        if let Some(rest) = tick.checked_sub(elapsed) {
            thread::sleep(rest);
        }
    }

    // ── 4. Shutdown ───────────────────────────────────────────
    let report = engine.validation_report();
    info!(
        "Validation report: {}",
        serde_json::to_string(&report).context("encoding validation report")?
    );
    info!("Final counters: {}", engine.counters());

    if let Some(file) = &config_file {
        if engine.counters().config_updates > 0 {
            engine
                .save_config(file)
                .with_context(|| format!("saving config to {}", file.path().display()))?;
        }
    }

    Ok(())
}
