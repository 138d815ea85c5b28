//! `sumo` – dry-run harness for the sumo control loop.
//!
//! Reads JSON sensor lines on stdin, runs the arbitration loop against
//! them, and writes the resulting velocity commands to stdout as JSON
//! lines.  Logs go to stderr.
//!
//! ```text
//! sumo [run]     run the control loop (default)
//! sumo config    print the effective configuration as TOML
//! sumo init      write a default config file if none exists
//! ```
//!
//! Ctrl-C or the end of stdin stops the loop; the last command written is
//! always a stop.

mod config;
mod wire;

use std::io::BufRead;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use sumo_hal::{Clock, MotionPrimitiveExecutor, ShutdownSignal, SystemClock};
use sumo_perception::SensorState;
use sumo_runtime::{CommandGuard, ControlLoop, PriorityArbiter, StrategySelector, init_tracing};
use sumo_types::SumoError;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let _guard = init_tracing("sumo");

    let command = std::env::args().nth(1);
    let result = match command.as_deref() {
        None | Some("run") => config::load().and_then(drive),
        Some("config") => print_config(),
        Some("init") => init_config(),
        Some(other) => Err(SumoError::Config(format!(
            "unknown command `{other}`; expected run, config or init"
        ))),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "sumo exited with an error");
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// run
// ─────────────────────────────────────────────────────────────────────────────

fn drive(cfg: config::Config) -> Result<(), SumoError> {
    let shutdown = ShutdownSignal::new();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let on_interrupt = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || on_interrupt.trigger()) {
        warn!(error = %e, "failed to install Ctrl-C handler; stop with end of input instead");
    }

    // ── Sensor input ──────────────────────────────────────────────────────
    let sensors = Arc::new(SensorState::new());
    spawn_stdin_reader(Arc::clone(&sensors), shutdown.clone());

    // ── Control stack ─────────────────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let executor = MotionPrimitiveExecutor::new(
        Box::new(wire::JsonLineSink::stdout()),
        Arc::clone(&clock),
        shutdown,
    )
    .with_emission_rate(cfg.control.emission_rate_hz);

    let selector = match cfg.seed {
        Some(seed) => {
            info!(seed, "strategy selection seeded");
            StrategySelector::seeded(seed)
        }
        None => StrategySelector::from_entropy(),
    };
    let guard = CommandGuard::standard(cfg.safety.max_linear_speed, cfg.safety.max_angular_speed);
    let arbiter = PriorityArbiter::new(cfg.arbiter, sensors, selector, guard, executor)?;

    let mut control = ControlLoop::new(arbiter, clock, cfg.control.loop_config());
    control.run()
}

/// Feed stdin lines into `sensors` until end of input, then request
/// shutdown.
fn spawn_stdin_reader(sensors: Arc<SensorState>, shutdown: ShutdownSignal) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    wire::ingest_line(&sensors, &line);
                }
                Err(e) => {
                    warn!(error = %e, "failed to read sensor input");
                    break;
                }
            }
            if shutdown.is_triggered() {
                return;
            }
        }
        info!("sensor input closed; shutting down");
        shutdown.trigger();
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// config / init
// ─────────────────────────────────────────────────────────────────────────────

fn print_config() -> Result<(), SumoError> {
    let cfg = config::load()?;
    let raw = toml::to_string_pretty(&cfg)
        .map_err(|e| SumoError::Config(format!("failed to serialize config: {e}")))?;
    println!("{raw}");
    Ok(())
}

fn init_config() -> Result<(), SumoError> {
    let path = config::config_path();
    if path.exists() {
        info!(path = %path.display(), "config already exists; leaving it untouched");
        return Ok(());
    }
    config::save_to(&config::Config::default(), &path)?;
    info!(path = %path.display(), "default config written");
    Ok(())
}
