//! `pawctl-cli` – operator console for the quadruped controller
//!
//! This binary:
//!
//! 1. Initialises logging (stderr) and loads `~/.pawctl/config.toml` plus
//!    `PAWCTL_*` overrides.
//! 2. Builds the robot backend, resolves its capabilities once and stands up.
//! 3. Prints bus status events (patrol state changes, touches, faults) on a
//!    background thread.
//! 4. Reads line commands from stdin until `quit`, end of input or Ctrl-C,
//!    then stands up and releases the hardware.
//!
//! `pawctl --init-config` writes the default config file and exits.
//!
//! Exit code is 0 after a clean quit and 1 when startup fails.

mod config;
mod repl;
mod status;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use pawctl_hal::{DistanceProbe, SimRobot};
use pawctl_middleware::EventBus;
use pawctl_runtime::{ControllerConfig, Coordinator, Robot, init_tracing};
use pawctl_types::PawError;

fn main() -> ExitCode {
    init_tracing("pawctl");

    if std::env::args().nth(1).as_deref() == Some("--init-config") {
        return init_config();
    }
    print_banner();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("{} {}", "Fatal:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), PawError> {
    let controller = load_controller_config();

    // ── Robot ─────────────────────────────────────────────────────────────
    let robot = Arc::new(SimRobot::builder().build());
    info!("using simulated robot backend");
    let bus = EventBus::default();
    let mut coordinator = Coordinator::new(
        Robot {
            actuator: robot.clone(),
            distance: DistanceProbe::new().with_accessor("sim", robot.clone()),
            touch: Some(robot),
        },
        controller,
        bus.clone(),
    )?;

    // ── Ctrl-C ────────────────────────────────────────────────────────────
    // Raises the loop's shutdown flag and cancels a paw waiting for a hand.
    let shutdown = Arc::new(AtomicBool::new(false));
    let interrupt = coordinator.interrupt_handle();
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("{}", "⚠  Ctrl-C received – stopping …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
        interrupt.set();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use 'quit' to exit");
    }

    let printer_stop = Arc::new(AtomicBool::new(false));
    let printer =
        status::spawn_printer(&bus, printer_stop.clone()).map_err(|source| PawError::Spawn {
            task: "status-printer".to_string(),
            source,
        })?;

    coordinator.start()?;
    let input = repl::spawn_stdin_reader().map_err(|source| PawError::Spawn {
        task: "stdin-reader".to_string(),
        source,
    })?;

    println!("  Type {} for a list of commands.\n", "help".bold().cyan());
    repl::run(&mut coordinator, &input, &shutdown, &mut std::io::stdout());

    printer_stop.store(true, Ordering::SeqCst);
    if printer.join().is_err() {
        warn!("status printer panicked");
    }
    info!("pawctl exited");
    Ok(())
}

/// Compiled-in defaults, then the config file, then environment overrides.
/// A broken config file is reported and ignored.
fn load_controller_config() -> ControllerConfig {
    let mut file_cfg = match config::load() {
        Ok(Some(cfg)) => {
            info!(path = %config::config_path().display(), "config loaded");
            cfg
        }
        Ok(None) => config::Config::default(),
        Err(e) => {
            warn!(error = %e, "using default configuration");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut file_cfg);

    let mut controller = ControllerConfig::default();
    file_cfg.apply_to(&mut controller);
    controller
}

fn init_config() -> ExitCode {
    let path = config::config_path();
    if path.exists() {
        println!("  Config already exists at {}", path.display().to_string().bold());
        return ExitCode::SUCCESS;
    }
    match config::save(&config::Config::default()) {
        Ok(()) => {
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Error saving config".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn print_banner() {
    println!();
    println!("  {} {}", "pawctl".bold().cyan(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Quadruped behaviour controller");
    println!();
}
