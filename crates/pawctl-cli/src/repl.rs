//! Operator command loop.
//!
//! Stdin is read on its own thread and forwarded over a channel so the loop
//! can notice a Ctrl-C while no line is pending.  End of input counts as
//! `quit`.

use colored::Colorize;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use pawctl_runtime::{Command, Coordinator, Reply};
use pawctl_types::{CommandError, PawError};

/// How often the loop re-checks the shutdown flag while waiting for input.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    Eof,
}

/// Spawn the stdin reader thread.
pub fn spawn_stdin_reader() -> io::Result<Receiver<Input>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || read_lines(io::stdin().lock(), &tx))?;
    Ok(rx)
}

fn read_lines(mut reader: impl BufRead, tx: &Sender<Input>) {
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(Input::Line(line)).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        }
    }
    let _ = tx.send(Input::Eof);
}

/// Run the command loop until `quit`, end of input or `shutdown`.
///
/// The coordinator is always shut down before this returns.
pub fn run(
    coordinator: &mut Coordinator,
    input: &Receiver<Input>,
    shutdown: &Arc<AtomicBool>,
    out: &mut impl Write,
) {
    prompt(out);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            debug!("shutdown requested");
            break;
        }
        let line = match input.recv_timeout(POLL_INTERVAL) {
            Ok(Input::Line(line)) => line,
            Ok(Input::Eof) | Err(RecvTimeoutError::Disconnected) => {
                debug!("end of input");
                break;
            }
            Err(RecvTimeoutError::Timeout) => continue,
        };

        match coordinator.dispatch(&line) {
            Ok(Reply::Quit) => {
                writeln!(out, "{}", "Goodbye.".green()).ok();
                return;
            }
            Ok(reply) => print_reply(out, &reply),
            Err(PawError::Command(CommandError::Empty)) => {}
            Err(PawError::Command(e)) => {
                writeln!(
                    out,
                    "{} {}. Type {} for available commands.",
                    "✗".red(),
                    e,
                    "help".bold()
                )
                .ok();
            }
            Err(e) => {
                writeln!(out, "{} {}", "Error:".red().bold(), e).ok();
            }
        }
        prompt(out);
    }

    if let Ok(reply) = coordinator.execute(Command::Quit) {
        writeln!(out).ok();
        print_reply(out, &reply);
    }
}

fn print_reply(out: &mut impl Write, reply: &Reply) {
    match reply {
        Reply::Done(msg) => writeln!(out, "{} {}", "✓".green().bold(), msg),
        Reply::Notice(msg) => writeln!(out, "{} {}", "!".yellow().bold(), msg.yellow()),
        Reply::Help => writeln!(out, "{reply}"),
        Reply::Quit => writeln!(out, "{}", "Goodbye.".green()),
    }
    .ok();
}

fn prompt(out: &mut impl Write) {
    write!(out, "{} ", "pawctl>".bold().cyan()).ok();
    out.flush().ok();
}
