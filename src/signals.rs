//! SIGINT handling for the interactive shell.
//!
//! The handler itself does no work: signal-hook delivers SIGINT over its
//! internal self-pipe to a dedicated listener thread, which forwards the
//! signal to the current foreground process group or, when the shell
//! itself owns the terminal, prints a blank line.

use crate::eval::Runner;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use signal_hook::consts::SIGINT;
use signal_hook::iterator::Signals;
use std::thread;

pub fn spawn_sigint_forwarder(runner: Runner) {
    let mut signals = match Signals::new([SIGINT]) {
        Ok(signals) => signals,
        Err(_) => return,
    };
    thread::spawn(move || {
        for _ in signals.forever() {
            let pgid = runner.foreground();
            if pgid != 0 {
                let _ = kill(Pid::from_raw(-pgid), Signal::SIGINT);
            } else {
                eprintln!();
            }
        }
    });
}
