//! Terminal ownership and process-group wrappers.

use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::{getpgid, getpgrp, setpgid, tcsetpgrp, Pid};
use std::os::fd::BorrowedFd;

pub fn shell_pgid() -> i32 {
    getpgrp().as_raw()
}

pub fn pgid_of(pid: i32) -> Option<i32> {
    getpgid(Some(Pid::from_raw(pid))).ok().map(|p| p.as_raw())
}

/// Moves the calling process into its own fresh process group.
pub fn enter_new_group() -> nix::Result<()> {
    setpgid(Pid::from_raw(0), Pid::from_raw(0))
}

/// Installs `pgid` as the tty's foreground group. SIGTTOU is ignored
/// around the call: a non-foreground shell changing the tty would
/// otherwise be stopped.
pub fn set_foreground(tty_fd: i32, pgid: i32) -> nix::Result<()> {
    let fd = unsafe { BorrowedFd::borrow_raw(tty_fd) };
    let old = unsafe { signal(Signal::SIGTTOU, SigHandler::SigIgn) }?;
    let result = tcsetpgrp(fd, Pid::from_raw(pgid));
    unsafe {
        let _ = signal(Signal::SIGTTOU, old);
    }
    result
}
