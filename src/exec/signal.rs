// src/exec/signal.rs

//! OS-level termination helpers.
//!
//! Scripts are spawned as leaders of their own process group, so signalling
//! `-pid` reaches anything the script forked. The pid-only variant is the
//! fallback used when a stop request arrives for a run whose supervisor is
//! gone (e.g. after a service restart); there the group is not guaranteed.

use std::io;

/// Send SIGTERM to the process group led by `pid`.
pub fn terminate_group(pid: u32) -> io::Result<()> {
    send(-(to_pid(pid)?), Signal::Term)
}

/// Send SIGKILL to the process group led by `pid`.
pub fn kill_group(pid: u32) -> io::Result<()> {
    send(-(to_pid(pid)?), Signal::Kill)
}

/// Send SIGTERM to a single pid.
pub fn terminate_pid(pid: u32) -> io::Result<()> {
    send(to_pid(pid)?, Signal::Term)
}

/// Whether `err` means the target process no longer exists.
pub fn is_no_such_process(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(libc::ESRCH)
    }
    #[cfg(not(unix))]
    {
        err.kind() == io::ErrorKind::NotFound
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

fn to_pid(pid: u32) -> io::Result<i32> {
    match i32::try_from(pid) {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid pid {pid}"),
        )),
    }
}

#[cfg(unix)]
fn send(target: i32, signal: Signal) -> io::Result<()> {
    let signo = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(target, signo) };
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(unix))]
fn send(_target: i32, _signal: Signal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "signalling by pid is only supported on unix",
    ))
}
