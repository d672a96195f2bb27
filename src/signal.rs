//! Keyboard signal handling for the interactive loop.
//!
//! SIGINT is caught and only recorded; the main loop polls the record and
//! recovers between reads. SIGTSTP and SIGQUIT are ignored by the shell and
//! restored to their defaults in every child.

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::ffi::c_int;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn catch_interrupt(_: c_int) {
    // Only async-signal-safe operations are allowed here.
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the shell's dispositions.
///
/// SIGINT is installed without `SA_RESTART` so that a blocking read returns
/// early when the user presses Ctrl-C.
pub fn install() -> nix::Result<()> {
    let catch = SigAction::new(
        SigHandler::Handler(catch_interrupt),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    // SAFETY: `catch_interrupt` only stores to an atomic.
    unsafe {
        signal::sigaction(Signal::SIGINT, &catch)?;
        signal::sigaction(Signal::SIGTSTP, &ignore)?;
        signal::sigaction(Signal::SIGQUIT, &ignore)?;
    }
    debug!("signal handlers installed");
    Ok(())
}

/// Whether an interrupt arrived since the last call, clearing the record.
pub fn take_pending() -> bool {
    INTERRUPTED.swap(false, Ordering::SeqCst)
}

/// Put SIGINT, SIGTSTP and SIGQUIT back to their default dispositions.
///
/// Meant to run in a forked child before `exec`; it only makes
/// async-signal-safe calls and ignores their failures.
pub fn restore_defaults() {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for sig in [Signal::SIGINT, Signal::SIGTSTP, Signal::SIGQUIT] {
        // SAFETY: installing SIG_DFL runs no Rust code in signal context.
        let _ = unsafe { signal::sigaction(sig, &default) };
    }
}

/// Serializes tests that raise signals or reap children, since both touch
/// the process-wide interrupt flag.
#[cfg(test)]
pub(crate) fn lock_signals() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}
