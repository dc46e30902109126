//! Conversion of SIGINT/SIGTERM into a pollable interruption flag.
//!
//! The handler only stores into an atomic, which is async-signal-safe. Long-running waits
//! poll [`interrupted`] and unwind with [`crate::errors::ExpressError::Interrupted`], so
//! scoped resources such as the workspace are released by their `Drop` implementations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static INSTALL: Once = Once::new();

extern "C" fn on_signal(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Installs the SIGINT and SIGTERM handlers. Calling this more than once is a no-op.
#[allow(unsafe_code)]
pub fn install_interrupt_handler() {
    INSTALL.call_once(|| {
        let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        // SAFETY: `on_signal` only performs an atomic store.
        unsafe {
            libc::signal(libc::SIGINT, handler);
            libc::signal(libc::SIGTERM, handler);
        }
    });
}

/// Returns true once SIGINT or SIGTERM has been received.
#[must_use]
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}
