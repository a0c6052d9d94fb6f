//! Signal handling for daemon shutdown.
//!
//! SIGTERM and SIGINT set an atomic flag the main loop polls. Signal
//! handlers must be async-signal-safe, so the handler body is a single
//! atomic store.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);

/// Handle for shutdown signal management.
#[derive(Debug, Clone, Copy)]
pub struct SignalHandler {
    _priv: (),
}

impl SignalHandler {
    /// Register handlers for SIGTERM and SIGINT.
    ///
    /// On non-Unix platforms only manual shutdown is supported.
    pub fn new() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use std::os::raw::c_int;

            extern "C" fn handle_shutdown_signal(_: c_int) {
                SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
            }

            // SAFETY: the handler only performs an atomic store.
            unsafe {
                libc::signal(libc::SIGTERM, handle_shutdown_signal as libc::sighandler_t);
                libc::signal(libc::SIGINT, handle_shutdown_signal as libc::sighandler_t);
            }
        }
        Ok(Self { _priv: () })
    }

    /// Check if shutdown has been requested.
    #[inline]
    #[must_use]
    pub fn shutdown_requested(&self) -> bool {
        SHUTDOWN_FLAG.load(Ordering::Relaxed)
    }

    /// Manually request shutdown (tests, internal faults).
    pub fn request_shutdown(&self) {
        SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_shutdown_request() {
        let handler = SignalHandler::new().unwrap();
        handler.request_shutdown();
        assert!(handler.shutdown_requested());
    }
}
