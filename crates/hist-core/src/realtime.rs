//! Thread scheduling helpers for the worker threads.
//!
//! The sampler runs at elevated SCHED_FIFO priority, the submitter one
//! step above it. Without CAP_SYS_NICE the elevation degrades to a
//! warning and the threads stay at the default policy.

#![allow(unsafe_code)]

use hist_common::error::{BridgeError, BridgeResult};
use tracing::{info, warn};

/// Apply SCHED_FIFO with the given priority to the calling thread.
///
/// Returns `Ok(true)` when applied, `Ok(false)` when the process lacks
/// the privilege.
///
/// # Errors
///
/// Fails on unexpected scheduler errors (bad priority for the policy).
#[cfg(target_os = "linux")]
pub fn elevate_current_thread(priority: u8) -> BridgeResult<bool> {
    let param = libc::sched_param {
        sched_priority: i32::from(priority),
    };
    // SAFETY: pthread_self is always valid; param outlives the call.
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    match rc {
        0 => {
            info!(priority, "SCHED_FIFO applied");
            Ok(true)
        }
        libc::EPERM => {
            warn!(
                priority,
                "no permission for SCHED_FIFO, staying at default priority"
            );
            Ok(false)
        }
        other => Err(BridgeError::Config(format!(
            "pthread_setschedparam failed: {other}"
        ))),
    }
}

/// Non-Linux fallback: no real-time scheduling available.
#[cfg(not(target_os = "linux"))]
pub fn elevate_current_thread(priority: u8) -> BridgeResult<bool> {
    warn!(priority, "real-time scheduling not supported on this platform");
    Ok(false)
}
