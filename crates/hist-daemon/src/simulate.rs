//! Demo feeder for controller-less runs.
//!
//! Plays the controller's role against the in-memory provider: plugs a
//! u16 module, finishes parameterization, then wiggles a counter so both
//! sinks show live data.

use hist_fieldbus::catalog::{CUSTOM_SUBMODULE_IDENT, CUSTOM_SUBSLOT};
use hist_fieldbus::device::{DeviceEvent, DeviceHandler};
use hist_fieldbus::SimulatedProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

const DEMO_SLOT: u16 = 1;
const DEMO_MODULE_IDENT: u32 = 0x0000_0210;
const DEMO_AREP: u32 = 1;
const DEMO_PERIOD: Duration = Duration::from_millis(100);

/// Handle of the feeder thread.
pub struct Feeder {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Arm the pipeline like a controller would and start the counter thread.
pub fn start(device: DeviceHandler, provider: Arc<SimulatedProvider>) -> std::io::Result<Feeder> {
    info!(
        slot = DEMO_SLOT,
        module_ident = DEMO_MODULE_IDENT,
        "starting simulated controller"
    );

    if let Err(e) = device.exp_module_ind(provider.as_ref(), DEMO_SLOT, DEMO_MODULE_IDENT) {
        warn!(error = %e, "demo module plug failed");
    }
    if let Err(e) = device.exp_submodule_ind(
        provider.as_ref(),
        DEMO_SLOT,
        CUSTOM_SUBSLOT,
        DEMO_MODULE_IDENT,
        CUSTOM_SUBMODULE_IDENT,
    ) {
        warn!(error = %e, "demo submodule plug failed");
    }
    device.state_ind(provider.as_ref(), DEMO_AREP, DeviceEvent::PrmEnd);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let handle = std::thread::Builder::new()
        .name("hist-sim-feeder".into())
        .spawn(move || {
            let mut counter: u16 = 0;
            while !stop_flag.load(Ordering::Acquire) {
                counter = counter.wrapping_add(1);
                let mut image = [0u8; 8];
                image[0..2].copy_from_slice(&counter.to_le_bytes());
                provider.set_output(DEMO_SLOT, &image);
                std::thread::sleep(DEMO_PERIOD);
            }
        })?;

    Ok(Feeder {
        stop,
        handle: Some(handle),
    })
}

impl Feeder {
    /// Stop the counter thread and wait for it.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
