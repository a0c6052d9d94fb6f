//! Fieldbus plane abstractions for the historian bridge.
//!
//! This crate provides:
//! - [`ProcessImageProvider`] trait over the external PROFINET device stack
//! - [`catalog`] module with the supported module types
//! - [`registry`] module tracking what is plugged where
//! - [`device`] module with the controller-facing callback handler
//! - [`SimulatedProvider`] for tests and controller-less runs
//!
//! The protocol stack itself (connection handshake, alarms transport,
//! LLDP, DCP) lives outside this workspace; the bridge only consumes it
//! as a provider of output process images.

pub mod catalog;
pub mod device;
pub mod registry;

pub use catalog::*;
pub use device::*;
pub use registry::*;

use hist_common::error::{BridgeError, BridgeResult};
use std::collections::HashMap;
use std::sync::Mutex;

/// Provider/consumer status byte for a subslot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Iops {
    /// Data is valid.
    #[default]
    Good,
    /// Data is invalid.
    Bad,
}

/// PNIO status quadruple reported with connect/control/alarm callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PnioStatus {
    /// Error code.
    pub error_code: u8,
    /// Error decode.
    pub error_decode: u8,
    /// Error code 1.
    pub error_code_1: u8,
    /// Error code 2.
    pub error_code_2: u8,
}

/// Result of one output process-image pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputData {
    /// Bytes written into the caller's buffer.
    pub len: u16,
    /// Provider status of the data.
    pub iops: Iops,
    /// Stack's own new-data flag. The sampler ignores it and compares
    /// bytes instead (works around a stack bug).
    pub updated: bool,
}

/// Process-image provider the bridge samples from.
///
/// Implemented by the shim over the external PROFINET stack, and by
/// [`SimulatedProvider`] for tests.
pub trait ProcessImageProvider: Send + Sync {
    /// Pull the current output image for a subslot into `buf`.
    fn output_get(&self, slot: u16, subslot: u16, buf: &mut [u8]) -> BridgeResult<OutputData>;

    /// Set input data and IOPS for a subslot (once, on ready-for-data).
    fn input_set_data_and_iops(
        &self,
        slot: u16,
        subslot: u16,
        data: &[u8],
        iops: Iops,
    ) -> BridgeResult<()>;

    /// Set consumer status for an output subslot (once per occupied slot
    /// on ready-for-data).
    fn output_set_iocs(&self, slot: u16, subslot: u16, iocs: Iops) -> BridgeResult<()>;

    /// Tell the controller the application is ready for data.
    fn application_ready(&self, arep: u32) -> BridgeResult<()>;

    /// Acknowledge an alarm indication.
    fn alarm_send_ack(&self, arep: u32, status: PnioStatus) -> BridgeResult<()>;

    /// Drive the stack's periodic work. Called once per timer tick.
    fn handle_periodic(&self);

    /// Set the device's provider state (run/stop).
    fn set_provider_state(&self, run: bool) -> BridgeResult<()>;

    /// Plug a module into a slot.
    fn plug_module(&self, slot: u16, module_ident: u32) -> BridgeResult<()>;

    /// Pull the module from a slot.
    fn pull_module(&self, slot: u16) -> BridgeResult<()>;

    /// Plug a submodule into a subslot.
    #[allow(clippy::too_many_arguments)]
    fn plug_submodule(
        &self,
        slot: u16,
        subslot: u16,
        module_ident: u32,
        submodule_ident: u32,
        direction: DataDirection,
        input_len: u16,
        output_len: u16,
    ) -> BridgeResult<()>;

    /// Pull the submodule from a subslot.
    fn pull_submodule(&self, slot: u16, subslot: u16) -> BridgeResult<()>;
}

#[derive(Debug, Default)]
struct SimState {
    outputs: HashMap<u16, Vec<u8>>,
    plugged: HashMap<u16, u32>,
    input_iops_set: Vec<(u16, u16)>,
    output_iocs_set: Vec<(u16, u16)>,
    application_ready_calls: u32,
    alarm_acks: u32,
    periodic_calls: u64,
    running: bool,
}

/// In-memory provider for tests and controller-less runs.
///
/// Tests place output images per slot with [`set_output`](Self::set_output)
/// and observe the handshake calls the bridge makes.
#[derive(Debug, Default)]
pub struct SimulatedProvider {
    state: Mutex<SimState>,
}

impl SimulatedProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Place the output image the next `output_get` for `slot` returns.
    pub fn set_output(&self, slot: u16, bytes: &[u8]) {
        self.state().outputs.insert(slot, bytes.to_vec());
    }

    /// Number of `application_ready` calls observed.
    #[must_use]
    pub fn application_ready_calls(&self) -> u32 {
        self.state().application_ready_calls
    }

    /// Number of `alarm_send_ack` calls observed.
    #[must_use]
    pub fn alarm_acks(&self) -> u32 {
        self.state().alarm_acks
    }

    /// Number of `handle_periodic` calls observed.
    #[must_use]
    pub fn periodic_calls(&self) -> u64 {
        self.state().periodic_calls
    }

    /// Whether the provider state was last set to run.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state().running
    }

    /// Subslots whose output IOCS was set, in call order.
    #[must_use]
    pub fn output_iocs_set(&self) -> Vec<(u16, u16)> {
        self.state().output_iocs_set.clone()
    }

    /// Subslots whose input IOPS was set, in call order.
    #[must_use]
    pub fn input_iops_set(&self) -> Vec<(u16, u16)> {
        self.state().input_iops_set.clone()
    }
}

impl ProcessImageProvider for SimulatedProvider {
    fn output_get(&self, slot: u16, _subslot: u16, buf: &mut [u8]) -> BridgeResult<OutputData> {
        let state = self.state();
        match state.outputs.get(&slot) {
            Some(image) => {
                let len = image.len().min(buf.len());
                buf[..len].copy_from_slice(&image[..len]);
                Ok(OutputData {
                    len: len as u16,
                    iops: Iops::Good,
                    updated: true,
                })
            }
            None => Ok(OutputData {
                len: 0,
                iops: Iops::Bad,
                updated: false,
            }),
        }
    }

    fn input_set_data_and_iops(
        &self,
        slot: u16,
        subslot: u16,
        _data: &[u8],
        _iops: Iops,
    ) -> BridgeResult<()> {
        self.state().input_iops_set.push((slot, subslot));
        Ok(())
    }

    fn output_set_iocs(&self, slot: u16, subslot: u16, _iocs: Iops) -> BridgeResult<()> {
        self.state().output_iocs_set.push((slot, subslot));
        Ok(())
    }

    fn application_ready(&self, _arep: u32) -> BridgeResult<()> {
        self.state().application_ready_calls += 1;
        Ok(())
    }

    fn alarm_send_ack(&self, _arep: u32, _status: PnioStatus) -> BridgeResult<()> {
        self.state().alarm_acks += 1;
        Ok(())
    }

    fn handle_periodic(&self) {
        self.state().periodic_calls += 1;
    }

    fn set_provider_state(&self, run: bool) -> BridgeResult<()> {
        self.state().running = run;
        Ok(())
    }

    fn plug_module(&self, slot: u16, module_ident: u32) -> BridgeResult<()> {
        self.state().plugged.insert(slot, module_ident);
        Ok(())
    }

    fn pull_module(&self, slot: u16) -> BridgeResult<()> {
        if self.state().plugged.remove(&slot).is_none() {
            return Err(BridgeError::Fieldbus(format!("slot {slot} was empty")));
        }
        Ok(())
    }

    fn plug_submodule(
        &self,
        _slot: u16,
        _subslot: u16,
        _module_ident: u32,
        _submodule_ident: u32,
        _direction: DataDirection,
        _input_len: u16,
        _output_len: u16,
    ) -> BridgeResult<()> {
        Ok(())
    }

    fn pull_submodule(&self, _slot: u16, _subslot: u16) -> BridgeResult<()> {
        Ok(())
    }
}
