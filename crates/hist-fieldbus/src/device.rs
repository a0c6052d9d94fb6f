//! Controller-facing callback handler.
//!
//! The external stack hands an opaque context pointer back into every
//! callback; here that becomes an explicit capability object: a
//! [`DeviceHandler`] holding the slot registry, the sampler's event set
//! and the shared connection handle. The stack shim calls these methods
//! from its own thread; everything heavier than a flag post or a registry
//! update is deferred to the sampler.

use crate::catalog::{
    self, DataDirection, CUSTOM_SUBSLOT, DAP_INTERFACE_SUBSLOT, DAP_PORT_SUBSLOT, DAP_SLOT,
    DAP_SUBSLOT,
};
use crate::registry::SlotRegistry;
use crate::{Iops, PnioStatus, ProcessImageProvider};
use hist_common::error::{BridgeError, BridgeResult};
use hist_common::event::{EventSet, EVENT_ABORT, EVENT_ALARM, EVENT_READY_FOR_DATA};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

const NO_CONNECTION: u32 = u32::MAX;

/// Shared handle of the active application relation.
///
/// Written by the callback thread on PRMEND, cleared by the sampler on
/// abort. `u32::MAX` means no connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    arep: AtomicU32,
    alarm_allowed: AtomicBool,
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionHandle {
    /// Create a disconnected handle with alarms permitted.
    #[must_use]
    pub fn new() -> Self {
        Self {
            arep: AtomicU32::new(NO_CONNECTION),
            alarm_allowed: AtomicBool::new(true),
        }
    }

    /// Save the application relation handle.
    pub fn set(&self, arep: u32) {
        self.arep.store(arep, Ordering::Release);
    }

    /// Forget the connection.
    pub fn clear(&self) {
        self.arep.store(NO_CONNECTION, Ordering::Release);
    }

    /// Current handle, if connected.
    #[must_use]
    pub fn get(&self) -> Option<u32> {
        match self.arep.load(Ordering::Acquire) {
            NO_CONNECTION => None,
            arep => Some(arep),
        }
    }

    /// Whether an application relation is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.get().is_some()
    }

    /// Whether the device may raise a new alarm.
    #[must_use]
    pub fn alarm_allowed(&self) -> bool {
        self.alarm_allowed.load(Ordering::Acquire)
    }

    /// Grant or revoke alarm permission.
    pub fn set_alarm_allowed(&self, allowed: bool) {
        self.alarm_allowed.store(allowed, Ordering::Release);
    }
}

/// Stack lifecycle events delivered through the state callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Connection establishment started.
    Startup,
    /// Parameterization finished; data exchange may begin.
    PrmEnd,
    /// Controller confirmed application-ready.
    ApplReady,
    /// Cyclic data exchange is running.
    Data,
    /// Connection aborted.
    Abort,
}

/// The device's side of the fieldbus callback contract.
#[derive(Debug, Clone)]
pub struct DeviceHandler {
    registry: Arc<Mutex<SlotRegistry>>,
    events: Arc<EventSet>,
    connection: Arc<ConnectionHandle>,
}

impl DeviceHandler {
    /// Create a handler around the shared bridge state.
    #[must_use]
    pub fn new(
        registry: Arc<Mutex<SlotRegistry>>,
        events: Arc<EventSet>,
        connection: Arc<ConnectionHandle>,
    ) -> Self {
        Self {
            registry,
            events,
            connection,
        }
    }

    fn registry(&self) -> MutexGuard<'_, SlotRegistry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Connect request from a controller.
    pub fn connect_ind(&self, arep: u32, status: &PnioStatus) {
        debug!(arep, ?status, "connect indication");
    }

    /// Controller released the connection.
    pub fn release_ind(&self, arep: u32, status: &PnioStatus) {
        debug!(arep, ?status, "release indication");
    }

    /// Dcontrol request (for example PRMEND) from the controller.
    pub fn dcontrol_ind(&self, arep: u32, command: u32) {
        debug!(arep, command, "dcontrol indication");
    }

    /// Ccontrol confirmation from the controller.
    pub fn ccontrol_cnf(&self, arep: u32, status: &PnioStatus) {
        debug!(arep, ?status, "ccontrol confirmation");
    }

    /// Connection state change.
    ///
    /// `PrmEnd` arms the pipeline: the handle is saved, IOPS/IOCS are set
    /// good for every plugged subslot, the provider state goes to run and
    /// the sampler is woken to send application-ready. `Abort` only posts
    /// the event; the sampler resets its own state.
    pub fn state_ind(&self, provider: &dyn ProcessImageProvider, arep: u32, event: DeviceEvent) {
        match event {
            DeviceEvent::PrmEnd => {
                info!(arep, "parameterization complete");
                self.connection.set(arep);

                for subslot in [DAP_SUBSLOT, DAP_INTERFACE_SUBSLOT, DAP_PORT_SUBSLOT] {
                    if let Err(e) =
                        provider.input_set_data_and_iops(DAP_SLOT, subslot, &[], Iops::Good)
                    {
                        warn!(subslot, error = %e, "failed to set DAP IOPS");
                    }
                }

                let occupied: Vec<u16> = self
                    .registry()
                    .iter_occupied()
                    .filter(|(_, m)| m.direction == DataDirection::Output)
                    .map(|(slot, _)| slot)
                    .collect();
                for slot in occupied {
                    debug!(slot, subslot = CUSTOM_SUBSLOT, "setting output IOCS");
                    if let Err(e) = provider.output_set_iocs(slot, CUSTOM_SUBSLOT, Iops::Good) {
                        warn!(slot, error = %e, "failed to set output IOCS");
                    }
                }

                if let Err(e) = provider.set_provider_state(true) {
                    warn!(error = %e, "failed to set provider state");
                }
                self.events.post(EVENT_READY_FOR_DATA);
            }
            DeviceEvent::Abort => {
                info!(arep, "connection aborted");
                self.events.post(EVENT_ABORT);
            }
            DeviceEvent::Startup | DeviceEvent::ApplReady | DeviceEvent::Data => {
                debug!(arep, ?event, "state indication");
            }
        }
    }

    /// Expected-module indication: the controller wants `module_ident`
    /// in `slot`.
    ///
    /// Any catalog module is accepted in any slot. An out-of-range slot is
    /// logged and the plug forgotten; the stack's own response is passed
    /// through unchanged.
    ///
    /// # Errors
    ///
    /// `UnknownModule` when the ident is not in the catalog, or the
    /// provider's plug error.
    pub fn exp_module_ind(
        &self,
        provider: &dyn ProcessImageProvider,
        slot: u16,
        module_ident: u32,
    ) -> BridgeResult<()> {
        if catalog::lookup_module(module_ident).is_none() {
            warn!(slot, module_ident, "module not found");
            return Err(BridgeError::UnknownModule {
                module_ident,
                submodule_ident: 0,
            });
        }

        if provider.pull_module(slot).is_err() {
            debug!(slot, "slot was empty");
        }

        debug!(slot, module_ident, "plugging module");
        provider.plug_module(slot, module_ident)?;

        match self.registry().plug(slot, module_ident) {
            Ok(()) => {}
            Err(BridgeError::SlotOutOfRange { slot, max }) => {
                warn!(slot, max, "slot out of range, plug not recorded");
            }
            Err(e) => warn!(error = %e, "plug not recorded"),
        }
        Ok(())
    }

    /// Expected-submodule indication for the single submodule per module.
    ///
    /// # Errors
    ///
    /// `UnknownModule` when the ident pair is not in the catalog, or the
    /// provider's plug error.
    pub fn exp_submodule_ind(
        &self,
        provider: &dyn ProcessImageProvider,
        slot: u16,
        subslot: u16,
        module_ident: u32,
        submodule_ident: u32,
    ) -> BridgeResult<()> {
        let Some(m) = catalog::lookup(module_ident, submodule_ident) else {
            warn!(
                slot,
                subslot,
                module_ident,
                submodule_ident,
                "submodule not found"
            );
            return Err(BridgeError::UnknownModule {
                module_ident,
                submodule_ident,
            });
        };

        if provider.pull_submodule(slot, subslot).is_err() {
            debug!(slot, subslot, "subslot was empty");
        }

        debug!(
            slot,
            subslot,
            output_len = m.output_len,
            kind = %m.kind,
            "plugging submodule"
        );
        provider.plug_submodule(
            slot,
            subslot,
            module_ident,
            submodule_ident,
            m.direction,
            0,
            m.output_len,
        )
    }

    /// New-data status indication. Informational only; change detection
    /// compares bytes.
    pub fn new_data_status_ind(&self, arep: u32, crep: u32, changes: u8) {
        debug!(arep, crep, changes, "new data status");
    }

    /// Alarm indication; the sampler acknowledges it.
    pub fn alarm_ind(&self, arep: u32, slot: u16, subslot: u16, data_len: u16, data_usi: u16) {
        debug!(arep, slot, subslot, data_len, data_usi, "alarm indication");
        self.events.post(EVENT_ALARM);
    }

    /// Controller confirmed an alarm sent by the device.
    pub fn alarm_cnf(&self, arep: u32, status: &PnioStatus) {
        debug!(arep, ?status, "alarm confirmation");
        self.connection.set_alarm_allowed(true);
    }

    /// Controller confirmed the device's alarm acknowledgement.
    pub fn alarm_ack_cnf(&self, arep: u32, result: i32) {
        debug!(arep, result, "alarm ack confirmation");
    }

    /// Parameter read request. This device has none.
    pub fn read_ind(&self, arep: u32, slot: u16, subslot: u16, index: u16) {
        debug!(arep, slot, subslot, index, "parameter read");
        warn!("no parameters defined");
    }

    /// Parameter write request. This device has none.
    pub fn write_ind(&self, arep: u32, slot: u16, subslot: u16, index: u16, len: u16) {
        debug!(arep, slot, subslot, index, len, "parameter write");
        warn!("no parameters defined");
    }
}
