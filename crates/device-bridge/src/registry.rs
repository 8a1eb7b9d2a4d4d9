//! Device Registry
//!
//! The current device list plus a single selected-device pointer.
//!
//! A refresh replaces the list wholesale. The selection is only defaulted
//! when nothing was selected before; a selected device that drops out of the
//! list stays selected so a transient disconnect keeps the user's choice.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use droid_lite_core::{Event, EventBus};

use crate::adb::{AdbError, DeviceBridge};
use crate::device::Device;

#[derive(Default)]
struct RegistryState {
    devices: Vec<Device>,
    selected: Option<String>,
}

/// Device registry
pub struct DeviceRegistry {
    bridge: Arc<dyn DeviceBridge>,
    events: Arc<EventBus>,
    state: RwLock<RegistryState>,
}

impl DeviceRegistry {
    pub fn new(bridge: Arc<dyn DeviceBridge>, events: Arc<EventBus>) -> Self {
        Self {
            bridge,
            events,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Re-list devices and replace the registry contents.
    ///
    /// On failure the list is cleared and the error returned.
    pub async fn refresh(&self) -> Result<Vec<Device>, AdbError> {
        let result = self.bridge.list_devices().await;

        let outcome = {
            let mut state = self.state.write();
            match result {
                Ok(devices) => {
                    if state.selected.is_none() {
                        state.selected = devices.first().map(|d| d.id.clone());
                    }
                    state.devices = devices.clone();
                    debug!("Device list refreshed: {} device(s)", devices.len());
                    Ok(devices)
                }
                Err(e) => {
                    warn!("Device refresh failed: {}", e);
                    state.devices.clear();
                    Err(e)
                }
            }
        };

        self.events.emit(Event::DevicesChanged);
        outcome
    }

    /// Point the selection at `id`. Returns whether `id` is in the current list.
    pub fn select(&self, id: &str) -> bool {
        let known = {
            let mut state = self.state.write();
            state.selected = Some(id.to_string());
            state.devices.iter().any(|d| d.id == id)
        };

        self.events.emit(Event::SelectionChanged {
            device_id: id.to_string(),
        });
        known
    }

    /// Seed the selection from an earlier session. Emits nothing.
    pub fn restore_selection(&self, id: Option<String>) {
        self.state.write().selected = id;
    }

    pub fn devices(&self) -> Vec<Device> {
        self.state.read().devices.clone()
    }

    /// Selected id, even if that device is no longer listed
    pub fn selected_id(&self) -> Option<String> {
        self.state.read().selected.clone()
    }

    /// Selected device, if it is in the current list
    pub fn selected_device(&self) -> Option<Device> {
        let state = self.state.read();
        let selected = state.selected.as_ref()?;
        state.devices.iter().find(|d| &d.id == selected).cloned()
    }

    /// Ready devices connected over the network
    pub fn wireless_devices(&self) -> Vec<Device> {
        self.state
            .read()
            .devices
            .iter()
            .filter(|d| d.is_ready() && d.is_network())
            .cloned()
            .collect()
    }
}
