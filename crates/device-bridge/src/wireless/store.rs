//! Saved wireless devices
//!
//! Network endpoints that were seen online are remembered in the global
//! state store so they can be reconnected in later sessions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use droid_lite_core::StateStore;

use crate::device::Device;

/// State key holding the saved device list
pub const WIRELESS_DEVICES_KEY: &str = "android.wirelessDevices";

/// Port adbd listens on after `adb tcpip`
pub const DEFAULT_TCPIP_PORT: u16 = 5555;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    /// Legacy `adb tcpip` mode on the default port
    #[serde(rename = "tcpip")]
    Tcpip,
    /// Android 11+ wireless debugging on a random port
    #[serde(rename = "wireless-debug")]
    WirelessDebug,
}

impl ConnectionType {
    pub fn from_port(port: u16) -> Self {
        if port == DEFAULT_TCPIP_PORT {
            ConnectionType::Tcpip
        } else {
            ConnectionType::WirelessDebug
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Tcpip => "tcpip",
            ConnectionType::WirelessDebug => "wireless-debug",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedWirelessDevice {
    pub id: String,
    pub ip_address: String,
    pub port: u16,
    pub connection_type: ConnectionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Epoch milliseconds of the last time the device was seen online
    pub last_connected: i64,
}

impl SavedWirelessDevice {
    /// Build a record from a network device id (`ip:port`)
    pub fn from_device(device: &Device) -> Option<Self> {
        let (ip, port) = device.id.rsplit_once(':')?;
        let port: u16 = port.parse().ok()?;
        if ip.is_empty() {
            return None;
        }

        Some(Self {
            id: device.id.clone(),
            ip_address: ip.to_string(),
            port,
            connection_type: ConnectionType::from_port(port),
            model: device.model.clone(),
            last_connected: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// `ip:port` to pass to `adb connect`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip_address, self.port)
    }

    pub fn last_connected_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.last_connected)
    }
}

/// Durable store of saved wireless devices.
///
/// Failures are logged and never propagated: reads degrade to an empty list
/// and failed writes leave the previous contents in place.
#[derive(Clone)]
pub struct WirelessStore {
    state: Arc<StateStore>,
}

impl WirelessStore {
    pub fn new(state: Arc<StateStore>) -> Self {
        Self { state }
    }

    /// All saved devices, empty when nothing is saved or the store is unreadable
    pub async fn load(&self) -> Vec<SavedWirelessDevice> {
        match self.state.get::<Vec<SavedWirelessDevice>>(WIRELESS_DEVICES_KEY).await {
            Ok(devices) => devices.unwrap_or_default(),
            Err(e) => {
                error!("Failed to load saved wireless devices: {}", e);
                Vec::new()
            }
        }
    }

    /// Insert or replace the record for `device`, stamped with the current time.
    /// Returns false when the device id is not an `ip:port` endpoint or the
    /// write failed.
    pub async fn save(&self, device: &Device) -> bool {
        let Some(record) = SavedWirelessDevice::from_device(device) else {
            debug!("Not saving {}: not a network endpoint", device.id);
            return false;
        };
        self.upsert(record).await
    }

    async fn upsert(&self, record: SavedWirelessDevice) -> bool {
        self.modify(|devices| {
            match devices.iter_mut().find(|d| d.id == record.id) {
                Some(existing) => *existing = record,
                None => devices.push(record),
            }
            true
        })
        .await
    }

    /// Forget a device; no-op when it was never saved
    pub async fn remove(&self, id: &str) -> bool {
        self.modify(|devices| {
            let before = devices.len();
            devices.retain(|d| d.id != id);
            devices.len() != before
        })
        .await
    }

    /// Save every ready network device in `devices`. Returns how many were saved.
    pub async fn observe(&self, devices: &[Device]) -> usize {
        let mut saved = 0;
        for device in devices.iter().filter(|d| d.is_ready() && d.is_network()) {
            if self.save(device).await {
                saved += 1;
            }
        }
        saved
    }

    /// Apply `f` to the saved list as one atomic read-modify-write.
    /// Returns what `f` returned, or false when the store could not be written.
    async fn modify<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut Vec<SavedWirelessDevice>) -> bool,
    {
        let mut changed = false;
        let result = self
            .state
            .modify::<Vec<SavedWirelessDevice>, _>(WIRELESS_DEVICES_KEY, |current| {
                let mut devices = current.unwrap_or_default();
                changed = f(&mut devices);
                Some(devices)
            })
            .await;

        match result {
            Ok(()) => changed,
            Err(e) => {
                warn!("Failed to save wireless devices: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceState;

    fn store(dir: &std::path::Path) -> WirelessStore {
        WirelessStore::new(Arc::new(StateStore::global(dir)))
    }

    fn network(id: &str, model: Option<&str>) -> Device {
        let mut device = Device::new(id, DeviceState::Ready);
        device.model = model.map(str::to_string);
        device
    }

    #[tokio::test]
    async fn test_resave_replaces_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        assert!(store.save(&network("192.168.1.20:5555", Some("Pixel 6"))).await);
        assert!(store.save(&network("192.168.1.20:5555", Some("Pixel 7"))).await);

        let saved = store.load().await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].model.as_deref(), Some("Pixel 7"));
        assert_eq!(saved[0].connection_type, ConnectionType::Tcpip);
        assert_eq!(saved[0].endpoint(), "192.168.1.20:5555");
    }

    #[tokio::test]
    async fn test_remove_is_noop_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store.save(&network("10.0.0.5:37215", None)).await;
        assert!(!store.remove("10.0.0.9:5555").await);
        assert_eq!(store.load().await.len(), 1);

        assert!(store.remove("10.0.0.5:37215").await);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateStore::global(dir.path());
        std::fs::write(state.path(), "not json").unwrap();

        assert!(store(dir.path()).load().await.is_empty());
    }

    #[tokio::test]
    async fn test_observe_only_saves_ready_network_devices() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let mut offline = network("10.0.0.7:5555", None);
        offline.state = DeviceState::Offline;
        let devices = vec![
            network("R58M123ABC", None),
            network("10.0.0.6:41233", Some("Galaxy S21")),
            offline,
        ];

        assert_eq!(store.observe(&devices).await, 1);
        let saved = store.load().await;
        assert_eq!(saved[0].id, "10.0.0.6:41233");
        assert_eq!(saved[0].connection_type, ConnectionType::WirelessDebug);
    }

    #[test]
    fn test_record_uses_camel_case_keys() {
        let record = SavedWirelessDevice {
            id: "10.0.0.6:5555".into(),
            ip_address: "10.0.0.6".into(),
            port: 5555,
            connection_type: ConnectionType::Tcpip,
            model: None,
            last_connected: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["ipAddress"], "10.0.0.6");
        assert_eq!(json["connectionType"], "tcpip");
        assert_eq!(json["lastConnected"], 1_700_000_000_000i64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_all_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let tasks: Vec<_> = (1..=8)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move { store.save(&network(&format!("10.0.0.{}:5555", n), None)).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }

        let mut ids: Vec<String> = store.load().await.into_iter().map(|d| d.id).collect();
        ids.sort();
        let expected: Vec<String> = (1..=8).map(|n| format!("10.0.0.{}:5555", n)).collect();
        assert_eq!(ids, expected);
    }
}
