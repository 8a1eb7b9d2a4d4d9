//! Device Types and State
//!
//! Represents devices reported by `adb devices -l`: USB-attached phones,
//! emulators, and network endpoints (`ip:port`).

use serde::{Deserialize, Serialize};

/// Device state as reported by ADB
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Online and accepting commands (`device`)
    Ready,
    /// Known to ADB but not responding
    Offline,
    /// Waiting for the user to accept the debugging prompt
    Unauthorized,
    /// Anything else ADB reports (`no permissions`, `recovery`, ...)
    Unknown(String),
}

impl DeviceState {
    pub fn from_adb(state: &str) -> Self {
        match state {
            "device" => DeviceState::Ready,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            other => DeviceState::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeviceState::Ready => "ready",
            DeviceState::Offline => "offline",
            DeviceState::Unauthorized => "unauthorized",
            DeviceState::Unknown(state) => state,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, DeviceState::Ready)
    }
}

/// Device type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    /// Physical device connected via USB or Wi-Fi
    Physical,
    /// Android emulator
    Emulator,
}

/// Device information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Serial number or `ip:port` endpoint
    pub id: String,
    pub state: DeviceState,
    pub device_type: DeviceType,
    /// Model name with underscores replaced by spaces (e.g. "Pixel 7")
    pub model: Option<String>,
    pub product: Option<String>,
    /// Device codename
    pub device: Option<String>,
    pub transport_id: Option<u32>,
}

impl Device {
    pub fn new(id: impl Into<String>, state: DeviceState) -> Self {
        let id = id.into();
        let device_type = if id.starts_with("emulator-") {
            DeviceType::Emulator
        } else {
            DeviceType::Physical
        };

        Self {
            id,
            state,
            device_type,
            model: None,
            product: None,
            device: None,
            transport_id: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn is_emulator(&self) -> bool {
        self.device_type == DeviceType::Emulator
    }

    /// Connected over the network rather than USB
    pub fn is_network(&self) -> bool {
        self.id.contains(':')
    }

    /// Best available human-readable name
    pub fn display_name(&self) -> String {
        self.model
            .as_ref()
            .or(self.product.as_ref())
            .or(self.device.as_ref())
            .cloned()
            .unwrap_or_else(|| self.id.clone())
    }
}

/// Parse the output of `adb devices -l`
pub fn parse_devices(output: &str) -> Vec<Device> {
    let mut devices = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("List of devices") || line.starts_with('*') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }

        let state = if parts[1] == "no" && parts.get(2).is_some_and(|p| p.starts_with("permissions")) {
            DeviceState::Unknown("no permissions".to_string())
        } else {
            DeviceState::from_adb(parts[1])
        };

        let mut device = Device::new(parts[0], state);

        for part in parts.iter().skip(2) {
            if let Some(value) = part.strip_prefix("model:") {
                device.model = Some(value.replace('_', " "));
            } else if let Some(value) = part.strip_prefix("product:") {
                device.product = Some(value.to_string());
            } else if let Some(value) = part.strip_prefix("device:") {
                device.device = Some(value.to_string());
            } else if let Some(value) = part.strip_prefix("transport_id:") {
                device.transport_id = value.parse().ok();
            }
        }

        devices.push(device);
    }

    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICES_OUTPUT: &str = "\
List of devices attached
R58M123ABC             device usb:1-1 product:beyond1ltexx model:SM_G973F device:beyond1 transport_id:3
emulator-5554          device product:sdk_gphone64_x86_64 model:sdk_gphone64_x86_64 device:emu64xa transport_id:1
192.168.1.42:5555      offline transport_id:4
ZY22BQ                 unauthorized usb:1-2 transport_id:5

";

    #[test]
    fn test_parse_devices() {
        let devices = parse_devices(DEVICES_OUTPUT);
        assert_eq!(devices.len(), 4);

        let phone = &devices[0];
        assert_eq!(phone.id, "R58M123ABC");
        assert!(phone.is_ready());
        assert_eq!(phone.model.as_deref(), Some("SM G973F"));
        assert_eq!(phone.device.as_deref(), Some("beyond1"));
        assert_eq!(phone.transport_id, Some(3));
        assert!(!phone.is_network());

        assert!(devices[1].is_emulator());
        assert_eq!(devices[2].state, DeviceState::Offline);
        assert!(devices[2].is_network());
        assert_eq!(devices[3].state, DeviceState::Unauthorized);
    }

    #[test]
    fn test_parse_skips_daemon_chatter() {
        let output = "* daemon not running; starting now at tcp:5037\n\
                      * daemon started successfully\n\
                      List of devices attached\n";
        assert!(parse_devices(output).is_empty());
    }

    #[test]
    fn test_no_permissions_state() {
        let output = "List of devices attached\n\
                      0123456789ABCDEF       no permissions (user in plugdev group); see [http://developer.android.com/tools/device.html] usb:1-1\n";
        let devices = parse_devices(output);
        assert_eq!(devices[0].state, DeviceState::Unknown("no permissions".into()));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut device = Device::new("abc", DeviceState::Ready);
        assert_eq!(device.display_name(), "abc");

        device.device = Some("beyond1".into());
        assert_eq!(device.display_name(), "beyond1");

        device.product = Some("beyond1ltexx".into());
        assert_eq!(device.display_name(), "beyond1ltexx");

        device.model = Some("SM G973F".into());
        assert_eq!(device.display_name(), "SM G973F");
    }
}
