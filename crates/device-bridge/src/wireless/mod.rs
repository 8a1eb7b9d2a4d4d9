//! Wireless debugging
//!
//! Saved endpoints, reconnection, pairing, TCP/IP promotion, and network scan.

pub mod pairing;
pub mod reconnect;
pub mod scanner;
pub mod store;
pub mod tcpip;

pub use pairing::{pair_and_connect, validate_endpoint, validate_pairing_code};
pub use reconnect::{ReconnectReport, Reconnector};
pub use scanner::{candidate_hosts, local_ipv4, NetworkScanner};
pub use store::{
    ConnectionType, SavedWirelessDevice, WirelessStore, DEFAULT_TCPIP_PORT, WIRELESS_DEVICES_KEY,
};
pub use tcpip::{enable_tcpip, parse_device_ip, usb_devices};
