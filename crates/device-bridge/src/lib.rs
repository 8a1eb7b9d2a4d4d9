//! Android Device Bridge
//!
//! Talks to devices through ADB: listing and selecting devices, installing
//! and launching apps, streaming logcat, and wireless debugging setup.

pub mod adb;
pub mod device;
pub mod logcat;
pub mod registry;
pub mod wireless;

pub use adb::{AdbClient, AdbError, AdbOutput, DeviceBridge};
pub use device::{parse_devices, Device, DeviceState, DeviceType};
pub use logcat::{LogEntry, LogFilter, LogLevel, LogcatError, LogcatMode, LogcatSession};
pub use registry::DeviceRegistry;
pub use wireless::{
    ConnectionType, NetworkScanner, ReconnectReport, Reconnector, SavedWirelessDevice,
    WirelessStore,
};

/// Default ADB server port
pub const DEFAULT_ADB_PORT: u16 = 5037;
