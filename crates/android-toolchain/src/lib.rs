//! Android Toolchain Discovery
//!
//! Finds the Android SDK and the command-line tools droid-lite drives:
//! - `adb` from platform-tools
//! - `aapt` from build-tools
//! - `keytool` and `java` from a JDK

pub mod detector;

pub use detector::{
    exe_name, DetectionError, SdkInfo, SdkSource, ToolchainDetector, ToolchainStatus,
};
