//! droid-lite - Android build and device tooling
//!
//! The binary wires these crates together:
//!
//! - `droid-lite-core`: configuration, state stores, events, errors
//! - `droid-lite-android-toolchain`: SDK, ADB, aapt, and JDK detection
//! - `droid-lite-device-bridge`: devices, wireless debugging, logcat
//! - `droid-lite-build-engine`: Gradle tasks, artifacts, signing, packages

#![warn(clippy::all)]

pub mod commands;
pub mod session;

pub use droid_lite_android_toolchain as toolchain;
pub use droid_lite_build_engine as build;
pub use droid_lite_core as core;
pub use droid_lite_device_bridge as device;

pub use session::Session;
