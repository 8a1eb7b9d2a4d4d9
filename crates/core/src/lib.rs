//! droid-lite Core - shared types
//!
//! This crate provides the pieces every other droid-lite crate leans on:
//! configuration, durable state, the event bus, and error types.

pub mod config;
pub mod error;
pub mod events;
pub mod storage;

pub use config::AppConfig;
pub use error::{CoreError, Result};
pub use events::{Event, EventBus, EventSubscription};
pub use storage::{SecretStore, StateStore};

/// droid-lite version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "droid-lite";
