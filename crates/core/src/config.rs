//! Application Configuration
//!
//! Manages the tool settings including:
//! - Android SDK and JDK overrides
//! - Wireless debugging timeouts
//! - Build defaults
//! - Logcat buffering

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use directories::ProjectDirs;
use tracing::{info, debug};

use crate::error::{CoreError, Result};

/// Android SDK configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AndroidConfig {
    /// Path to Android SDK (overrides ANDROID_HOME detection)
    pub sdk_path: Option<PathBuf>,
    /// Path to a JDK (overrides JAVA_HOME)
    pub java_home: Option<PathBuf>,
}

/// Wireless debugging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WirelessConfig {
    /// Reconnect saved wireless devices when a session activates
    pub reconnect_on_start: bool,
    /// Per-endpoint timeout for reconnect attempts
    pub reconnect_timeout_secs: u64,
    /// Port used when switching a USB device to TCP/IP mode
    pub default_tcpip_port: u16,
    /// Per-address timeout while scanning the network
    pub scan_timeout_ms: u64,
    /// Number of addresses probed at once while scanning
    pub scan_concurrency: usize,
}

impl Default for WirelessConfig {
    fn default() -> Self {
        Self {
            reconnect_on_start: true,
            reconnect_timeout_secs: 5,
            default_tcpip_port: 5555,
            scan_timeout_ms: 1500,
            scan_concurrency: 16,
        }
    }
}

impl WirelessConfig {
    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.reconnect_timeout_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Default build variant
    pub default_variant: String,
    /// Upper bound on a single Gradle invocation (unbounded when unset)
    pub build_timeout_secs: Option<u64>,
    /// Activity launched after install, relative to the package
    pub launch_activity: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            default_variant: "debug".to_string(),
            build_timeout_secs: None,
            launch_activity: ".MainActivity".to_string(),
        }
    }
}

impl BuildConfig {
    pub fn build_timeout(&self) -> Option<Duration> {
        self.build_timeout_secs.map(Duration::from_secs)
    }
}

/// Logcat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogcatConfig {
    /// Number of parsed lines buffered between the reader and the consumer
    pub buffer_lines: usize,
}

impl Default for LogcatConfig {
    fn default() -> Self {
        Self { buffer_lines: 1000 }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration version for migrations
    pub version: u32,
    /// Android SDK settings
    pub android: AndroidConfig,
    /// Wireless debugging settings
    pub wireless: WirelessConfig,
    /// Build settings
    pub build: BuildConfig,
    /// Logcat settings
    pub logcat: LogcatConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            android: AndroidConfig::default(),
            wireless: WirelessConfig::default(),
            build: BuildConfig::default(),
            logcat: LogcatConfig::default(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "droid-lite", "droid-lite")
}

impl AppConfig {
    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get the data directory path (state stores live here)
    pub fn data_dir() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Load configuration from the default location
    pub async fn load() -> Result<Self> {
        let config_file = Self::config_file()
            .ok_or_else(|| CoreError::Config("Cannot determine config path".into()))?;
        Self::load_from(&config_file).await
    }

    /// Load configuration from a file, writing defaults if it does not exist
    pub async fn load_from(config_file: &Path) -> Result<Self> {
        if config_file.exists() {
            debug!("Loading config from {:?}", config_file);
            let contents = tokio::fs::read_to_string(config_file).await?;
            let config: AppConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            info!("Config file not found, using defaults");
            let config = AppConfig::default();
            config.save_to(config_file).await?;
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub async fn save_to(&self, config_file: &Path) -> Result<()> {
        if let Some(parent) = config_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(config_file, contents).await?;

        debug!("Config saved to {:?}", config_file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.wireless.reconnect_timeout(), Duration::from_secs(5));
        assert_eq!(config.wireless.default_tcpip_port, 5555);
        assert_eq!(config.build.default_variant, "debug");
        assert!(config.build.build_timeout().is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [wireless]
            reconnect_timeout_secs = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.wireless.reconnect_timeout_secs, 2);
        assert!(config.wireless.reconnect_on_start);
        assert_eq!(config.logcat.buffer_lines, 1000);
    }

    #[tokio::test]
    async fn test_load_creates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = AppConfig::load_from(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.version, 1);

        let reloaded = AppConfig::load_from(&path).await.unwrap();
        assert_eq!(reloaded.build.launch_activity, ".MainActivity");
    }
}
