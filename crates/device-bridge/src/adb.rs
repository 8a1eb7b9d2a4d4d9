//! ADB (Android Debug Bridge) Client
//!
//! Communicates with devices via the `adb` executable. Every call spawns one
//! child process; calls with a timeout kill the child when it expires.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::device::{parse_devices, Device};

static ADB_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Android Debug Bridge version ([\d.]+)").expect("valid regex"));

/// Words ADB prints when `connect` or `pair` did not work (it still exits 0)
const FAILURE_MARKERS: &[&str] = &["failed", "unable", "cannot"];

/// ADB errors
#[derive(Debug, thiserror::Error)]
pub enum AdbError {
    #[error("ADB not found at {0}")]
    NotFound(PathBuf),
    #[error("ADB command failed: {0}")]
    CommandFailed(String),
    #[error("adb {command} timed out after {after:?}")]
    Timeout { command: String, after: Duration },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdbError {
    pub fn user_message(&self) -> String {
        match self {
            AdbError::NotFound(path) => format!(
                "ADB not found at {}.\n\n\
                 Install \"Android SDK Platform-Tools\" from the SDK Manager, \
                 or set android.sdk_path in the config file.",
                path.display()
            ),
            other => other.to_string(),
        }
    }
}

/// Captured output of one ADB invocation
#[derive(Debug, Clone)]
pub struct AdbOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl AdbOutput {
    /// stdout and stderr together, trimmed
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout.trim(), self.stderr.trim())
            .trim()
            .to_string()
    }

    fn reports_failure(&self) -> bool {
        let text = self.combined().to_lowercase();
        FAILURE_MARKERS.iter().any(|marker| text.contains(marker))
    }
}

/// The device operations the registry, reconnector, and scanner depend on
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// `adb devices -l`
    async fn list_devices(&self) -> Result<Vec<Device>, AdbError>;

    /// `adb connect <endpoint>`, returning ADB's message on success
    async fn connect(&self, endpoint: &str) -> Result<String, AdbError>;

    /// `adb disconnect <endpoint>`
    async fn disconnect(&self, endpoint: &str) -> Result<(), AdbError>;
}

/// ADB Client
#[derive(Debug, Clone)]
pub struct AdbClient {
    adb_path: PathBuf,
}

impl AdbClient {
    /// Create a client for a specific `adb` executable
    pub fn new(adb_path: PathBuf) -> Self {
        Self { adb_path }
    }

    /// Create a client for the `adb` inside an SDK's platform-tools
    pub fn from_sdk(sdk_path: &Path) -> Self {
        let name = if cfg!(windows) { "adb.exe" } else { "adb" };
        Self::new(sdk_path.join("platform-tools").join(name))
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb_path
    }

    /// Check if ADB is available
    pub fn is_available(&self) -> bool {
        self.adb_path.exists()
    }

    /// Run ADB and capture output without judging the exit status
    pub async fn exec(&self, args: &[&str], timeout: Option<Duration>) -> Result<AdbOutput, AdbError> {
        if !self.is_available() {
            return Err(AdbError::NotFound(self.adb_path.clone()));
        }

        debug!("adb {:?}", args);

        let mut command = Command::new(&self.adb_path);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| AdbError::Timeout {
                    command: args.join(" "),
                    after: limit,
                })??,
            None => command.output().await?,
        };

        Ok(AdbOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        })
    }

    /// Run an ADB command, failing on a non-zero exit
    pub async fn run(&self, args: &[&str]) -> Result<String, AdbError> {
        let output = self.exec(args, None).await?;

        if !output.success {
            return Err(AdbError::CommandFailed(output.combined()));
        }

        Ok(output.stdout)
    }

    /// Run an ADB command for a specific device
    pub async fn run_for_device(&self, serial: &str, args: &[&str]) -> Result<String, AdbError> {
        let mut full_args = vec!["-s", serial];
        full_args.extend(args);
        self.run(&full_args).await
    }

    /// Start the ADB server
    pub async fn start_server(&self) -> Result<(), AdbError> {
        self.run(&["start-server"]).await?;
        Ok(())
    }

    /// Kill the ADB server
    pub async fn kill_server(&self) -> Result<(), AdbError> {
        self.run(&["kill-server"]).await?;
        Ok(())
    }

    /// ADB version string, e.g. "1.0.41"
    pub async fn version(&self) -> Result<Option<String>, AdbError> {
        let output = self.run(&["version"]).await?;
        Ok(parse_adb_version(&output))
    }

    /// Run a shell command on device
    pub async fn shell(&self, serial: &str, command: &str) -> Result<String, AdbError> {
        self.run_for_device(serial, &["shell", command]).await
    }

    /// Install (or reinstall) an APK
    pub async fn install(&self, serial: &str, apk_path: &Path) -> Result<(), AdbError> {
        let path_str = apk_path.to_string_lossy();
        let output = self.run_for_device(serial, &["install", "-r", &path_str]).await?;

        // Older platform-tools exit 0 and print "Failure [...]"
        if output.contains("Failure") {
            return Err(AdbError::CommandFailed(output.trim().to_string()));
        }
        Ok(())
    }

    /// Launch an activity (`package/activity`)
    pub async fn start_activity(&self, serial: &str, component: &str) -> Result<(), AdbError> {
        let output = self.run_for_device(serial, &["shell", "am", "start", "-n", component]).await?;

        if output.contains("Error:") {
            return Err(AdbError::CommandFailed(output.trim().to_string()));
        }
        Ok(())
    }

    /// PID of a running package, `None` when it is not running
    pub async fn pidof(&self, serial: &str, package: &str) -> Result<Option<u32>, AdbError> {
        let output = self.exec(&["-s", serial, "shell", "pidof", "-s", package], None).await?;
        Ok(output.stdout.trim().parse().ok())
    }

    /// Pair with a device using a wireless debugging pairing code
    pub async fn pair(&self, endpoint: &str, code: &str) -> Result<String, AdbError> {
        let output = self.exec(&["pair", endpoint, code], None).await?;

        if !output.success || output.reports_failure() {
            return Err(AdbError::CommandFailed(output.combined()));
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Restart adbd on the device listening on a TCP port
    pub async fn tcpip(&self, serial: &str, port: u16) -> Result<(), AdbError> {
        let port = port.to_string();
        self.run_for_device(serial, &["tcpip", &port]).await?;
        Ok(())
    }

    /// Installed package names
    pub async fn list_packages(&self, serial: &str) -> Result<Vec<String>, AdbError> {
        let output = self.run_for_device(serial, &["shell", "pm", "list", "packages"]).await?;
        Ok(output
            .lines()
            .filter_map(|line| line.trim().strip_prefix("package:"))
            .map(str::to_string)
            .collect())
    }

    /// Raw `dumpsys window` output
    pub async fn dumpsys_window(&self, serial: &str) -> Result<String, AdbError> {
        self.run_for_device(serial, &["shell", "dumpsys", "window"]).await
    }
}

#[async_trait]
impl DeviceBridge for AdbClient {
    async fn list_devices(&self) -> Result<Vec<Device>, AdbError> {
        let output = self.run(&["devices", "-l"]).await?;
        Ok(parse_devices(&output))
    }

    async fn connect(&self, endpoint: &str) -> Result<String, AdbError> {
        let output = self.exec(&["connect", endpoint], None).await?;

        if !output.success || output.reports_failure() {
            debug!("adb connect {} failed: {}", endpoint, output.combined());
            return Err(AdbError::CommandFailed(output.combined()));
        }
        Ok(output.stdout.trim().to_string())
    }

    async fn disconnect(&self, endpoint: &str) -> Result<(), AdbError> {
        let output = self.exec(&["disconnect", endpoint], None).await?;
        if !output.success {
            warn!("adb disconnect {} failed: {}", endpoint, output.combined());
            return Err(AdbError::CommandFailed(output.combined()));
        }
        Ok(())
    }
}

/// Extract the version from `adb version` output
pub fn parse_adb_version(output: &str) -> Option<String> {
    ADB_VERSION_RE
        .captures(output)
        .map(|caps| caps[1].to_string())
}
