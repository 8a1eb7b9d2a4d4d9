//! Session context
//!
//! Everything one invocation works with: configuration, state stores, the
//! event bus, the device registry, and the live logcat stream. Components get
//! what they need from here instead of reaching for globals.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info, warn};

use droid_lite_android_toolchain::{exe_name, DetectionError, ToolchainDetector};
use droid_lite_build_engine::{
    find_project_root, module_dir, GradleRunner, ModuleTarget, PackageDetector, SigningStore,
};
use droid_lite_core::{AppConfig, Event, EventBus, SecretStore, StateStore};
use droid_lite_device_bridge::{
    AdbClient, Device, DeviceBridge, DeviceRegistry, LogcatSession, NetworkScanner,
    ReconnectReport, Reconnector, WirelessStore,
};

/// State key remembering the selected device between invocations
pub const SELECTED_DEVICE_KEY: &str = "android.selectedDevice";

pub struct Session {
    config: AppConfig,
    events: Arc<EventBus>,
    toolchain: ToolchainDetector,
    project_root: PathBuf,
    workspace: StateStore,
    secrets: SecretStore,
    adb: AdbClient,
    bridge: Arc<dyn DeviceBridge>,
    devices: DeviceRegistry,
    wireless: WirelessStore,
    logcat: LogcatSession,
}

impl Session {
    /// Open a session for the project found in `workspace_dir`
    pub async fn open(config: AppConfig, data_dir: &Path, workspace_dir: &Path) -> Result<Self> {
        let events = Arc::new(EventBus::new());
        let toolchain = ToolchainDetector::new()
            .with_sdk_path(config.android.sdk_path.clone())
            .with_java_home(config.android.java_home.clone());

        let project_root = find_project_root(workspace_dir);
        debug!("Project root: {:?}", project_root);

        let global = Arc::new(StateStore::global(data_dir));
        let workspace = StateStore::for_workspace(data_dir, &project_root);
        let secrets = SecretStore::open(data_dir);

        let adb = match toolchain.adb_path() {
            Ok(path) | Err(DetectionError::AdbNotFound(path)) => AdbClient::new(path),
            Err(_) => AdbClient::new(PathBuf::from(exe_name("adb"))),
        };
        let bridge: Arc<dyn DeviceBridge> = Arc::new(adb.clone());

        let devices = DeviceRegistry::new(bridge.clone(), events.clone());
        match workspace.get::<String>(SELECTED_DEVICE_KEY).await {
            Ok(selected) => devices.restore_selection(selected),
            Err(e) => warn!("Could not restore selected device: {}", e),
        }

        let logcat = LogcatSession::new(adb.clone(), events.clone(), config.logcat.buffer_lines);

        Ok(Self {
            wireless: WirelessStore::new(global),
            config,
            events,
            toolchain,
            project_root,
            workspace,
            secrets,
            adb,
            bridge,
            devices,
            logcat,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn toolchain(&self) -> &ToolchainDetector {
        &self.toolchain
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn wireless(&self) -> &WirelessStore {
        &self.wireless
    }

    pub fn logcat(&self) -> &LogcatSession {
        &self.logcat
    }

    /// The ADB client, or a remediation message when ADB is missing
    pub fn adb(&self) -> Result<&AdbClient> {
        if self.adb.is_available() {
            return Ok(&self.adb);
        }
        match self.toolchain.adb_path() {
            Err(e) => Err(anyhow!(e.user_message())),
            Ok(_) => Err(anyhow!(DetectionError::AdbNotFound(self.adb.adb_path().to_path_buf()).user_message())),
        }
    }

    /// Startup sequence: reconnect saved wireless devices (when enabled), then
    /// refresh the device list
    pub async fn activate(&self) -> Result<(Option<ReconnectReport>, Vec<Device>)> {
        self.adb()?;

        let report = if self.config.wireless.reconnect_on_start {
            Some(self.reconnect_all().await)
        } else {
            None
        };

        let devices = self.refresh_devices().await?;
        Ok((report, devices))
    }

    pub async fn reconnect_all(&self) -> ReconnectReport {
        Reconnector::new(
            self.bridge.clone(),
            self.wireless.clone(),
            self.events.clone(),
            self.config.wireless.reconnect_timeout(),
        )
        .reconnect_all()
        .await
    }

    /// Refresh the registry and remember every wireless device that is online
    pub async fn refresh_devices(&self) -> Result<Vec<Device>> {
        let devices = self
            .devices
            .refresh()
            .await
            .map_err(|e| anyhow!(e.user_message()))
            .context("Failed to list devices")?;

        if self.wireless.observe(&devices).await > 0 {
            self.events.emit(Event::WirelessDevicesChanged);
        }
        Ok(devices)
    }

    /// Select a device and remember the choice for later invocations
    pub async fn select_device(&self, id: &str) -> bool {
        let known = self.devices.select(id);
        if let Err(e) = self.workspace.update(SELECTED_DEVICE_KEY, Some(&id)).await {
            warn!("Could not save selected device: {}", e);
        }
        known
    }

    /// `explicit`, else the selected device, else an error
    pub fn target_device(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.devices.selected_id())
            .ok_or_else(|| anyhow!("No device selected. Connect a device or pass --device."))
    }

    pub fn scanner(&self) -> NetworkScanner {
        NetworkScanner::new(
            self.bridge.clone(),
            self.config.wireless.default_tcpip_port,
            self.config.wireless.scan_timeout(),
            self.config.wireless.scan_concurrency,
        )
    }

    pub async fn module_target(&self) -> Option<String> {
        ModuleTarget::new(&self.workspace).get().await
    }

    pub async fn set_module_target(&self, module: Option<&str>) -> Result<()> {
        let target = ModuleTarget::new(&self.workspace);
        target.set(module).await.context("Failed to save module target")?;

        let module = target.get().await;
        info!("Module target: {}", module.as_deref().unwrap_or("(Project Root)"));
        self.events.emit(Event::ModuleTargetChanged { module });
        Ok(())
    }

    pub fn signing(&self) -> SigningStore<'_> {
        SigningStore::new(&self.workspace, &self.secrets)
    }

    pub fn gradle(&self) -> GradleRunner {
        let android_home = self.toolchain.sdk_path().map(|(path, _)| path);

        GradleRunner::new(self.project_root.clone())
            .with_java(self.toolchain.java_path())
            .with_java_home(self.config.android.java_home.clone())
            .with_android_home(android_home)
            .with_timeout(self.config.build.build_timeout())
    }

    pub fn package_detector(&self, module: Option<&str>) -> PackageDetector {
        PackageDetector::new(
            self.project_root.clone(),
            module_dir(&self.project_root, module),
            self.toolchain.aapt_path(),
        )
    }

    /// Tear down long-running children
    pub async fn shutdown(&self) {
        self.logcat.stop().await;
        self.events.emit(Event::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use droid_lite_device_bridge::DeviceState;

    async fn session(dir: &Path) -> Session {
        let mut config = AppConfig::default();
        config.android.sdk_path = Some(dir.join("no-sdk"));
        Session::open(config, &dir.join("data"), dir).await.unwrap()
    }

    #[tokio::test]
    async fn test_module_target_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path()).await;
        let sub = session.events().subscribe();

        assert_eq!(session.module_target().await, None);
        session.set_module_target(Some(":lib:core")).await.unwrap();
        assert_eq!(session.module_target().await.as_deref(), Some(":lib:core"));

        assert_eq!(
            sub.drain(),
            vec![Event::ModuleTargetChanged { module: Some(":lib:core".into()) }]
        );
    }

    #[tokio::test]
    async fn test_selection_survives_sessions() {
        let dir = tempfile::tempdir().unwrap();
        {
            let session = session(dir.path()).await;
            assert!(!session.select_device("R58M123ABC").await);
        }

        let session = session(dir.path()).await;
        assert_eq!(session.target_device(None).unwrap(), "R58M123ABC");
        assert_eq!(session.target_device(Some("emulator-5554")).unwrap(), "emulator-5554");
    }

    #[tokio::test]
    async fn test_wireless_store_is_global() {
        let dir = tempfile::tempdir().unwrap();
        let project_a = dir.path().join("a");
        let project_b = dir.path().join("b");
        std::fs::create_dir_all(&project_a).unwrap();
        std::fs::create_dir_all(&project_b).unwrap();
        let data = dir.path().join("data");

        let a = Session::open(AppConfig::default(), &data, &project_a).await.unwrap();
        a.wireless()
            .save(&Device::new("192.168.1.20:5555", DeviceState::Ready))
            .await;

        let b = Session::open(AppConfig::default(), &data, &project_b).await.unwrap();
        assert_eq!(b.wireless().load().await.len(), 1);
    }
}
