//! CLI commands for droid-lite
//!
//! Each command works against a [`Session`] and prints its results; errors
//! carry the remediation text of the failing component.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use droid_lite_build_engine::{
    generate_keystore, list_modules, ArtifactKind, BuildMessage, BuildOutcome, BuildVariant,
    CertificateInfo, GradleTask, KeystoreConfig, SigningProperties, PROJECT_ROOT,
};
use droid_lite_core::Event;
use droid_lite_device_bridge::wireless::{
    candidate_hosts, enable_tcpip, local_ipv4, pair_and_connect, usb_devices,
};
use droid_lite_device_bridge::{DeviceBridge, LogFilter, LogLevel, LogcatMode};

use crate::session::Session;

/// List devices, optionally selecting one
pub struct DevicesCommand {
    pub select: Option<String>,
}

impl DevicesCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let (report, devices) = session.activate().await?;

        if let Some(report) = report.filter(|r| r.attempted > 0) {
            println!(
                "Reconnected {}/{} saved wireless device(s)",
                report.succeeded.len(),
                report.attempted
            );
        }

        if let Some(id) = &self.select {
            if !session.select_device(id).await {
                warn!("{} is not connected; it stays selected for when it returns", id);
            }
        }

        if devices.is_empty() {
            println!("No devices connected");
            return Ok(());
        }

        let selected = session.devices().selected_id();
        println!("Connected devices:");
        for device in &devices {
            let marker = if selected.as_deref() == Some(device.id.as_str()) { "*" } else { " " };
            println!(
                "{} {:<24} {:<14} {}",
                marker,
                device.id,
                device.state.as_str(),
                device.display_name()
            );
        }
        Ok(())
    }
}

/// Wireless debugging subcommands
pub enum WirelessCommand {
    List,
    Reconnect,
    Forget { id: String },
    Disconnect { endpoint: String },
    Pair { endpoint: String, code: String, connect_port: u16 },
    Tcpip { device: Option<String>, port: Option<u16> },
    Scan,
}

impl WirelessCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        match self {
            WirelessCommand::List => {
                let saved = session.wireless().load().await;
                if saved.is_empty() {
                    println!("No saved wireless devices");
                }
                for device in saved {
                    let last = device
                        .last_connected_at()
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "{:<24} {:<15} {:<24} last connected {}",
                        device.endpoint(),
                        device.connection_type.as_str(),
                        device.model.as_deref().unwrap_or("-"),
                        last
                    );
                }
            }
            WirelessCommand::Reconnect => {
                session.adb()?;
                let report = session.reconnect_all().await;
                for endpoint in &report.succeeded {
                    println!("✓ {}", endpoint);
                }
                for (endpoint, reason) in &report.failed {
                    println!("✗ {}: {}", endpoint, reason);
                }
                session.refresh_devices().await?;
            }
            WirelessCommand::Forget { id } => {
                if session.wireless().remove(id).await {
                    session.events().emit(Event::WirelessDevicesChanged);
                    println!("Forgot {}", id);
                } else {
                    println!("{} was not saved", id);
                }
            }
            WirelessCommand::Disconnect { endpoint } => {
                let adb = session.adb()?;
                adb.disconnect(endpoint)
                    .await
                    .map_err(|e| anyhow!(e.user_message()))?;
                println!("Disconnected {}", endpoint);
                session.refresh_devices().await?;
            }
            WirelessCommand::Pair { endpoint, code, connect_port } => {
                let adb = session.adb()?;
                let connected = pair_and_connect(adb, endpoint, code, *connect_port)
                    .await
                    .map_err(|e| anyhow!(e.user_message()))
                    .context("Pairing failed")?;
                println!("✓ Paired and connected: {}", connected);
                session.refresh_devices().await?;
            }
            WirelessCommand::Tcpip { device, port } => {
                let adb = session.adb()?;
                let devices = session.refresh_devices().await?;
                let usb = usb_devices(&devices);

                let serial = match device {
                    Some(id) => id.clone(),
                    None => match usb.as_slice() {
                        [only] => only.id.clone(),
                        [] => bail!("No USB device connected. Connect one with a cable first."),
                        _ => bail!(
                            "Several USB devices connected ({}). Pick one with --device.",
                            usb.iter().map(|d| d.id.as_str()).collect::<Vec<_>>().join(", ")
                        ),
                    },
                };

                let port = port.unwrap_or(session.config().wireless.default_tcpip_port);
                let endpoint = enable_tcpip(adb, &serial, port)
                    .await
                    .map_err(|e| anyhow!(e.user_message()))?;
                println!("✓ {} is now connected at {}", serial, endpoint);
                println!("  You can unplug the USB cable.");
                session.refresh_devices().await?;
            }
            WirelessCommand::Scan => {
                session.adb()?;
                let local = local_ipv4()
                    .ok_or_else(|| anyhow!("Could not determine the local network address"))?;
                let hosts = candidate_hosts(local);
                println!("Scanning {} addresses near {} (Ctrl-C to stop)...", hosts.len(), local);

                let cancel = CancellationToken::new();
                let on_interrupt = cancel.clone();
                let watcher = tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        on_interrupt.cancel();
                    }
                });

                let found = session.scanner().scan(hosts, cancel).await;
                watcher.abort();

                if found.is_empty() {
                    println!("No devices found in TCP/IP mode");
                } else {
                    println!("Found {} device(s):", found.len());
                    for endpoint in found {
                        println!("  {}", endpoint);
                    }
                    println!("Connect with `adb connect <endpoint>`; it is saved once it shows up in `droid-lite devices`.");
                }
            }
        }
        Ok(())
    }
}

/// Module target subcommands
pub enum ModuleCommand {
    List,
    Set { name: String },
    Show,
}

impl ModuleCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        match self {
            ModuleCommand::List => {
                let active = session.module_target().await;
                for module in list_modules(session.project_root()) {
                    let is_active = match active.as_deref() {
                        Some(active) => module == active,
                        None => module == PROJECT_ROOT,
                    };
                    println!("{} {}", if is_active { "*" } else { " " }, module);
                }
            }
            ModuleCommand::Set { name } => {
                session.set_module_target(Some(name.as_str())).await?;
                let module = session.module_target().await;
                println!("Module target: {}", module.as_deref().unwrap_or(PROJECT_ROOT));
            }
            ModuleCommand::Show => {
                let module = session.module_target().await;
                println!("Project root:  {}", session.project_root().display());
                println!("Module target: {}", module.as_deref().unwrap_or(PROJECT_ROOT));
            }
        }
        Ok(())
    }
}

/// Build command options
pub struct BuildCommand {
    pub release: bool,
    pub bundle: bool,
    pub signed: bool,
}

impl BuildCommand {
    fn variant(&self, session: &Session) -> BuildVariant {
        if self.release || self.signed {
            return BuildVariant::Release;
        }
        session
            .config()
            .build
            .default_variant
            .parse()
            .unwrap_or(BuildVariant::Debug)
    }

    /// Execute the build command, returning the artifact path
    pub async fn execute(&self, session: &Session) -> Result<PathBuf> {
        let variant = self.variant(session);
        let kind = if self.bundle { ArtifactKind::Bundle } else { ArtifactKind::Apk };

        let signing = if self.signed {
            Some(session.signing().properties().await.ok_or_else(|| {
                anyhow!("No usable keystore configured. Run `droid-lite keystore create` first.")
            })?)
        } else {
            None
        };

        let outcome = run_task(session, GradleTask::for_artifact(kind, variant), signing.as_ref()).await?;
        let artifact = outcome
            .artifact
            .ok_or_else(|| anyhow!("{} produced no artifact", outcome.task))?;

        if artifact.exists() {
            println!("✓ Built {}", artifact.display());
        } else {
            warn!("Build succeeded but {} does not exist", artifact.display());
            println!("✓ Build succeeded (expected artifact at {})", artifact.display());
        }
        Ok(artifact)
    }
}

/// `clean` or `sync`
pub struct GradleTaskCommand {
    pub task: GradleTask,
}

impl GradleTaskCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let outcome = run_task(session, self.task, None).await?;
        println!("✓ {} completed", outcome.task);
        Ok(())
    }
}

/// Run a Gradle task for the active module, printing progress as it goes
async fn run_task(
    session: &Session,
    task: GradleTask,
    signing: Option<&SigningProperties>,
) -> Result<BuildOutcome> {
    let module = session.module_target().await;
    let events = session.events();

    events.emit(Event::BuildStarted { task: task.name() });

    let (tx, mut rx) = mpsc::channel(256);
    let printer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match message {
                BuildMessage::Started(task) => println!("> {}", task),
                BuildMessage::Task(task) => println!("  {}", task),
                BuildMessage::Warning(line) => println!("  warning: {}", line),
                BuildMessage::Error(line) => eprintln!("  {}", line),
                BuildMessage::Output(line) => debug!("{}", line),
                BuildMessage::Finished { .. } => {}
            }
        }
    });

    let result = session
        .gradle()
        .execute(task, module.as_deref(), signing, Some(tx))
        .await;
    let _ = printer.await;

    match result {
        Ok(outcome) => {
            events.emit(Event::BuildCompleted {
                success: true,
                artifact: outcome.artifact.clone(),
            });
            Ok(outcome)
        }
        Err(e) => {
            events.emit(Event::BuildCompleted {
                success: false,
                artifact: None,
            });
            Err(anyhow!(e.user_message()))
        }
    }
}

/// Build the default variant, then install and launch it
pub struct RunCommand {
    pub device: Option<String>,
    pub package: Option<String>,
}

const RUN_BUILD: BuildCommand = BuildCommand { release: false, bundle: false, signed: false };

impl RunCommand {
    /// Whether the APK `run` builds carries the debug `applicationIdSuffix`
    fn is_debug_build(session: &Session) -> bool {
        RUN_BUILD.variant(session) == BuildVariant::Debug
    }

    pub async fn execute(&self, session: &Session) -> Result<()> {
        let adb = session.adb()?;
        session.refresh_devices().await?;
        let serial = session.target_device(self.device.as_deref())?;

        let apk = RUN_BUILD.execute(session).await?;
        if !apk.is_file() {
            bail!("No APK found at {}", apk.display());
        }

        info!("Installing on device: {}", serial);
        adb.install(&serial, &apk)
            .await
            .map_err(|e| anyhow!(e.user_message()))
            .context("Install failed")?;
        println!("✓ Installed on {}", serial);

        let package = match &self.package {
            Some(package) => package.clone(),
            None => {
                let module = session.module_target().await;
                let candidates = session
                    .package_detector(module.as_deref())
                    .detect(Some(&apk), Self::is_debug_build(session), Some((adb, &serial)))
                    .await;
                debug!("Package candidates: {:?}", candidates);
                candidates
                    .into_iter()
                    .next()
                    .map(|c| c.name)
                    .ok_or_else(|| anyhow!("Could not determine the package name. Pass --package."))?
            }
        };

        let component = format!("{}/{}", package, session.config().build.launch_activity);
        info!("Starting app: {}", component);
        adb.start_activity(&serial, &component)
            .await
            .map_err(|e| anyhow!(e.user_message()))
            .context("Launch failed")?;
        println!("✓ Launched {}", component);
        Ok(())
    }
}

/// Stream logcat until interrupted
pub struct LogcatCommand {
    pub device: Option<String>,
    pub package: Option<String>,
    pub level: Option<String>,
    pub clear: bool,
}

impl LogcatCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        session.adb()?;
        session.refresh_devices().await?;
        let serial = session.target_device(self.device.as_deref())?;

        let filter = match self.level.as_deref() {
            Some(level) => LogFilter::min_level(
                LogLevel::parse(level).ok_or_else(|| anyhow!("Unknown log level '{}'", level))?,
            ),
            None => LogFilter::default(),
        };
        let mode = match &self.package {
            Some(package) => LogcatMode::Package(package.clone()),
            None => LogcatMode::All,
        };

        let logcat = session.logcat();
        if self.clear {
            logcat.clear(&serial).await?;
        }

        let mut rx = logcat.start(&serial, mode, filter).await?;
        loop {
            tokio::select! {
                entry = rx.recv() => match entry {
                    Some(entry) => println!("{}", entry.formatted()),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        logcat.stop().await;
        Ok(())
    }
}

/// Keystore subcommands
pub enum KeystoreCommand {
    Create { path: Option<PathBuf>, cert: CertificateInfo },
    Show,
    Clear,
}

impl KeystoreCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let signing = session.signing();

        match self {
            KeystoreCommand::Create { path, cert } => {
                let keytool = session
                    .toolchain()
                    .keytool_path()
                    .map_err(|e| anyhow!(e.user_message()))?;
                let keystore = path
                    .clone()
                    .unwrap_or_else(|| session.project_root().join("keystore").join("release.jks"));

                generate_keystore(&keytool, &keystore, cert)
                    .await
                    .map_err(|e| anyhow!(e.user_message()))?;

                let config = KeystoreConfig {
                    keystore_path: keystore.clone(),
                    key_alias: cert.alias.clone(),
                };
                signing
                    .save(&config, &cert.store_password, &cert.key_password)
                    .await
                    .context("Failed to save signing configuration")?;

                println!("✓ Keystore created: {}", keystore.display());
                println!("  Keep it and its passwords safe; releases signed with it can only be updated with the same key.");
            }
            KeystoreCommand::Show => match signing.config().await {
                Some(config) => {
                    println!("Keystore: {}", config.keystore_path.display());
                    println!("Alias:    {}", config.key_alias);
                    if !signing.is_configured().await {
                        println!("⚠ The keystore file is missing");
                    } else if signing.properties().await.is_none() {
                        println!("⚠ Passwords are missing; create or re-save the keystore");
                    }
                }
                None => println!("No keystore configured"),
            },
            KeystoreCommand::Clear => {
                signing.clear().await.context("Failed to clear signing configuration")?;
                println!("Signing configuration cleared (the keystore file was kept)");
            }
        }
        Ok(())
    }
}

/// Environment diagnostics
pub struct DoctorCommand {
    pub restart_server: bool,
}

impl DoctorCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let status = session.toolchain().detect_all().await;

        match &status.sdk {
            Some(sdk) => {
                println!("✓ Android SDK: {} ({:?})", sdk.path.display(), sdk.source);
                if let Some(latest) = sdk.build_tools_versions.last() {
                    println!("  build-tools {}", latest);
                }
                if let Some(platform) = sdk.platform_versions.last() {
                    println!("  platform android-{}", platform);
                }
            }
            None => println!("✗ Android SDK not found"),
        }
        print_tool("aapt", status.aapt.as_ref());
        print_tool("keytool", status.keytool.as_ref());
        print_tool("java", session.toolchain().java_path().as_ref());

        match session.adb() {
            Ok(adb) => {
                println!("✓ ADB: {}", adb.adb_path().display());
                match adb.version().await {
                    Ok(Some(version)) => println!("  version {}", version),
                    Ok(None) => println!("  version unknown"),
                    Err(e) => println!("  ✗ {}", e.user_message()),
                }

                if self.restart_server {
                    println!("Restarting ADB server...");
                    if let Err(e) = adb.kill_server().await {
                        debug!("kill-server: {}", e);
                    }
                    adb.start_server()
                        .await
                        .map_err(|e| anyhow!(e.user_message()))?;
                    println!("✓ ADB server restarted");
                }

                match session.refresh_devices().await {
                    Ok(devices) => {
                        println!("{} device(s) connected", devices.len());
                        for device in devices {
                            println!("  {:<24} {}", device.id, device.state.as_str());
                        }
                    }
                    Err(e) => println!("✗ {:#}", e),
                }
            }
            Err(e) => println!("✗ {}", e),
        }

        let missing = status.missing_components();
        if missing.is_empty() {
            println!("\nEverything needed is installed.");
        } else {
            println!("\nMissing: {}", missing.join(", "));
        }
        Ok(())
    }
}

fn print_tool(name: &str, path: Option<&PathBuf>) {
    match path {
        Some(path) => println!("✓ {}: {}", name, path.display()),
        None => println!("✗ {} not found", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use droid_lite_core::AppConfig;

    async fn session(dir: &std::path::Path, config: AppConfig) -> Session {
        Session::open(config, &dir.join("data"), dir).await.unwrap()
    }

    #[tokio::test]
    async fn test_build_variant_selection() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.build.default_variant = "release".into();
        let session = session(dir.path(), config).await;

        let debug_default = BuildCommand { release: false, bundle: false, signed: false };
        assert_eq!(debug_default.variant(&session), BuildVariant::Release);

        let signed = BuildCommand { release: false, bundle: true, signed: true };
        assert_eq!(signed.variant(&session), BuildVariant::Release);
    }

    #[tokio::test]
    async fn test_run_package_suffix_follows_build_variant() {
        let dir = tempfile::tempdir().unwrap();
        let session_debug = session(dir.path(), AppConfig::default()).await;
        assert!(RunCommand::is_debug_build(&session_debug));

        let other = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.build.default_variant = "release".into();
        let session_release = session(other.path(), config).await;
        assert!(!RunCommand::is_debug_build(&session_release));
    }

    #[tokio::test]
    async fn test_signed_build_requires_keystore() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), AppConfig::default()).await;
        let sub = session.events().subscribe();

        let build = BuildCommand { release: true, bundle: false, signed: true };
        let err = build.execute(&session).await.unwrap_err();
        assert!(err.to_string().contains("keystore"));
        // Refused before Gradle ran
        assert!(sub.drain().is_empty());
    }

    #[tokio::test]
    async fn test_build_without_wrapper_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), AppConfig::default()).await;
        let sub = session.events().subscribe();

        let build = BuildCommand { release: false, bundle: false, signed: false };
        let err = build.execute(&session).await.unwrap_err();
        assert!(err.to_string().contains("gradlew"));

        assert_eq!(
            sub.drain(),
            vec![
                Event::BuildStarted { task: "assembleDebug".into() },
                Event::BuildCompleted { success: false, artifact: None },
            ]
        );
    }

    #[tokio::test]
    async fn test_module_set_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), AppConfig::default()).await;

        ModuleCommand::Set { name: ":app".into() }.execute(&session).await.unwrap();
        assert_eq!(session.module_target().await.as_deref(), Some(":app"));

        ModuleCommand::Set { name: PROJECT_ROOT.into() }.execute(&session).await.unwrap();
        assert_eq!(session.module_target().await, None);
    }

    #[tokio::test]
    async fn test_forget_unknown_wireless_device() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), AppConfig::default()).await;
        let sub = session.events().subscribe();

        WirelessCommand::Forget { id: "10.0.0.9:5555".into() }
            .execute(&session)
            .await
            .unwrap();
        assert!(sub.drain().is_empty());
    }
}
