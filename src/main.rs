//! droid-lite - Android build and device tooling
//!
//! Parses the command line, sets up logging and configuration, opens a
//! session for the current project, and dispatches to a command.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use droid_lite::commands::{
    BuildCommand, DevicesCommand, DoctorCommand, GradleTaskCommand, KeystoreCommand,
    LogcatCommand, ModuleCommand, RunCommand, WirelessCommand,
};
use droid_lite::session::Session;
use droid_lite_build_engine::{CertificateInfo, GradleTask};
use droid_lite_core::{AppConfig, APP_NAME, VERSION};

#[derive(Parser, Debug)]
#[command(name = "droid-lite", version, about = "Android build, device, and wireless debugging tooling")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding persisted state
    #[arg(long, global = true, env = "DROID_LITE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Project directory (defaults to the current directory)
    #[arg(long, short = 'C', global = true)]
    project: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List connected devices
    Devices {
        /// Select a device for run and logcat
        #[arg(long)]
        select: Option<String>,
    },
    /// Wireless debugging
    #[command(subcommand)]
    Wireless(WirelessCmd),
    /// Module target for Gradle tasks
    #[command(subcommand)]
    Module(ModuleCmd),
    /// Build an APK or app bundle
    Build {
        #[arg(long)]
        release: bool,
        /// Build an .aab instead of an .apk
        #[arg(long)]
        bundle: bool,
        /// Sign with the configured keystore (implies --release)
        #[arg(long)]
        signed: bool,
    },
    /// Run `gradlew clean`
    Clean,
    /// Let Gradle configure the project
    Sync,
    /// Build, install, and launch the debug app
    Run {
        #[arg(long)]
        device: Option<String>,
        /// Package to launch (detected when omitted)
        #[arg(long)]
        package: Option<String>,
    },
    /// Stream device logs
    Logcat {
        #[arg(long)]
        device: Option<String>,
        /// Only show this package's process
        #[arg(long)]
        package: Option<String>,
        /// Minimum level (v, d, i, w, e, f or a level name)
        #[arg(long)]
        level: Option<String>,
        /// Clear the device buffer first
        #[arg(long)]
        clear: bool,
    },
    /// Release signing keystore
    #[command(subcommand)]
    Keystore(KeystoreCmd),
    /// Check the toolchain and ADB
    Doctor {
        /// Kill and restart the ADB server
        #[arg(long)]
        restart_server: bool,
    },
}

#[derive(Subcommand, Debug)]
enum WirelessCmd {
    /// Saved wireless devices
    List,
    /// Reconnect every saved device
    Reconnect,
    /// Forget a saved device
    Forget { id: String },
    /// Disconnect an endpoint
    Disconnect { endpoint: String },
    /// Pair using the code shown on the device (Android 11+)
    Pair {
        /// Pairing endpoint, IP:PORT
        endpoint: String,
        /// Six-digit pairing code
        code: String,
        /// Port shown under "IP address & Port" on the device
        #[arg(long)]
        connect_port: u16,
    },
    /// Switch a USB device to TCP/IP and connect over Wi-Fi
    Tcpip {
        #[arg(long)]
        device: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Look for devices listening on the local network
    Scan,
}

#[derive(Subcommand, Debug)]
enum ModuleCmd {
    /// Modules from settings.gradle
    List,
    /// Set the target (`(Project Root)` clears it)
    Set { name: String },
    /// Show the project root and target
    Show,
}

#[derive(Subcommand, Debug)]
enum KeystoreCmd {
    /// Generate a keystore with keytool and remember it for signed builds
    Create(CreateKeystoreArgs),
    /// Show the configured keystore
    Show,
    /// Forget the keystore and its passwords
    Clear,
}

#[derive(Args, Debug)]
struct CreateKeystoreArgs {
    /// Output file (defaults to keystore/release.jks in the project)
    #[arg(long)]
    path: Option<PathBuf>,
    #[arg(long, default_value = "release")]
    alias: String,
    #[arg(long, env = "DROID_LITE_STORE_PASSWORD", hide_env_values = true)]
    store_password: String,
    /// Defaults to the store password
    #[arg(long, env = "DROID_LITE_KEY_PASSWORD", hide_env_values = true)]
    key_password: Option<String>,
    #[arg(long, default_value_t = 10000)]
    validity_days: u32,
    /// Common name (CN)
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, default_value = "")]
    org_unit: String,
    #[arg(long, default_value = "")]
    org: String,
    #[arg(long, default_value = "")]
    locality: String,
    #[arg(long, default_value = "")]
    state: String,
    /// Two-letter country code
    #[arg(long, default_value = "")]
    country: String,
}

impl CreateKeystoreArgs {
    fn certificate(&self) -> CertificateInfo {
        CertificateInfo {
            alias: self.alias.clone(),
            store_password: self.store_password.clone(),
            key_password: self
                .key_password
                .clone()
                .unwrap_or_else(|| self.store_password.clone()),
            validity_days: self.validity_days,
            common_name: self.name.clone(),
            organizational_unit: self.org_unit.clone(),
            organization: self.org.clone(),
            locality: self.locality.clone(),
            state: self.state.clone(),
            country: self.country.to_uppercase(),
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    debug!("{} v{} starting", APP_NAME, VERSION);

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path).await?,
        None => AppConfig::load().await?,
    };

    let data_dir = cli
        .data_dir
        .clone()
        .or_else(AppConfig::data_dir)
        .ok_or_else(|| anyhow!("Cannot determine a data directory; pass --data-dir"))?;
    let project = match cli.project.clone() {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let session = Session::open(config, &data_dir, &project).await?;
    info!("Project: {}", session.project_root().display());

    let result = dispatch(cli.command, &session).await;
    session.shutdown().await;
    result
}

async fn dispatch(command: Command, session: &Session) -> Result<()> {
    match command {
        Command::Devices { select } => DevicesCommand { select }.execute(session).await,
        Command::Wireless(cmd) => {
            let cmd = match cmd {
                WirelessCmd::List => WirelessCommand::List,
                WirelessCmd::Reconnect => WirelessCommand::Reconnect,
                WirelessCmd::Forget { id } => WirelessCommand::Forget { id },
                WirelessCmd::Disconnect { endpoint } => WirelessCommand::Disconnect { endpoint },
                WirelessCmd::Pair { endpoint, code, connect_port } => {
                    WirelessCommand::Pair { endpoint, code, connect_port }
                }
                WirelessCmd::Tcpip { device, port } => WirelessCommand::Tcpip { device, port },
                WirelessCmd::Scan => WirelessCommand::Scan,
            };
            cmd.execute(session).await
        }
        Command::Module(cmd) => {
            let cmd = match cmd {
                ModuleCmd::List => ModuleCommand::List,
                ModuleCmd::Set { name } => ModuleCommand::Set { name },
                ModuleCmd::Show => ModuleCommand::Show,
            };
            cmd.execute(session).await
        }
        Command::Build { release, bundle, signed } => {
            BuildCommand { release, bundle, signed }
                .execute(session)
                .await
                .map(|_| ())
        }
        Command::Clean => GradleTaskCommand { task: GradleTask::Clean }.execute(session).await,
        Command::Sync => GradleTaskCommand { task: GradleTask::Sync }.execute(session).await,
        Command::Run { device, package } => RunCommand { device, package }.execute(session).await,
        Command::Logcat { device, package, level, clear } => {
            LogcatCommand { device, package, level, clear }
                .execute(session)
                .await
        }
        Command::Keystore(cmd) => {
            let cmd = match cmd {
                KeystoreCmd::Create(args) => KeystoreCommand::Create {
                    path: args.path.clone(),
                    cert: args.certificate(),
                },
                KeystoreCmd::Show => KeystoreCommand::Show,
                KeystoreCmd::Clear => KeystoreCommand::Clear,
            };
            cmd.execute(session).await
        }
        Command::Doctor { restart_server } => DoctorCommand { restart_server }.execute(session).await,
    }
}
