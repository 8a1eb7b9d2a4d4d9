//! Toolchain Detection
//!
//! Locates the Android SDK and the executables droid-lite shells out to:
//! `adb`, `aapt`, `keytool`, and `java`.

use std::path::{Path, PathBuf};
use std::env;
use tracing::{info, debug, warn};
use which::which;

/// Result of SDK detection
#[derive(Debug, Clone)]
pub struct SdkInfo {
    pub path: PathBuf,
    pub source: SdkSource,
    pub build_tools_versions: Vec<String>,
    pub platform_versions: Vec<u32>,
    pub has_platform_tools: bool,
}

/// Where an SDK path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkSource {
    /// `android.sdk_path` in the configuration file
    Configured,
    /// `ANDROID_HOME` or `ANDROID_SDK_ROOT`
    Environment,
    /// A well-known install location for this OS
    Default,
}

/// Toolchain detection errors
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("Android SDK not found")]
    SdkNotFound,
    #[error("ADB not found at {0}")]
    AdbNotFound(PathBuf),
    #[error("keytool not found")]
    KeytoolNotFound,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DetectionError {
    /// Message with remediation hints for the user
    pub fn user_message(&self) -> String {
        match self {
            DetectionError::SdkNotFound => "Android SDK not found.\n\n\
                Solutions:\n\
                1. Set android.sdk_path in the droid-lite config file\n\
                2. Or set the ANDROID_HOME environment variable"
                .to_string(),
            DetectionError::AdbNotFound(path) => format!(
                "ADB not found at {}.\n\n\
                 Solutions:\n\
                 1. Open Android Studio -> SDK Manager\n\
                 2. SDK Tools tab -> enable \"Android SDK Platform-Tools\"",
                path.display()
            ),
            DetectionError::KeytoolNotFound => "keytool not found!\n\n\
                Please ensure a JDK is installed and either:\n\
                - set the JAVA_HOME environment variable\n\
                - add the JDK bin folder to PATH"
                .to_string(),
            DetectionError::Io(e) => format!("File operation failed: {}", e),
        }
    }
}

/// Platform-specific executable file name
pub fn exe_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

/// Toolchain detector
#[derive(Debug, Clone, Default)]
pub struct ToolchainDetector {
    sdk_override: Option<PathBuf>,
    java_home_override: Option<PathBuf>,
}

impl ToolchainDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer this SDK location over environment and defaults
    pub fn with_sdk_path(mut self, path: Option<PathBuf>) -> Self {
        self.sdk_override = path;
        self
    }

    /// Prefer this JDK over JAVA_HOME
    pub fn with_java_home(mut self, path: Option<PathBuf>) -> Self {
        self.java_home_override = path;
        self
    }

    /// SDK path candidates in priority order
    fn sdk_candidates(&self) -> Vec<(PathBuf, SdkSource)> {
        let mut candidates = Vec::new();

        if let Some(path) = &self.sdk_override {
            candidates.push((path.clone(), SdkSource::Configured));
        }

        for var in ["ANDROID_HOME", "ANDROID_SDK_ROOT"] {
            if let Ok(value) = env::var(var) {
                if !value.is_empty() {
                    candidates.push((PathBuf::from(value), SdkSource::Environment));
                }
            }
        }

        for path in default_sdk_paths() {
            candidates.push((path, SdkSource::Default));
        }

        candidates
    }

    /// First SDK location that exists on disk
    pub fn sdk_path(&self) -> Option<(PathBuf, SdkSource)> {
        let found = self
            .sdk_candidates()
            .into_iter()
            .find(|(path, _)| path.is_dir());

        match &found {
            Some((path, source)) => debug!("Android SDK found ({:?}): {:?}", source, path),
            None => warn!("Android SDK not found automatically"),
        }
        found
    }

    /// Detect and describe the Android SDK installation
    pub async fn detect_sdk(&self) -> Result<SdkInfo, DetectionError> {
        info!("Detecting Android SDK...");

        let (path, source) = self.sdk_path().ok_or(DetectionError::SdkNotFound)?;

        let mut build_tools_versions = list_dir_names(&path.join("build-tools")).await;
        sort_versions(&mut build_tools_versions);

        let mut platform_versions: Vec<u32> = list_dir_names(&path.join("platforms"))
            .await
            .iter()
            .filter_map(|name| name.strip_prefix("android-")?.parse().ok())
            .collect();
        platform_versions.sort_unstable();

        info!("Found Android SDK at {:?}", path);

        Ok(SdkInfo {
            has_platform_tools: path.join("platform-tools").exists(),
            path,
            source,
            build_tools_versions,
            platform_versions,
        })
    }

    /// Path to `adb` inside the SDK's platform-tools
    pub fn adb_path(&self) -> Result<PathBuf, DetectionError> {
        let (sdk, _) = self.sdk_path().ok_or(DetectionError::SdkNotFound)?;
        let adb = sdk.join("platform-tools").join(exe_name("adb"));

        if !adb.exists() {
            return Err(DetectionError::AdbNotFound(adb));
        }
        Ok(adb)
    }

    /// `aapt` from the newest build-tools, falling back to PATH
    pub fn aapt_path(&self) -> Option<PathBuf> {
        if let Some((sdk, _)) = self.sdk_path() {
            let build_tools = sdk.join("build-tools");
            let mut versions = std::fs::read_dir(&build_tools)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .filter(|e| e.path().is_dir())
                        .map(|e| e.file_name().to_string_lossy().to_string())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            sort_versions(&mut versions);

            for version in versions.iter().rev() {
                let aapt = build_tools.join(version).join(exe_name("aapt"));
                if aapt.exists() {
                    debug!("Found aapt: {:?}", aapt);
                    return Some(aapt);
                }
            }
        }

        which("aapt").ok()
    }

    fn java_home(&self) -> Option<PathBuf> {
        self.java_home_override
            .clone()
            .or_else(|| env::var("JAVA_HOME").ok().filter(|v| !v.is_empty()).map(PathBuf::from))
    }

    /// `keytool` from JAVA_HOME, PATH, or a common JDK location
    pub fn keytool_path(&self) -> Result<PathBuf, DetectionError> {
        let keytool = exe_name("keytool");

        if let Some(java_home) = self.java_home() {
            let path = java_home.join("bin").join(&keytool);
            if path.exists() {
                return Ok(path);
            }
        }

        if let Ok(path) = which("keytool") {
            return Ok(path);
        }

        common_jdk_paths()
            .into_iter()
            .map(|jdk| jdk.join("bin").join(&keytool))
            .find(|path| path.exists())
            .ok_or(DetectionError::KeytoolNotFound)
    }

    /// `java` from JAVA_HOME, falling back to PATH
    pub fn java_path(&self) -> Option<PathBuf> {
        if let Some(java_home) = self.java_home() {
            let path = java_home.join("bin").join(exe_name("java"));
            if path.exists() {
                return Some(path);
            }
        }
        which("java").ok()
    }
}

fn default_sdk_paths() -> Vec<PathBuf> {
    let home = dirs::home_dir();
    let mut paths = Vec::new();

    if cfg!(windows) {
        if let Some(home) = &home {
            paths.push(home.join("AppData").join("Local").join("Android").join("Sdk"));
        }
        paths.push(PathBuf::from(r"C:\Android\sdk"));
        paths.push(PathBuf::from(r"C:\Program Files\Android\Sdk"));
        paths.push(PathBuf::from(r"C:\Program Files (x86)\Android\Sdk"));
    } else if cfg!(target_os = "macos") {
        if let Some(home) = &home {
            paths.push(home.join("Library").join("Android").join("sdk"));
        }
    } else {
        if let Some(home) = &home {
            paths.push(home.join("Android").join("Sdk"));
        }
        paths.push(PathBuf::from("/usr/local/android-sdk"));
    }

    paths
}

fn common_jdk_paths() -> Vec<PathBuf> {
    let home = dirs::home_dir();

    if cfg!(windows) {
        let mut paths: Vec<PathBuf> = home
            .iter()
            .map(|h| h.join("AppData").join("Local").join("Android").join("Sdk").join("jbr"))
            .collect();
        paths.extend(
            [
                r"C:\Program Files\Java\jdk-21",
                r"C:\Program Files\Java\jdk-17",
                r"C:\Program Files\Java\jdk-11",
                r"C:\Program Files\Eclipse Adoptium\jdk-21",
                r"C:\Program Files\Eclipse Adoptium\jdk-17",
                r"C:\Program Files\Microsoft\jdk-17",
            ]
            .into_iter()
            .map(PathBuf::from),
        );
        paths
    } else if cfg!(target_os = "macos") {
        let mut paths = vec![
            PathBuf::from("/Library/Java/JavaVirtualMachines/jdk-21.jdk/Contents/Home"),
            PathBuf::from("/Library/Java/JavaVirtualMachines/jdk-17.jdk/Contents/Home"),
        ];
        if let Some(home) = &home {
            paths.push(home.join("Library").join("Android").join("sdk").join("jbr"));
        }
        paths
    } else {
        vec![
            PathBuf::from("/usr/lib/jvm/java-21-openjdk"),
            PathBuf::from("/usr/lib/jvm/java-17-openjdk"),
            PathBuf::from("/usr/lib/jvm/default-java"),
        ]
    }
}

async fn list_dir_names(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return names;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Sort dotted version strings numerically ("9.0.0" < "34.0.0")
pub fn sort_versions(versions: &mut [String]) {
    versions.sort_by_key(|v| {
        v.split(|c: char| !c.is_ascii_digit())
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<u64>().unwrap_or(0))
            .collect::<Vec<_>>()
    });
}

/// Overall toolchain status
#[derive(Debug, Clone)]
pub struct ToolchainStatus {
    pub sdk: Option<SdkInfo>,
    pub adb: Option<PathBuf>,
    pub aapt: Option<PathBuf>,
    pub keytool: Option<PathBuf>,
}

impl ToolchainDetector {
    /// Detect every tool at once
    pub async fn detect_all(&self) -> ToolchainStatus {
        ToolchainStatus {
            sdk: self.detect_sdk().await.ok(),
            adb: self.adb_path().ok(),
            aapt: self.aapt_path(),
            keytool: self.keytool_path().ok(),
        }
    }
}

impl ToolchainStatus {
    /// Get missing components
    pub fn missing_components(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.sdk.is_none() {
            missing.push("Android SDK");
        }
        if self.adb.is_none() {
            missing.push("ADB (platform-tools)");
        }
        if self.keytool.is_none() {
            missing.push("JDK keytool");
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_sdk_wins() {
        let dir = tempfile::tempdir().unwrap();
        let detector = ToolchainDetector::new().with_sdk_path(Some(dir.path().to_path_buf()));

        let (path, source) = detector.sdk_path().unwrap();
        assert_eq!(path, dir.path());
        assert_eq!(source, SdkSource::Configured);
    }

    #[test]
    fn test_adb_missing_reports_expected_path() {
        let dir = tempfile::tempdir().unwrap();
        let detector = ToolchainDetector::new().with_sdk_path(Some(dir.path().to_path_buf()));

        match detector.adb_path() {
            Err(DetectionError::AdbNotFound(path)) => {
                assert!(path.starts_with(dir.path().join("platform-tools")));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_aapt_prefers_newest_build_tools() {
        let dir = tempfile::tempdir().unwrap();
        for version in ["9.0.0", "34.0.0", "30.0.3"] {
            let bin = dir.path().join("build-tools").join(version);
            std::fs::create_dir_all(&bin).unwrap();
            std::fs::write(bin.join(exe_name("aapt")), "").unwrap();
        }
        let detector = ToolchainDetector::new().with_sdk_path(Some(dir.path().to_path_buf()));

        let aapt = detector.aapt_path().unwrap();
        assert!(aapt.starts_with(dir.path().join("build-tools").join("34.0.0")));
    }

    #[test]
    fn test_sort_versions() {
        let mut versions = vec!["34.0.0".to_string(), "9.0.0".to_string(), "30.0.3".to_string()];
        sort_versions(&mut versions);
        assert_eq!(versions, vec!["9.0.0", "30.0.3", "34.0.0"]);
    }

    #[test]
    fn test_keytool_from_java_home() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join(exe_name("keytool")), "").unwrap();

        let detector = ToolchainDetector::new().with_java_home(Some(dir.path().to_path_buf()));
        assert_eq!(detector.keytool_path().unwrap(), bin.join(exe_name("keytool")));
    }
}
