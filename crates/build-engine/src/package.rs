//! Package name detection
//!
//! Works out which application id to launch by asking, in order: the built
//! APK, the module's Gradle file, the manifest, and finally the device.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use droid_lite_device_bridge::AdbClient;

static BADGING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"package:\s*name='([^']+)'").expect("valid regex"));
static APPLICATION_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"applicationId\s*=?\s*["']([^"']+)["']"#).expect("valid regex"));
static NAMESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"namespace\s*=?\s*["']([^"']+)["']"#).expect("valid regex"));
static DEBUG_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)debug\s*\{[^}]*?applicationIdSuffix\s*=?\s*["']([^"']+)["']"#)
        .expect("valid regex")
});
static MANIFEST_PACKAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"package\s*=\s*["']([^"']+)["']"#).expect("valid regex"));
static CURRENT_FOCUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"mCurrentFocus=Window\{[^}]*\s+u\d+\s+([^\s/]+)").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageSource {
    Apk,
    Gradle,
    Manifest,
    ForegroundApp,
    InstalledPackages,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCandidate {
    pub name: String,
    pub source: PackageSource,
    pub confidence: Confidence,
}

/// Package name from `aapt dump badging` output
pub fn parse_badging(output: &str) -> Option<String> {
    BADGING_RE.captures(output).map(|caps| caps[1].to_string())
}

/// Application id from a Gradle build file, with the debug suffix applied when
/// `debug` is set
pub fn parse_gradle_package(build_file: &str, debug: bool) -> Option<String> {
    let base = APPLICATION_ID_RE
        .captures(build_file)
        .or_else(|| NAMESPACE_RE.captures(build_file))
        .map(|caps| caps[1].to_string())?;

    if debug {
        if let Some(suffix) = DEBUG_SUFFIX_RE.captures(build_file) {
            return Some(format!("{}{}", base, &suffix[1]));
        }
    }
    Some(base)
}

pub fn parse_manifest_package(manifest: &str) -> Option<String> {
    MANIFEST_PACKAGE_RE
        .captures(manifest)
        .map(|caps| caps[1].to_string())
}

/// Package of the focused window in `dumpsys window` output
pub fn parse_current_focus(dumpsys: &str) -> Option<String> {
    CURRENT_FOCUS_RE
        .captures(dumpsys)
        .map(|caps| caps[1].to_string())
}

/// Where to look for the application id
pub struct PackageDetector {
    aapt: Option<PathBuf>,
    project_root: PathBuf,
    module_dir: PathBuf,
}

impl PackageDetector {
    pub fn new(project_root: PathBuf, module_dir: PathBuf, aapt: Option<PathBuf>) -> Self {
        Self {
            aapt,
            project_root,
            module_dir,
        }
    }

    /// Read the package name out of a built APK
    pub async fn from_apk(&self, apk: &Path) -> Option<String> {
        let aapt = self.aapt.as_ref()?;
        if !apk.is_file() {
            return None;
        }

        let output = match Command::new(aapt)
            .args(["dump", "badging"])
            .arg(apk)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!("aapt failed: {}", e);
                return None;
            }
        };

        parse_badging(&String::from_utf8_lossy(&output.stdout))
    }

    /// Application id from the module's build file, then the root build file
    pub async fn from_gradle(&self, debug: bool) -> Option<String> {
        for dir in [&self.module_dir, &self.project_root] {
            for name in ["build.gradle", "build.gradle.kts"] {
                let Ok(contents) = tokio::fs::read_to_string(dir.join(name)).await else {
                    continue;
                };
                if let Some(package) = parse_gradle_package(&contents, debug) {
                    return Some(package);
                }
            }
        }
        None
    }

    pub async fn from_manifest(&self) -> Option<String> {
        let manifest = self
            .module_dir
            .join("src")
            .join("main")
            .join("AndroidManifest.xml");
        let contents = tokio::fs::read_to_string(&manifest).await.ok()?;
        parse_manifest_package(&contents)
    }

    /// Every candidate, best first, without duplicates.
    ///
    /// `device` adds the foreground app and installed packages that share the
    /// Gradle id's prefix.
    pub async fn detect(
        &self,
        apk: Option<&Path>,
        debug: bool,
        device: Option<(&AdbClient, &str)>,
    ) -> Vec<PackageCandidate> {
        let mut candidates = Vec::new();

        if let Some(apk) = apk {
            if let Some(name) = self.from_apk(apk).await {
                push_unique(&mut candidates, name, PackageSource::Apk, Confidence::High);
            }
        }

        let gradle = self.from_gradle(debug).await;
        if let Some(name) = gradle.clone() {
            push_unique(&mut candidates, name, PackageSource::Gradle, Confidence::High);
        }

        if let Some(name) = self.from_manifest().await {
            push_unique(&mut candidates, name, PackageSource::Manifest, Confidence::High);
        }

        if let Some((adb, serial)) = device {
            match adb.dumpsys_window(serial).await {
                Ok(dumpsys) => {
                    if let Some(name) = parse_current_focus(&dumpsys) {
                        push_unique(&mut candidates, name, PackageSource::ForegroundApp, Confidence::Medium);
                    }
                }
                Err(e) => debug!("dumpsys window failed: {}", e),
            }

            if let Some(prefix) = gradle.as_deref() {
                match adb.list_packages(serial).await {
                    Ok(packages) => {
                        for name in packages.into_iter().filter(|p| p.starts_with(prefix)) {
                            push_unique(&mut candidates, name, PackageSource::InstalledPackages, Confidence::Medium);
                        }
                    }
                    Err(e) => debug!("pm list packages failed: {}", e),
                }
            }
        }

        candidates
    }
}

fn push_unique(candidates: &mut Vec<PackageCandidate>, name: String, source: PackageSource, confidence: Confidence) {
    if !candidates.iter().any(|c| c.name == name) {
        candidates.push(PackageCandidate {
            name,
            source,
            confidence,
        });
    }
}
