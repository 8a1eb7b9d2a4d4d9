//! Android Build Engine
//!
//! Drives the Gradle wrapper: module targets, build tasks, artifact lookup,
//! release signing, and working out which package a build produced.

pub mod artifact;
pub mod config;
pub mod gradle;
pub mod modules;
pub mod package;
pub mod signing;

pub use artifact::{default_artifact_path, resolve_artifact_path};
pub use config::{ArtifactKind, BuildVariant, GradleTask};
pub use gradle::{BuildMessage, BuildOutcome, GradleOutput, GradleRunner};
pub use modules::{
    find_project_root, list_modules, module_dir, qualify_task, ModuleTarget, PROJECT_ROOT,
};
pub use package::{PackageCandidate, PackageDetector, PackageSource};
pub use signing::{
    generate_keystore, CertificateInfo, KeystoreConfig, SigningProperties, SigningStore,
};

use std::path::PathBuf;
use std::time::Duration;

/// Build errors
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Gradle wrapper not found in {0}")]
    WrapperNotFound(PathBuf),
    #[error("{task} failed:\n{output}")]
    BuildFailed { task: String, output: String },
    #[error("Gradle timed out after {0:?}")]
    Timeout(Duration),
    #[error("Toolchain not found: {0}")]
    ToolchainNotFound(String),
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),
    #[error("Signing error: {0}")]
    SigningError(String),
    #[error(transparent)]
    State(#[from] droid_lite_core::CoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    pub fn user_message(&self) -> String {
        match self {
            BuildError::WrapperNotFound(root) => format!(
                "No Gradle wrapper (gradlew) in {}.\n\n\
                 Generate one with `gradle wrapper`, or run droid-lite from the project directory.",
                root.display()
            ),
            BuildError::ToolchainNotFound(tool) => format!(
                "{} not found.\n\nInstall a JDK and set JAVA_HOME, or add it to PATH.",
                tool
            ),
            other => other.to_string(),
        }
    }
}
