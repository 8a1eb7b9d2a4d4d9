//! Build Configuration
//!
//! Variants, artifact kinds, and the Gradle tasks they map to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Build variant (debug/release)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildVariant {
    #[default]
    Debug,
    Release,
}

impl BuildVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildVariant::Debug => "debug",
            BuildVariant::Release => "release",
        }
    }

    pub fn gradle_task_suffix(&self) -> &'static str {
        match self {
            BuildVariant::Debug => "Debug",
            BuildVariant::Release => "Release",
        }
    }
}

impl FromStr for BuildVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(BuildVariant::Debug),
            "release" => Ok(BuildVariant::Release),
            other => Err(format!("unknown build variant '{}'", other)),
        }
    }
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a build produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArtifactKind {
    #[default]
    Apk,
    /// Android App Bundle
    Bundle,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Apk => "apk",
            ArtifactKind::Bundle => "aab",
        }
    }

    /// Directory under `build/outputs`
    pub fn outputs_dir(&self) -> &'static str {
        match self {
            ArtifactKind::Apk => "apk",
            ArtifactKind::Bundle => "bundle",
        }
    }
}

/// A Gradle task droid-lite knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradleTask {
    Assemble(BuildVariant),
    Bundle(BuildVariant),
    Clean,
    /// Lists tasks, which forces Gradle to configure (sync) the project
    Sync,
}

impl GradleTask {
    pub fn for_artifact(kind: ArtifactKind, variant: BuildVariant) -> Self {
        match kind {
            ArtifactKind::Apk => GradleTask::Assemble(variant),
            ArtifactKind::Bundle => GradleTask::Bundle(variant),
        }
    }

    /// Unqualified task name
    pub fn name(&self) -> String {
        match self {
            GradleTask::Assemble(variant) => format!("assemble{}", variant.gradle_task_suffix()),
            GradleTask::Bundle(variant) => format!("bundle{}", variant.gradle_task_suffix()),
            GradleTask::Clean => "clean".to_string(),
            GradleTask::Sync => "tasks".to_string(),
        }
    }

    pub fn artifact(&self) -> Option<(ArtifactKind, BuildVariant)> {
        match self {
            GradleTask::Assemble(variant) => Some((ArtifactKind::Apk, *variant)),
            GradleTask::Bundle(variant) => Some((ArtifactKind::Bundle, *variant)),
            _ => None,
        }
    }

    /// Whether the task is scoped to the active module target
    pub fn is_module_scoped(&self) -> bool {
        !matches!(self, GradleTask::Sync)
    }
}
