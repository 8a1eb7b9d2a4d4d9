//! Locate build outputs (APK / AAB) for a module and variant

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::{ArtifactKind, BuildVariant};
use crate::modules::{module_dir, normalize_module};

/// Where Gradle puts the artifact by convention. The file may not exist.
pub fn default_artifact_path(
    root: &Path,
    module: Option<&str>,
    variant: BuildVariant,
    kind: ArtifactKind,
) -> PathBuf {
    let base_name = normalize_module(module)
        .and_then(|m| m.rsplit(':').find(|segment| !segment.is_empty()))
        .unwrap_or("app");

    module_dir(root, module)
        .join("build")
        .join("outputs")
        .join(kind.outputs_dir())
        .join(variant.as_str())
        .join(format!("{}-{}.{}", base_name, variant.as_str(), kind.extension()))
}

/// Newest matching artifact under the module's outputs, or the default path.
///
/// Instrumentation-test outputs are skipped and the path must mention the
/// variant (case-insensitive). Scan errors are logged and fall through to the
/// default.
pub fn resolve_artifact_path(
    root: &Path,
    module: Option<&str>,
    variant: BuildVariant,
    kind: ArtifactKind,
) -> PathBuf {
    let outputs = module_dir(root, module)
        .join("build")
        .join("outputs")
        .join(kind.outputs_dir());

    if !outputs.is_dir() {
        debug!("{:?} does not exist, using default artifact path", outputs);
        return default_artifact_path(root, module, variant, kind);
    }

    let variant_name = variant.as_str();
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in WalkDir::new(&outputs) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error scanning {:?}: {}", outputs, e);
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().map_or(true, |ext| ext != kind.extension())
        {
            continue;
        }

        let relative = path.strip_prefix(&outputs).unwrap_or(path);
        let lowered = relative.to_string_lossy().to_lowercase();
        if lowered.contains("androidtest") || !lowered.contains(variant_name) {
            continue;
        }

        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        if newest.as_ref().map_or(true, |(time, _)| modified > *time) {
            newest = Some((modified, path.to_path_buf()));
        }
    }

    match newest {
        Some((_, path)) => {
            debug!("Resolved artifact {:?}", path);
            path
        }
        None => default_artifact_path(root, module, variant, kind),
    }
}
