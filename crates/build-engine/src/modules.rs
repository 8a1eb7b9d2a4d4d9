//! Gradle modules and the active module target
//!
//! Module paths (`:app`, `:lib:core`) come from the settings file. The active
//! target scopes every build task and the artifact search; it is stored per
//! project and deliberately not re-validated against the settings file.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use droid_lite_core::{CoreError, StateStore};

/// Synthetic entry meaning "the whole project"
pub const PROJECT_ROOT: &str = "(Project Root)";

/// State key holding the active module target
pub const MODULE_TARGET_KEY: &str = "android.gradle.module";

const SETTINGS_FILES: [&str; 2] = ["settings.gradle", "settings.gradle.kts"];
const BUILD_FILES: [&str; 2] = ["build.gradle", "build.gradle.kts"];

static MODULE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"['"](:[^'"]+)['"]"#).expect("valid regex"));

/// Extract module paths from settings file contents
pub fn parse_modules(settings: &str) -> Vec<String> {
    let mut modules = vec![PROJECT_ROOT.to_string()];
    modules.extend(MODULE_RE.captures_iter(settings).map(|caps| caps[1].to_string()));

    modules.sort();
    modules.dedup();
    modules
}

/// Modules declared by the project at `root`, always including `(Project Root)`
pub fn list_modules(root: &Path) -> Vec<String> {
    for name in SETTINGS_FILES {
        let path = root.join(name);
        if !path.is_file() {
            continue;
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => return parse_modules(&contents),
            Err(e) => {
                warn!("Could not read {:?}: {}", path, e);
                break;
            }
        }
    }

    debug!("No readable settings file in {:?}", root);
    vec![PROJECT_ROOT.to_string()]
}

/// Wrapper scripts, Unix first
pub const WRAPPER_SCRIPTS: [&str; 2] = ["gradlew", "gradlew.bat"];

fn has_wrapper(dir: &Path) -> bool {
    WRAPPER_SCRIPTS.iter().any(|name| dir.join(name).is_file())
}

fn has_build_or_settings(dir: &Path) -> bool {
    SETTINGS_FILES
        .iter()
        .chain(BUILD_FILES.iter())
        .any(|name| dir.join(name).is_file())
}

/// Locate the Gradle project inside `workspace`.
///
/// The workspace itself qualifies if it has a wrapper script or a build or
/// settings file. Otherwise the first immediate child (by name) that has both
/// is used, and the workspace is the fallback.
pub fn find_project_root(workspace: &Path) -> PathBuf {
    if has_wrapper(workspace) || has_build_or_settings(workspace) {
        return workspace.to_path_buf();
    }

    let mut children: Vec<PathBuf> = match std::fs::read_dir(workspace) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(e) => {
            warn!("Could not scan {:?}: {}", workspace, e);
            return workspace.to_path_buf();
        }
    };
    children.sort();

    match children
        .into_iter()
        .find(|dir| has_wrapper(dir) && has_build_or_settings(dir))
    {
        Some(dir) => {
            debug!("Gradle project found in {:?}", dir);
            dir
        }
        None => workspace.to_path_buf(),
    }
}

/// Normalize a module selection: `(Project Root)` and empty mean the root
pub fn normalize_module(module: Option<&str>) -> Option<&str> {
    module.filter(|m| !m.is_empty() && *m != PROJECT_ROOT)
}

/// Prefix `task` with the module path, if any
pub fn qualify_task(module: Option<&str>, task: &str) -> String {
    match normalize_module(module) {
        Some(module) => format!("{}:{}", module.trim_end_matches(':'), task),
        None => task.to_string(),
    }
}

/// Directory of a module (`:lib:core` -> `<root>/lib/core`); `app` for the root
pub fn module_dir(root: &Path, module: Option<&str>) -> PathBuf {
    match normalize_module(module) {
        Some(module) => module
            .split(':')
            .filter(|segment| !segment.is_empty())
            .fold(root.to_path_buf(), |dir, segment| dir.join(segment)),
        None => root.join("app"),
    }
}

/// The persisted module target of one project
pub struct ModuleTarget<'a> {
    store: &'a StateStore,
}

impl<'a> ModuleTarget<'a> {
    pub fn new(store: &'a StateStore) -> Self {
        Self { store }
    }

    /// Active module, `None` for the whole project. Unreadable state reads as root.
    pub async fn get(&self) -> Option<String> {
        match self.store.get::<String>(MODULE_TARGET_KEY).await {
            Ok(module) => module.filter(|m| normalize_module(Some(m.as_str())).is_some()),
            Err(e) => {
                warn!("Could not read module target: {}", e);
                None
            }
        }
    }

    /// Set the target; `None` or `(Project Root)` clears it
    pub async fn set(&self, module: Option<&str>) -> Result<(), CoreError> {
        self.store
            .update(MODULE_TARGET_KEY, normalize_module(module).as_ref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modules() {
        assert_eq!(
            parse_modules("include ':app', ':lib:core'"),
            vec!["(Project Root)", ":app", ":lib:core"]
        );
    }

    #[test]
    fn test_parse_modules_dedups_and_sorts() {
        let settings = r#"
            rootProject.name = "Demo"
            include(":feature:login")
            include(":app")
            include(":app")
            include ':core'
        "#;
        assert_eq!(
            parse_modules(settings),
            vec!["(Project Root)", ":app", ":core", ":feature:login"]
        );
        assert_eq!(parse_modules(""), vec!["(Project Root)"]);
    }

    #[test]
    fn test_list_modules_prefers_groovy_settings() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(list_modules(dir.path()), vec![PROJECT_ROOT]);

        std::fs::write(dir.path().join("settings.gradle.kts"), "include(\":kts\")").unwrap();
        assert_eq!(list_modules(dir.path()), vec![PROJECT_ROOT, ":kts"]);

        std::fs::write(dir.path().join("settings.gradle"), "include ':groovy'").unwrap();
        assert_eq!(list_modules(dir.path()), vec![PROJECT_ROOT, ":groovy"]);
    }

    #[test]
    fn test_find_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();

        // Nothing qualifies: fall back to the workspace
        assert_eq!(find_project_root(workspace), workspace);

        // A child with only a build file does not qualify
        std::fs::create_dir_all(workspace.join("a-docs")).unwrap();
        std::fs::write(workspace.join("a-docs").join("build.gradle"), "").unwrap();

        std::fs::create_dir_all(workspace.join("android")).unwrap();
        std::fs::write(workspace.join("android").join("gradlew"), "").unwrap();
        std::fs::write(workspace.join("android").join("settings.gradle"), "").unwrap();

        assert_eq!(find_project_root(workspace), workspace.join("android"));

        // The workspace wins once it has a wrapper of its own
        std::fs::write(workspace.join("gradlew"), "").unwrap();
        assert_eq!(find_project_root(workspace), workspace);
    }

    #[test]
    fn test_qualify_task() {
        assert_eq!(qualify_task(Some(":lib:core"), "assembleDebug"), ":lib:core:assembleDebug");
        assert_eq!(qualify_task(Some(PROJECT_ROOT), "assembleDebug"), "assembleDebug");
        assert_eq!(qualify_task(None, "clean"), "clean");
    }

    #[test]
    fn test_module_dir() {
        let root = Path::new("/work/demo");
        assert_eq!(module_dir(root, Some(":lib:core")), root.join("lib").join("core"));
        assert_eq!(module_dir(root, None), root.join("app"));
    }

    #[tokio::test]
    async fn test_module_target_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::for_workspace(dir.path(), dir.path());
        let target = ModuleTarget::new(&store);

        assert_eq!(target.get().await, None);

        target.set(Some(":lib:core")).await.unwrap();
        let reopened = StateStore::for_workspace(dir.path(), dir.path());
        assert_eq!(ModuleTarget::new(&reopened).get().await.as_deref(), Some(":lib:core"));

        target.set(Some(PROJECT_ROOT)).await.unwrap();
        assert_eq!(target.get().await, None);
    }

    #[tokio::test]
    async fn test_stale_target_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::for_workspace(dir.path(), dir.path());
        ModuleTarget::new(&store).set(Some(":removed")).await.unwrap();

        // The module no longer exists, but the target is returned as-is
        assert_eq!(list_modules(dir.path()), vec![PROJECT_ROOT]);
        assert_eq!(ModuleTarget::new(&store).get().await.as_deref(), Some(":removed"));
    }
}
