//! Gradle Wrapper Invocation
//!
//! Runs the project's wrapper script, streaming output line by line while
//! also capturing it for the caller.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::artifact::resolve_artifact_path;
use crate::config::GradleTask;
use crate::modules::qualify_task;
use crate::signing::SigningProperties;
use crate::BuildError;

const WRAPPER_MAIN_CLASS: &str = "org.gradle.wrapper.GradleWrapperMain";

/// Progress reported while Gradle runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildMessage {
    Started(String),
    /// `> Task :app:compileDebugKotlin`
    Task(String),
    Warning(String),
    Error(String),
    Output(String),
    Finished { success: bool },
}

/// Captured output of one Gradle run
#[derive(Debug, Clone, Default)]
pub struct GradleOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl GradleOutput {
    /// Last `lines` lines of stderr, or of stdout when stderr is empty
    pub fn tail(&self, lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let all: Vec<&str> = source.lines().collect();
        all[all.len().saturating_sub(lines)..].join("\n")
    }
}

/// Result of a task that ran to completion
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Fully qualified task name
    pub task: String,
    pub output: GradleOutput,
    /// Resolved artifact for assemble/bundle tasks (may not exist on disk)
    pub artifact: Option<PathBuf>,
}

/// The program and leading arguments that start Gradle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradleInvocation {
    pub program: PathBuf,
    pub prefix_args: Vec<String>,
}

/// Decide how to start Gradle for the project at `root`.
///
/// On Windows the wrapper jar is run through `java` directly when both are
/// available, which sidesteps batch-file quoting and line-ending problems.
pub fn resolve_wrapper(root: &Path, windows: bool, java: Option<&Path>) -> Result<GradleInvocation, BuildError> {
    if windows {
        let jar = root.join("gradle").join("wrapper").join("gradle-wrapper.jar");
        if let (true, Some(java)) = (jar.is_file(), java) {
            return Ok(GradleInvocation {
                program: java.to_path_buf(),
                prefix_args: vec![
                    "-classpath".to_string(),
                    jar.to_string_lossy().to_string(),
                    WRAPPER_MAIN_CLASS.to_string(),
                ],
            });
        }
    }

    let script = root.join(if windows { "gradlew.bat" } else { "gradlew" });
    if !script.is_file() {
        return Err(BuildError::WrapperNotFound(root.to_path_buf()));
    }

    Ok(GradleInvocation {
        program: script,
        prefix_args: Vec::new(),
    })
}

/// Classify one line of Gradle output
pub fn parse_gradle_line(line: &str) -> BuildMessage {
    let line = line.trim_end();
    let trimmed = line.trim_start();

    if trimmed.starts_with("> Task") {
        return BuildMessage::Task(trimmed.trim_start_matches("> Task").trim().to_string());
    }
    if trimmed.starts_with("e: ") || trimmed.contains("error:") || trimmed.starts_with("FAILURE:") || trimmed.contains("BUILD FAILED") {
        return BuildMessage::Error(line.to_string());
    }
    if trimmed.starts_with("w: ") || trimmed.contains("warning:") || trimmed.contains("WARNING") {
        return BuildMessage::Warning(line.to_string());
    }

    BuildMessage::Output(line.to_string())
}

/// Runs Gradle tasks for one project
#[derive(Debug, Clone)]
pub struct GradleRunner {
    project_root: PathBuf,
    java: Option<PathBuf>,
    java_home: Option<PathBuf>,
    android_home: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl GradleRunner {
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            project_root,
            java: None,
            java_home: None,
            android_home: None,
            timeout: None,
        }
    }

    /// `java` executable used for the Windows wrapper-jar fallback
    pub fn with_java(mut self, java: Option<PathBuf>) -> Self {
        self.java = java;
        self
    }

    /// Set JAVA_HOME
    pub fn with_java_home(mut self, path: Option<PathBuf>) -> Self {
        self.java_home = path;
        self
    }

    /// Set ANDROID_HOME
    pub fn with_android_home(mut self, path: Option<PathBuf>) -> Self {
        self.android_home = path;
        self
    }

    /// Kill Gradle after `timeout`; `None` waits indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn invocation(&self) -> Result<GradleInvocation, BuildError> {
        resolve_wrapper(&self.project_root, cfg!(windows), self.java.as_deref())
    }

    /// Run `task` scoped to `module`, resolving its artifact on success
    pub async fn execute(
        &self,
        task: GradleTask,
        module: Option<&str>,
        signing: Option<&SigningProperties>,
        tx: Option<mpsc::Sender<BuildMessage>>,
    ) -> Result<BuildOutcome, BuildError> {
        let task_name = if task.is_module_scoped() {
            qualify_task(module, &task.name())
        } else {
            task.name()
        };

        let mut args = vec![task_name.clone(), "--console=plain".to_string()];
        if let Some(signing) = signing {
            args.extend(signing.gradle_args());
        }

        info!("Running Gradle task {}", task_name);
        if let Some(tx) = &tx {
            let _ = tx.send(BuildMessage::Started(task_name.clone())).await;
        }

        let output = self.run(&args, tx.clone()).await;

        let success = output.as_ref().map(|o| o.success).unwrap_or(false);
        if let Some(tx) = &tx {
            let _ = tx.send(BuildMessage::Finished { success }).await;
        }

        let output = output?;
        if !output.success {
            return Err(BuildError::BuildFailed {
                task: task_name,
                output: output.tail(30),
            });
        }

        let artifact = task
            .artifact()
            .map(|(kind, variant)| resolve_artifact_path(&self.project_root, module, variant, kind));

        info!("Gradle task {} completed", task_name);
        Ok(BuildOutcome {
            task: task_name,
            output,
            artifact,
        })
    }

    /// Run Gradle with raw arguments
    pub async fn run(
        &self,
        args: &[String],
        tx: Option<mpsc::Sender<BuildMessage>>,
    ) -> Result<GradleOutput, BuildError> {
        let invocation = self.invocation()?;
        debug!("Running: {:?} {:?} {:?}", invocation.program, invocation.prefix_args, args);

        let mut cmd = Command::new(&invocation.program);
        cmd.current_dir(&self.project_root)
            .args(&invocation.prefix_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref java_home) = self.java_home {
            cmd.env("JAVA_HOME", java_home);
        }
        if let Some(ref android_home) = self.android_home {
            cmd.env("ANDROID_HOME", android_home);
            cmd.env("ANDROID_SDK_ROOT", android_home);
        }

        let mut child = cmd.spawn()?;

        let stdout_task = child.stdout.take().map(|out| stream_lines(out, tx.clone(), false));
        let stderr_task = child.stderr.take().map(|err| stream_lines(err, tx.clone(), true));

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!("Gradle timed out after {:?}, killing it", limit);
                    let _ = child.kill().await;
                    return Err(BuildError::Timeout(limit));
                }
            },
            None => child.wait().await?,
        };

        Ok(GradleOutput {
            stdout: collect(stdout_task).await,
            stderr: collect(stderr_task).await,
            success: status.success(),
        })
    }
}

fn stream_lines<R>(reader: R, tx: Option<mpsc::Sender<BuildMessage>>, is_stderr: bool) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut captured = String::new();
        let mut lines = BufReader::new(reader).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(tx) = &tx {
                let message = match parse_gradle_line(&line) {
                    BuildMessage::Output(text) if is_stderr && !text.trim().is_empty() => {
                        BuildMessage::Warning(text)
                    }
                    other => other,
                };
                let _ = tx.send(message).await;
            }
            captured.push_str(&line);
            captured.push('\n');
        }
        captured
    })
}

async fn collect(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_wrapper_unix() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_wrapper(dir.path(), false, None),
            Err(BuildError::WrapperNotFound(_))
        ));

        std::fs::write(dir.path().join("gradlew"), "#!/bin/sh\n").unwrap();
        let invocation = resolve_wrapper(dir.path(), false, None).unwrap();
        assert_eq!(invocation.program, dir.path().join("gradlew"));
        assert!(invocation.prefix_args.is_empty());
    }

    #[test]
    fn test_resolve_wrapper_windows_prefers_jar() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper_dir = dir.path().join("gradle").join("wrapper");
        std::fs::create_dir_all(&wrapper_dir).unwrap();
        std::fs::write(wrapper_dir.join("gradle-wrapper.jar"), "").unwrap();
        std::fs::write(dir.path().join("gradlew.bat"), "").unwrap();

        let java = PathBuf::from("java.exe");
        let invocation = resolve_wrapper(dir.path(), true, Some(&java)).unwrap();
        assert_eq!(invocation.program, java);
        assert_eq!(invocation.prefix_args[0], "-classpath");
        assert_eq!(invocation.prefix_args[2], WRAPPER_MAIN_CLASS);

        // Without java the batch script is used
        let invocation = resolve_wrapper(dir.path(), true, None).unwrap();
        assert_eq!(invocation.program, dir.path().join("gradlew.bat"));
    }

    #[test]
    fn test_parse_gradle_line() {
        assert_eq!(
            parse_gradle_line("> Task :app:compileDebugKotlin"),
            BuildMessage::Task(":app:compileDebugKotlin".into())
        );
        assert!(matches!(
            parse_gradle_line("e: file:///src/Main.kt:3:5 Unresolved reference: foo"),
            BuildMessage::Error(_)
        ));
        assert!(matches!(parse_gradle_line("w: deprecated API"), BuildMessage::Warning(_)));
        assert!(matches!(parse_gradle_line("BUILD SUCCESSFUL in 4s"), BuildMessage::Output(_)));
    }

    #[test]
    fn test_output_tail() {
        let output = GradleOutput {
            stdout: "a\nb\nc\n".into(),
            stderr: String::new(),
            success: false,
        };
        assert_eq!(output.tail(2), "b\nc");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_runs_qualified_task() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("gradlew");
        std::fs::write(&script, "#!/bin/sh\necho \"> Task $1\"\necho \"args: $*\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = GradleRunner::new(dir.path().to_path_buf());
        let (tx, mut rx) = mpsc::channel(32);
        let outcome = runner
            .execute(
                GradleTask::Assemble(crate::BuildVariant::Debug),
                Some(":lib:core"),
                None,
                Some(tx),
            )
            .await
            .unwrap();

        assert_eq!(outcome.task, ":lib:core:assembleDebug");
        assert!(outcome.output.stdout.contains("args: :lib:core:assembleDebug --console=plain"));
        assert_eq!(
            outcome.artifact,
            Some(dir.path().join("lib/core/build/outputs/apk/debug/core-debug.apk"))
        );

        let mut messages = Vec::new();
        while let Some(message) = rx.recv().await {
            messages.push(message);
        }
        assert_eq!(messages.first(), Some(&BuildMessage::Started(":lib:core:assembleDebug".into())));
        assert!(messages.contains(&BuildMessage::Task(":lib:core:assembleDebug".into())));
        assert_eq!(messages.last(), Some(&BuildMessage::Finished { success: true }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_task_reports_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("gradlew");
        std::fs::write(&script, "#!/bin/sh\necho 'Task not found in root project' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = GradleRunner::new(dir.path().to_path_buf());
        match runner.execute(GradleTask::Clean, Some(":stale"), None, None).await {
            Err(BuildError::BuildFailed { task, output }) => {
                assert_eq!(task, ":stale:clean");
                assert!(output.contains("Task not found"));
            }
            other => panic!("unexpected result: {:?}", other.map(|o| o.task)),
        }
    }
}
