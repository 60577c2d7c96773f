//! Launching the AtlasMap worker (`java -jar <archive>`).
//!
//! The supervisor starts the worker and streams its stdout into an output
//! channel. It does not wait for readiness, restart the worker, or stop a
//! second launch; callers decide when to launch. Exit is published on a
//! `watch` channel so interested callers can react to it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::watch;

use crate::app_logger::DiagnosticLog;
use crate::output_channel::OutputChannel;

const LOG_SOURCE: &str = "worker";

/// Stdout read size.
const READ_CHUNK_BYTES: usize = 4096;

/// How long to wait for buffered stdout after the worker exits. A descendant
/// that inherited the pipe can keep it open indefinitely.
const STDOUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// How the worker process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    /// Exit code, or `None` when terminated by a signal or when waiting failed.
    pub code: Option<i32>,
    pub success: bool,
}

/// Handle to a launched worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pid: Option<u32>,
    archive: PathBuf,
    exit_rx: watch::Receiver<Option<WorkerExit>>,
}

impl WorkerHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Exit status if the worker has already ended.
    pub fn exit_status(&self) -> Option<WorkerExit> {
        self.exit_rx.borrow().clone()
    }

    /// Subscribe to termination. The value turns `Some` exactly once.
    pub fn subscribe_exit(&self) -> watch::Receiver<Option<WorkerExit>> {
        self.exit_rx.clone()
    }

    /// Wait for the worker to end.
    pub async fn wait(&self) -> WorkerExit {
        let mut rx = self.exit_rx.clone();
        loop {
            if let Some(exit) = rx.borrow_and_update().clone() {
                return exit;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without publishing; report what we have.
                return rx.borrow().clone().unwrap_or(WorkerExit {
                    code: None,
                    success: false,
                });
            }
        }
    }
}

/// Result of [`ProcessSupervisor::launch`].
#[derive(Debug)]
pub enum LaunchOutcome {
    Started(WorkerHandle),
    FailedToStart { reason: String },
}

impl LaunchOutcome {
    pub fn into_result(self) -> Result<WorkerHandle, String> {
        match self {
            LaunchOutcome::Started(handle) => Ok(handle),
            LaunchOutcome::FailedToStart { reason } => Err(reason),
        }
    }
}

#[derive(Clone)]
pub struct ProcessSupervisor {
    java_bin: String,
    output: OutputChannel,
    log: DiagnosticLog,
}

impl ProcessSupervisor {
    pub fn new(java_bin: impl Into<String>, output: OutputChannel, log: DiagnosticLog) -> Self {
        Self {
            java_bin: java_bin.into(),
            output,
            log,
        }
    }

    pub fn output(&self) -> &OutputChannel {
        &self.output
    }

    /// Argument vector passed to the Java launcher.
    pub(crate) fn worker_args(archive: &Path) -> [std::ffi::OsString; 2] {
        ["-jar".into(), archive.as_os_str().to_owned()]
    }

    /// Start the worker. Must be called from within a tokio runtime.
    pub fn launch(&self, archive: &Path) -> LaunchOutcome {
        let mut cmd = Command::new(&self.java_bin);
        cmd.args(Self::worker_args(archive))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let reason = format!(
                    "Failed to start worker \"{} -jar {}\": {e}",
                    self.java_bin,
                    archive.display()
                );
                self.log.error(LOG_SOURCE, reason.clone());
                return LaunchOutcome::FailedToStart { reason };
            }
        };

        let pid = child.id();
        self.log.info(
            LOG_SOURCE,
            format!("Started worker {} (pid {pid:?})", archive.display()),
        );

        let (exit_tx, exit_rx) = watch::channel(None);

        let reader = child.stdout.take().map(|mut stdout| {
            let output = self.output.clone();
            let log = self.log.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; READ_CHUNK_BYTES];
                loop {
                    match stdout.read(&mut buf).await {
                        Ok(0) => break,
                        // Chunk-local decode; a sequence split across reads becomes U+FFFD.
                        Ok(n) => output.append(&String::from_utf8_lossy(&buf[..n])),
                        Err(e) => {
                            log.warn(LOG_SOURCE, format!("Worker stdout read failed: {e}"));
                            break;
                        }
                    }
                }
            })
        });

        let log = self.log.clone();
        tokio::spawn(async move {
            let exit = match child.wait().await {
                Ok(status) => WorkerExit {
                    code: status.code(),
                    success: status.success(),
                },
                Err(e) => {
                    log.error(LOG_SOURCE, format!("Failed to wait for worker: {e}"));
                    WorkerExit {
                        code: None,
                        success: false,
                    }
                }
            };
            // Give buffered stdout a moment to reach the channel; the reader
            // keeps running detached if the pipe outlives the worker.
            if let Some(reader) = reader
                && tokio::time::timeout(STDOUT_DRAIN_GRACE, reader).await.is_err()
            {
                tracing::debug!("worker stdout still open after exit");
            }
            let message = format!("Worker exited with code {:?}", exit.code);
            if exit.success {
                log.info(LOG_SOURCE, message);
            } else {
                log.warn(LOG_SOURCE, message);
            }
            exit_tx.send_replace(Some(exit));
        });

        LaunchOutcome::Started(WorkerHandle {
            pid,
            archive: archive.to_path_buf(),
            exit_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_logger::LogLevel;
    use serial_test::serial;

    fn supervisor(java_bin: &str) -> (ProcessSupervisor, OutputChannel, DiagnosticLog) {
        let output = OutputChannel::new("Atlasmap server");
        let log = DiagnosticLog::new(100);
        (
            ProcessSupervisor::new(java_bin, output.clone(), log.clone()),
            output,
            log,
        )
    }

    /// Write an executable stand-in for `java` that runs `body` with the launcher's args.
    #[cfg(unix)]
    fn fake_java(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-java");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn worker_args_are_jar_and_archive() {
        let args = ProcessSupervisor::worker_args(Path::new("/ext/jars/atlasmap-standalone.jar"));
        assert_eq!(args[0], "-jar");
        assert_eq!(args[1], "/ext/jars/atlasmap-standalone.jar");
    }

    #[tokio::test]
    #[serial]
    async fn missing_launcher_fails_to_start() {
        let (sup, output, log) = supervisor("/nonexistent/bin/java-atlasmap-test");
        let outcome = sup.launch(Path::new("worker.jar"));

        let reason = match outcome {
            LaunchOutcome::FailedToStart { reason } => reason,
            LaunchOutcome::Started(_) => panic!("launch should fail"),
        };
        assert!(reason.contains("Failed to start worker"));
        assert!(output.contents().is_empty());
        let errors = log.entries_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, reason);
    }

    #[test]
    fn into_result_maps_failure() {
        let outcome = LaunchOutcome::FailedToStart { reason: "nope".into() };
        assert_eq!(outcome.into_result().unwrap_err(), "nope");
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn stdout_is_streamed_to_output_channel() {
        let dir = tempfile::TempDir::new().unwrap();
        let java = fake_java(dir.path(), r#"echo "args: $1 $2"; printf 'Listening on 8585\n'"#);
        let (sup, output, _log) = supervisor(java.to_str().unwrap());

        let handle = sup.launch(Path::new("jars/atlasmap-standalone.jar")).into_result().unwrap();
        assert!(handle.pid().is_some());
        let exit = handle.wait().await;

        assert!(exit.success);
        assert_eq!(exit.code, Some(0));
        assert_eq!(
            output.contents(),
            "args: -jar jars/atlasmap-standalone.jar\nListening on 8585\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn exit_code_is_published() {
        let dir = tempfile::TempDir::new().unwrap();
        let java = fake_java(dir.path(), "exit 3");
        let (sup, _output, log) = supervisor(java.to_str().unwrap());

        let handle = sup.launch(Path::new("worker.jar")).into_result().unwrap();
        let mut exits = handle.subscribe_exit();
        let exit = handle.wait().await;
        assert_eq!(exit, WorkerExit { code: Some(3), success: false });
        assert_eq!(handle.exit_status(), Some(exit.clone()));
        assert_eq!(exits.borrow_and_update().clone(), Some(exit));

        let infos: Vec<_> = log.entries_at(LogLevel::Info).into_iter().map(|e| e.message).collect();
        assert!(infos.iter().any(|m| m.starts_with("Started worker")));
        let warns: Vec<_> = log.entries_at(LogLevel::Warn).into_iter().map(|e| e.message).collect();
        assert_eq!(warns, vec!["Worker exited with code Some(3)".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn stderr_is_not_captured() {
        let dir = tempfile::TempDir::new().unwrap();
        let java = fake_java(dir.path(), "echo out; echo err >&2");
        let (sup, output, _log) = supervisor(java.to_str().unwrap());

        let handle = sup.launch(Path::new("worker.jar")).into_result().unwrap();
        handle.wait().await;
        assert_eq!(output.contents(), "out\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn duplicate_launches_are_not_prevented() {
        let dir = tempfile::TempDir::new().unwrap();
        let java = fake_java(dir.path(), "echo up");
        let (sup, output, _log) = supervisor(java.to_str().unwrap());

        let a = sup.launch(Path::new("worker.jar")).into_result().unwrap();
        let b = sup.launch(Path::new("worker.jar")).into_result().unwrap();
        a.wait().await;
        b.wait().await;
        assert_eq!(output.contents(), "up\nup\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn exit_is_published_while_a_descendant_holds_stdout() {
        let dir = tempfile::TempDir::new().unwrap();
        let java = fake_java(dir.path(), "echo up; sleep 5 & exit 0");
        let (sup, output, log) = supervisor(java.to_str().unwrap());

        let handle = sup.launch(Path::new("worker.jar")).into_result().unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(3), handle.wait())
            .await
            .expect("exit should not wait for the inherited pipe");

        assert_eq!(exit, WorkerExit { code: Some(0), success: true });
        assert_eq!(output.contents(), "up\n");
        assert!(log.entries_at(LogLevel::Warn).is_empty());
    }
}
