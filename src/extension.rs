//! Command surface exposed to the host: open the panel, start the worker,
//! and revive a panel the host persisted across a restart.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

use crate::app_logger::DiagnosticLog;
use crate::config::AppConfig;
use crate::fetch::{ContentFetcher, HttpFetcher};
use crate::output_channel::OutputChannel;
use crate::panel::{PanelManager, PanelOpen, PanelSettings};
use crate::supervisor::{LaunchOutcome, ProcessSupervisor, WorkerHandle};
use crate::surface::{Surface, SurfaceHost};

pub const OPEN_COMMAND: &str = "atlasmap.open";
pub const START_COMMAND: &str = "atlasmap.start";

pub struct Extension {
    config: AppConfig,
    extension_path: PathBuf,
    log: DiagnosticLog,
    output: OutputChannel,
    panels: PanelManager,
    supervisor: ProcessSupervisor,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl Extension {
    /// Wire up the extension with the default HTTP fetcher.
    pub fn activate(host: Arc<dyn SurfaceHost>, config: AppConfig, extension_path: PathBuf) -> Self {
        Self::activate_with_fetcher(host, Arc::new(HttpFetcher::new()), config, extension_path)
    }

    pub fn activate_with_fetcher(
        host: Arc<dyn SurfaceHost>,
        fetcher: Arc<dyn ContentFetcher>,
        config: AppConfig,
        extension_path: PathBuf,
    ) -> Self {
        let log = DiagnosticLog::default();
        let output = OutputChannel::new(config.output_channel_name.clone());
        let panels = PanelManager::new(
            host,
            fetcher,
            log.clone(),
            PanelSettings {
                title: config.panel_title.clone(),
                ..PanelSettings::default()
            },
        );
        let supervisor = ProcessSupervisor::new(config.java_bin.clone(), output.clone(), log.clone());

        tracing::info!(origin = %config.origin, path = %extension_path.display(), "extension activated");

        Self {
            config,
            extension_path,
            log,
            output,
            panels,
            supervisor,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Command ids this extension handles.
    pub fn commands() -> [&'static str; 2] {
        [OPEN_COMMAND, START_COMMAND]
    }

    /// Run a command by id. Errors carry a message for the host to show.
    pub fn execute_command(&self, command: &str) -> Result<(), String> {
        match command {
            OPEN_COMMAND => self.open_panel().map(|_| ()),
            START_COMMAND => self.start_worker().map(|_| ()),
            other => Err(format!("Unknown command \"{other}\"")),
        }
    }

    /// Open the panel at the configured origin, or reveal it.
    pub fn open_panel(&self) -> Result<PanelOpen, String> {
        let origin = self.config.origin_url()?;
        self.panels.open_or_reveal(origin)
    }

    /// Launch `<extension_path>/<worker_archive>`.
    pub fn start_worker(&self) -> Result<WorkerHandle, String> {
        let archive = self.worker_archive();
        match self.supervisor.launch(&archive) {
            LaunchOutcome::Started(handle) => {
                let mut workers = self.workers.lock();
                workers.retain(|w| w.exit_status().is_none());
                workers.push(handle.clone());
                Ok(handle)
            }
            LaunchOutcome::FailedToStart { reason } => Err(reason),
        }
    }

    /// Re-attach a panel the host restored. `state` is the host's persisted
    /// token; it carries nothing the panel needs.
    ///
    /// A surface that cannot be attached is disposed rather than left orphaned.
    pub fn deserialize_panel(&self, surface: Arc<dyn Surface>, state: serde_json::Value) -> Result<u64, String> {
        tracing::debug!(%state, "reviving panel");
        let origin = match self.config.origin_url() {
            Ok(origin) => origin,
            Err(e) => {
                surface.dispose();
                return Err(e);
            }
        };
        let (generation, _load) = self.panels.revive(surface, origin)?;
        Ok(generation)
    }

    pub fn deactivate(&self) {
        self.panels.dispose();
        tracing::info!("extension deactivated");
    }

    pub fn worker_archive(&self) -> PathBuf {
        self.config.worker_archive_path(&self.extension_path)
    }

    pub fn panels(&self) -> &PanelManager {
        &self.panels
    }

    pub fn output(&self) -> &OutputChannel {
        &self.output
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.log
    }

    /// Workers started through this extension that have not exited yet, oldest first.
    pub fn workers(&self) -> Vec<WorkerHandle> {
        let mut workers = self.workers.lock();
        workers.retain(|w| w.exit_status().is_none());
        workers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_logger::LogLevel;
    use crate::fetch::FetchError;
    use crate::panel::LoadOutcome;
    use crate::surface::{SurfaceOptions, ViewColumn};
    use crate::surface::headless::{HeadlessHost, HeadlessSurface};
    use futures_util::future::BoxFuture;
    use serial_test::serial;
    use std::path::Path;

    struct StaticFetcher(&'static str);

    impl ContentFetcher for StaticFetcher {
        fn fetch(&self, _url: &str) -> BoxFuture<'static, Result<String, FetchError>> {
            let body = self.0.to_string();
            Box::pin(async move { Ok(body) })
        }
    }

    fn extension(config: AppConfig) -> (Arc<HeadlessHost>, Extension) {
        let host = Arc::new(HeadlessHost::new());
        let ext = Extension::activate_with_fetcher(
            host.clone(),
            Arc::new(StaticFetcher(r#"<base href="/">"#)),
            config,
            PathBuf::from("/opt/atlasmap-ext"),
        );
        (host, ext)
    }

    #[test]
    fn exposes_both_commands() {
        assert_eq!(Extension::commands(), ["atlasmap.open", "atlasmap.start"]);
    }

    #[tokio::test]
    async fn open_command_opens_then_reveals() {
        let (host, ext) = extension(AppConfig::default());

        ext.execute_command(OPEN_COMMAND).unwrap();
        ext.execute_command(OPEN_COMMAND).unwrap();

        assert_eq!(host.surfaces().len(), 1);
        assert_eq!(host.surfaces()[0].reveal_count(), 1);
        assert!(ext.panels().is_open());
    }

    #[tokio::test]
    async fn open_panel_rewrites_against_configured_origin() {
        let (host, ext) = extension(AppConfig {
            origin: "http://localhost:9000".into(),
            panel_title: "Mapper".into(),
            ..AppConfig::default()
        });

        let PanelOpen::Created { load, .. } = ext.open_panel().unwrap() else {
            panic!("expected a new panel");
        };
        assert_eq!(load.await.unwrap(), LoadOutcome::Applied);
        let surface = host.last_surface().unwrap();
        assert_eq!(surface.title(), "Mapper");
        assert_eq!(surface.html().as_deref(), Some(r#"<base href="http://localhost:9000/">"#));
        assert_eq!(ext.output().name(), "Atlasmap server");
    }

    #[tokio::test]
    async fn invalid_origin_is_reported() {
        let (host, ext) = extension(AppConfig {
            origin: "file:///tmp".into(),
            ..AppConfig::default()
        });
        let err = ext.execute_command(OPEN_COMMAND).unwrap_err();
        assert!(err.contains("not allowed"));
        assert!(host.surfaces().is_empty());
    }

    #[test]
    fn unknown_command_is_rejected() {
        let (_host, ext) = extension(AppConfig::default());
        let err = ext.execute_command("atlasmap.stop").unwrap_err();
        assert!(err.contains("Unknown command"));
    }

    #[test]
    fn worker_archive_lives_under_extension_path() {
        let (_host, ext) = extension(AppConfig::default());
        assert_eq!(
            ext.worker_archive(),
            Path::new("/opt/atlasmap-ext/jars/atlasmap-standalone.jar")
        );
    }

    #[tokio::test]
    #[serial]
    async fn start_command_reports_spawn_failure() {
        let (_host, ext) = extension(AppConfig {
            java_bin: "/nonexistent/bin/java-atlasmap-test".into(),
            ..AppConfig::default()
        });
        let err = ext.execute_command(START_COMMAND).unwrap_err();
        assert!(err.contains("Failed to start worker"));
        assert!(ext.workers().is_empty());
        assert_eq!(ext.diagnostics().len(), 1);
    }

    #[tokio::test]
    async fn deserialize_panel_revives_host_surface() {
        let (host, ext) = extension(AppConfig::default());
        let restored = Arc::new(HeadlessSurface::new(
            "atlasmap",
            "AtlasMap",
            ViewColumn::One,
            SurfaceOptions::default(),
        ));
        let mut html = restored.watch_html();

        let generation = ext
            .deserialize_panel(restored.clone(), serde_json::json!({"anything": true}))
            .unwrap();
        html.changed().await.unwrap();

        assert_eq!(generation, 1);
        assert!(host.surfaces().is_empty());
        assert!(ext.panels().is_open());
        assert_eq!(restored.html().as_deref(), Some(r#"<base href="http://127.0.0.1:8585/">"#));
    }

    #[tokio::test]
    async fn deactivate_disposes_panel() {
        let (host, ext) = extension(AppConfig::default());
        ext.execute_command(OPEN_COMMAND).unwrap();
        ext.deactivate();
        assert!(!ext.panels().is_open());
        assert!(host.surfaces()[0].is_disposed());
    }

    #[test]
    fn open_command_outside_runtime_is_an_error() {
        let (host, ext) = extension(AppConfig::default());

        let err = ext.execute_command(OPEN_COMMAND).unwrap_err();
        assert!(err.contains("no async runtime"));
        assert!(!ext.panels().is_open());
        assert!(host.surfaces().is_empty());
        assert_eq!(ext.diagnostics().entries_at(LogLevel::Error).len(), 1);
    }

    #[test]
    fn deserialize_with_invalid_origin_disposes_surface() {
        let (_host, ext) = extension(AppConfig {
            origin: "ftp://example.com".into(),
            ..AppConfig::default()
        });
        let restored = Arc::new(HeadlessSurface::new(
            "atlasmap",
            "AtlasMap",
            ViewColumn::One,
            SurfaceOptions::default(),
        ));

        let err = ext
            .deserialize_panel(restored.clone(), serde_json::Value::Null)
            .unwrap_err();
        assert!(err.contains("not allowed"));
        assert!(restored.is_disposed());
        assert!(!ext.panels().is_open());
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn exited_workers_are_dropped_from_the_list() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::TempDir::new().unwrap();
        let java = dir.path().join("fake-java");
        std::fs::write(&java, "#!/bin/sh\necho up\n").unwrap();
        std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();

        let (_host, ext) = extension(AppConfig {
            java_bin: java.to_string_lossy().into_owned(),
            ..AppConfig::default()
        });
        let first = ext.start_worker().unwrap();
        assert_eq!(ext.workers().len(), 1);
        first.wait().await;

        assert!(ext.workers().is_empty());
        let second = ext.start_worker().unwrap();
        assert_eq!(ext.workers().len(), 1);
        second.wait().await;
        assert!(ext.workers().is_empty());
    }
}
