pub mod app_logger;
pub mod config;
pub mod disposable;
pub mod events;
pub mod extension;
pub mod fetch;
pub mod logging;
pub mod message;
pub mod output_channel;
pub mod panel;
pub mod rewrite;
pub mod supervisor;
pub mod surface;

pub use app_logger::{DiagnosticLog, LogEntry, LogLevel};
pub use config::AppConfig;
pub use extension::{Extension, OPEN_COMMAND, START_COMMAND};
pub use fetch::{ContentFetcher, FetchError, HttpFetcher};
pub use output_channel::OutputChannel;
pub use panel::{LoadOutcome, PanelManager, PanelOpen, PanelSettings, VIEW_TYPE};
pub use supervisor::{LaunchOutcome, ProcessSupervisor, WorkerExit, WorkerHandle};
pub use surface::{Surface, SurfaceHost, SurfaceOptions, ViewColumn, ViewState};
