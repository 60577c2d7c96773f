use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use atlasmap_host_lib::surface::headless::HeadlessHost;
use atlasmap_host_lib::{AppConfig, Extension, LoadOutcome, PanelOpen, config, logging};

#[derive(Parser, Debug)]
#[command(name = "atlasmap-host", version, about = "Run the AtlasMap worker and render its UI")]
struct Cli {
    /// Directory the worker archive path is resolved against
    #[arg(long, env = "ATLASMAP_EXTENSION_PATH", default_value = ".")]
    extension_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch the worker and follow its console output until it exits
    Start {
        /// Worker archive (overrides the configured one)
        #[arg(long)]
        archive: Option<PathBuf>,
        /// Java launcher (overrides the configured one)
        #[arg(long)]
        java: Option<String>,
    },
    /// Open the panel on a headless surface and print the rewritten document
    Open {
        /// Worker origin (overrides the configured one)
        #[arg(long)]
        origin: Option<String>,
        /// Write the document here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show the effective configuration
    Config {
        /// Write the defaults if no config file exists yet
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let mut cfg = config::load_app_config();

    match cli.command {
        Command::Start { archive, java } => {
            if let Some(archive) = archive {
                cfg.worker_archive = archive;
            }
            if let Some(java) = java {
                cfg.java_bin = java;
            }
            start(cfg, cli.extension_path).await
        }
        Command::Open { origin, out } => {
            if let Some(origin) = origin {
                cfg.origin = origin;
            }
            open(cfg, cli.extension_path, out).await
        }
        Command::Config { init } => show_config(cfg, init),
    }
}

async fn start(cfg: AppConfig, extension_path: PathBuf) -> anyhow::Result<()> {
    let ext = Extension::activate(Arc::new(HeadlessHost::new()), cfg, extension_path);
    // Subscribe before launching so no early output is missed.
    let mut output = ext.output().subscribe();
    let worker = ext.start_worker().map_err(anyhow::Error::msg)?;
    tracing::info!(pid = ?worker.pid(), archive = %worker.archive().display(), "worker started");

    let mut stdout = std::io::stdout();
    let exit = loop {
        tokio::select! {
            chunk = output.recv() => match chunk {
                Ok(text) => {
                    stdout.write_all(text.as_bytes())?;
                    stdout.flush()?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "output follower lagged");
                }
                Err(RecvError::Closed) => {}
            },
            exit = worker.wait() => break exit,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted; worker left running");
                return Ok(());
            }
        }
    };

    while let Ok(text) = output.try_recv() {
        stdout.write_all(text.as_bytes())?;
    }
    stdout.flush()?;

    if !exit.success {
        bail!("worker exited with code {:?}", exit.code);
    }
    Ok(())
}

async fn open(cfg: AppConfig, extension_path: PathBuf, out: Option<PathBuf>) -> anyhow::Result<()> {
    let host = Arc::new(HeadlessHost::new());
    let ext = Extension::activate(host.clone(), cfg, extension_path);

    let load = match ext.open_panel().map_err(anyhow::Error::msg)? {
        PanelOpen::Created { load, .. } => load,
        PanelOpen::Revealed { .. } => bail!("panel was already open"),
    };

    match load.await.context("content load task failed")? {
        LoadOutcome::Applied => {}
        LoadOutcome::Failed(reason) => bail!("{reason}"),
        LoadOutcome::Discarded => bail!("panel closed before its content arrived"),
    }

    let html = host
        .last_surface()
        .and_then(|surface| surface.html())
        .context("panel has no content")?;

    match out {
        Some(path) => {
            std::fs::write(&path, html)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "panel content written");
        }
        None => {
            let mut stdout = std::io::stdout();
            stdout.write_all(html.as_bytes())?;
            stdout.flush()?;
        }
    }

    ext.deactivate();
    Ok(())
}

fn show_config(cfg: AppConfig, init: bool) -> anyhow::Result<()> {
    let path = config::config_dir().join(config::CONFIG_FILE);
    if init && !path.exists() {
        config::save_app_config(&cfg).map_err(anyhow::Error::msg)?;
        tracing::info!(path = %path.display(), "wrote default config");
    }
    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(&cfg)?);
    Ok(())
}
