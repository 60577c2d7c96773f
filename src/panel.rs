//! Singleton panel lifecycle.
//!
//! A [`PanelManager`] owns at most one live panel. Opening either reveals the
//! live panel or creates a new one; the panel reloads its content whenever the
//! surface becomes visible again; closing releases every event subscription
//! in reverse registration order.
//!
//! Content loads run on spawned tasks. Each load remembers the generation of
//! the panel that requested it and is discarded if that panel has since been
//! disposed or replaced.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use url::Url;

use crate::app_logger::DiagnosticLog;
use crate::disposable::DisposableStore;
use crate::fetch::ContentFetcher;
use crate::message::InboundMessage;
use crate::rewrite::rewrite_root_href;
use crate::surface::{Surface, SurfaceHost, SurfaceOptions, ViewColumn, ViewState};

/// View type registered for the AtlasMap panel.
pub const VIEW_TYPE: &str = "atlasmap";

const LOG_SOURCE: &str = "panel";

/// Result of a single content load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Rewritten content was assigned to the surface.
    Applied,
    /// The requesting panel is gone; the result was dropped.
    Discarded,
    /// Fetching failed; the surface kept whatever it showed before.
    Failed(String),
}

/// What [`PanelManager::open_or_reveal`] did.
#[derive(Debug)]
pub enum PanelOpen {
    Revealed { generation: u64 },
    Created { generation: u64, load: JoinHandle<LoadOutcome> },
}

#[derive(Debug, Clone)]
pub struct PanelSettings {
    pub view_type: String,
    pub title: String,
    pub options: SurfaceOptions,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            view_type: VIEW_TYPE.to_string(),
            title: "AtlasMap".to_string(),
            options: SurfaceOptions::default(),
        }
    }
}

struct PanelSlot {
    generation: u64,
    origin: Url,
    surface: Arc<dyn Surface>,
    disposables: DisposableStore,
}

#[derive(Default)]
struct PanelState {
    current: Option<PanelSlot>,
    next_generation: u64,
}

struct ManagerInner {
    host: Arc<dyn SurfaceHost>,
    fetcher: Arc<dyn ContentFetcher>,
    log: DiagnosticLog,
    settings: PanelSettings,
    state: Mutex<PanelState>,
}

/// Owner of the single live panel. Cheap to clone; clones share the panel.
#[derive(Clone)]
pub struct PanelManager {
    inner: Arc<ManagerInner>,
}

impl PanelManager {
    pub fn new(
        host: Arc<dyn SurfaceHost>,
        fetcher: Arc<dyn ContentFetcher>,
        log: DiagnosticLog,
        settings: PanelSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                host,
                fetcher,
                log,
                settings,
                state: Mutex::new(PanelState {
                    current: None,
                    next_generation: 1,
                }),
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.state.lock().current.is_some()
    }

    pub fn current_generation(&self) -> Option<u64> {
        self.inner.state.lock().current.as_ref().map(|slot| slot.generation)
    }

    /// Reveal the live panel, or create one showing `origin`.
    ///
    /// Creating a panel needs a tokio runtime for its content load. Without
    /// one nothing is created and the error is returned.
    pub fn open_or_reveal(&self, origin: Url) -> Result<PanelOpen, String> {
        let column = self.inner.host.active_column();

        let live = self
            .inner
            .state
            .lock()
            .current
            .as_ref()
            .map(|slot| (slot.generation, slot.surface.clone()));
        if let Some((generation, surface)) = live {
            surface.reveal(column);
            return Ok(PanelOpen::Revealed { generation });
        }

        let runtime = self.runtime()?;
        let settings = &self.inner.settings;
        let surface = self.inner.host.create_surface(
            &settings.view_type,
            &settings.title,
            column.unwrap_or(ViewColumn::One),
            settings.options,
        );
        let (generation, load) = self.attach(&runtime, surface, origin);
        Ok(PanelOpen::Created { generation, load })
    }

    /// Re-attach a surface the host restored after a restart.
    ///
    /// A panel that is already live is disposed first. Without a tokio
    /// runtime the restored surface is disposed and the live panel is kept.
    pub fn revive(
        &self,
        surface: Arc<dyn Surface>,
        origin: Url,
    ) -> Result<(u64, JoinHandle<LoadOutcome>), String> {
        let runtime = match self.runtime() {
            Ok(runtime) => runtime,
            Err(e) => {
                surface.dispose();
                return Err(e);
            }
        };
        if self.is_open() {
            tracing::info!("replacing live panel with revived surface");
            self.dispose();
        }
        Ok(self.attach(&runtime, surface, origin))
    }

    /// Reload the live panel if its surface is visible.
    pub fn on_visibility_restored(&self) -> Option<JoinHandle<LoadOutcome>> {
        let generation = self.current_generation()?;
        self.reload_if_visible(generation)
    }

    /// Handle a message posted by the embedded content.
    pub fn on_inbound_message(&self, message: &serde_json::Value) {
        match InboundMessage::parse(message) {
            Ok(InboundMessage::Alert { text }) => self.inner.host.show_error_message(&text),
            Ok(InboundMessage::Unknown) => {
                tracing::debug!(%message, "ignoring panel message");
            }
            Err(e) => tracing::debug!("{e}"),
        }
    }

    /// Reload the live panel regardless of visibility.
    pub fn load_content(&self) -> Option<JoinHandle<LoadOutcome>> {
        let (generation, origin) = {
            let state = self.inner.state.lock();
            let slot = state.current.as_ref()?;
            (slot.generation, slot.origin.clone())
        };
        let runtime = self.runtime().ok()?;
        Some(self.spawn_load(&runtime, generation, origin))
    }

    /// Close the live panel.
    ///
    /// The singleton is cleared before anything else, so re-entrant calls
    /// (the surface firing its own dispose event) find nothing to do.
    pub fn dispose(&self) {
        let slot = self.inner.state.lock().current.take();
        let Some(mut slot) = slot else {
            return;
        };
        tracing::info!(generation = slot.generation, "disposing panel");
        slot.surface.dispose();
        slot.disposables.dispose_all();
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Runtime that content loads are spawned on. Its absence is recorded once
    /// per attempt in the diagnostic log.
    fn runtime(&self) -> Result<Handle, String> {
        Handle::try_current().map_err(|e| {
            let reason = format!("Failed to load panel content: no async runtime ({e})");
            self.inner.log.error(LOG_SOURCE, reason.clone());
            reason
        })
    }

    fn attach(
        &self,
        runtime: &Handle,
        surface: Arc<dyn Surface>,
        origin: Url,
    ) -> (u64, JoinHandle<LoadOutcome>) {
        let generation = {
            let mut state = self.inner.state.lock();
            let generation = state.next_generation;
            state.next_generation += 1;
            generation
        };

        let mut disposables = DisposableStore::new();
        let weak = Arc::downgrade(&self.inner);

        disposables.push(surface.on_did_dispose({
            let weak = weak.clone();
            Arc::new(move |_: ()| {
                if let Some(manager) = upgrade(&weak) {
                    manager.dispose_generation(generation);
                }
            })
        }));

        disposables.push(surface.on_did_change_view_state({
            let weak = weak.clone();
            Arc::new(move |view: ViewState| {
                if view.visible
                    && let Some(manager) = upgrade(&weak)
                {
                    let _ = manager.reload_if_visible(generation);
                }
            })
        }));

        disposables.push(surface.on_did_receive_message({
            let weak = weak.clone();
            Arc::new(move |message: serde_json::Value| {
                if let Some(manager) = upgrade(&weak)
                    && manager.current_generation() == Some(generation)
                {
                    manager.on_inbound_message(&message);
                }
            })
        }));

        surface.set_title(&self.inner.settings.title);

        self.inner.state.lock().current = Some(PanelSlot {
            generation,
            origin: origin.clone(),
            surface,
            disposables,
        });
        tracing::info!(generation, %origin, "panel attached");

        (generation, self.spawn_load(runtime, generation, origin))
    }

    fn dispose_generation(&self, generation: u64) {
        if self.current_generation() == Some(generation) {
            self.dispose();
        }
    }

    fn reload_if_visible(&self, generation: u64) -> Option<JoinHandle<LoadOutcome>> {
        let (origin, surface) = {
            let state = self.inner.state.lock();
            let slot = state.current.as_ref().filter(|s| s.generation == generation)?;
            (slot.origin.clone(), slot.surface.clone())
        };
        if !surface.is_visible() {
            return None;
        }
        let runtime = self.runtime().ok()?;
        surface.set_title(&self.inner.settings.title);
        Some(self.spawn_load(&runtime, generation, origin))
    }

    fn spawn_load(&self, runtime: &Handle, generation: u64, origin: Url) -> JoinHandle<LoadOutcome> {
        let fetch = self.inner.fetcher.fetch(origin.as_str());
        let weak = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            let result = fetch.await;
            let Some(manager) = upgrade(&weak) else {
                return LoadOutcome::Discarded;
            };
            match result {
                Ok(body) => manager.apply_content(generation, &origin, &body),
                Err(e) => {
                    let description = e.to_string();
                    manager.inner.log.error(LOG_SOURCE, description.clone());
                    LoadOutcome::Failed(description)
                }
            }
        })
    }

    fn apply_content(&self, generation: u64, origin: &Url, body: &str) -> LoadOutcome {
        let surface = {
            let state = self.inner.state.lock();
            match state.current.as_ref() {
                Some(slot) if slot.generation == generation => slot.surface.clone(),
                _ => {
                    tracing::debug!(generation, "dropping content for a panel that is gone");
                    return LoadOutcome::Discarded;
                }
            }
        };
        surface.set_html(rewrite_root_href(body, origin.as_str()));
        LoadOutcome::Applied
    }
}

fn upgrade(weak: &Weak<ManagerInner>) -> Option<PanelManager> {
    weak.upgrade().map(|inner| PanelManager { inner })
}
