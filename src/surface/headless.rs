//! In-memory surface host.
//!
//! Keeps the displayed document in a `watch` channel so callers can await
//! content changes, records every notification, and exposes the user-side
//! actions (show/hide, post a message, close) that a real embedding would
//! trigger from its UI.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::watch;

use super::{Surface, SurfaceHost, SurfaceOptions, ViewColumn, ViewState};
use crate::disposable::Disposable;
use crate::events::{EventEmitter, Listener};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

pub struct HeadlessSurface {
    id: u64,
    view_type: String,
    options: SurfaceOptions,
    title: Mutex<String>,
    column: Mutex<ViewColumn>,
    html: watch::Sender<Option<String>>,
    visible: AtomicBool,
    disposed: AtomicBool,
    reveal_count: AtomicUsize,
    dispose_events: EventEmitter<()>,
    view_state_events: EventEmitter<ViewState>,
    message_events: EventEmitter<serde_json::Value>,
}

impl HeadlessSurface {
    pub fn new(view_type: &str, title: &str, column: ViewColumn, options: SurfaceOptions) -> Self {
        let (html, _) = watch::channel(None);
        Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            view_type: view_type.to_string(),
            options,
            title: Mutex::new(title.to_string()),
            column: Mutex::new(column),
            html,
            visible: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
            reveal_count: AtomicUsize::new(0),
            dispose_events: EventEmitter::new(),
            view_state_events: EventEmitter::new(),
            message_events: EventEmitter::new(),
        }
    }

    /// Process-unique identity of this surface.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn view_type(&self) -> &str {
        &self.view_type
    }

    pub fn options(&self) -> SurfaceOptions {
        self.options
    }

    pub fn title(&self) -> String {
        self.title.lock().clone()
    }

    pub fn column(&self) -> ViewColumn {
        *self.column.lock()
    }

    /// Currently displayed document, if any was ever assigned.
    pub fn html(&self) -> Option<String> {
        self.html.borrow().clone()
    }

    /// Observe document assignments.
    pub fn watch_html(&self) -> watch::Receiver<Option<String>> {
        self.html.subscribe()
    }

    pub fn reveal_count(&self) -> usize {
        self.reveal_count.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Simulate the surface being hidden or shown by the user.
    pub fn set_visible(&self, visible: bool) {
        if self.is_disposed() {
            return;
        }
        let was = self.visible.swap(visible, Ordering::SeqCst);
        if was != visible {
            self.view_state_events.fire(ViewState { visible, active: visible });
        }
    }

    /// Simulate the embedded content posting a message.
    pub fn post_message(&self, message: serde_json::Value) {
        if self.is_disposed() {
            return;
        }
        self.message_events.fire(message);
    }

    /// Simulate the user closing the surface.
    pub fn close(&self) {
        self.dispose();
    }

    pub fn listener_counts(&self) -> (usize, usize, usize) {
        (
            self.dispose_events.listener_count(),
            self.view_state_events.listener_count(),
            self.message_events.listener_count(),
        )
    }
}

impl Surface for HeadlessSurface {
    fn reveal(&self, column: Option<ViewColumn>) {
        if let Some(column) = column {
            *self.column.lock() = column;
        }
        self.reveal_count.fetch_add(1, Ordering::SeqCst);
        self.set_visible(true);
    }

    fn set_title(&self, title: &str) {
        *self.title.lock() = title.to_string();
    }

    fn set_html(&self, html: String) {
        if self.is_disposed() {
            tracing::debug!(surface = self.id, "ignoring content for disposed surface");
            return;
        }
        self.html.send_replace(Some(html));
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.visible.store(false, Ordering::SeqCst);
        self.dispose_events.fire(());
    }

    fn on_did_dispose(&self, listener: Listener<()>) -> Box<dyn Disposable> {
        self.dispose_events.subscribe(listener)
    }

    fn on_did_change_view_state(&self, listener: Listener<ViewState>) -> Box<dyn Disposable> {
        self.view_state_events.subscribe(listener)
    }

    fn on_did_receive_message(&self, listener: Listener<serde_json::Value>) -> Box<dyn Disposable> {
        self.message_events.subscribe(listener)
    }
}

/// Surface host that keeps everything in memory.
#[derive(Default)]
pub struct HeadlessHost {
    surfaces: Mutex<Vec<Arc<HeadlessSurface>>>,
    errors: Mutex<Vec<String>>,
    active_column: Mutex<Option<ViewColumn>>,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active_column(&self, column: Option<ViewColumn>) {
        *self.active_column.lock() = column;
    }

    /// Every surface created so far, oldest first.
    pub fn surfaces(&self) -> Vec<Arc<HeadlessSurface>> {
        self.surfaces.lock().clone()
    }

    pub fn last_surface(&self) -> Option<Arc<HeadlessSurface>> {
        self.surfaces.lock().last().cloned()
    }

    /// Error notifications shown so far.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl SurfaceHost for HeadlessHost {
    fn create_surface(
        &self,
        view_type: &str,
        title: &str,
        column: ViewColumn,
        options: SurfaceOptions,
    ) -> Arc<dyn Surface> {
        let surface = Arc::new(HeadlessSurface::new(view_type, title, column, options));
        self.surfaces.lock().push(surface.clone());
        surface
    }

    fn active_column(&self) -> Option<ViewColumn> {
        *self.active_column.lock()
    }

    fn show_error_message(&self, text: &str) {
        tracing::error!("{text}");
        self.errors.lock().push(text.to_string());
    }
}
