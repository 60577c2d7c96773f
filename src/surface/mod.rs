//! Host-side abstraction of an embedded UI panel.
//!
//! A [`Surface`] displays HTML, exchanges JSON messages with it and reports
//! visibility and disposal. A [`SurfaceHost`] creates surfaces and shows
//! notifications. The panel manager only talks to these traits, so any
//! embedding (an editor webview, a desktop window, the in-memory
//! [`headless`] host) can drive it.

pub mod headless;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::disposable::Disposable;
use crate::events::Listener;

/// Editor column a surface is shown in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewColumn {
    Active,
    Beside,
    One,
    Two,
    Three,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceOptions {
    pub enable_scripts: bool,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self { enable_scripts: true }
    }
}

/// Snapshot delivered with every view-state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    pub visible: bool,
    pub active: bool,
}

/// An embedded panel able to render HTML and talk to it.
pub trait Surface: Send + Sync {
    /// Bring the surface to the foreground, optionally moving it to `column`.
    fn reveal(&self, column: Option<ViewColumn>);

    fn set_title(&self, title: &str);

    /// Replace the displayed document.
    ///
    /// Must be a no-op once the surface is disposed: a load that passed its
    /// generation check can still land after a concurrent dispose.
    fn set_html(&self, html: String);

    fn is_visible(&self) -> bool;

    /// Tear the surface down. Fires the dispose event if it has not fired yet.
    fn dispose(&self);

    fn on_did_dispose(&self, listener: Listener<()>) -> Box<dyn Disposable>;

    fn on_did_change_view_state(&self, listener: Listener<ViewState>) -> Box<dyn Disposable>;

    /// Messages posted by the embedded content.
    fn on_did_receive_message(&self, listener: Listener<serde_json::Value>) -> Box<dyn Disposable>;
}

/// The environment that owns surfaces.
pub trait SurfaceHost: Send + Sync {
    fn create_surface(
        &self,
        view_type: &str,
        title: &str,
        column: ViewColumn,
        options: SurfaceOptions,
    ) -> Arc<dyn Surface>;

    /// Column of the active editor, if any.
    fn active_column(&self) -> Option<ViewColumn>;

    fn show_error_message(&self, text: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_enables_scripts() {
        assert!(SurfaceOptions::default().enable_scripts);
    }

    #[test]
    fn options_use_camel_case() {
        let json = serde_json::to_value(SurfaceOptions::default()).unwrap();
        assert_eq!(json, serde_json::json!({"enableScripts": true}));
    }

    #[test]
    fn view_column_serializes_lowercase() {
        let json = serde_json::to_string(&ViewColumn::Beside).unwrap();
        assert_eq!(json, "\"beside\"");
    }
}
