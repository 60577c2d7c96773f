use serde::Deserialize;

/// Messages the embedded content may post to its host.
///
/// Only `alert` is understood. Any other `command` parses as
/// [`InboundMessage::Unknown`] and is ignored by the panel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum InboundMessage {
    /// Show `text` to the user as an error notification.
    Alert { text: String },
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Interpret a raw message. Malformed input (no `command`, an `alert`
    /// without `text`, a non-object) yields an error string for logging.
    pub fn parse(value: &serde_json::Value) -> Result<Self, String> {
        Self::deserialize(value).map_err(|e| format!("Unrecognised panel message: {e}"))
    }
}
