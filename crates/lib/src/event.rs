//! LINE webhook envelope parsing.
//!
//! Extraction is deliberately forgiving: any missing key, an unparseable
//! body, or an empty event list yields absent fields instead of an error,
//! and the pipeline decides what to do with what it got.

use serde::Deserialize;

/// Top-level webhook body: a list of event records. Only the first is consumed.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

/// One event record. Every field the relay reads is optional on the wire.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    /// Event kind ("message", "follow", ...). Only "message" carries text.
    #[serde(rename = "type", default)]
    pub typ: Option<String>,
    #[serde(default)]
    pub source: Option<EventSource>,
    /// Single-use token for one direct reply to this event.
    #[serde(rename = "replyToken", default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
pub struct EventSource {
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventMessage {
    /// Message sub-type ("text", "image", ...). Text is extracted only for "text".
    #[serde(rename = "type", default)]
    pub typ: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Fields pulled from the first event of an envelope. All absent when the
/// envelope is malformed or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedEvent {
    pub sender_id: Option<String>,
    pub reply_token: Option<String>,
    pub message_text: Option<String>,
}

/// Parse the raw envelope and read the first event.
/// The sender id is read regardless of event kind; message text only when
/// the event is a text message.
pub fn extract_event(raw: &str) -> ExtractedEvent {
    let envelope: WebhookEnvelope = match serde_json::from_str(raw) {
        Ok(e) => e,
        Err(e) => {
            log::debug!("envelope did not parse: {}", e);
            return ExtractedEvent::default();
        }
    };
    let Some(event) = envelope.events.into_iter().next() else {
        return ExtractedEvent::default();
    };

    let sender_id = event.source.and_then(|s| s.user_id);
    let reply_token = event.reply_token;
    let message_text = match (event.typ.as_deref(), event.message) {
        (Some("message"), Some(msg)) if msg.typ.as_deref() == Some("text") => msg.text,
        _ => None,
    };

    ExtractedEvent {
        sender_id,
        reply_token,
        message_text,
    }
}
