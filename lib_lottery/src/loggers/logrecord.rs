use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Returns the current UTC time formatted as an RFC 9557 timestamp with
/// millisecond precision.
pub fn current_datetime_rfc9557() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// # Logrecord
///
/// One structured event. Protocol events carry an `action` and a `result`
/// plus ordered key/value fields, and render as
/// `action: connect | result: success | client_id: 1`. Free-form messages
/// leave `action` empty and render their text as is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Logrecord {
    /// The severity level (0 silly .. 6 fatal).
    pub loglevel: i64,
    /// Information about the process emitting the event.
    pub app: App,
    /// The protocol step this event describes (`connect`, `send_message`, ...).
    pub action: Option<String>,
    /// `success`, `fail` or `in_progress`.
    pub result: Option<String>,
    /// Ordered identifiers attached to the event.
    pub fields: Vec<(String, String)>,
    /// Details about the message content.
    pub message: Message,
    /// Flexible JSON value for arbitrary extra metadata.
    pub tags: Value,
    /// RFC 9557 formatted timestamp string.
    pub rfc9557: String,
}

impl Default for Logrecord {
    /// Creates an empty record stamped with the current time.
    fn default() -> Self {
        Self {
            loglevel: 0,
            app: App::default(),
            action: None,
            result: None,
            fields: Vec::new(),
            message: Message::default(),
            tags: serde_json::json!([]),
            rfc9557: current_datetime_rfc9557(),
        }
    }
}

impl Logrecord {
    /// Starts a protocol event for `action` with the given `result`.
    pub fn action(action: &str, result: &str) -> Self {
        Self {
            action: Some(action.to_string()),
            result: Some(result.to_string()),
            ..Self::default()
        }
    }

    /// Appends a `key: value` pair. Order of calls is the rendering order.
    pub fn field(mut self, key: &str, value: impl Display) -> Self {
        self.fields.push((key.to_string(), value.to_string()));
        self
    }

    /// Attaches extra JSON metadata.
    pub fn tags(mut self, tags: Value) -> Self {
        self.tags = tags;
        self
    }

    /// Renders the human-readable line for this record.
    pub fn text(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(action) = &self.action {
            parts.push(format!("action: {}", action));
        }
        if let Some(result) = &self.result {
            parts.push(format!("result: {}", result));
        }
        if !self.message.text.is_empty() {
            parts.push(self.message.text.clone());
        }
        for (key, value) in &self.fields {
            parts.push(format!("{}: {}", key, value));
        }
        parts.join(" | ")
    }

    /// True when there is extra JSON metadata worth printing.
    pub fn has_tags(&self) -> bool {
        self.tags != serde_json::json!([]) && !self.tags.is_null()
    }
}

/// # Message
///
/// The free-form textual content of a log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The language of the message (e.g., "en" for English).
    pub lang: String,
    /// The actual text content of the message.
    pub text: String,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            text: String::new(),
            lang: "en".to_string(),
        }
    }
}

/// # App
///
/// The process that generated the log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    /// The process ID (PID) of the application.
    pub pid: i64,
    /// The executable's base name.
    pub name: String,
}

impl Default for App {
    fn default() -> Self {
        let name = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "lottery".to_string());
        Self {
            pid: std::process::id() as i64,
            name,
        }
    }
}
