//! Push payload decoding.
//!
//! Turns whatever the push service delivered into an [`InboundPayload`]
//! with a displayable title and body. Decoding never fails: it walks an
//! ordered list of [`DecodeStrategy`] values, takes the first that yields
//! fields, then fills every gap with a default.
//!
//! # Accepted shapes
//!
//! ```text
//! structured  {"event": "...", "channel": "...", "data": {"title", "body", "icon", ...}}
//! flat        {"title": "...", "body": "...", "icon": "..."}
//! anything    raw text becomes the body
//! ```

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{DEFAULT_BODY, DEFAULT_ICON_PATH, DEFAULT_SCOPE, DEFAULT_TITLE};
use crate::platform::{PlatformError, PushData};

/// Normalized record produced for every delivered push.
///
/// `title` and `body` are never empty. `event`, `channel` and `data` are
/// set only when the sender used the structured event form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundPayload {
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Icon URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Event name (structured form only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Target channel (structured form only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Event data object (structured form only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Fields extracted by one strategy, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedFields {
    /// Title, if the payload carried one.
    pub title: Option<String>,
    /// Body, if the payload carried one.
    pub body: Option<String>,
    /// Icon, if the payload carried one.
    pub icon: Option<String>,
    /// Event name of the structured form.
    pub event: Option<String>,
    /// Channel of the structured form.
    pub channel: Option<String>,
    /// Data object of the structured form.
    pub data: Option<Value>,
}

impl DecodedFields {
    /// Extract fields from a parsed JSON document.
    ///
    /// Anything other than an object yields no fields.
    pub fn from_json(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let event = object
            .get("event")
            .and_then(coerce_text)
            .filter(|e| !e.is_empty());
        let data = match object.get("data") {
            None | Some(Value::Null) => Some(Value::Object(Map::new())),
            Some(data @ Value::Object(_)) => Some(data.clone()),
            Some(_) => None,
        };
        // Data fields win, then top-level fields for senders that put them
        // next to the event.
        let field = |data: &Value, name: &str| {
            data.get(name)
                .and_then(coerce_text)
                .or_else(|| object.get(name).and_then(coerce_text))
        };

        match (event, data) {
            (Some(event), Some(data)) => {
                let title = field(&data, "title").unwrap_or_else(|| event.clone());
                let body = field(&data, "body").unwrap_or_else(|| data.to_string());
                Self {
                    title: Some(title),
                    body: Some(body),
                    icon: field(&data, "icon"),
                    channel: object.get("channel").and_then(coerce_text),
                    event: Some(event),
                    data: Some(data),
                }
            }
            _ => Self {
                title: object.get("title").and_then(coerce_text),
                body: object.get("body").and_then(coerce_text),
                icon: object.get("icon").and_then(coerce_text),
                ..Self::default()
            },
        }
    }
}

/// Coerce a JSON value to display text. `null` counts as absent.
fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// One way of reading a push body. Tried in [`DecodeStrategy::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Read as text, parse as JSON.
    TextJson,
    /// Use the platform's own JSON accessor.
    StructuredAccessor,
    /// Treat the raw text as the body, replacing invalid UTF-8.
    RawText,
}

impl DecodeStrategy {
    /// Strategies in the order they are attempted.
    pub const ORDER: [Self; 3] = [Self::TextJson, Self::StructuredAccessor, Self::RawText];

    /// Run this strategy against `data`.
    pub fn attempt(self, data: &dyn PushData) -> Result<DecodedFields, PlatformError> {
        match self {
            Self::TextJson => {
                let text = data.text()?;
                let value: Value = serde_json::from_str(&text)
                    .map_err(|e| PlatformError::Failed(format!("not JSON: {e}")))?;
                Ok(DecodedFields::from_json(&value))
            }
            Self::StructuredAccessor => Ok(DecodedFields::from_json(&data.json()?)),
            Self::RawText => Ok(DecodedFields {
                body: Some(data.text_lossy()?),
                ..DecodedFields::default()
            }),
        }
    }
}

/// Payload decoder bound to the delivery agent's registration scope.
#[derive(Debug, Clone)]
pub struct PayloadDecoder {
    default_icon: String,
}

impl Default for PayloadDecoder {
    fn default() -> Self {
        Self {
            default_icon: format!("{DEFAULT_SCOPE}{DEFAULT_ICON_PATH}"),
        }
    }
}

impl PayloadDecoder {
    /// Parse `scope` and create a decoder.
    pub fn for_scope(scope: &str, icon_path: &str) -> anyhow::Result<Self> {
        let scope = Url::parse(scope)
            .map_err(|e| anyhow::anyhow!("invalid registration scope {scope:?}: {e}"))?;
        let default_icon = scope
            .join(icon_path)
            .map_err(|e| anyhow::anyhow!("invalid icon path {icon_path:?}: {e}"))?;
        Ok(Self {
            default_icon: default_icon.to_string(),
        })
    }

    /// Icon used when the payload names none.
    pub fn default_icon(&self) -> &str {
        &self.default_icon
    }

    /// Decode a push body. `None` means the push carried no data.
    pub fn decode(&self, data: Option<&dyn PushData>) -> InboundPayload {
        let (fields, strategy) = self.extract(data);
        match strategy {
            Some(strategy) => log::debug!("[Decoder] Payload decoded via {strategy:?}"),
            None => log::debug!("[Decoder] No usable payload, using defaults"),
        }
        self.normalize(fields)
    }

    /// Run the strategies and report which one produced the fields.
    pub fn extract(
        &self,
        data: Option<&dyn PushData>,
    ) -> (DecodedFields, Option<DecodeStrategy>) {
        let Some(data) = data else {
            return (DecodedFields::default(), None);
        };

        for strategy in DecodeStrategy::ORDER {
            match strategy.attempt(data) {
                Ok(fields) => return (fields, Some(strategy)),
                Err(e) => log::debug!("[Decoder] {strategy:?} failed: {e}"),
            }
        }
        (DecodedFields::default(), None)
    }

    fn normalize(&self, fields: DecodedFields) -> InboundPayload {
        let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());
        InboundPayload {
            title: non_empty(fields.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: non_empty(fields.body).unwrap_or_else(|| DEFAULT_BODY.to_string()),
            icon: Some(non_empty(fields.icon).unwrap_or_else(|| self.default_icon.clone())),
            event: fields.event,
            channel: fields.channel,
            data: fields.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::RawPushData;
    use serde_json::json;

    fn decode(raw: &str) -> InboundPayload {
        PayloadDecoder::default().decode(Some(&RawPushData::from(raw)))
    }

    /// Push data whose text accessor fails but whose JSON accessor works.
    struct JsonOnly(Value);

    impl PushData for JsonOnly {
        fn text(&self) -> Result<String, PlatformError> {
            Err(PlatformError::Unsupported("text()".to_string()))
        }

        fn json(&self) -> Result<Value, PlatformError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_flat_form() {
        let payload = decode(r#"{"title":"A","body":"B"}"#);
        assert_eq!(payload.title, "A");
        assert_eq!(payload.body, "B");
        assert!(payload.event.is_none());
        assert!(payload.channel.is_none());
        assert!(payload.data.is_none());
    }

    #[test]
    fn test_structured_form() {
        let payload = decode(
            r#"{"event":"test","channel":"default","data":{"title":"Hi","body":"there"}}"#,
        );
        assert_eq!(payload.title, "Hi");
        assert_eq!(payload.body, "there");
        assert_eq!(payload.event.as_deref(), Some("test"));
        assert_eq!(payload.channel.as_deref(), Some("default"));
        assert_eq!(payload.data, Some(json!({"title": "Hi", "body": "there"})));
    }

    #[test]
    fn test_structured_form_falls_back_to_event_name_and_data_text() {
        let payload = decode(r#"{"event":"test","data":{}}"#);
        assert_eq!(payload.title, "test");
        assert_eq!(payload.body, "{}");
        assert!(payload.channel.is_none());
    }

    #[test]
    fn test_structured_form_without_data() {
        let payload = decode(r#"{"event":"ping","channel":"c"}"#);
        assert_eq!(payload.title, "ping");
        assert_eq!(payload.body, "{}");
        assert_eq!(payload.data, Some(json!({})));
    }

    #[test]
    fn test_event_without_data_keeps_top_level_fields() {
        let payload = decode(r#"{"event":"x","title":"T","body":"B","icon":"i.png"}"#);
        assert_eq!(payload.title, "T");
        assert_eq!(payload.body, "B");
        assert_eq!(payload.icon.as_deref(), Some("i.png"));
        assert_eq!(payload.event.as_deref(), Some("x"));
    }

    #[test]
    fn test_data_fields_win_over_top_level_fields() {
        let payload = decode(r#"{"event":"x","title":"outer","data":{"title":"inner"}}"#);
        assert_eq!(payload.title, "inner");
        assert_eq!(payload.body, r#"{"title":"inner"}"#);
    }

    #[test]
    fn test_invalid_utf8_text_becomes_body() {
        let decoder = PayloadDecoder::default();
        let data = RawPushData::new(b"caf\xe9 ouvert".to_vec());
        let (_, strategy) = decoder.extract(Some(&data));
        let payload = decoder.decode(Some(&data));

        assert_eq!(strategy, Some(DecodeStrategy::RawText));
        assert_eq!(payload.title, DEFAULT_TITLE);
        assert_eq!(payload.body, "caf\u{FFFD} ouvert");
    }

    #[test]
    fn test_event_with_non_object_data_is_flat() {
        let payload = decode(r#"{"event":"x","data":"str","title":"T"}"#);
        assert_eq!(payload.title, "T");
        assert!(payload.event.is_none());
        assert!(payload.data.is_none());
    }

    #[test]
    fn test_plain_text_becomes_body() {
        let payload = decode("plain text");
        assert_eq!(payload.title, "Notification");
        assert_eq!(payload.body, "plain text");
    }

    #[test]
    fn test_json_accessor_used_when_text_fails() {
        let data = JsonOnly(json!({"title": "From json()", "body": "ok"}));
        let decoder = PayloadDecoder::default();
        let (fields, strategy) = decoder.extract(Some(&data));
        assert_eq!(strategy, Some(DecodeStrategy::StructuredAccessor));
        assert_eq!(fields.title.as_deref(), Some("From json()"));
    }

    #[test]
    fn test_malformed_inputs_always_have_title_and_body() {
        let decoder = PayloadDecoder::default();
        let inputs: Vec<RawPushData> = vec![
            RawPushData::from(""),
            RawPushData::from("null"),
            RawPushData::from("42"),
            RawPushData::from("[1,2]"),
            RawPushData::from(r#"{"title":"","body":""}"#),
            RawPushData::from(r#"{"title":null}"#),
            RawPushData::from(r#"{"event":"","data":{}}"#),
        ];

        for input in &inputs {
            let payload = decoder.decode(Some(input));
            assert!(!payload.title.is_empty(), "empty title for {input:?}");
            assert!(!payload.body.is_empty(), "empty body for {input:?}");
        }

        let invalid = decoder.decode(Some(&RawPushData::new(vec![0xc3, 0x28, 0xff])));
        assert_eq!(invalid.title, DEFAULT_TITLE);
        assert_eq!(invalid.body, "\u{FFFD}(\u{FFFD}");

        let absent = decoder.decode(None);
        assert_eq!(absent.title, DEFAULT_TITLE);
        assert_eq!(absent.body, DEFAULT_BODY);
    }

    #[test]
    fn test_non_string_fields_are_coerced() {
        let payload = decode(r#"{"title":7,"body":{"k":true},"icon":false}"#);
        assert_eq!(payload.title, "7");
        assert_eq!(payload.body, r#"{"k":true}"#);
        assert_eq!(payload.icon.as_deref(), Some("false"));
    }

    #[test]
    fn test_default_icon_resolves_against_scope() {
        let decoder = PayloadDecoder::for_scope("https://app.example.com/push/", "icon-default.png")
            .unwrap();
        let payload = decoder.decode(Some(&RawPushData::from(r#"{"title":"A"}"#)));
        assert_eq!(
            payload.icon.as_deref(),
            Some("https://app.example.com/push/icon-default.png")
        );
    }

    #[test]
    fn test_payload_icon_is_kept() {
        let payload = decode(r#"{"title":"A","icon":"https://cdn.example.com/i.png"}"#);
        assert_eq!(payload.icon.as_deref(), Some("https://cdn.example.com/i.png"));
    }

    #[test]
    fn test_invalid_scope_is_rejected() {
        assert!(PayloadDecoder::for_scope("not a url", "icon.png").is_err());
    }
}
