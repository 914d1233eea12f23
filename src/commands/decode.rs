//! Offline payload decoding.
//!
//! Shows what a tab would receive for a given push body:
//!
//! ```bash
//! echo '{"event":"created","channel":"orders","data":{"id":7}}' | pushnotif decode
//! pushnotif decode --file push.bin
//! ```

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

use crate::broadcast::DeliveryEnvelope;
use crate::config::Config;
use crate::payload::PayloadDecoder;
use crate::platform::{PushData, RawPushData};

/// Decodes `raw` into the pretty-printed envelope a tab would receive.
///
/// An empty body is treated as a push without data.
///
/// # Errors
///
/// Returns an error if the configured scope is not a valid URL.
pub fn render(raw: &[u8], config: &Config) -> Result<String> {
    let decoder = PayloadDecoder::for_scope(&config.scope, &config.icon_path)?;
    let data = RawPushData::new(raw);
    let payload = if raw.is_empty() {
        decoder.decode(None)
    } else {
        decoder.decode(Some(&data as &dyn PushData))
    };
    serde_json::to_string_pretty(&DeliveryEnvelope::new(payload))
        .context("Failed to serialize envelope")
}

/// Reads a push body from `file` (stdin when `None`) and prints its envelope.
///
/// # Errors
///
/// Returns an error if the input cannot be read or the scope is invalid.
pub fn run(file: Option<&Path>, config: &Config) -> Result<()> {
    let raw = match file {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    println!("{}", render(&raw, config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn envelope(raw: &[u8]) -> Value {
        serde_json::from_str(&render(raw, &Config::default()).unwrap()).unwrap()
    }

    #[test]
    fn test_render_structured_payload() {
        let value = envelope(br#"{"event":"created","channel":"orders","data":{"id":7}}"#);
        assert_eq!(value["type"], "push-received");
        assert_eq!(value["title"], "created");
        assert_eq!(value["body"], r#"{"id":7}"#);
        assert_eq!(value["channel"], "orders");
    }

    #[test]
    fn test_render_empty_input_uses_defaults() {
        let value = envelope(b"");
        assert_eq!(value["title"], "Notification");
        assert_eq!(value["body"], "New message.");
        assert_eq!(value["icon"], "http://127.0.0.1:3000/icon-default.png");
    }

    #[test]
    fn test_render_rejects_bad_scope() {
        let config = Config {
            scope: "nope".to_string(),
            ..Config::default()
        };
        assert!(render(b"hi", &config).is_err());
    }
}
