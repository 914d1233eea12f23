//! HTTP client for the push collaborator.
//!
//! The collaborator owns the VAPID key pair, stores subscriptions and fans
//! triggered events out as push messages. This module only consumes it:
//!
//! ```text
//! GET  /vapid-public-key  -> {"publicKey": "<base64url>"}
//! POST /subscribe         {endpoint, keys: {p256dh, auth}, channels}
//! POST /trigger           {channels, event, data} -> {ok, sent?, failed?, message?}
//! ```

use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::constants::ERROR_BODY_MAX_CHARS;
use crate::error::ApiError;

/// Encryption keys of a platform subscription, both unpadded base64url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// Browser's P-256 ECDH public key.
    pub p256dh: String,
    /// Shared auth secret.
    pub auth: String,
}

/// Body of `POST /subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Subscription encryption keys.
    pub keys: SubscriptionKeys,
    /// Channels this subscription receives events for.
    pub channels: Vec<String>,
}

/// Body of `POST /trigger`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    /// Target channels. Empty means every subscription.
    pub channels: Vec<String>,
    /// Event name.
    pub event: String,
    /// Event data object.
    pub data: Value,
}

impl TriggerRequest {
    /// Build a trigger for one channel or several.
    ///
    /// `data` of `None` (or JSON `null`) is sent as `{}`.
    pub fn new(
        channels: impl Into<ChannelTarget>,
        event: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let data = match data {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(data) => data,
        };
        Self {
            channels: channels.into().0,
            event: event.into(),
            data,
        }
    }
}

/// One or more channel names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelTarget(pub Vec<String>);

impl From<&str> for ChannelTarget {
    fn from(channel: &str) -> Self {
        Self(vec![channel.to_string()])
    }
}

impl From<String> for ChannelTarget {
    fn from(channel: String) -> Self {
        Self(vec![channel])
    }
}

impl From<Vec<String>> for ChannelTarget {
    fn from(channels: Vec<String>) -> Self {
        Self(channels)
    }
}

impl From<&[&str]> for ChannelTarget {
    fn from(channels: &[&str]) -> Self {
        Self(channels.iter().map(|c| (*c).to_string()).collect())
    }
}

/// Response of `POST /trigger`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResponse {
    /// Whether the collaborator accepted the trigger.
    pub ok: bool,
    /// Push messages delivered to the push service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent: Option<u64>,
    /// Push messages the push service rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<u64>,
    /// Human-readable status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyResponse {
    public_key: String,
}

/// Async client for the collaborator endpoints.
///
/// The VAPID public key is fetched once per client and cached for the
/// client's lifetime. Separate clients (one per CLI invocation) fetch
/// independently.
#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    base: Url,
    public_key: OnceCell<String>,
}

impl ApiClient {
    /// Creates a client for the collaborator at `api_base`.
    ///
    /// # Errors
    ///
    /// Returns an error if `api_base` is not an absolute URL or the HTTP
    /// client cannot be built.
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut base = Url::parse(api_base)
            .map_err(|e| ApiError::InvalidUrl(format!("{api_base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(api_base.to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ApiError::Request {
                url: api_base.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            base,
            public_key: OnceCell::new(),
        })
    }

    /// Creates a client from the loaded configuration.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::new`].
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(&config.api_base, config.request_timeout())
    }

    /// Base URL all endpoints are resolved against.
    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Returns the collaborator's VAPID public key (base64url).
    ///
    /// Only the first successful call hits the network.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not 2xx or the
    /// body has no `publicKey`.
    pub async fn vapid_public_key(&self) -> Result<String, ApiError> {
        let key = self
            .public_key
            .get_or_try_init(|| async {
                let response: PublicKeyResponse = self.get_json("vapid-public-key").await?;
                log::debug!("[Api] Fetched VAPID public key");
                Ok::<_, ApiError>(response.public_key)
            })
            .await?;
        Ok(key.clone())
    }

    /// Registers a push subscription with the collaborator.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not 2xx.
    pub async fn register_subscription(&self, request: &SubscribeRequest) -> Result<(), ApiError> {
        let url = self.endpoint("subscribe")?;
        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                url: url.to_string(),
                source,
            })?;
        check_status(response).await?;
        Ok(())
    }

    /// Asks the collaborator to push an event to the given channels.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not 2xx or the
    /// response is not a trigger result.
    pub async fn trigger(&self, request: &TriggerRequest) -> Result<TriggerResponse, ApiError> {
        let url = self.endpoint("trigger")?;
        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                url: url.to_string(),
                source,
            })?;
        let response = check_status(response).await?;
        decode_json(response, &url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| ApiError::Request {
                url: url.to_string(),
                source,
            })?;
        let response = check_status(response).await?;
        decode_json(response, &url).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{}{path}: {e}", self.base)))
    }
}

/// Turn a non-2xx response into [`ApiError::Status`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let text = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown status").to_string()
    } else {
        truncate(body.trim(), ERROR_BODY_MAX_CHARS)
    };
    Err(ApiError::Status {
        status: status.as_u16(),
        text,
    })
}

async fn decode_json<T: DeserializeOwned>(
    response: reqwest::Response,
    url: &Url,
) -> Result<T, ApiError> {
    let bytes = response.bytes().await.map_err(|source| ApiError::Request {
        url: url.to_string(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trigger_request_single_channel() {
        let request = TriggerRequest::new("orders", "created", None);
        assert_eq!(request.channels, vec!["orders".to_string()]);
        assert_eq!(request.data, json!({}));
    }

    #[test]
    fn test_trigger_request_many_channels() {
        let request = TriggerRequest::new(
            vec!["a".to_string(), "b".to_string()],
            "e",
            Some(json!({"n": 1})),
        );
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"channels": ["a", "b"], "event": "e", "data": {"n": 1}})
        );
    }

    #[test]
    fn test_trigger_request_null_data() {
        let request = TriggerRequest::new(&["a", "b"][..], "e", Some(Value::Null));
        assert_eq!(request.data, json!({}));
        assert_eq!(request.channels.len(), 2);
    }

    #[test]
    fn test_trigger_response_optional_fields() {
        let response: TriggerResponse = serde_json::from_str(r#"{"ok":true}"#).unwrap();
        assert!(response.ok);
        assert_eq!(response.sent, None);

        let response: TriggerResponse =
            serde_json::from_str(r#"{"ok":true,"sent":2,"failed":1,"message":"done"}"#).unwrap();
        assert_eq!(response.sent, Some(2));
        assert_eq!(response.failed, Some(1));
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = ApiClient::new("http://localhost:3000/api", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000/api/");
        assert_eq!(
            client.endpoint("subscribe").unwrap().as_str(),
            "http://localhost:3000/api/subscribe"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = ApiClient::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("héllo", 2), "hé...");
    }
}
