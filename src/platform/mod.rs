//! Browser platform seams.
//!
//! The delivery agent and the subscription lifecycle never touch a browser
//! API directly. Every capability they need is one of the traits below, so
//! the same pipeline runs against a service worker binding, the in-process
//! implementations in [`local`], or test doubles.
//!
//! # Capabilities
//!
//! ```text
//! delivery agent                       page
//! ──────────────                       ────
//! PushData            (push body)      PermissionPrompt (Notification.requestPermission)
//! NotificationSurface (showNotification) PushManager    (pushManager.subscribe)
//! BroadcastBus        (BroadcastChannel)
//! ClientDirectory     (clients.matchAll / openWindow)
//! WindowClient        (client.postMessage / focus)
//! ```

pub mod local;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub use crate::error::PlatformError;

/// Body of one inbound push message.
///
/// Mirrors the two accessors a push event exposes: raw text and a
/// JSON-decoding shortcut. Either may fail independently.
pub trait PushData: Send + Sync {
    /// Payload as UTF-8 text. Fails on invalid UTF-8.
    fn text(&self) -> Result<String, PlatformError>;

    /// Payload as text with invalid UTF-8 sequences replaced by U+FFFD.
    fn text_lossy(&self) -> Result<String, PlatformError> {
        self.text()
    }

    /// Payload decoded as JSON by the platform.
    fn json(&self) -> Result<Value, PlatformError>;
}

/// Push body held as owned bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPushData {
    bytes: Vec<u8>,
}

impl RawPushData {
    /// Wrap raw bytes received from the push service.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<&str> for RawPushData {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl PushData for RawPushData {
    fn text(&self) -> Result<String, PlatformError> {
        String::from_utf8(self.bytes.clone())
            .map_err(|e| PlatformError::Failed(format!("payload is not UTF-8: {e}")))
    }

    fn text_lossy(&self) -> Result<String, PlatformError> {
        Ok(String::from_utf8_lossy(&self.bytes).into_owned())
    }

    fn json(&self) -> Result<Value, PlatformError> {
        serde_json::from_slice(&self.bytes)
            .map_err(|e| PlatformError::Failed(format!("payload is not JSON: {e}")))
    }
}

/// Options passed to the platform when displaying a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    /// Notification body text.
    pub body: String,
    /// Icon URL. Omitted on the reduced-feature retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Unique tag so notifications never collapse into each other.
    pub tag: String,
    /// Always `false`: notifications dismiss on their own.
    pub require_interaction: bool,
}

/// System notification display.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    /// Display a notification.
    async fn show_notification(
        &self,
        title: &str,
        options: &NotificationOptions,
    ) -> Result<(), PlatformError>;

    /// Close a displayed notification by tag.
    async fn close_notification(&self, tag: &str) -> Result<(), PlatformError>;
}

/// Shared cross-tab bus (a `BroadcastChannel` with a fixed name).
#[async_trait]
pub trait BroadcastBus: Send + Sync {
    /// Bus identifier.
    fn name(&self) -> &str;

    /// Publish a message to every listener currently attached.
    async fn post(&self, message: &Value) -> Result<(), PlatformError>;
}

/// Filter for [`ClientDirectory::match_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientQuery {
    /// Include tabs this delivery agent does not control yet.
    pub include_uncontrolled: bool,
}

/// One open browser window under the delivery agent's origin.
#[async_trait]
pub trait WindowClient: Send + Sync {
    /// Platform client identifier.
    fn id(&self) -> &str;

    /// Post a message directly to this window.
    async fn post_message(&self, message: &Value) -> Result<(), PlatformError>;

    /// Bring this window to the foreground.
    async fn focus(&self) -> Result<(), PlatformError>;
}

/// Enumeration of open windows.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// All reachable window clients matching `query`.
    async fn match_all(
        &self,
        query: ClientQuery,
    ) -> Result<Vec<Arc<dyn WindowClient>>, PlatformError>;

    /// Open a new window at `url`.
    async fn open_window(&self, url: &str) -> Result<(), PlatformError>;
}

/// Result of a notification permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Notifications allowed.
    Granted,
    /// Notifications blocked by the user.
    Denied,
    /// The user dismissed the prompt without choosing.
    Default,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Granted => write!(f, "granted"),
            Self::Denied => write!(f, "denied"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Notification permission prompt.
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    /// Ask the user for notification permission.
    async fn request_permission(&self) -> Result<Permission, PlatformError>;
}

/// Per-subscription key as handed out by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// Already text-encoded (a subscription's JSON form).
    Encoded(String),
    /// Raw key bytes (`getKey()`).
    Raw(Vec<u8>),
}

/// Platform-issued push subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSubscription {
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Browser's P-256 ECDH public key.
    pub p256dh: KeyMaterial,
    /// Shared auth secret.
    pub auth: KeyMaterial,
}

/// Platform push subscription manager.
#[async_trait]
pub trait PushManager: Send + Sync {
    /// Create (or return the existing) push subscription for the given
    /// application server key.
    async fn subscribe(
        &self,
        application_server_key: &[u8],
    ) -> Result<PlatformSubscription, PlatformError>;
}
