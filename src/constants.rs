//! Fixed identifiers and defaults shared by the delivery agent and tabs.
//!
//! # Categories
//!
//! - **Wire identifiers**: names both sides of the tab fan-out must agree on
//! - **Display defaults**: text and icon used when a push payload is unusable
//! - **Network**: collaborator request defaults

use std::time::Duration;

// ============================================================================
// Wire identifiers
// ============================================================================

/// Name of the shared broadcast bus every tab listens on.
pub const BROADCAST_CHANNEL_NAME: &str = "web-push-alert";

/// Discriminator carried in the `type` field of every Delivery Envelope.
///
/// Tabs ignore bus/message traffic whose `type` differs.
pub const ENVELOPE_TYPE: &str = "push-received";

/// Channel registered with the collaborator when page code subscribed to none.
pub const DEFAULT_CHANNEL: &str = "default";

/// Channel name that binds a callback to an event on every channel.
pub const WILDCARD_CHANNEL: &str = "*";

/// Prefix of the per-push notification tag.
pub const NOTIFICATION_TAG_PREFIX: &str = "web-push";

// ============================================================================
// Display defaults
// ============================================================================

/// Title shown when the payload carried none.
pub const DEFAULT_TITLE: &str = "Notification";

/// Body shown when the payload carried none.
pub const DEFAULT_BODY: &str = "New message.";

/// Same-origin icon asset, resolved against the delivery agent's scope.
pub const DEFAULT_ICON_PATH: &str = "icon-default.png";

/// Window opened by a notification click when no tab is open.
pub const DEFAULT_START_URL: &str = "/";

// ============================================================================
// Network
// ============================================================================

/// Base URL of the collaborator when nothing is configured.
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:3000";

/// Registration scope of the delivery agent when nothing is configured.
pub const DEFAULT_SCOPE: &str = "http://127.0.0.1:3000/";

/// HTTP client request timeout for collaborator calls.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum characters of an error response body kept in error messages.
pub const ERROR_BODY_MAX_CHARS: usize = 200;
