//! Push subscription lifecycle.
//!
//! Establishing a subscription is a linear sequence with no automatic
//! retries:
//!
//! ```text
//! Idle ─► PermissionRequested ─► KeyFetched ─► PlatformSubscribed ─► Registered ─► Active
//!   │             │                  │                 │                  │
//!   └─────────────┴──────────────────┴─────────────────┴──────────────────┴──► Failed(reason)
//! ```
//!
//! Any error ends the attempt in `Failed` and is returned to the caller,
//! which decides whether to run the whole lifecycle again.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::sync::Arc;

use crate::api::{ApiClient, SubscribeRequest, SubscriptionKeys};
use crate::constants::DEFAULT_CHANNEL;
use crate::error::LifecycleError;
use crate::platform::{KeyMaterial, Permission, PermissionPrompt, PushManager};

/// Position in the subscription sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing attempted yet.
    Idle,
    /// Notification permission was requested.
    PermissionRequested,
    /// The collaborator's public key is known.
    KeyFetched,
    /// The platform issued a push subscription.
    PlatformSubscribed,
    /// The collaborator accepted the subscription.
    Registered,
    /// Subscription complete.
    Active,
    /// The attempt ended with an error.
    Failed(String),
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::PermissionRequested => write!(f, "permission-requested"),
            Self::KeyFetched => write!(f, "key-fetched"),
            Self::PlatformSubscribed => write!(f, "platform-subscribed"),
            Self::Registered => write!(f, "registered"),
            Self::Active => write!(f, "active"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// A subscription the collaborator now knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredSubscription {
    /// Push service endpoint.
    pub endpoint: String,
    /// Normalized encryption keys.
    pub keys: SubscriptionKeys,
    /// Channels registered for this subscription.
    pub channels: Vec<String>,
}

/// Drives one page's subscription from permission prompt to registration.
pub struct SubscriptionLifecycle {
    prompt: Arc<dyn PermissionPrompt>,
    push: Arc<dyn PushManager>,
    api: Arc<ApiClient>,
    state: LifecycleState,
    history: Vec<LifecycleState>,
}

impl std::fmt::Debug for SubscriptionLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionLifecycle")
            .field("state", &self.state)
            .field("api", &self.api.base_url())
            .finish_non_exhaustive()
    }
}

impl SubscriptionLifecycle {
    /// Create a lifecycle in the `Idle` state.
    pub fn new(
        prompt: Arc<dyn PermissionPrompt>,
        push: Arc<dyn PushManager>,
        api: Arc<ApiClient>,
    ) -> Self {
        Self {
            prompt,
            push,
            api,
            state: LifecycleState::Idle,
            history: vec![LifecycleState::Idle],
        }
    }

    /// Current state.
    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    /// Every state of the latest attempt, oldest first.
    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    /// Run the whole sequence for `channels`.
    ///
    /// `channels` are deduplicated in order; an empty list registers the
    /// default channel.
    ///
    /// # Errors
    ///
    /// Returns the error of the first step that failed. The lifecycle is
    /// then in [`LifecycleState::Failed`].
    pub async fn run(
        &mut self,
        channels: &[String],
    ) -> Result<RegisteredSubscription, LifecycleError> {
        self.state = LifecycleState::Idle;
        self.history = vec![LifecycleState::Idle];

        match self.attempt(channels).await {
            Ok(subscription) => Ok(subscription),
            Err(e) => {
                log::warn!("[Lifecycle] Subscription failed: {e}");
                self.transition(LifecycleState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn attempt(
        &mut self,
        channels: &[String],
    ) -> Result<RegisteredSubscription, LifecycleError> {
        self.transition(LifecycleState::PermissionRequested);
        let permission = match self.prompt.request_permission().await {
            Ok(permission) => permission,
            Err(e) => {
                log::debug!("[Lifecycle] Permission prompt unavailable: {e}");
                Permission::Denied
            }
        };
        if permission != Permission::Granted {
            return Err(LifecycleError::PermissionDenied(permission));
        }

        let public_key = self
            .api
            .vapid_public_key()
            .await
            .map_err(LifecycleError::KeyFetch)?;
        let application_server_key = decode_base64url(&public_key)?;
        self.transition(LifecycleState::KeyFetched);

        let subscription = self
            .push
            .subscribe(&application_server_key)
            .await
            .map_err(LifecycleError::PlatformSubscribe)?;
        self.transition(LifecycleState::PlatformSubscribed);

        let request = SubscribeRequest {
            endpoint: subscription.endpoint,
            keys: SubscriptionKeys {
                p256dh: normalize_key(&subscription.p256dh)?,
                auth: normalize_key(&subscription.auth)?,
            },
            channels: normalize_channels(channels),
        };
        self.api
            .register_subscription(&request)
            .await
            .map_err(LifecycleError::Registration)?;
        self.transition(LifecycleState::Registered);

        log::info!(
            "[Lifecycle] Subscribed to {} channel(s): {}",
            request.channels.len(),
            request.channels.join(", ")
        );
        self.transition(LifecycleState::Active);

        Ok(RegisteredSubscription {
            endpoint: request.endpoint,
            keys: request.keys,
            channels: request.channels,
        })
    }

    fn transition(&mut self, next: LifecycleState) {
        log::info!("[Lifecycle] {} -> {next}", self.state);
        self.state = next.clone();
        self.history.push(next);
    }
}

/// Decode base64url text, tolerating padding and the standard alphabet.
pub fn decode_base64url(text: &str) -> Result<Vec<u8>, LifecycleError> {
    let normalized: String = text
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    let bytes = URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| LifecycleError::InvalidKey(e.to_string()))?;
    if bytes.is_empty() {
        return Err(LifecycleError::InvalidKey("empty key".to_string()));
    }
    Ok(bytes)
}

/// Render subscription key material as unpadded base64url.
pub fn normalize_key(key: &KeyMaterial) -> Result<String, LifecycleError> {
    match key {
        KeyMaterial::Raw(bytes) => Ok(URL_SAFE_NO_PAD.encode(bytes)),
        KeyMaterial::Encoded(text) => Ok(URL_SAFE_NO_PAD.encode(decode_base64url(text)?)),
    }
}

/// Deduplicate `channels` in order, defaulting to the implicit channel.
pub fn normalize_channels(channels: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(channels.len());
    for channel in channels {
        if !unique.contains(channel) {
            unique.push(channel.clone());
        }
    }
    if unique.is_empty() {
        unique.push(DEFAULT_CHANNEL.to_string());
    }
    unique
}
