//! pushnotif - channel/event pub-sub delivered over Web Push.
//!
//! A collaborator server fans events out as push messages; this crate covers
//! everything from "a push physically arrived" to "page callbacks ran", plus
//! establishing the push subscription in the first place.
//!
//! # Architecture
//!
//! ```text
//!                     ┌──────────────── delivery agent ────────────────┐
//! push message ──────►│ PayloadDecoder ─► NotificationPresenter        │
//!                     │                └► TabBroadcaster ──┬── bus ────┼──► TabListener ─► ChannelRegistry ─► callbacks
//!                     └────────────────────────────────────┴── direct ─┘
//!
//! page ─► SubscriptionLifecycle ─► PermissionPrompt ─► ApiClient (/vapid-public-key)
//!                                ─► PushManager     ─► ApiClient (/subscribe)
//! ```
//!
//! Downstream of an arrived push everything degrades instead of failing;
//! the subscription lifecycle fails loudly to its caller.
//!
//! # Modules
//!
//! - [`payload`] - Push body decoding with guaranteed defaults
//! - [`presenter`] - System notifications and click handling
//! - [`broadcast`] - Delivery envelope fan-out to open tabs
//! - [`agent`] - The background delivery loop
//! - [`registry`] - Per-tab channel subscriptions and event dispatch
//! - [`lifecycle`] - Permission, key fetch, platform subscribe, registration
//! - [`api`] - Collaborator HTTP client
//! - [`platform`] - Browser capability traits and in-process implementations
//! - [`config`] - Configuration loading/saving

// Library modules
pub mod agent;
pub mod api;
pub mod broadcast;
pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod lifecycle;
pub mod payload;
pub mod platform;
pub mod presenter;
pub mod registry;

// Re-export commonly used types
pub use agent::{AgentHandle, DeliveryAgent, DeliveryReport, PushMessage};
pub use api::{ApiClient, SubscribeRequest, TriggerRequest, TriggerResponse};
pub use broadcast::{BroadcastReport, DeliveryEnvelope, PathOutcome, TabBroadcaster};
pub use config::Config;
pub use error::{ApiError, LifecycleError, PlatformError};
pub use lifecycle::{LifecycleState, RegisteredSubscription, SubscriptionLifecycle};
pub use payload::{InboundPayload, PayloadDecoder};
pub use presenter::{NotificationClick, NotificationPresenter, PresentOutcome};
pub use registry::{ChannelRegistry, DispatchOutcome, NotificationSummary, TabListener};
