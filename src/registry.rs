//! Per-tab channel registry and envelope dispatcher.
//!
//! A page registers interest in channels and binds callbacks to events on
//! them. Every [`DeliveryEnvelope`](crate::broadcast::DeliveryEnvelope) that
//! reaches the tab is matched against the bindings and the matching
//! callbacks run synchronously, one after the other.
//!
//! # Usage
//!
//! ```ignore
//! let mut registry = ChannelRegistry::new();
//! registry
//!     .subscribe("orders")
//!     .bind("created", |data, _| {
//!         println!("new order: {data}");
//!         Ok(())
//!     })
//!     .bind("cancelled", |_, _| Ok(()));
//!
//! // Any channel: the callback also receives the channel name.
//! registry.subscribe("*").bind("created", |data, channel| Ok(()));
//! ```
//!
//! # Isolation
//!
//! A callback that returns an error or panics is logged and skipped. The
//! remaining callbacks, the notification hook and later envelopes are not
//! affected.

use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::{broadcast, mpsc};

use crate::constants::{DEFAULT_CHANNEL, ENVELOPE_TYPE, WILDCARD_CHANNEL};

/// Callback bound to a channel event.
///
/// Receives the event data and, for wildcard bindings only, the name of the
/// channel the event arrived on.
pub type EventCallback = Box<dyn FnMut(&Value, Option<&str>) -> anyhow::Result<()> + Send>;

/// Page-wide hook called for every envelope that carries a title or body.
pub type NotificationHook = Box<dyn FnMut(&NotificationSummary) -> anyhow::Result<()> + Send>;

/// Channel half of a binding key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelSelector {
    /// Exactly this channel.
    Named(String),
    /// Every channel (`*`).
    Any,
}

impl ChannelSelector {
    /// Interpret a channel name, mapping `*` to [`ChannelSelector::Any`].
    #[must_use]
    pub fn parse(name: &str) -> Self {
        if name == WILDCARD_CHANNEL {
            Self::Any
        } else {
            Self::Named(name.to_string())
        }
    }

    /// Name as passed to [`ChannelRegistry::subscribe`].
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Any => WILDCARD_CHANNEL,
        }
    }
}

/// Argument passed to the [`NotificationHook`].
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationSummary {
    /// Envelope title.
    pub title: String,
    /// Envelope body.
    pub body: String,
    /// Event data, if the push used the structured form.
    pub data: Option<Value>,
}

/// Result of handing one message to [`ChannelRegistry::handle_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a delivery envelope.
    Ignored,
    /// The envelope was dispatched.
    Dispatched {
        /// Callbacks that ran.
        invoked: usize,
        /// Callbacks among those that errored or panicked.
        failed: usize,
        /// Whether the notification hook ran.
        hook_fired: bool,
    },
}

/// Channel subscriptions and event bindings of one page.
#[derive(Default)]
pub struct ChannelRegistry {
    /// Subscribed channel names in first-subscribe order.
    channels: Vec<String>,
    /// (channel, event) -> callbacks in registration order.
    bindings: HashMap<(ChannelSelector, String), Vec<EventCallback>>,
    hook: Option<NotificationHook>,
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.channels)
            .field("total_callbacks", &self.callback_count())
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}

impl ChannelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `name` and return a handle for binding events.
    ///
    /// Subscribing to a known channel again returns a handle to the same
    /// registration; existing bindings are kept.
    pub fn subscribe(&mut self, name: &str) -> Channel<'_> {
        if !self.channels.iter().any(|c| c == name) {
            log::debug!("[Registry] Subscribed to channel '{name}'");
            self.channels.push(name.to_string());
        }
        Channel {
            selector: ChannelSelector::parse(name),
            registry: self,
        }
    }

    /// Install (or replace) the page-wide notification hook.
    pub fn set_notification_hook<F>(&mut self, hook: F)
    where
        F: FnMut(&NotificationSummary) -> anyhow::Result<()> + Send + 'static,
    {
        self.hook = Some(Box::new(hook));
    }

    /// Remove the notification hook.
    pub fn clear_notification_hook(&mut self) {
        self.hook = None;
    }

    /// Subscribed channel names, deduplicated, in first-subscribe order.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.channels.clone()
    }

    /// Channels to register with the collaborator.
    ///
    /// Falls back to the implicit default channel when nothing was
    /// subscribed.
    #[must_use]
    pub fn subscription_channels(&self) -> Vec<String> {
        if self.channels.is_empty() {
            vec![DEFAULT_CHANNEL.to_string()]
        } else {
            self.channels()
        }
    }

    /// Total callbacks across every binding.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.bindings.values().map(Vec::len).sum()
    }

    /// Dispatch one message received over the bus or a direct post.
    ///
    /// Messages whose `type` is not the delivery envelope marker are
    /// ignored.
    pub fn handle_message(&mut self, message: &Value) -> DispatchOutcome {
        if message.get("type").and_then(Value::as_str) != Some(ENVELOPE_TYPE) {
            log::trace!("[Registry] Ignoring foreign message");
            return DispatchOutcome::Ignored;
        }

        let empty = Value::Object(serde_json::Map::new());
        let data = match message.get("data") {
            None | Some(Value::Null) => &empty,
            Some(data) => data,
        };
        let mut invoked = 0;
        let mut failed = 0;

        let event = message.get("event").and_then(Value::as_str);
        let channel = message.get("channel").and_then(Value::as_str);
        if let (Some(event), Some(channel)) = (event, channel) {
            let exact = (ChannelSelector::Named(channel.to_string()), event.to_string());
            let wildcard = (ChannelSelector::Any, event.to_string());

            if let Some(callbacks) = self.bindings.get_mut(&exact) {
                for callback in callbacks.iter_mut() {
                    invoked += 1;
                    if !invoke(callback, data, None, channel, event) {
                        failed += 1;
                    }
                }
            }
            if let Some(callbacks) = self.bindings.get_mut(&wildcard) {
                for callback in callbacks.iter_mut() {
                    invoked += 1;
                    if !invoke(callback, data, Some(channel), channel, event) {
                        failed += 1;
                    }
                }
            }
            log::debug!("[Registry] {channel}::{event} -> {invoked} callback(s)");
        }

        let hook_fired = self.fire_hook(message);
        DispatchOutcome::Dispatched {
            invoked,
            failed,
            hook_fired,
        }
    }

    fn fire_hook(&mut self, message: &Value) -> bool {
        let Some(hook) = self.hook.as_mut() else {
            return false;
        };
        let title = message.get("title").and_then(display_text);
        let body = message.get("body").and_then(display_text);
        if title.is_none() && body.is_none() {
            return false;
        }

        let summary = NotificationSummary {
            title: title.unwrap_or_default(),
            body: body.unwrap_or_default(),
            data: message.get("data").cloned(),
        };
        match catch_unwind(AssertUnwindSafe(|| hook(&summary))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("[Registry] Notification hook failed: {e:#}"),
            Err(panic) => log::error!(
                "[Registry] Notification hook panicked: {}",
                panic_message(panic.as_ref())
            ),
        }
        true
    }
}

fn display_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Run one callback, containing errors and panics. Returns `true` on success.
fn invoke(
    callback: &mut EventCallback,
    data: &Value,
    wildcard_channel: Option<&str>,
    channel: &str,
    event: &str,
) -> bool {
    match catch_unwind(AssertUnwindSafe(|| callback(data, wildcard_channel))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::error!("[Registry] Callback for {channel}::{event} failed: {e:#}");
            false
        }
        Err(panic) => {
            log::error!(
                "[Registry] Callback for {channel}::{event} panicked: {}",
                panic_message(panic.as_ref())
            );
            false
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Handle returned by [`ChannelRegistry::subscribe`].
pub struct Channel<'a> {
    registry: &'a mut ChannelRegistry,
    selector: ChannelSelector,
}

impl std::fmt::Debug for Channel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl Channel<'_> {
    /// Channel name this handle binds on.
    #[must_use]
    pub fn name(&self) -> &str {
        self.selector.as_str()
    }

    /// Attach `callback` to `event` on this channel.
    ///
    /// Binding the same event again adds another callback; nothing is
    /// replaced.
    pub fn bind<F>(self, event: &str, callback: F) -> Self
    where
        F: FnMut(&Value, Option<&str>) -> anyhow::Result<()> + Send + 'static,
    {
        log::debug!("[Registry] Bound {}::{event}", self.selector.as_str());
        self.registry
            .bindings
            .entry((self.selector.clone(), event.to_string()))
            .or_default()
            .push(Box::new(callback));
        self
    }
}

/// Feeds every message a tab receives into its registry.
///
/// A tab hears envelopes on two paths: the shared bus and direct posts
/// from the delivery agent. Both are drained until they close.
#[derive(Debug)]
pub struct TabListener {
    registry: ChannelRegistry,
    bus: Option<broadcast::Receiver<Value>>,
    inbox: Option<mpsc::UnboundedReceiver<Value>>,
}

impl TabListener {
    /// Listen with `registry` on whichever paths are available.
    pub fn new(
        registry: ChannelRegistry,
        bus: Option<broadcast::Receiver<Value>>,
        inbox: Option<mpsc::UnboundedReceiver<Value>>,
    ) -> Self {
        Self {
            registry,
            bus,
            inbox,
        }
    }

    /// Dispatch messages until both paths close, then hand the registry back.
    pub async fn run(mut self) -> ChannelRegistry {
        let mut bus_open = self.bus.is_some();
        let mut inbox_open = self.inbox.is_some();

        while bus_open || inbox_open {
            tokio::select! {
                received = next_bus(&mut self.bus), if bus_open => match received {
                    Ok(message) => {
                        self.registry.handle_message(&message);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("[Registry] Bus listener lagged, {skipped} message(s) lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => bus_open = false,
                },
                received = next_inbox(&mut self.inbox), if inbox_open => match received {
                    Some(message) => {
                        self.registry.handle_message(&message);
                    }
                    None => inbox_open = false,
                },
            }
        }

        log::debug!("[Registry] Tab listener stopped");
        self.registry
    }
}

async fn next_bus(
    bus: &mut Option<broadcast::Receiver<Value>>,
) -> Result<Value, broadcast::error::RecvError> {
    match bus {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_inbox(inbox: &mut Option<mpsc::UnboundedReceiver<Value>>) -> Option<Value> {
    match inbox {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
