//! Fan-out of decoded pushes to every open tab.
//!
//! Two redundant paths carry the same [`DeliveryEnvelope`]:
//!
//! ```text
//! TabBroadcaster
//!     ├── BroadcastBus ("web-push-alert")     tabs with a bus listener attached
//!     └── ClientDirectory::match_all          every window, controlled or not
//!             └── WindowClient::post_message
//! ```
//!
//! Both paths always run and fail independently. A tab listening on both
//! receives the envelope twice; receivers treat delivery as best-effort.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::constants::ENVELOPE_TYPE;
use crate::payload::InboundPayload;
use crate::platform::{BroadcastBus, ClientDirectory, ClientQuery};

/// Message posted to tabs for every delivered push.
///
/// Serializes as `{"type": "push-received", "title": ..., "body": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEnvelope {
    /// Always [`ENVELOPE_TYPE`].
    #[serde(rename = "type")]
    pub kind: String,
    /// The decoded push.
    #[serde(flatten)]
    pub payload: InboundPayload,
}

impl DeliveryEnvelope {
    /// Wrap a decoded payload.
    pub fn new(payload: InboundPayload) -> Self {
        Self {
            kind: ENVELOPE_TYPE.to_string(),
            payload,
        }
    }
}

/// Result of one delivery path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathOutcome {
    /// Posted to this many receivers (the bus counts as one).
    Delivered(usize),
    /// The mechanism is not available in this context.
    Unsupported,
    /// The path failed before reaching anyone.
    Failed(String),
}

/// Outcome of both delivery paths for one push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Shared bus path.
    pub bus: PathOutcome,
    /// Direct per-client path.
    pub clients: PathOutcome,
}

/// Posts envelopes on the shared bus and to each open client.
pub struct TabBroadcaster {
    bus: Option<Arc<dyn BroadcastBus>>,
    clients: Arc<dyn ClientDirectory>,
}

impl std::fmt::Debug for TabBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabBroadcaster")
            .field("bus", &self.bus.as_ref().map(|b| b.name().to_string()))
            .finish_non_exhaustive()
    }
}

impl TabBroadcaster {
    /// Create a broadcaster. `bus` is `None` where no broadcast bus exists.
    pub fn new(bus: Option<Arc<dyn BroadcastBus>>, clients: Arc<dyn ClientDirectory>) -> Self {
        Self { bus, clients }
    }

    /// Deliver `payload` on both paths.
    pub async fn broadcast(&self, payload: &InboundPayload) -> BroadcastReport {
        let envelope = DeliveryEnvelope::new(payload.clone());
        let message = match serde_json::to_value(&envelope) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("[Broadcast] Envelope serialization failed: {e}");
                let reason = e.to_string();
                return BroadcastReport {
                    bus: PathOutcome::Failed(reason.clone()),
                    clients: PathOutcome::Failed(reason),
                };
            }
        };

        let bus = self.post_bus(&message).await;
        let clients = self.post_clients(&message).await;
        log::debug!("[Broadcast] bus={bus:?} clients={clients:?}");
        BroadcastReport { bus, clients }
    }

    async fn post_bus(&self, message: &serde_json::Value) -> PathOutcome {
        let Some(bus) = &self.bus else {
            return PathOutcome::Unsupported;
        };
        match bus.post(message).await {
            Ok(()) => PathOutcome::Delivered(1),
            Err(e) => {
                log::debug!("[Broadcast] Bus '{}' post failed: {e}", bus.name());
                PathOutcome::Failed(e.to_string())
            }
        }
    }

    async fn post_clients(&self, message: &serde_json::Value) -> PathOutcome {
        let query = ClientQuery {
            include_uncontrolled: true,
        };
        let clients = match self.clients.match_all(query).await {
            Ok(clients) => clients,
            Err(e) => {
                log::debug!("[Broadcast] Client enumeration failed: {e}");
                return PathOutcome::Failed(e.to_string());
            }
        };

        let mut delivered = 0;
        for client in &clients {
            match client.post_message(message).await {
                Ok(()) => delivered += 1,
                Err(e) => log::debug!("[Broadcast] Post to {} failed: {e}", client.id()),
            }
        }
        PathOutcome::Delivered(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::local::{LocalBroadcastBus, LocalClients, LocalWindowClient};
    use crate::platform::{PlatformError, WindowClient};
    use async_trait::async_trait;
    use serde_json::json;

    fn payload() -> InboundPayload {
        InboundPayload {
            title: "Hi".to_string(),
            body: "there".to_string(),
            icon: None,
            event: Some("test".to_string()),
            channel: Some("default".to_string()),
            data: Some(json!({"title": "Hi"})),
        }
    }

    struct BrokenDirectory;

    #[async_trait]
    impl ClientDirectory for BrokenDirectory {
        async fn match_all(
            &self,
            _query: ClientQuery,
        ) -> Result<Vec<Arc<dyn WindowClient>>, PlatformError> {
            Err(PlatformError::Failed("matchAll threw".to_string()))
        }

        async fn open_window(&self, _url: &str) -> Result<(), PlatformError> {
            Ok(())
        }
    }

    #[test]
    fn test_envelope_shape() {
        let value = serde_json::to_value(DeliveryEnvelope::new(payload())).unwrap();
        assert_eq!(value["type"], "push-received");
        assert_eq!(value["title"], "Hi");
        assert_eq!(value["event"], "test");
        assert_eq!(value["channel"], "default");
        assert!(value.get("icon").is_none());
    }

    #[tokio::test]
    async fn test_both_paths_deliver() {
        let bus = Arc::new(LocalBroadcastBus::new("web-push-alert", 8));
        let mut bus_rx = bus.subscribe();
        let clients = Arc::new(LocalClients::new());
        let (tab, mut tab_rx) = LocalWindowClient::new("tab", false);
        clients.add(tab);

        let broadcaster = TabBroadcaster::new(Some(bus), clients);
        let report = broadcaster.broadcast(&payload()).await;

        assert_eq!(report.bus, PathOutcome::Delivered(1));
        assert_eq!(report.clients, PathOutcome::Delivered(1));
        assert_eq!(bus_rx.recv().await.unwrap()["type"], "push-received");
        assert_eq!(tab_rx.recv().await.unwrap()["body"], "there");
    }

    #[tokio::test]
    async fn test_client_path_runs_without_bus() {
        let clients = Arc::new(LocalClients::new());
        let (tab, mut tab_rx) = LocalWindowClient::new("tab", true);
        clients.add(tab);

        let report = TabBroadcaster::new(None, clients)
            .broadcast(&payload())
            .await;

        assert_eq!(report.bus, PathOutcome::Unsupported);
        assert_eq!(report.clients, PathOutcome::Delivered(1));
        assert!(tab_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_bus_path_runs_when_enumeration_fails() {
        let bus = Arc::new(LocalBroadcastBus::new("web-push-alert", 8));
        let mut bus_rx = bus.subscribe();

        let report = TabBroadcaster::new(Some(bus), Arc::new(BrokenDirectory))
            .broadcast(&payload())
            .await;

        assert_eq!(report.bus, PathOutcome::Delivered(1));
        assert!(matches!(report.clients, PathOutcome::Failed(_)));
        assert!(bus_rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_one_closed_tab_does_not_block_others() {
        let clients = Arc::new(LocalClients::new());
        let (closing, closing_rx) = LocalWindowClient::new("closing", true);
        let (open, mut open_rx) = LocalWindowClient::new("open", true);
        clients.add(Arc::clone(&closing));
        clients.add(open);
        drop(closing_rx);

        let report = TabBroadcaster::new(None, clients)
            .broadcast(&payload())
            .await;

        assert_eq!(report.clients, PathOutcome::Delivered(1));
        assert!(open_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_no_open_tabs() {
        let report = TabBroadcaster::new(None, Arc::new(LocalClients::new()))
            .broadcast(&payload())
            .await;
        assert_eq!(report.clients, PathOutcome::Delivered(0));
    }
}
