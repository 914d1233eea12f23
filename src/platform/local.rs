//! In-process implementations of the cross-tab platform seams.
//!
//! `LocalBroadcastBus` fans messages out over a tokio broadcast channel and
//! `LocalClients` keeps one mpsc inbox per open tab. Together they let the
//! delivery agent and any number of tab registries run in one process.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, PoisonError,
};
use tokio::sync::{broadcast, mpsc};

use super::{BroadcastBus, ClientDirectory, ClientQuery, PlatformError, WindowClient};

/// Broadcast bus backed by a tokio broadcast channel.
///
/// Posting with no listener attached is not an error; the message is dropped.
#[derive(Debug)]
pub struct LocalBroadcastBus {
    name: String,
    sender: broadcast::Sender<Value>,
}

impl LocalBroadcastBus {
    /// Create a bus with the given name and per-listener buffer capacity.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            name: name.into(),
            sender,
        }
    }

    /// Attach a new listener that receives every future message.
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.sender.subscribe()
    }

    /// Number of listeners currently attached.
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl BroadcastBus for LocalBroadcastBus {
    fn name(&self) -> &str {
        &self.name
    }

    async fn post(&self, message: &Value) -> Result<(), PlatformError> {
        let _ = self.sender.send(message.clone());
        Ok(())
    }
}

/// One open tab with a direct-message inbox.
#[derive(Debug)]
pub struct LocalWindowClient {
    id: String,
    controlled: bool,
    inbox: mpsc::UnboundedSender<Value>,
    focus_count: AtomicUsize,
}

impl LocalWindowClient {
    /// Create a tab. The returned receiver is the tab's `message` listener.
    pub fn new(
        id: impl Into<String>,
        controlled: bool,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Value>) {
        let (inbox, rx) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            id: id.into(),
            controlled,
            inbox,
            focus_count: AtomicUsize::new(0),
        });
        (client, rx)
    }

    /// Whether the delivery agent controls this tab.
    pub fn is_controlled(&self) -> bool {
        self.controlled
    }

    /// Whether the tab has gone away (its inbox receiver was dropped).
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }

    /// How many times this tab was focused.
    pub fn focus_count(&self) -> usize {
        self.focus_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WindowClient for LocalWindowClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn post_message(&self, message: &Value) -> Result<(), PlatformError> {
        self.inbox
            .send(message.clone())
            .map_err(|_closed| PlatformError::Failed(format!("client {} is closed", self.id)))
    }

    async fn focus(&self) -> Result<(), PlatformError> {
        self.focus_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Directory of open tabs under one origin.
#[derive(Debug, Default)]
pub struct LocalClients {
    clients: Mutex<Vec<Arc<LocalWindowClient>>>,
    opened: Mutex<Vec<String>>,
}

impl LocalClients {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open tab. A tab with the same id is replaced and closed
    /// tabs are dropped.
    pub fn add(&self, client: Arc<LocalWindowClient>) {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients.retain(|c| c.id != client.id && !c.is_closed());
        clients.push(client);
    }

    /// Forget a tab.
    pub fn remove(&self, id: &str) {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|c| c.id != id);
    }

    /// Number of tabs currently tracked.
    pub fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no tab is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// URLs passed to [`ClientDirectory::open_window`], oldest first.
    pub fn opened_windows(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ClientDirectory for LocalClients {
    async fn match_all(
        &self,
        query: ClientQuery,
    ) -> Result<Vec<Arc<dyn WindowClient>>, PlatformError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients.retain(|c| !c.is_closed());
        Ok(clients
            .iter()
            .filter(|c| query.include_uncontrolled || c.controlled)
            .map(|c| Arc::clone(c) as Arc<dyn WindowClient>)
            .collect())
    }

    async fn open_window(&self, url: &str) -> Result<(), PlatformError> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_bus_delivers_to_every_listener() {
        let bus = LocalBroadcastBus::new("web-push-alert", 8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.post(&json!({"n": 1})).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap()["n"], 1);
        assert_eq!(rx2.recv().await.unwrap()["n"], 1);
        assert_eq!(bus.name(), "web-push-alert");
    }

    #[tokio::test]
    async fn test_bus_post_without_listeners_is_ok() {
        let bus = LocalBroadcastBus::new("web-push-alert", 8);
        assert_eq!(bus.listener_count(), 0);
        assert!(bus.post(&json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn test_match_all_respects_uncontrolled_filter() {
        let clients = LocalClients::new();
        let (controlled, _rx1) = LocalWindowClient::new("a", true);
        let (uncontrolled, _rx2) = LocalWindowClient::new("b", false);
        clients.add(controlled);
        clients.add(uncontrolled);

        let only_controlled = clients.match_all(ClientQuery::default()).await.unwrap();
        assert_eq!(only_controlled.len(), 1);

        let all = clients
            .match_all(ClientQuery {
                include_uncontrolled: true,
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_closed_tab_is_not_enumerated() {
        let clients = LocalClients::new();
        let (tab, rx) = LocalWindowClient::new("gone", true);
        clients.add(Arc::clone(&tab));
        drop(rx);

        assert!(tab.is_closed());
        assert!(tab.post_message(&json!({})).await.is_err());
        assert!(clients
            .match_all(ClientQuery::default())
            .await
            .unwrap()
            .is_empty());
        assert!(clients.is_empty());
    }

    #[tokio::test]
    async fn test_closed_tabs_are_dropped_on_add() {
        let clients = LocalClients::new();
        for n in 0..3 {
            let (tab, rx) = LocalWindowClient::new(format!("tab-{n}"), true);
            clients.add(tab);
            drop(rx);
        }
        let (live, _rx) = LocalWindowClient::new("live", true);
        clients.add(live);

        assert_eq!(clients.len(), 1);
    }

    #[tokio::test]
    async fn test_open_window_is_recorded() {
        let clients = LocalClients::new();
        clients.open_window("/").await.unwrap();
        assert_eq!(clients.opened_windows(), vec!["/".to_string()]);
    }
}
