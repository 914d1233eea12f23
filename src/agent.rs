//! Background delivery agent.
//!
//! Receives push messages independently of any open tab and runs each one
//! through the same fixed pipeline:
//!
//! ```text
//! PushMessage ──► decode ──► present ──► broadcast ──► completion token
//!                  (never     (retry      (bus + every
//!                   fails)    w/o icon)    client)
//! ```
//!
//! Messages are handled one at a time in arrival order. A message's
//! completion token resolves only after presentation and both broadcast
//! paths finished, including their fallbacks.
//!
//! # Usage
//!
//! ```ignore
//! let handle = DeliveryAgent::new(decoder, presenter, broadcaster, click).spawn();
//! let report = handle.deliver(Some(RawPushData::from(body))).await?;
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::broadcast::{BroadcastReport, TabBroadcaster};
use crate::config::Config;
use crate::constants::BROADCAST_CHANNEL_NAME;
use crate::payload::{InboundPayload, PayloadDecoder};
use crate::platform::{
    BroadcastBus, ClientDirectory, NotificationSurface, PushData, RawPushData,
};
use crate::presenter::{ClickOutcome, NotificationClick, NotificationPresenter, PresentOutcome};

/// Buffered push messages before senders wait.
const INBOX_CAPACITY: usize = 64;

/// One inbound push as delivered by the platform.
#[derive(Debug)]
pub struct PushMessage {
    /// Push body; `None` when the push carried no data.
    pub data: Option<RawPushData>,
    /// Resolved once the message is fully handled.
    pub done: Option<oneshot::Sender<DeliveryReport>>,
}

impl PushMessage {
    /// A message without a completion token.
    pub fn new(data: Option<RawPushData>) -> Self {
        Self { data, done: None }
    }

    /// A message plus the receiver of its completion token.
    pub fn with_completion(data: Option<RawPushData>) -> (Self, oneshot::Receiver<DeliveryReport>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                data,
                done: Some(tx),
            },
            rx,
        )
    }
}

/// What happened to one push.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    /// The decoded payload.
    pub payload: InboundPayload,
    /// Presentation result.
    pub presented: PresentOutcome,
    /// Broadcast result for both paths.
    pub broadcast: BroadcastReport,
}

/// Decodes, presents and broadcasts inbound pushes.
#[derive(Debug)]
pub struct DeliveryAgent {
    decoder: PayloadDecoder,
    presenter: NotificationPresenter,
    broadcaster: TabBroadcaster,
    click: NotificationClick,
}

impl DeliveryAgent {
    /// Assemble an agent from its stages.
    pub fn new(
        decoder: PayloadDecoder,
        presenter: NotificationPresenter,
        broadcaster: TabBroadcaster,
        click: NotificationClick,
    ) -> Self {
        Self {
            decoder,
            presenter,
            broadcaster,
            click,
        }
    }

    /// Build an agent for the configured scope on top of platform bindings.
    pub fn from_config(
        config: &Config,
        surface: Arc<dyn NotificationSurface>,
        bus: Option<Arc<dyn BroadcastBus>>,
        clients: Arc<dyn ClientDirectory>,
    ) -> Result<Self> {
        let decoder = PayloadDecoder::for_scope(&config.scope, &config.icon_path)
            .context("Failed to build payload decoder")?;
        if let Some(bus) = &bus {
            if bus.name() != BROADCAST_CHANNEL_NAME {
                log::warn!(
                    "[Agent] Bus '{}' is not '{BROADCAST_CHANNEL_NAME}'; tabs may not hear it",
                    bus.name()
                );
            }
        }

        Ok(Self::new(
            decoder,
            NotificationPresenter::new(Arc::clone(&surface)),
            TabBroadcaster::new(bus, Arc::clone(&clients)),
            NotificationClick::new(surface, clients, config.start_url.clone()),
        ))
    }

    /// Run one push through decode, present and broadcast.
    pub async fn handle_push(&self, data: Option<&dyn PushData>) -> DeliveryReport {
        let payload = self.decoder.decode(data);
        log::info!(
            "[Agent] Push received: '{}' (event={:?}, channel={:?})",
            payload.title,
            payload.event,
            payload.channel
        );

        let presented = self.presenter.present(&payload).await;
        let broadcast = self.broadcaster.broadcast(&payload).await;

        DeliveryReport {
            payload,
            presented,
            broadcast,
        }
    }

    /// React to a click on a notification this agent displayed.
    pub async fn handle_click(&self, tag: &str) -> ClickOutcome {
        let outcome = self.click.handle(tag).await;
        log::info!("[Agent] Notification {tag} clicked: {outcome:?}");
        outcome
    }

    /// Process messages in arrival order until every sender is gone.
    pub async fn run(&self, mut rx: mpsc::Receiver<PushMessage>) {
        log::debug!("[Agent] Delivery loop started");

        while let Some(message) = rx.recv().await {
            let data = message.data.as_ref().map(|d| d as &dyn PushData);
            let report = self.handle_push(data).await;
            if let Some(done) = message.done {
                let _ = done.send(report);
            }
        }

        log::debug!("[Agent] Delivery loop stopped");
    }

    /// Start the delivery loop on a tokio task.
    pub fn spawn(self) -> AgentHandle {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let task = tokio::spawn(async move { self.run(rx).await });
        AgentHandle { tx, task }
    }
}

/// Sending side of a spawned [`DeliveryAgent`].
#[derive(Debug)]
pub struct AgentHandle {
    tx: mpsc::Sender<PushMessage>,
    task: JoinHandle<()>,
}

impl AgentHandle {
    /// Queue a push without waiting for it to be handled.
    pub async fn enqueue(&self, data: Option<RawPushData>) -> Result<()> {
        self.tx
            .send(PushMessage::new(data))
            .await
            .map_err(|_stopped| anyhow::anyhow!("delivery agent stopped"))
    }

    /// Queue a push and wait until it is fully handled.
    pub async fn deliver(&self, data: Option<RawPushData>) -> Result<DeliveryReport> {
        let (message, done) = PushMessage::with_completion(data);
        self.tx
            .send(message)
            .await
            .map_err(|_stopped| anyhow::anyhow!("delivery agent stopped"))?;
        done.await.context("delivery agent dropped the message")
    }

    /// Close the inbox and wait for queued messages to drain.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.tx);
        self.task.await.context("delivery loop panicked")
    }
}
