//! System notification display for decoded pushes.
//!
//! Presentation is best-effort: a failed display is retried once without
//! the icon, and a second failure is logged and dropped. Nothing here ever
//! returns an error to the delivery agent.

use chrono::Utc;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::constants::NOTIFICATION_TAG_PREFIX;
use crate::payload::InboundPayload;
use crate::platform::{ClientDirectory, ClientQuery, NotificationOptions, NotificationSurface};

static TAG_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fresh notification tag: `web-push-<unix millis>-<counter>`.
pub fn unique_tag() -> String {
    format!(
        "{NOTIFICATION_TAG_PREFIX}-{}-{}",
        Utc::now().timestamp_millis(),
        TAG_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// How a presentation attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Displayed with every requested field.
    Shown,
    /// The first attempt failed; displayed without the icon.
    ShownWithoutIcon,
    /// Both attempts failed.
    Dropped(String),
}

impl PresentOutcome {
    /// Whether a notification is visible.
    pub fn is_shown(&self) -> bool {
        !matches!(self, Self::Dropped(_))
    }
}

/// Shows one platform notification per decoded push.
pub struct NotificationPresenter {
    surface: Arc<dyn NotificationSurface>,
}

impl std::fmt::Debug for NotificationPresenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationPresenter").finish_non_exhaustive()
    }
}

impl NotificationPresenter {
    /// Create a presenter on top of a notification surface.
    pub fn new(surface: Arc<dyn NotificationSurface>) -> Self {
        Self { surface }
    }

    /// Display `payload`, retrying once without the icon.
    pub async fn present(&self, payload: &InboundPayload) -> PresentOutcome {
        let mut options = NotificationOptions {
            body: payload.body.clone(),
            icon: payload.icon.clone(),
            tag: unique_tag(),
            require_interaction: false,
        };

        let first = match self.surface.show_notification(&payload.title, &options).await {
            Ok(()) => {
                log::debug!("[Presenter] Shown '{}' ({})", payload.title, options.tag);
                return PresentOutcome::Shown;
            }
            Err(e) => e,
        };

        log::warn!("[Presenter] Display failed ({first}), retrying without icon");
        options.icon = None;
        match self.surface.show_notification(&payload.title, &options).await {
            Ok(()) => PresentOutcome::ShownWithoutIcon,
            Err(e) => {
                log::warn!("[Presenter] Retry failed, notification dropped: {e}");
                PresentOutcome::Dropped(e.to_string())
            }
        }
    }
}

/// What a notification click did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// An existing window was focused.
    Focused(String),
    /// No window was open; a new one was requested.
    Opened(String),
    /// Neither focusing nor opening worked.
    Failed(String),
}

/// Handles clicks on notifications this crate displayed.
///
/// Closes the clicked notification, then focuses the first open window
/// (controlled or not) or opens `start_url` when none is open.
pub struct NotificationClick {
    surface: Arc<dyn NotificationSurface>,
    clients: Arc<dyn ClientDirectory>,
    start_url: String,
}

impl std::fmt::Debug for NotificationClick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationClick")
            .field("start_url", &self.start_url)
            .finish_non_exhaustive()
    }
}

impl NotificationClick {
    /// Create a click handler.
    pub fn new(
        surface: Arc<dyn NotificationSurface>,
        clients: Arc<dyn ClientDirectory>,
        start_url: impl Into<String>,
    ) -> Self {
        Self {
            surface,
            clients,
            start_url: start_url.into(),
        }
    }

    /// React to a click on the notification tagged `tag`.
    pub async fn handle(&self, tag: &str) -> ClickOutcome {
        if let Err(e) = self.surface.close_notification(tag).await {
            log::debug!("[Presenter] Could not close {tag}: {e}");
        }

        let query = ClientQuery {
            include_uncontrolled: true,
        };
        match self.clients.match_all(query).await {
            Ok(clients) => {
                if let Some(first) = clients.first() {
                    match first.focus().await {
                        Ok(()) => return ClickOutcome::Focused(first.id().to_string()),
                        Err(e) => log::warn!("[Presenter] Focus failed: {e}"),
                    }
                }
            }
            Err(e) => log::warn!("[Presenter] Client enumeration failed: {e}"),
        }

        match self.clients.open_window(&self.start_url).await {
            Ok(()) => ClickOutcome::Opened(self.start_url.clone()),
            Err(e) => {
                log::warn!("[Presenter] Could not open {}: {e}", self.start_url);
                ClickOutcome::Failed(e.to_string())
            }
        }
    }
}
