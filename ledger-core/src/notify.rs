//! Notification port
//!
//! Notifications are fire-and-forget user signals: the trait cannot fail and
//! implementations must never block a money operation on delivery. The real
//! platform pushes these to devices; tests use [`MemoryNotifier`] to assert
//! on what was sent.

use crate::types::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Deposit/withdrawal settled, failed, or cancelled
    TransactionUpdate,
    /// Game locked, cancelled, or otherwise changed
    GameUpdate,
    /// A period payout landed
    Payout,
    /// A refund landed
    Refund,
    /// Invited to a game
    Invitation,
}

/// Delivery priority hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPriority {
    /// Informational
    Low,
    /// Default
    Normal,
    /// Money moved
    High,
}

/// A user-facing signal
#[derive(Debug, Clone)]
pub struct Notification {
    /// Recipient
    pub user_id: UserId,

    /// Kind
    pub kind: NotificationKind,

    /// Short title
    pub title: String,

    /// Body text
    pub body: String,

    /// Priority hint
    pub priority: NotificationPriority,

    /// Deep-link reference (game id, transaction id)
    pub action_ref: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Build a notification stamped now
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
        priority: NotificationPriority,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            body: body.into(),
            priority,
            action_ref: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a deep-link reference
    pub fn with_action_ref(mut self, action_ref: impl Into<String>) -> Self {
        self.action_ref = Some(action_ref.into());
        self
    }
}

/// Notification collaborator
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification. Must not fail; drop on the floor if the
    /// downstream channel is unavailable.
    async fn notify(&self, notification: Notification);
}

/// Discards every notification
#[derive(Debug, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _notification: Notification) {}
}

/// Records notifications for test assertions
#[derive(Default)]
pub struct MemoryNotifier {
    sent: RwLock<Vec<Notification>>,
}

impl MemoryNotifier {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }

    /// Notifications delivered to one user
    pub async fn sent_to(&self, user: &UserId) -> Vec<Notification> {
        self.sent
            .read()
            .await
            .iter()
            .filter(|n| &n.user_id == user)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, notification: Notification) {
        self.sent.write().await.push(notification);
    }
}
