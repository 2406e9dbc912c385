//! Notification publishing.
//!
//! The controller hands finished notifications to a `Publisher` after its
//! write commits. Publishing only enqueues; delivery to connected clients
//! happens elsewhere.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewOrder,
    StatusUpdated,
    PickedUp,
    PickupConfirmed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewOrder => "new_order",
            NotificationKind::StatusUpdated => "status_updated",
            NotificationKind::PickedUp => "picked_up",
            NotificationKind::PickupConfirmed => "pickup_confirmed",
        }
    }
}

/// A message addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient: UserId,
    pub title: String,
    pub description: String,
    pub order_id: OrderId,
    pub kind: NotificationKind,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient: UserId,
        kind: NotificationKind,
        order_id: OrderId,
        title: impl Into<String>,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            recipient,
            title: title.into(),
            description: description.into(),
            order_id,
            kind,
            created_at,
        }
    }
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on this many live connections.
    Delivered(usize),
    /// The recipient has no live connection.
    Offline,
}

/// Errors returned by a publisher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("Notification transport unavailable: {0}")]
    Unavailable(String),
}

/// Event sink for notifications.
///
/// Implementations must not block: `publish` is called on the request path
/// after the order write has committed.
pub trait Publisher: Send + Sync {
    fn publish(&self, notification: Notification) -> Result<Delivery, PublishError>;
}

type Channels = HashMap<UserId, Vec<mpsc::UnboundedSender<Notification>>>;

/// Online-presence directory: each user's live push channels.
#[derive(Debug, Clone, Default)]
pub struct PresenceDirectory {
    channels: Arc<RwLock<Channels>>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new push channel for `user_id`.
    ///
    /// The channel is removed on the first publish after the receiver is
    /// dropped.
    pub fn connect(&self, user_id: UserId) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id)
            .or_default()
            .push(tx);
        tracing::debug!(user_id = %user_id, "presence channel connected");
        rx
    }

    /// Returns the number of live channels for `user_id`.
    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .map(|senders| senders.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Publisher for PresenceDirectory {
    fn publish(&self, notification: Notification) -> Result<Delivery, PublishError> {
        let recipient = notification.recipient;
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(senders) = channels.get_mut(&recipient) else {
            return Ok(Delivery::Offline);
        };

        senders.retain(|tx| tx.send(notification.clone()).is_ok());
        let delivered = senders.len();
        if delivered == 0 {
            channels.remove(&recipient);
            return Ok(Delivery::Offline);
        }

        Ok(Delivery::Delivered(delivered))
    }
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    published: Vec<Notification>,
    fail_on_publish: bool,
}

/// Publisher that records notifications for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<RwLock<InMemoryPublisherState>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the publisher to fail every publish.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().unwrap().fail_on_publish = fail;
    }

    /// Returns all recorded notifications in publish order.
    pub fn published(&self) -> Vec<Notification> {
        self.state.read().unwrap().published.clone()
    }

    /// Returns the notifications addressed to `recipient`.
    pub fn published_to(&self, recipient: UserId) -> Vec<Notification> {
        self.state
            .read()
            .unwrap()
            .published
            .iter()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect()
    }

    pub fn published_count(&self) -> usize {
        self.state.read().unwrap().published.len()
    }
}

impl Publisher for InMemoryPublisher {
    fn publish(&self, notification: Notification) -> Result<Delivery, PublishError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_publish {
            return Err(PublishError::Unavailable("publisher offline".to_string()));
        }
        state.published.push(notification);
        Ok(Delivery::Delivered(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(recipient: UserId) -> Notification {
        Notification::new(
            recipient,
            NotificationKind::NewOrder,
            OrderId::new(),
            "New order",
            "A customer placed an order",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn presence_delivers_to_every_connection() {
        let directory = PresenceDirectory::new();
        let user = UserId::new();
        let mut first = directory.connect(user);
        let mut second = directory.connect(user);

        let delivery = directory.publish(notification(user)).unwrap();
        assert_eq!(delivery, Delivery::Delivered(2));

        assert_eq!(first.recv().await.unwrap().title, "New order");
        assert_eq!(second.recv().await.unwrap().recipient, user);
    }

    #[test]
    fn presence_reports_offline_users() {
        let directory = PresenceDirectory::new();
        let delivery = directory.publish(notification(UserId::new())).unwrap();
        assert_eq!(delivery, Delivery::Offline);
    }

    #[test]
    fn presence_prunes_dropped_connections() {
        let directory = PresenceDirectory::new();
        let user = UserId::new();
        let kept = directory.connect(user);
        drop(directory.connect(user));

        assert_eq!(directory.connection_count(user), 1);
        assert_eq!(
            directory.publish(notification(user)).unwrap(),
            Delivery::Delivered(1)
        );

        drop(kept);
        assert_eq!(directory.connection_count(user), 0);
        assert_eq!(
            directory.publish(notification(user)).unwrap(),
            Delivery::Offline
        );
    }

    #[test]
    fn in_memory_publisher_records_and_fails() {
        let publisher = InMemoryPublisher::new();
        let user = UserId::new();

        publisher.publish(notification(user)).unwrap();
        assert_eq!(publisher.published_to(user).len(), 1);

        publisher.set_fail_on_publish(true);
        assert!(publisher.publish(notification(user)).is_err());
        assert_eq!(publisher.published_count(), 1);
    }

    #[test]
    fn notification_serializes_camel_case() {
        let json = serde_json::to_value(notification(UserId::new())).unwrap();
        assert_eq!(json["kind"], "new_order");
        assert!(json.get("orderId").is_some());
        assert!(json.get("createdAt").is_some());
    }
}
