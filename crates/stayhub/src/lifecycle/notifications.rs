use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::access::Actor;
use super::clock::Clock;
use super::domain::{Notification, NotificationId, NotificationKind, UserId};
use super::error::CoordinatorError;
use super::repository::{MarketplaceStore, RepositoryError};

/// Message handed to the dispatcher by a coordinator side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundNotification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
}

impl OutboundNotification {
    pub fn new(
        user_id: &UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.clone(),
            kind,
            title: title.into(),
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

/// Outbound delivery hook (inbox writer, e-mail adapter, push gateway).
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, notification: OutboundNotification) -> Result<(), DispatchError>;
}

/// Dispatcher that files every message into the recipient's inbox in the store.
pub struct StoreDispatcher<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> StoreDispatcher<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl<S> NotificationDispatcher for StoreDispatcher<S>
where
    S: MarketplaceStore + 'static,
{
    async fn send(&self, notification: OutboundNotification) -> Result<(), DispatchError> {
        let record = Notification {
            id: NotificationId::generate(),
            user_id: notification.user_id,
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            metadata: notification.metadata,
            is_read: false,
            read_at: None,
            created_at: self.clock.now(),
        };
        self.store.insert_notification(record).await?;
        Ok(())
    }
}

/// Best-effort wrapper used by coordinators once the primary mutation is committed.
pub(crate) struct Notifier<N> {
    dispatcher: Arc<N>,
}

impl<N> Clone for Notifier<N> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<N> Notifier<N>
where
    N: NotificationDispatcher + 'static,
{
    pub(crate) fn new(dispatcher: Arc<N>) -> Self {
        Self { dispatcher }
    }

    /// Failures are logged and swallowed; they never reach the caller.
    pub(crate) async fn notify(&self, notification: OutboundNotification) {
        let recipient = notification.user_id.clone();
        let title = notification.title.clone();
        if let Err(error) = self.dispatcher.send(notification).await {
            tracing::warn!(%recipient, %title, %error, "notification dispatch failed");
        }
    }
}

/// Recipient-facing view over stored notifications.
pub struct NotificationInbox<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> NotificationInbox<S>
where
    S: MarketplaceStore + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn list(
        &self,
        actor: &Actor,
        unread_only: bool,
    ) -> Result<Vec<Notification>, CoordinatorError> {
        let notifications = self.store.notifications_for(&actor.user_id).await?;
        Ok(notifications
            .into_iter()
            .filter(|notification| !unread_only || !notification.is_read)
            .collect())
    }

    pub async fn unread_count(&self, actor: &Actor) -> Result<usize, CoordinatorError> {
        Ok(self.list(actor, true).await?.len())
    }

    /// Another user's notification is reported as missing rather than forbidden.
    pub async fn mark_read(
        &self,
        actor: &Actor,
        id: &NotificationId,
    ) -> Result<Notification, CoordinatorError> {
        let mut notification = self
            .store
            .notification(id)
            .await?
            .filter(|notification| notification.user_id == actor.user_id)
            .ok_or(CoordinatorError::NotFound("Notification"))?;

        if !notification.is_read {
            notification.is_read = true;
            notification.read_at = Some(self.clock.now());
            self.store.update_notification(notification.clone()).await?;
        }
        Ok(notification)
    }

    pub async fn mark_all_read(&self, actor: &Actor) -> Result<usize, CoordinatorError> {
        let now = self.clock.now();
        let mut marked = 0;
        for mut notification in self.list(actor, true).await? {
            notification.is_read = true;
            notification.read_at = Some(now);
            self.store.update_notification(notification).await?;
            marked += 1;
        }
        Ok(marked)
    }
}
