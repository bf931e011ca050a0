pub mod http;

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{Notification, ReadAllAck};

pub use http::HttpNotificationApi;

/// Operations against the remote notification store for the signed-in user.
/// Implementations: HttpNotificationApi (REST over reqwest).
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Authoritative current set, newest first.
    async fn fetch_all(&self) -> Result<Vec<Notification>>;

    /// Mark one notification read. Idempotent; `NotFound` for ids the caller
    /// does not own.
    async fn mark_read(&self, id: &str) -> Result<Notification>;

    /// Mark every unread notification read. Idempotent.
    async fn mark_all_read(&self) -> Result<ReadAllAck>;
}

#[async_trait]
impl<T: NotificationApi + ?Sized> NotificationApi for Arc<T> {
    async fn fetch_all(&self) -> Result<Vec<Notification>> {
        (**self).fetch_all().await
    }

    async fn mark_read(&self, id: &str) -> Result<Notification> {
        (**self).mark_read(id).await
    }

    async fn mark_all_read(&self) -> Result<ReadAllAck> {
        (**self).mark_all_read().await
    }
}
