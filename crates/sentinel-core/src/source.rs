//! Port for the source website.

use async_trait::async_trait;

use crate::{credentials::SessionCredential, domain::NotificationId, Result};

/// Authenticated access to the notification feed and its management endpoints.
///
/// Implementations must bound every call with a timeout. A 401/403/419 answer
/// maps to `Error::NotAuthenticated`, any other non-2xx to `Error::Http`.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Raw markup of the notifications page.
    async fn fetch_feed(&self, cred: &SessionCredential) -> Result<String>;

    /// Binary body of an absolute image url.
    async fn fetch_thumbnail(&self, cred: &SessionCredential, url: &str) -> Result<Vec<u8>>;

    /// `POST {notifications}/{id}/read`
    async fn mark_read(&self, cred: &SessionCredential, id: &NotificationId) -> Result<()>;

    /// `POST {notifications}/{id}` with `_method=DELETE`
    async fn delete(&self, cred: &SessionCredential, id: &NotificationId) -> Result<()>;
}
