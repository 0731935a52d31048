//! Delivery of one qualifying notification, followed by the dedup commit.

use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::{
    actions::ActionRequest,
    classify::Classification,
    credentials::SessionCredential,
    dedup::{DedupStore, MarkOutcome},
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{DeliveryPayload, Thumbnail},
    },
    normalize::NormalizedNotification,
    source::FeedSource,
    Result,
};

const THUMBNAIL_FILE_NAME: &str = "thumb.jpg";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryReport {
    pub message: MessageRef,
    pub with_thumbnail: bool,
    /// False when the send succeeded but the dedup write did not.
    pub committed: bool,
}

pub struct Dispatcher {
    source: Arc<dyn FeedSource>,
    messenger: Arc<dyn MessagingPort>,
    dedup: Arc<dyn DedupStore>,
    chat_id: ChatId,
    footer: String,
}

impl Dispatcher {
    pub fn new(
        source: Arc<dyn FeedSource>,
        messenger: Arc<dyn MessagingPort>,
        dedup: Arc<dyn DedupStore>,
        chat_id: ChatId,
        footer: impl Into<String>,
    ) -> Self {
        Self {
            source,
            messenger,
            dedup,
            chat_id,
            footer: footer.into(),
        }
    }

    /// Send `notif` and, only after the channel confirms, record it as delivered.
    ///
    /// `Err` means nothing was sent and the id stays eligible for the next cycle.
    pub async fn deliver(
        &self,
        cred: &SessionCredential,
        notif: &NormalizedNotification,
        classification: Classification,
    ) -> Result<DeliveryReport> {
        let thumbnail = self.fetch_thumbnail(cred, notif).await;
        let mut payload =
            build_payload(notif, classification, thumbnail, &self.footer, Local::now());

        let message = match self.messenger.send_notification(self.chat_id, &payload).await {
            Ok(message) => message,
            // A rejected image must not hold the entry back; resend as text only.
            Err(e) if payload.thumbnail.is_some() => {
                tracing::warn!(notif_id = %notif.id, error = %e, "send with thumbnail failed; retrying without image");
                payload.thumbnail = None;
                self.messenger
                    .send_notification(self.chat_id, &payload)
                    .await?
            }
            Err(e) => return Err(e),
        };
        let with_thumbnail = payload.thumbnail.is_some();

        let committed = match self.dedup.mark_delivered(&notif.id).await {
            Ok(MarkOutcome::Inserted) => true,
            Ok(MarkOutcome::AlreadyMarked) => {
                tracing::debug!(notif_id = %notif.id, "notification was already marked");
                true
            }
            Err(e) => {
                tracing::error!(
                    notif_id = %notif.id,
                    error = %e,
                    "delivered but failed to record; it may be delivered again next cycle"
                );
                false
            }
        };

        Ok(DeliveryReport {
            message,
            with_thumbnail,
            committed,
        })
    }

    async fn fetch_thumbnail(
        &self,
        cred: &SessionCredential,
        notif: &NormalizedNotification,
    ) -> Option<Thumbnail> {
        let url = notif.thumbnail_url.as_deref()?;
        if !self.messenger.capabilities().supports_photos {
            return None;
        }
        match self.source.fetch_thumbnail(cred, url).await {
            Ok(bytes) if !bytes.is_empty() => Some(Thumbnail {
                file_name: THUMBNAIL_FILE_NAME.to_string(),
                bytes,
            }),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(notif_id = %notif.id, url, error = %e, "thumbnail fetch failed; sending without image");
                None
            }
        }
    }
}

pub fn build_payload(
    notif: &NormalizedNotification,
    classification: Classification,
    thumbnail: Option<Thumbnail>,
    footer: &str,
    processed_at: DateTime<Local>,
) -> DeliveryPayload {
    DeliveryPayload {
        notif_id: notif.id.clone(),
        text: notif.text.clone(),
        severity: classification.severity,
        color: classification.severity.color(),
        processed_at,
        footer: footer.to_string(),
        thumbnail,
        link: notif.action_link.clone(),
        actions: ActionRequest::all_for(&notif.id),
    }
}
