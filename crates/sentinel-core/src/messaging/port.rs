use async_trait::async_trait;

use crate::{
    actions::ActionRequest,
    domain::{ChatId, MessageRef},
    messaging::types::{DeliveryPayload, MessagingCapabilities},
    Result,
};

/// Destination-channel port.
///
/// The core decides what to send and which actions to attach; rendering is the
/// adapter's business.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// Fails when the destination chat cannot be resolved.
    async fn check_channel(&self, chat_id: ChatId) -> Result<()>;

    async fn send_notification(
        &self,
        chat_id: ChatId,
        payload: &DeliveryPayload,
    ) -> Result<MessageRef>;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    /// Replace the action controls on a delivered message. `link` is kept as
    /// the "open" control when present.
    async fn replace_actions(
        &self,
        msg: MessageRef,
        actions: &[ActionRequest],
        link: Option<&str>,
    ) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
