//! Follow-up actions attached to delivered notifications.
//!
//! An action is keyed only by the notification id, so it can be resolved after
//! a restart without any in-memory message state. The credential is read at
//! invocation time, never captured at delivery time.

use crate::{
    credentials::CredentialSource,
    domain::{MessageRef, NotificationId},
    errors::Error,
    messaging::port::MessagingPort,
    source::FeedSource,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    MarkRead,
    Delete,
}

impl ActionKind {
    fn prefix(self) -> &'static str {
        match self {
            ActionKind::MarkRead => "read",
            ActionKind::Delete => "del",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ActionKind::MarkRead => "📖 Mark Read",
            ActionKind::Delete => "🗑️ Delete",
        }
    }

    pub fn success_ack(self) -> &'static str {
        match self {
            ActionKind::MarkRead => "✅ Marked as read!",
            ActionKind::Delete => "🗑️ Deleted.",
        }
    }

    pub fn failure_ack(self) -> &'static str {
        match self {
            ActionKind::MarkRead => "❌ Failed. Session invalid?",
            ActionKind::Delete => "❌ Failed to delete.",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub id: NotificationId,
}

impl ActionRequest {
    pub fn new(kind: ActionKind, id: NotificationId) -> Self {
        Self { kind, id }
    }

    /// Mark-read and delete, in display order.
    pub fn all_for(id: &NotificationId) -> Vec<Self> {
        vec![
            Self::new(ActionKind::MarkRead, id.clone()),
            Self::new(ActionKind::Delete, id.clone()),
        ]
    }

    /// `read:{id}` / `del:{id}`
    pub fn callback_data(&self) -> String {
        format!("{}:{}", self.kind.prefix(), self.id)
    }

    pub fn parse(data: &str) -> Option<Self> {
        let (prefix, id) = data.split_once(':')?;
        let kind = match prefix {
            "read" => ActionKind::MarkRead,
            "del" => ActionKind::Delete,
            _ => return None,
        };
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        Some(Self::new(kind, NotificationId::new(id)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    Done,
    NotAuthenticated,
    Failed(String),
}

impl ActionOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, ActionOutcome::Done)
    }
}

/// Call the source site's management endpoint for `req`.
pub async fn perform(
    credentials: &dyn CredentialSource,
    source: &dyn FeedSource,
    req: &ActionRequest,
) -> ActionOutcome {
    let cred = match credentials.load() {
        Ok(Some(cred)) => cred,
        Ok(None) => return ActionOutcome::NotAuthenticated,
        Err(e) => return ActionOutcome::Failed(e.to_string()),
    };

    let res = match req.kind {
        ActionKind::MarkRead => source.mark_read(&cred, &req.id).await,
        ActionKind::Delete => source.delete(&cred, &req.id).await,
    };

    match res {
        Ok(()) => ActionOutcome::Done,
        Err(Error::NotAuthenticated) => ActionOutcome::NotAuthenticated,
        Err(e) => ActionOutcome::Failed(e.to_string()),
    }
}

/// Reflect a finished action on the delivered message.
///
/// Mark-read leaves the message with the remaining controls; delete removes
/// it. Nothing changes unless the action succeeded.
pub async fn apply_outcome(
    messenger: &dyn MessagingPort,
    message: MessageRef,
    link: Option<&str>,
    req: &ActionRequest,
    outcome: &ActionOutcome,
) -> Result<()> {
    if !outcome.is_done() {
        return Ok(());
    }
    match req.kind {
        ActionKind::MarkRead => {
            let remaining: Vec<_> = ActionRequest::all_for(&req.id)
                .into_iter()
                .filter(|a| a.kind != req.kind)
                .collect();
            messenger.replace_actions(message, &remaining, link).await
        }
        ActionKind::Delete => messenger.delete_message(message).await,
    }
}
