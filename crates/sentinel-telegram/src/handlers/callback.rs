use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButtonKind, InlineKeyboardMarkup},
};

use sentinel_core::{
    actions::{self, ActionKind, ActionOutcome, ActionRequest},
    domain::{ChatId, MessageId, MessageRef, UserId},
};

use crate::router::AppState;

/// Target of the first url button, so an edited keyboard keeps its "Open" link.
pub(crate) fn open_link(markup: &InlineKeyboardMarkup) -> Option<String> {
    markup.inline_keyboard.iter().flatten().find_map(|b| match &b.kind {
        InlineKeyboardButtonKind::Url(url) => Some(url.to_string()),
        _ => None,
    })
}

fn ack_text(kind: ActionKind, outcome: &ActionOutcome) -> &'static str {
    if outcome.is_done() {
        kind.success_ack()
    } else {
        kind.failure_ack()
    }
}

pub async fn handle_callback(
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let data = q.data.clone().unwrap_or_default();

    // Always answer the callback query so the client stops spinning.
    let Some(message) = q.message.as_ref() else {
        let _ = state.messenger.answer_callback_query(&cb_id, None).await;
        return Ok(());
    };
    let Some(req) = ActionRequest::parse(&data) else {
        let _ = state
            .messenger
            .answer_callback_query(&cb_id, Some("Unknown action"))
            .await;
        return Ok(());
    };

    let chat_id = ChatId(message.chat.id.0);
    let user_id = UserId(q.from.id.0 as i64);
    if !state.cfg.is_authorized(chat_id, Some(user_id)) {
        let _ = state
            .messenger
            .answer_callback_query(&cb_id, Some("Unauthorized"))
            .await;
        return Ok(());
    }

    let outcome = actions::perform(state.credentials.as_ref(), state.source.as_ref(), &req).await;
    match &outcome {
        ActionOutcome::Done => {
            tracing::info!(notif_id = %req.id, action = ?req.kind, user_id = user_id.0, "action completed")
        }
        ActionOutcome::NotAuthenticated => {
            tracing::warn!(notif_id = %req.id, action = ?req.kind, "action rejected: session invalid")
        }
        ActionOutcome::Failed(e) => {
            tracing::warn!(notif_id = %req.id, action = ?req.kind, error = %e, "action failed")
        }
    }

    let _ = state
        .messenger
        .answer_callback_query(&cb_id, Some(ack_text(req.kind, &outcome)))
        .await;

    let posted = MessageRef {
        chat_id,
        message_id: MessageId(message.id.0),
    };
    let link = message.reply_markup().and_then(open_link);
    if let Err(e) = actions::apply_outcome(
        state.messenger.as_ref(),
        posted,
        link.as_deref(),
        &req,
        &outcome,
    )
    .await
    {
        tracing::warn!(notif_id = %req.id, action = ?req.kind, error = %e, "failed to update channel message");
    }

    Ok(())
}
