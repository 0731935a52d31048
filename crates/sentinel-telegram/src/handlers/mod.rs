//! Telegram update handlers.
//!
//! Callbacks come from the action buttons on delivered notifications;
//! messages carry operator commands. Both are honored only in the
//! destination chat.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use sentinel_core::domain::{ChatId, UserId};

use crate::router::AppState;
mod callback;
mod commands;

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if !text.starts_with('/') {
        return Ok(());
    }

    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));
    if !state.cfg.is_authorized(ChatId(msg.chat.id.0), user_id) {
        tracing::debug!(chat_id = msg.chat.id.0, "command from unauthorized chat ignored");
        if msg.chat.is_private() {
            let _ = bot
                .send_message(msg.chat.id, "Unauthorized. Commands are accepted in the notification channel only.")
                .await;
        }
        return Ok(());
    }

    commands::handle_command(msg, state).await
}
