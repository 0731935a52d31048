//! Telegram adapter (teloxide).
//!
//! Implements the `sentinel-core` MessagingPort over the Telegram Bot API and
//! handles the inbound button callbacks and operator commands.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode},
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use sentinel_core::{
    actions::ActionRequest,
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    formatting::truncate_chars,
    messaging::{
        port::MessagingPort,
        types::{DeliveryPayload, MessagingCapabilities},
    },
    Result,
};

const MAX_MESSAGE_LEN: usize = 4096;
const MAX_CAPTION_LEN: usize = 1024;
/// Leaves room for the marker and footer around the display text.
const CAPTION_TEXT_BUDGET: usize = 900;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

/// Action buttons on the first row, the "Open" link (if any) on the second.
/// Empty rows are left out.
pub fn action_keyboard(actions: &[ActionRequest], link: Option<&str>) -> InlineKeyboardMarkup {
    let buttons: Vec<InlineKeyboardButton> = actions
        .iter()
        .map(|a| InlineKeyboardButton::callback(a.kind.label(), a.callback_data()))
        .collect();

    let mut rows = Vec::new();
    if !buttons.is_empty() {
        rows.push(buttons);
    }
    if let Some(url) = link.and_then(|l| reqwest::Url::parse(l).ok()) {
        rows.push(vec![InlineKeyboardButton::url("🔗 Open", url)]);
    }
    InlineKeyboardMarkup::new(rows)
}

pub fn notification_keyboard(payload: &DeliveryPayload) -> InlineKeyboardMarkup {
    action_keyboard(&payload.actions, payload.link.as_deref())
}

/// Render the payload body, shortening the display text to fit `limit`.
fn render_within(payload: &DeliveryPayload, limit: usize) -> String {
    let html = payload.render_html();
    if html.chars().count() <= limit {
        return html;
    }
    let mut shorter = payload.clone();
    let mut budget = CAPTION_TEXT_BUDGET.min(limit / 2);
    loop {
        shorter.text = truncate_chars(&payload.text, budget);
        let html = shorter.render_html();
        // Escaping can expand the text, so shrink until it fits.
        if budget == 0 || html.chars().count() <= limit {
            return html;
        }
        budget /= 2;
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_photos: true,
        }
    }

    async fn check_channel(&self, chat_id: ChatId) -> Result<()> {
        self.with_retry(|| self.bot.get_chat(Self::tg_chat(chat_id)))
            .await?;
        Ok(())
    }

    async fn send_notification(
        &self,
        chat_id: ChatId,
        payload: &DeliveryPayload,
    ) -> Result<MessageRef> {
        let markup = notification_keyboard(payload);

        let msg = match &payload.thumbnail {
            Some(thumb) => {
                let caption = render_within(payload, MAX_CAPTION_LEN);
                self.with_retry(|| {
                    self.bot
                        .send_photo(
                            Self::tg_chat(chat_id),
                            InputFile::memory(thumb.bytes.clone())
                                .file_name(thumb.file_name.clone()),
                        )
                        .caption(caption.clone())
                        .parse_mode(ParseMode::Html)
                        .reply_markup(markup.clone())
                })
                .await?
            }
            None => {
                let html = render_within(payload, MAX_MESSAGE_LEN);
                self.with_retry(|| {
                    self.bot
                        .send_message(Self::tg_chat(chat_id), html.clone())
                        .parse_mode(ParseMode::Html)
                        .disable_web_page_preview(true)
                        .reply_markup(markup.clone())
                })
                .await?
            }
        };

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn replace_actions(
        &self,
        msg: MessageRef,
        actions: &[ActionRequest],
        link: Option<&str>,
    ) -> Result<()> {
        let markup = action_keyboard(actions, link);
        self.with_retry(|| {
            self.bot
                .edit_message_reply_markup(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
                .reply_markup(markup.clone())
        })
        .await?;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }
}
