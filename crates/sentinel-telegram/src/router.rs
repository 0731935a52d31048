use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;

use sentinel_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use sentinel_core::{
    config::Config,
    credentials::{CredentialSource, FileCredentialStore},
    dedup::DedupStore,
    domain::ChatId,
    messaging::port::MessagingPort,
    poller::{PipelineDeps, PollController, PollSettings},
    source::FeedSource,
    watchlist::WatchlistFile,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub messenger: Arc<dyn MessagingPort>,
    pub controller: PollController,
    pub credentials: Arc<dyn CredentialSource>,
    pub source: Arc<dyn FeedSource>,
    pub dedup: Arc<dyn DedupStore>,
    pub watchlist: WatchlistFile,
}

impl AppState {
    pub fn channel(&self) -> ChatId {
        ChatId(self.cfg.channel_id)
    }
}

pub async fn run_polling(
    cfg: Arc<Config>,
    source: Arc<dyn FeedSource>,
    dedup: Arc<dyn DedupStore>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(bot = %me.username(), channel_id = cfg.channel_id, "sentinel started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed; continuing"),
    }

    // 429 RetryAfter is still retried once inside the Telegram adapter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let credentials: Arc<dyn CredentialSource> =
        Arc::new(FileCredentialStore::new(cfg.session_file.clone()));
    let watchlist = WatchlistFile::new(cfg.watchlist_file.clone());

    let controller = PollController::new(
        PipelineDeps {
            credentials: credentials.clone(),
            source: source.clone(),
            messenger: messenger.clone(),
            dedup: dedup.clone(),
            watchlist: Arc::new(watchlist.clone()),
        },
        PollSettings {
            chat_id: ChatId(cfg.channel_id),
            interval: cfg.poll_interval,
            base_url: cfg.source_base_url.clone(),
            footer: cfg.footer_text.clone(),
        },
    );

    let cancel = CancellationToken::new();
    let poll_task = controller.spawn(cancel.clone());

    let state = Arc::new(AppState {
        cfg,
        messenger,
        controller,
        credentials,
        source,
        dedup,
        watchlist,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_channel_post().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    cancel.cancel();
    if let Err(e) = poll_task.await {
        tracing::warn!(error = %e, "poll loop ended abnormally");
    }
    tracing::info!("sentinel stopped");

    Ok(())
}
