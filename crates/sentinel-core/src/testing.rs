//! In-memory fakes for the pipeline ports.

use std::{
    collections::{BTreeMap, HashSet},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    actions::ActionRequest,
    config::Config,
    credentials::{CredentialSource, SessionCredential},
    dedup::{DedupStore, MarkOutcome},
    domain::{ChatId, MessageId, MessageRef, NotificationId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{DeliveryPayload, MessagingCapabilities},
    },
    source::FeedSource,
    Result,
};

pub fn config() -> Config {
    Config {
        telegram_bot_token: "x".to_string(),
        channel_id: -100,
        telegram_allowed_users: vec![],
        source_base_url: "https://mangabuff.ru".to_string(),
        notifications_path: "/notifications".to_string(),
        request_timeout: Duration::from_secs(1),
        poll_interval: Duration::from_secs(300),
        session_file: PathBuf::from("/tmp/s.json"),
        watchlist_file: PathBuf::from("/tmp/w.json"),
        db_file: PathBuf::from("/tmp/n.db"),
        dedup_retention_days: None,
        footer_text: "MangaBuff Sentinel".to_string(),
    }
}

pub fn credential() -> SessionCredential {
    SessionCredential {
        cookies: BTreeMap::from([("mangabuff_session".to_string(), "s".to_string())]),
        csrf_token: "tok".to_string(),
        user_agent: "UA".to_string(),
    }
}

// === Credentials ===

pub struct StaticCredentials(Option<SessionCredential>);

impl StaticCredentials {
    pub fn authenticated() -> Self {
        Self(Some(credential()))
    }

    pub fn absent() -> Self {
        Self(None)
    }
}

impl CredentialSource for StaticCredentials {
    fn load(&self) -> Result<Option<SessionCredential>> {
        Ok(self.0.clone())
    }
}

// === Source site ===

#[derive(Default)]
pub struct FakeSource {
    feed: Mutex<String>,
    /// `Some(0)` simulates a network error, `Some(401)` a stale session.
    feed_failure: Mutex<Option<u16>>,
    feed_gate: Mutex<Option<Arc<Notify>>>,
    feed_calls: AtomicUsize,
    thumbnail: Mutex<Vec<u8>>,
    thumbnails_fail: AtomicBool,
    thumbnail_urls: Mutex<Vec<String>>,
    action_failure: Mutex<Option<u16>>,
    reads: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
}

fn status_error(status: u16) -> Error {
    match status {
        0 => Error::External("connection reset".to_string()),
        401 | 403 | 419 => Error::NotAuthenticated,
        other => Error::Http { status: other },
    }
}

impl FakeSource {
    pub fn new(feed: &str) -> Self {
        let s = Self::default();
        s.set_feed(feed);
        *s.thumbnail.lock().unwrap() = b"img".to_vec();
        s
    }

    pub fn set_feed(&self, feed: &str) {
        *self.feed.lock().unwrap() = feed.to_string();
    }

    pub fn fail_feed_with_status(&self, status: Option<u16>) {
        *self.feed_failure.lock().unwrap() = status;
    }

    /// Block `fetch_feed` until the returned handle is notified.
    pub fn hold_feed(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.feed_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn set_thumbnail(&self, bytes: Vec<u8>) {
        *self.thumbnail.lock().unwrap() = bytes;
    }

    pub fn fail_thumbnails(&self) {
        self.thumbnails_fail.store(true, Ordering::SeqCst);
    }

    pub fn fail_actions_with_status(&self, status: u16) {
        *self.action_failure.lock().unwrap() = Some(status);
    }

    pub fn feed_calls(&self) -> usize {
        self.feed_calls.load(Ordering::SeqCst)
    }

    pub fn thumbnail_urls(&self) -> Vec<String> {
        self.thumbnail_urls.lock().unwrap().clone()
    }

    pub fn read_calls(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }

    fn action_result(&self) -> Result<()> {
        match *self.action_failure.lock().unwrap() {
            Some(status) => Err(status_error(status)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FeedSource for FakeSource {
    async fn fetch_feed(&self, _cred: &SessionCredential) -> Result<String> {
        self.feed_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.feed_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(status) = *self.feed_failure.lock().unwrap() {
            return Err(status_error(status));
        }
        Ok(self.feed.lock().unwrap().clone())
    }

    async fn fetch_thumbnail(&self, _cred: &SessionCredential, url: &str) -> Result<Vec<u8>> {
        self.thumbnail_urls.lock().unwrap().push(url.to_string());
        if self.thumbnails_fail.load(Ordering::SeqCst) {
            return Err(Error::Http { status: 404 });
        }
        Ok(self.thumbnail.lock().unwrap().clone())
    }

    async fn mark_read(&self, _cred: &SessionCredential, id: &NotificationId) -> Result<()> {
        self.reads.lock().unwrap().push(id.0.clone());
        self.action_result()
    }

    async fn delete(&self, _cred: &SessionCredential, id: &NotificationId) -> Result<()> {
        self.deletes.lock().unwrap().push(id.0.clone());
        self.action_result()
    }
}

// === Messenger ===

/// One `replace_actions` call as seen by [`FakeMessenger`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplacedActions {
    pub message: MessageRef,
    pub actions: Vec<ActionRequest>,
    pub link: Option<String>,
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: AtomicI32,
    notifications: Mutex<Vec<DeliveryPayload>>,
    html: Mutex<Vec<String>>,
    deleted: Mutex<Vec<MessageRef>>,
    replaced: Mutex<Vec<ReplacedActions>>,
    fail_sends: AtomicBool,
    reject_photos: AtomicBool,
    fail_channel: AtomicBool,
    fail_ids: Mutex<HashSet<String>>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI32::new(1),
            ..Default::default()
        }
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)),
        }
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Fail any send that carries a thumbnail, as a channel rejecting the image would.
    pub fn reject_photos(&self, reject: bool) {
        self.reject_photos.store(reject, Ordering::SeqCst);
    }

    pub fn fail_channel(&self, fail: bool) {
        self.fail_channel.store(fail, Ordering::SeqCst);
    }

    pub fn fail_for_id(&self, id: &str) {
        self.fail_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_ids.lock().unwrap().clear();
        self.fail_sends(false);
    }

    pub fn notifications(&self) -> Vec<DeliveryPayload> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn html_sent(&self) -> Vec<String> {
        self.html.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn replaced(&self) -> Vec<ReplacedActions> {
        self.replaced.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_photos: true,
        }
    }

    async fn check_channel(&self, _chat_id: ChatId) -> Result<()> {
        if self.fail_channel.load(Ordering::SeqCst) {
            return Err(Error::External("chat not found".to_string()));
        }
        Ok(())
    }

    async fn send_notification(
        &self,
        chat_id: ChatId,
        payload: &DeliveryPayload,
    ) -> Result<MessageRef> {
        if self.fail_sends.load(Ordering::SeqCst)
            || self.fail_ids.lock().unwrap().contains(&payload.notif_id.0)
        {
            return Err(Error::External("send failed".to_string()));
        }
        if payload.thumbnail.is_some() && self.reject_photos.load(Ordering::SeqCst) {
            return Err(Error::External("IMAGE_PROCESS_FAILED".to_string()));
        }
        self.notifications.lock().unwrap().push(payload.clone());
        Ok(self.alloc(chat_id))
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.html.lock().unwrap().push(html.to_string());
        Ok(self.alloc(chat_id))
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.deleted.lock().unwrap().push(msg);
        Ok(())
    }

    async fn replace_actions(
        &self,
        msg: MessageRef,
        actions: &[ActionRequest],
        link: Option<&str>,
    ) -> Result<()> {
        self.replaced.lock().unwrap().push(ReplacedActions {
            message: msg,
            actions: actions.to_vec(),
            link: link.map(str::to_string),
        });
        Ok(())
    }

    async fn answer_callback_query(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
        Ok(())
    }
}

// === Dedup ===

#[derive(Default)]
pub struct MemoryDedup {
    ids: Mutex<HashSet<String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryDedup {
    pub fn seed(&self, ids: &[&str]) {
        let mut set = self.ids.lock().unwrap();
        for id in ids {
            set.insert(id.to_string());
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().unwrap().contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap().len()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DedupStore for MemoryDedup {
    async fn is_delivered(&self, id: &NotificationId) -> Result<bool> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Storage("database is locked".to_string()));
        }
        Ok(self.contains(&id.0))
    }

    async fn mark_delivered(&self, id: &NotificationId) -> Result<MarkOutcome> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk full".to_string()));
        }
        Ok(if self.ids.lock().unwrap().insert(id.0.clone()) {
            MarkOutcome::Inserted
        } else {
            MarkOutcome::AlreadyMarked
        })
    }

    async fn delivered_count(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }
}
