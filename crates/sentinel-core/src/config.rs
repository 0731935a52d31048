use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    domain::{ChatId, UserId},
    errors::Error,
    Result,
};

/// Typed configuration for the sentinel process.
#[derive(Clone, Debug)]
pub struct Config {
    // Destination channel
    pub telegram_bot_token: String,
    pub channel_id: i64,
    pub telegram_allowed_users: Vec<i64>,

    // Source site
    pub source_base_url: String,
    pub notifications_path: String,
    pub request_timeout: Duration,

    // Poll cycle
    pub poll_interval: Duration,

    // Durable state
    pub session_file: PathBuf,
    pub watchlist_file: PathBuf,
    pub db_file: PathBuf,
    pub dedup_retention_days: Option<u32>,

    // Presentation
    pub footer_text: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let channel_id = env_str("CHANNEL_ID")
            .ok_or_else(|| {
                Error::Config("CHANNEL_ID environment variable is required".to_string())
            })?
            .trim()
            .parse::<i64>()
            .map_err(|e| Error::Config(format!("CHANNEL_ID must be a chat id: {e}")))?;

        let telegram_allowed_users = parse_csv_i64(env_str("TELEGRAM_ALLOWED_USERS"));

        let source_base_url = env_str("SOURCE_BASE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "https://mangabuff.ru".to_string())
            .trim_end_matches('/')
            .to_string();
        let notifications_path = env_str("NOTIFICATIONS_PATH")
            .and_then(non_empty)
            .unwrap_or_else(|| "/notifications".to_string());
        let request_timeout =
            Duration::from_millis(env_u64("REQUEST_TIMEOUT_MS").unwrap_or(20_000));

        let poll_interval = Duration::from_secs(env_u64("POLL_INTERVAL_SECS").unwrap_or(300).max(1));

        let session_file = env_path("SESSION_FILE").unwrap_or_else(|| "session_cache.json".into());
        let watchlist_file =
            env_path("WATCHLIST_FILE").unwrap_or_else(|| "watchlist.json".into());
        let db_file = env_path("DB_FILE").unwrap_or_else(|| "notifications.db".into());
        let dedup_retention_days = env_u32("DEDUP_RETENTION_DAYS").filter(|d| *d > 0);

        let footer_text = env_str("FOOTER_TEXT")
            .and_then(non_empty)
            .unwrap_or_else(|| "MangaBuff Sentinel".to_string());

        Ok(Self {
            telegram_bot_token,
            channel_id,
            telegram_allowed_users,
            source_base_url,
            notifications_path,
            request_timeout,
            poll_interval,
            session_file,
            watchlist_file,
            db_file,
            dedup_retention_days,
            footer_text,
        })
    }

    /// Absolute notifications endpoint, e.g. `https://mangabuff.ru/notifications`.
    pub fn notifications_url(&self) -> String {
        format!(
            "{}/{}",
            self.source_base_url,
            self.notifications_path.trim_start_matches('/')
        )
    }

    /// Buttons and commands are honored only inside the destination chat, and
    /// only for allowed users when an allowlist is configured.
    pub fn is_authorized(&self, chat_id: ChatId, user_id: Option<UserId>) -> bool {
        if chat_id.0 != self.channel_id {
            return false;
        }
        if self.telegram_allowed_users.is_empty() {
            return true;
        }
        user_id.is_some_and(|u| self.telegram_allowed_users.contains(&u.0))
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        return &s[1..s.len() - 1];
    }
    s
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
