//! Durable set of notification ids that were already delivered.
//!
//! Entries are created once, right after a successful delivery, and are never
//! updated. The SQLite connection lives on a dedicated worker thread; callers
//! submit closures and await the reply.

use std::{
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

use crate::{domain::NotificationId, errors::Error, Result};

const CURRENT_SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS processed (
    notif_id     TEXT PRIMARY KEY,
    delivered_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_processed_delivered_at ON processed (delivered_at);
";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkOutcome {
    Inserted,
    AlreadyMarked,
}

/// Port for the dedup state.
///
/// A read error must surface as `Err`; callers must not treat it as "not seen".
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn is_delivered(&self, id: &NotificationId) -> Result<bool>;

    /// Idempotent: marking an existing id returns `AlreadyMarked`, not an error.
    async fn mark_delivered(&self, id: &NotificationId) -> Result<MarkOutcome>;

    async fn delivered_count(&self) -> Result<u64>;
}

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct StoreInner {
    sender: Mutex<mpsc::Sender<DbCommand>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Ok(sender) = self.sender.lock() {
                let _ = sender.send(DbCommand::Shutdown);
            }
            if handle.join().is_err() {
                tracing::error!("dedup store worker panicked");
            }
        }
    }
}

/// SQLite-backed dedup store.
#[derive(Clone)]
pub struct SqliteDedupStore {
    inner: Arc<StoreInner>,
}

impl SqliteDedupStore {
    /// Open (or create) the store. Safe to run on every start; never drops rows.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let path_for_thread = path.clone();

        let worker = thread::Builder::new()
            .name("sentinel-dedup".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(conn) => conn,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

                if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
                    tracing::warn!(error = %e, "failed to enable WAL mode");
                }

                if ready_tx.send(run_migrations(&mut conn)).is_err() {
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }
            })?;

        ready_rx
            .recv()
            .map_err(|_| Error::Storage("dedup worker exited before ready".to_string()))??;

        tracing::info!(path = %path.display(), "dedup store ready");

        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: Mutex::new(command_tx),
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = DbCommand::Execute(Box::new(move |conn| {
            let _ = reply_tx.send(task(conn));
        }));

        self.inner
            .sender
            .lock()
            .map_err(|_| Error::Storage("dedup sender poisoned".to_string()))?
            .send(command)
            .map_err(|_| Error::Storage("dedup worker is gone".to_string()))?;

        reply_rx
            .await
            .map_err(|_| Error::Storage("dedup worker dropped the request".to_string()))?
    }

    /// Delete entries delivered more than `days` ago. Returns removed rows.
    pub async fn prune_older_than(&self, days: u32) -> Result<usize> {
        let cutoff = (Utc::now() - ChronoDuration::days(i64::from(days))).to_rfc3339();
        self.execute(move |conn| {
            let n = conn.execute(
                "DELETE FROM processed WHERE delivered_at < ?1",
                params![cutoff],
            )?;
            Ok(n)
        })
        .await
    }
}

#[async_trait]
impl DedupStore for SqliteDedupStore {
    async fn is_delivered(&self, id: &NotificationId) -> Result<bool> {
        let id = id.0.clone();
        self.execute(move |conn| {
            let hit = conn
                .query_row(
                    "SELECT 1 FROM processed WHERE notif_id = ?1",
                    params![id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(hit.is_some())
        })
        .await
    }

    async fn mark_delivered(&self, id: &NotificationId) -> Result<MarkOutcome> {
        let id = id.0.clone();
        self.execute(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO processed (notif_id, delivered_at) VALUES (?1, ?2)",
                params![id, Utc::now().to_rfc3339()],
            )?;
            Ok(if inserted == 1 {
                MarkOutcome::Inserted
            } else {
                MarkOutcome::AlreadyMarked
            })
        })
        .await
    }

    async fn delivered_count(&self) -> Result<u64> {
        self.execute(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM processed", [], |row| row.get(0))?;
            Ok(u64::try_from(n).unwrap_or(0))
        })
        .await
    }
}

fn run_migrations(conn: &mut Connection) -> Result<()> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(Error::Storage(format!(
            "database version ({version}) is newer than supported schema ({CURRENT_SCHEMA_VERSION})"
        )));
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA_V1)?;
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn tmp_db(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        PathBuf::from(format!("/tmp/{prefix}-{}-{ts}.db", std::process::id()))
    }

    fn cleanup(path: &Path) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }

    #[tokio::test]
    async fn mark_then_seen() {
        let path = tmp_db("sentinel-dedup-basic");
        let store = SqliteDedupStore::open(&path).unwrap();
        let id = NotificationId::new("42");

        assert!(!store.is_delivered(&id).await.unwrap());
        assert_eq!(
            store.mark_delivered(&id).await.unwrap(),
            MarkOutcome::Inserted
        );
        assert!(store.is_delivered(&id).await.unwrap());
        assert_eq!(
            store.mark_delivered(&id).await.unwrap(),
            MarkOutcome::AlreadyMarked
        );
        assert_eq!(store.delivered_count().await.unwrap(), 1);

        drop(store);
        cleanup(&path);
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let path = tmp_db("sentinel-dedup-reopen");
        {
            let store = SqliteDedupStore::open(&path).unwrap();
            store
                .mark_delivered(&NotificationId::new("a"))
                .await
                .unwrap();
        }

        let store = SqliteDedupStore::open(&path).unwrap();
        assert!(store.is_delivered(&NotificationId::new("a")).await.unwrap());
        assert!(!store.is_delivered(&NotificationId::new("b")).await.unwrap());

        drop(store);
        cleanup(&path);
    }

    #[tokio::test]
    async fn concurrent_duplicate_marks_create_one_entry() {
        let path = tmp_db("sentinel-dedup-concurrent");
        let store = SqliteDedupStore::open(&path).unwrap();
        let id = NotificationId::new("dup");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(
                async move { store.mark_delivered(&id).await },
            ));
        }

        let mut inserted = 0;
        for h in handles {
            if h.await.unwrap().unwrap() == MarkOutcome::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(store.delivered_count().await.unwrap(), 1);

        drop(store);
        cleanup(&path);
    }

    #[tokio::test]
    async fn prune_keeps_recent_entries() {
        let path = tmp_db("sentinel-dedup-prune");
        let store = SqliteDedupStore::open(&path).unwrap();
        store
            .mark_delivered(&NotificationId::new("fresh"))
            .await
            .unwrap();

        let old = (Utc::now() - ChronoDuration::days(40)).to_rfc3339();
        store
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO processed (notif_id, delivered_at) VALUES ('old', ?1)",
                    params![old],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(store.prune_older_than(30).await.unwrap(), 1);
        assert!(store
            .is_delivered(&NotificationId::new("fresh"))
            .await
            .unwrap());
        assert!(!store.is_delivered(&NotificationId::new("old")).await.unwrap());

        drop(store);
        cleanup(&path);
    }
}
