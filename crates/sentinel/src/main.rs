use std::sync::Arc;

use sentinel_core::{config::Config, dedup::SqliteDedupStore};
use sentinel_source::SiteClient;

#[tokio::main]
async fn main() -> Result<(), sentinel_core::Error> {
    sentinel_core::logging::init("sentinel")?;

    let cfg = Arc::new(Config::load()?);

    let source = Arc::new(SiteClient::new(
        cfg.notifications_url(),
        cfg.request_timeout,
    )?);

    let dedup = SqliteDedupStore::open(cfg.db_file.clone())?;
    if let Some(days) = cfg.dedup_retention_days {
        match dedup.prune_older_than(days).await {
            Ok(removed) => tracing::info!(removed, days, "pruned old dedup entries"),
            Err(e) => tracing::warn!(error = %e, "dedup prune failed"),
        }
    }

    sentinel_telegram::router::run_polling(cfg, source, Arc::new(dedup))
        .await
        .map_err(|e| sentinel_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
