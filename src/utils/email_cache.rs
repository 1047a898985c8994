use std::time::Duration;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use moka::future::Cache;
use serde_json::Value;

use crate::model::account::account_key;
use crate::store::{Collection, Order, Query, RecordStore};

/// Registered (password-holding) account emails. Only taken emails are
/// stored; a miss says nothing.
#[derive(Clone)]
pub struct EmailCache {
    inner: Cache<String, bool>,
}

impl Default for EmailCache {
    fn default() -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(500_000) // tune based on memory
                .time_to_live(Duration::from_secs(86400)) // 24h TTL
                .build(),
        }
    }
}

impl EmailCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_taken(&self, email: &str) {
        self.inner.insert(account_key(email), true).await;
    }

    pub async fn is_taken(&self, email: &str) -> bool {
        self.inner.get(&account_key(email)).await.unwrap_or(false)
    }

    pub async fn forget(&self, email: &str) {
        self.inner.invalidate(&account_key(email)).await;
    }

    async fn batch_mark(&self, emails: &[String]) {
        let futures: Vec<_> = emails
            .iter()
            .map(|e| self.inner.insert(account_key(e), true))
            .collect();

        // Await all insertions concurrently
        futures::future::join_all(futures).await;
    }
}

/// Marks accounts that logged in during the last `days` days as taken.
pub async fn warmup_email_cache(
    cache: &EmailCache,
    store: &dyn RecordStore,
    days: i64,
    batch_size: usize,
) -> Result<()> {
    let since = (Utc::now() - chrono::Duration::days(days))
        .to_rfc3339_opts(SecondsFormat::AutoSi, true);
    let query = Query::new()
        .range("lastLoginAt", Some(&since), None)
        .sort_by("lastLoginAt", Order::Desc);

    let recent = store.find(Collection::Users, &query).await?;
    let emails: Vec<String> = recent
        .iter()
        .filter(|doc| doc.get("passwordHash").is_some_and(|h| !h.is_null()))
        .filter_map(|doc| doc.get("email").and_then(Value::as_str))
        .map(str::to_string)
        .collect();

    for batch in emails.chunks(batch_size.max(1)) {
        cache.batch_mark(batch).await;
    }

    log::info!(
        "Email cache warmup complete: {} recent accounts (last {} days)",
        emails.len(),
        days
    );
    Ok(())
}
