use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use autoscale_cuckoo_filter::CuckooFilter;
use serde_json::Value;

use crate::model::account::account_key;
use crate::store::{Collection, Query, RecordStore};

/// Expected capacity and false-positive rate.
/// Tune these based on real account counts.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Fast negative lookup for account emails. A miss means the email is
/// certainly unused; a hit still has to be confirmed. Until the warmup has
/// loaded existing accounts every lookup is a hit.
pub struct EmailFilter {
    inner: RwLock<CuckooFilter<String>>,
    warm: AtomicBool,
}

impl Default for EmailFilter {
    fn default() -> Self {
        Self {
            inner: RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)),
            warm: AtomicBool::new(false),
        }
    }
}

impl EmailFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// False positives possible. A cold filter or a poisoned lock answers
    /// "maybe".
    pub fn might_exist(&self, email: &str) -> bool {
        if !self.is_warm() {
            return true;
        }
        let email = account_key(email);
        self.inner
            .read()
            .map(|filter| filter.contains(&email))
            .unwrap_or(true)
    }

    pub fn insert(&self, email: &str) {
        let email = account_key(email);
        if let Ok(mut filter) = self.inner.write() {
            filter.add(&email);
        }
    }

    pub fn remove(&self, email: &str) {
        let email = account_key(email);
        if let Ok(mut filter) = self.inner.write() {
            filter.remove(&email);
        }
    }

    pub fn is_warm(&self) -> bool {
        self.warm.load(Ordering::Acquire)
    }

    fn mark_warm(&self) {
        self.warm.store(true, Ordering::Release);
    }

    /// Insert a batch of normalized emails
    fn insert_batch(&self, emails: &[String]) {
        if let Ok(mut filter) = self.inner.write() {
            for email in emails {
                filter.add(email);
            }
        }
    }
}

/// Loads every account email into the filter, `batch_size` at a time.
pub async fn warmup_email_filter(
    filter: &EmailFilter,
    store: &dyn RecordStore,
    batch_size: usize,
) -> Result<()> {
    let accounts = store.find(Collection::Users, &Query::new()).await?;

    let emails: Vec<String> = accounts
        .iter()
        .filter_map(|doc| doc.get("email").and_then(Value::as_str))
        .map(account_key)
        .collect();

    for batch in emails.chunks(batch_size.max(1)) {
        filter.insert_batch(batch);
    }

    filter.mark_warm();
    log::info!("Email filter warmup complete: {} accounts", emails.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[test]
    fn cold_filter_answers_maybe() {
        let filter = EmailFilter::new();
        assert!(!filter.is_warm());
        assert!(filter.might_exist("anyone@acme.co.uk"));
    }

    #[actix_web::test]
    async fn warmup_loads_existing_accounts() {
        let store = MemoryStore::new();
        let doc = serde_json::json!({ "id": "u1", "email": "Old@Acme.co.uk" });
        store
            .insert(Collection::Users, doc.as_object().cloned().unwrap())
            .await
            .unwrap();

        let filter = EmailFilter::new();
        warmup_email_filter(&filter, &store, 10).await.unwrap();
        assert!(filter.is_warm());
        assert!(filter.might_exist("old@acme.co.uk"));
        assert!(!filter.might_exist("new@acme.co.uk"));
    }

    #[actix_web::test]
    async fn lookups_ignore_case() {
        let filter = EmailFilter::new();
        warmup_email_filter(&filter, &MemoryStore::new(), 10).await.unwrap();
        assert!(!filter.might_exist("jane@acme.co.uk"));

        filter.insert("Jane@Acme.co.uk");
        assert!(filter.might_exist("jane@acme.co.uk"));

        filter.remove("JANE@acme.co.uk");
        assert!(!filter.might_exist("jane@acme.co.uk"));
    }
}
