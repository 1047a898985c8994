use std::sync::Arc;

use anyhow::{Context, anyhow};
use tracing::{info, warn};

use crate::api::users::{insert_account, new_account};
use crate::auth::password::hash_password;
use crate::config::{Config, StoreBackend};
use crate::model::role::Role;
use crate::store::memory::MemoryStore;
use crate::store::mysql::MySqlStore;
use crate::store::{InsertOutcome, RecordStore};
use crate::utils::email_filter::EmailFilter;

pub async fn init_store(config: &Config) -> anyhow::Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match config.store_backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Mysql => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set when STORE_BACKEND=mysql")?;
            Arc::new(
                MySqlStore::connect(url)
                    .await
                    .context("Failed to connect to database")?,
            )
        }
    };

    info!(backend = store.backend(), "Record store ready");
    Ok(store)
}

/// Creates the bootstrap admin from `ADMIN_EMAIL`/`ADMIN_PASSWORD`. Admins
/// cannot self-register, so without this a fresh install has no admin.
pub async fn seed_admin(
    store: &dyn RecordStore,
    filter: &EmailFilter,
    config: &Config,
) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };

    let hash =
        hash_password(password).map_err(|e| anyhow!("Failed to hash admin password: {e}"))?;
    let account = new_account(email, "Administrator", Role::Admin);

    match insert_account(store, filter, &account, Some(&hash)).await? {
        InsertOutcome::Inserted(_) => info!(email = %account.email, "Seeded admin account"),
        InsertOutcome::Exists(_) => info!(email = %account.email, "Admin account already present"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_config;
    use crate::store::{Collection, Query};

    #[actix_web::test]
    async fn admin_is_seeded_once() {
        let store = MemoryStore::new();
        let filter = EmailFilter::new();
        crate::utils::email_filter::warmup_email_filter(&filter, &store, 10)
            .await
            .unwrap();
        let mut config = test_config();
        config.admin_email = Some("Boss@Agency.test".into());
        config.admin_password = Some("correct horse".into());

        seed_admin(&store, &filter, &config).await.unwrap();
        seed_admin(&store, &filter, &config).await.unwrap();

        let admins = store
            .find(Collection::Users, &Query::new().eq("userType", "Admin"))
            .await
            .unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0]["email"], "boss@agency.test");
        assert!(filter.might_exist("boss@agency.test"));
    }

    #[actix_web::test]
    async fn nothing_seeded_without_credentials() {
        let store = MemoryStore::new();
        seed_admin(&store, &EmailFilter::new(), &test_config()).await.unwrap();
        assert_eq!(store.count(Collection::Users, &Query::new()).await.unwrap(), 0);
    }
}
