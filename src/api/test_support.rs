use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::http::{Method, header};
use actix_web::test::TestRequest;
use chrono::NaiveDate;

use crate::AppState;
use crate::api::users::{insert_account, new_account};
use crate::auth::auth::AuthUser;
use crate::auth::jwt::generate_access_token;
use crate::config::{Config, StoreBackend};
use crate::model::account::Account;
use crate::model::role::Role;
use crate::store::memory::MemoryStore;

pub const PEER: &str = "127.0.0.1:40000";

pub fn test_config() -> Config {
    Config {
        server_addr: "127.0.0.1:0".into(),
        store_backend: StoreBackend::Memory,
        database_url: None,
        jwt_secret: "test-secret-with-enough-entropy".into(),
        access_token_ttl: 900,
        refresh_token_ttl: 3600,
        rate_login_per_min: 10_000,
        rate_register_per_min: 10_000,
        rate_refresh_per_min: 10_000,
        rate_public_per_min: 10_000,
        rate_protected_per_min: 10_000,
        api_prefix: "/api".into(),
        log_dir: "logs".into(),
        attendance_window_days: 3,
        admin_email: None,
        admin_password: None,
    }
}

pub fn test_state() -> AppState {
    AppState::new(Arc::new(MemoryStore::new()), test_config()).unwrap()
}

/// Inserts a passwordless account of `role`.
pub async fn seed_account(state: &AppState, email: &str, role: Role) -> Account {
    let account = new_account(email, email.split('@').next().unwrap_or(email), role);
    insert_account(state.store.as_ref(), &state.filter, &account, None)
        .await
        .unwrap();
    account
}

pub async fn seed_employee(state: &AppState, email: &str, join_date: NaiveDate) -> Account {
    let mut account = new_account(email, "Staff Member", Role::Employee);
    account.join_date = Some(join_date);
    insert_account(state.store.as_ref(), &state.filter, &account, None)
        .await
        .unwrap();
    account
}

pub fn token_for(state: &AppState, account: &Account) -> String {
    let user = AuthUser {
        user_id: account.id.clone(),
        email: account.email.clone(),
        name: account.name.clone(),
        role: account.user_type,
    };
    generate_access_token(&user, &state.config.jwt_secret, state.config.access_token_ttl).unwrap()
}

/// Request with a peer address, which the rate limiter keys on.
pub fn request(method: Method, uri: &str) -> TestRequest {
    let peer: SocketAddr = PEER.parse().unwrap();
    TestRequest::default().method(method).uri(uri).peer_addr(peer)
}

pub fn authed(method: Method, uri: &str, token: &str) -> TestRequest {
    request(method, uri).insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
}
