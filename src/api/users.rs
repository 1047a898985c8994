use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{delete_one, load, updated};
use crate::auth::{auth::AuthUser, password::hash_password};
use crate::errors::{AppError, AppResult};
use crate::model::account::{Account, account_key};
use crate::model::role::Role;
use crate::store::{
    Collection, InsertOutcome, Order, Query, RecordStore, StoreError, from_document, to_document,
};
use crate::utils::email_cache::EmailCache;
use crate::utils::email_filter::EmailFilter;
use crate::utils::pagination::{AccountPage, Page, fetch_page, page_window};
use crate::utils::patch::{
    FieldKind, FieldSpec, build_patch, field, is_variant, looks_like_email, required,
};

pub fn new_account(email: &str, name: &str, user_type: Role) -> Account {
    let now = Utc::now();
    Account {
        id: Uuid::new_v4().to_string(),
        email: account_key(email),
        name: name.trim().to_string(),
        user_type,
        company: None,
        phone: None,
        notes: None,
        join_date: None,
        created_at: now,
        updated_at: now,
    }
}

/// Inserts an account unless its email is already used. New emails go
/// into the availability filter.
pub async fn insert_account(
    store: &dyn RecordStore,
    filter: &EmailFilter,
    account: &Account,
    password_hash: Option<&str>,
) -> Result<InsertOutcome, StoreError> {
    let mut doc = to_document(account)?;
    if let Some(hash) = password_hash {
        doc.insert("passwordHash".into(), json!(hash));
    }

    let outcome = store
        .insert_unique(Collection::Users, &account_key(&account.email), doc)
        .await?;
    if matches!(outcome, InsertOutcome::Inserted(_)) {
        filter.insert(&account.email);
    }
    Ok(outcome)
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AccountFilter {
    /// Client, Vendor, Employee or Admin
    pub user_type: Option<Role>,
    pub email: Option<String>,
    /// Substring of name, email or company
    pub search: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/users",
    params(AccountFilter),
    responses(
        (status = 200, description = "Accounts sorted by name", body = AccountPage),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_accounts(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    filter: web::Query<AccountFilter>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let query = Query::new()
        .eq_opt("userType", filter.user_type.map(|r| r.to_string()))
        .eq_opt("email", filter.email.as_deref().map(account_key))
        .contains(&["name", "email", "company"], filter.search.as_deref())
        .sort_by("name", Order::Asc);

    let page: Page<Account> = fetch_page(
        store.get_ref(),
        Collection::Users,
        query,
        page_window(filter.page, filter.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccount {
    #[schema(example = "sam@northcare.co.uk")]
    pub email: String,
    #[schema(example = "Sam Patel")]
    pub name: String,
    pub user_type: Role,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>, format = "date", example = "2026-02-01")]
    pub join_date: Option<NaiveDate>,
    /// Leave empty to let the owner claim the account by registering.
    #[serde(default)]
    pub password: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateAccount,
    responses(
        (status = 201, description = "Account created", body = Account),
        (status = 400, description = "Missing email or name"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Email already used")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn create_account(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    filter: web::Data<EmailFilter>,
    cache: web::Data<EmailCache>,
    payload: web::Json<CreateAccount>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let name = required(&payload.name, "Email and name are required")?;
    let email = account_key(required(&payload.email, "Email and name are required")?);
    if !looks_like_email(&email) {
        return Err(AppError::validation("A valid email is required"));
    }

    let mut account = new_account(&email, name, payload.user_type);
    account.company = payload.company.clone();
    account.phone = payload.phone.clone();
    account.notes = payload.notes.clone();
    account.join_date = payload.join_date;

    let password_hash = payload
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(hash_password)
        .transpose()?;

    match insert_account(store.get_ref(), &filter, &account, password_hash.as_deref()).await? {
        InsertOutcome::Inserted(_) => {
            if password_hash.is_some() {
                cache.mark_taken(&email).await;
            }
            info!(account_id = %account.id, user_type = %account.user_type, "Account created");
            Ok(HttpResponse::Created().json(account))
        }
        InsertOutcome::Exists(_) => Err(AppError::conflict(
            "An account with this email already exists",
        )),
    }
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account", body = Account),
        (status = 403, description = "Not your account"),
        (status = 404, description = "Account not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_account(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    if !auth.is_admin() && auth.user_id != id {
        return Err(AppError::forbidden("You can only view your own account"));
    }

    let account: Account = load(store.get_ref(), Collection::Users, &id, "Account").await?;
    Ok(HttpResponse::Ok().json(account))
}

const SELF_FIELDS: &[FieldSpec] = &[
    field("name", FieldKind::Text),
    field("company", FieldKind::OptionalText),
    field("phone", FieldKind::OptionalText),
];

const ADMIN_FIELDS: &[FieldSpec] = &[
    field("name", FieldKind::Text),
    field("company", FieldKind::OptionalText),
    field("phone", FieldKind::OptionalText),
    field("notes", FieldKind::OptionalText),
    field("joinDate", FieldKind::OptionalDate),
    field("userType", FieldKind::Choice(is_variant::<Role>)),
];

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "Account id")),
    request_body(content = Object, description = "Partial update: name, company, phone; admins also notes, joinDate, userType"),
    responses(
        (status = 200, description = "Updated account", body = Account),
        (status = 400, description = "Field cannot be updated"),
        (status = 403, description = "Not your account"),
        (status = 404, description = "Account not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_account(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
    payload: web::Json<Value>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let fields = if auth.is_admin() {
        ADMIN_FIELDS
    } else if auth.user_id == id {
        SELF_FIELDS
    } else {
        return Err(AppError::forbidden("You can only update your own account"));
    };

    let patch = build_patch(&payload, fields)?;
    let doc = updated(
        store.update(Collection::Users, &id, None, patch).await?,
        "Account",
    )?;

    let account: Account = from_document(doc)?;
    Ok(HttpResponse::Ok().json(account))
}

/// Connections that mention the account are left in place.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Account not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn delete_account(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    filter: web::Data<EmailFilter>,
    cache: web::Data<EmailCache>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let account: Account = load(store.get_ref(), Collection::Users, &id, "Account").await?;
    delete_one(store.get_ref(), Collection::Users, &id, "Account").await?;

    filter.remove(&account.email);
    cache.forget(&account.email).await;
    info!(account_id = %id, "Account deleted");

    Ok(HttpResponse::Ok().json(json!({ "message": "Account deleted" })))
}
