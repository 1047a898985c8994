use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::users::{insert_account, new_account};
use crate::auth::auth::AuthUser;
use crate::errors::{AppError, AppResult};
use crate::model::account::account_key;
use crate::model::connection::{Connection, connection_key};
use crate::model::role::Role;
use crate::store::{
    Collection, InsertOutcome, Order, Query, RecordStore, document_id, from_document, to_document,
};
use crate::utils::email_filter::EmailFilter;
use crate::utils::pagination::{ConnectionPage, Page, fetch_page, page_window};
use crate::utils::patch::{looks_like_email, required};

/// Vendor whose connections the caller manages. Vendors always act for
/// themselves; admins must name one.
fn vendor_scope(auth: &AuthUser, requested: Option<&str>) -> AppResult<String> {
    match auth.role {
        Role::Vendor => Ok(account_key(&auth.email)),
        Role::Admin => requested
            .map(account_key)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AppError::validation("vendorEmail is required")),
        _ => Err(AppError::forbidden("Only vendors manage connections")),
    }
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ConnectionFilter {
    /// Admins only; vendors always see their own
    pub vendor_email: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Substring of the connected email or notes
    pub search: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/connections",
    params(ConnectionFilter),
    responses(
        (status = 200, description = "Connections, newest first", body = ConnectionPage),
        (status = 403, description = "Employees have no connections")
    ),
    security(("bearer_auth" = [])),
    tag = "Connections"
)]
pub async fn list_connections(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    filter: web::Query<ConnectionFilter>,
) -> AppResult<HttpResponse> {
    let query = match auth.role {
        Role::Vendor => Query::new().eq("vendorEmail", account_key(&auth.email)),
        Role::Client => Query::new().eq("userEmail", account_key(&auth.email)),
        Role::Admin => {
            Query::new().eq_opt("vendorEmail", filter.vendor_email.as_deref().map(account_key))
        }
        Role::Employee => return Err(AppError::forbidden("Not allowed for this account type")),
    }
    .eq_opt("type", filter.kind.clone())
    .contains(&["userEmail", "notes"], filter.search.as_deref())
    .sort_by("createdAt", Order::Desc);

    let page: Page<Connection> = fetch_page(
        store.get_ref(),
        Collection::VendorConnections,
        query,
        page_window(filter.page, filter.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnection {
    #[schema(example = "sam@northcare.co.uk")]
    pub user_email: String,
    /// Used when the account does not exist yet
    #[serde(default)]
    #[schema(example = "Sam Patel")]
    pub name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, rename = "type")]
    #[schema(example = "client")]
    pub kind: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Admins only
    #[serde(default)]
    pub vendor_email: Option<String>,
}

/// Links a client to the vendor, creating a passwordless client account
/// when the email is new. Adding an existing link returns it unchanged.
#[utoipa::path(
    post,
    path = "/api/connections",
    request_body = CreateConnection,
    responses(
        (status = 201, description = "Connection created", body = Connection),
        (status = 200, description = "Connection already existed", body = Connection),
        (status = 400, description = "Missing userEmail"),
        (status = 403, description = "Only vendors manage connections")
    ),
    security(("bearer_auth" = [])),
    tag = "Connections"
)]
pub async fn create_connection(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    filter: web::Data<EmailFilter>,
    payload: web::Json<CreateConnection>,
) -> AppResult<HttpResponse> {
    let vendor_email = vendor_scope(&auth, payload.vendor_email.as_deref())?;
    let user_email = account_key(required(&payload.user_email, "userEmail is required")?);
    if !looks_like_email(&user_email) {
        return Err(AppError::validation("A valid userEmail is required"));
    }
    if user_email == vendor_email {
        return Err(AppError::validation("A vendor cannot connect to itself"));
    }

    // make sure the other side has an account
    if store
        .find_by_key(Collection::Users, &user_email)
        .await?
        .is_none()
    {
        let name = payload
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&user_email);
        let mut account = new_account(&user_email, name, Role::Client);
        account.company = payload.company.clone();
        account.phone = payload.phone.clone();

        if let InsertOutcome::Inserted(_) =
            insert_account(store.get_ref(), &filter, &account, None).await?
        {
            info!(email = %user_email, "Passwordless client account created");
        }
    }

    let now = Utc::now();
    let connection = Connection {
        id: Uuid::new_v4().to_string(),
        vendor_email: vendor_email.clone(),
        user_email: user_email.clone(),
        kind: payload.kind.clone().unwrap_or_else(|| "client".to_string()),
        notes: payload.notes.clone().unwrap_or_default(),
        created_at: now,
        updated_at: now,
    };

    match store
        .insert_unique(
            Collection::VendorConnections,
            &connection_key(&vendor_email, &user_email),
            to_document(&connection)?,
        )
        .await?
    {
        InsertOutcome::Inserted(_) => {
            info!(vendor = %vendor_email, user = %user_email, "Connection added");
            Ok(HttpResponse::Created().json(connection))
        }
        InsertOutcome::Exists(existing) => {
            debug!(vendor = %vendor_email, user = %user_email, "Connection already exists");
            let existing: Connection = from_document(existing)?;
            Ok(HttpResponse::Ok().json(existing))
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ConnectionRef {
    pub user_email: String,
    /// Admins only
    pub vendor_email: Option<String>,
}

/// Removes the link only; both accounts stay.
#[utoipa::path(
    delete,
    path = "/api/connections",
    params(ConnectionRef),
    responses(
        (status = 200, description = "Connection removed"),
        (status = 403, description = "Only vendors manage connections"),
        (status = 404, description = "Connection not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Connections"
)]
pub async fn delete_connection(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    target: web::Query<ConnectionRef>,
) -> AppResult<HttpResponse> {
    let vendor_email = vendor_scope(&auth, target.vendor_email.as_deref())?;
    let key = connection_key(&vendor_email, &target.user_email);

    let doc = store
        .find_by_key(Collection::VendorConnections, &key)
        .await?
        .ok_or_else(|| AppError::not_found("Connection not found"))?;
    let id = document_id(&doc)?.to_string();

    super::delete_one(store.get_ref(), Collection::VendorConnections, &id, "Connection").await?;
    info!(vendor = %vendor_email, user = %account_key(&target.user_email), "Connection removed");

    Ok(HttpResponse::Ok().json(json!({ "message": "Connection removed" })))
}
