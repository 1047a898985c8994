use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{delete_one, load, updated};
use crate::auth::auth::AuthUser;
use crate::errors::{AppError, AppResult};
use crate::model::account::account_key;
use crate::model::role::Role;
use crate::model::vendor_project::{ProjectStatus, VendorProject};
use crate::store::{Collection, Order, Query, RecordStore, from_document, to_document};
use crate::utils::pagination::{Page, VendorProjectPage, fetch_page, page_window};
use crate::utils::patch::{FieldKind, FieldSpec, build_patch, field, is_variant, required};

const LABEL: &str = "Project";

fn ensure_owner(auth: &AuthUser, project: &VendorProject) -> AppResult<()> {
    if auth.is_admin() || project.vendor_email == account_key(&auth.email) {
        Ok(())
    } else {
        Err(AppError::forbidden("You can only manage your own projects"))
    }
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ProjectFilter {
    pub vendor_email: Option<String>,
    pub status: Option<ProjectStatus>,
    pub category: Option<String>,
    /// Substring of title or description
    pub search: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// Vendors list their own packages; everyone else browses active ones.
#[utoipa::path(
    get,
    path = "/api/vendor-projects",
    params(ProjectFilter),
    responses((status = 200, description = "Vendor projects, newest first", body = VendorProjectPage)),
    security(("bearer_auth" = [])),
    tag = "Vendor projects"
)]
pub async fn list_projects(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    filter: web::Query<ProjectFilter>,
) -> AppResult<HttpResponse> {
    let base = match auth.role {
        Role::Vendor => Query::new()
            .eq("vendorEmail", account_key(&auth.email))
            .eq_opt("status", filter.status.map(|s| s.to_string())),
        Role::Admin => Query::new()
            .eq_opt("vendorEmail", filter.vendor_email.as_deref().map(account_key))
            .eq_opt("status", filter.status.map(|s| s.to_string())),
        Role::Client | Role::Employee => Query::new()
            .eq_opt("vendorEmail", filter.vendor_email.as_deref().map(account_key))
            .eq("status", ProjectStatus::Active.to_string()),
    };

    let query = base
        .eq_opt("category", filter.category.clone())
        .contains(&["title", "description"], filter.search.as_deref())
        .sort_by("createdAt", Order::Desc);

    let page: Page<VendorProject> = fetch_page(
        store.get_ref(),
        Collection::VendorProjects,
        query,
        page_window(filter.page, filter.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProject {
    #[schema(example = "Shift cover package")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    #[schema(example = "Healthcare")]
    pub category: String,
    #[schema(example = 1500.0)]
    pub price: f64,
    #[serde(default)]
    #[schema(example = 14)]
    pub delivery_days: u32,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    /// Admins only
    #[serde(default)]
    pub vendor_email: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/vendor-projects",
    request_body = CreateProject,
    responses(
        (status = 201, description = "Project created", body = VendorProject),
        (status = 400, description = "Missing title or invalid price"),
        (status = 403, description = "Vendors only")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor projects"
)]
pub async fn create_project(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    payload: web::Json<CreateProject>,
) -> AppResult<HttpResponse> {
    auth.require_any(&[Role::Vendor])?;

    let vendor_email = if auth.is_admin() {
        payload
            .vendor_email
            .as_deref()
            .map(account_key)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AppError::validation("vendorEmail is required"))?
    } else {
        account_key(&auth.email)
    };

    let title = required(&payload.title, "Title and price are required")?;
    if !payload.price.is_finite() || payload.price < 0.0 {
        return Err(AppError::validation("Price must be a non-negative number"));
    }

    let now = Utc::now();
    let project = VendorProject {
        id: Uuid::new_v4().to_string(),
        vendor_email,
        title: title.to_string(),
        description: payload.description.clone(),
        category: payload.category.clone(),
        price: payload.price,
        delivery_days: payload.delivery_days,
        status: payload.status.unwrap_or(ProjectStatus::Active),
        created_at: now,
        updated_at: now,
    };

    store
        .insert(Collection::VendorProjects, to_document(&project)?)
        .await?;
    info!(project_id = %project.id, vendor = %project.vendor_email, "Vendor project created");

    Ok(HttpResponse::Created().json(project))
}

#[utoipa::path(
    get,
    path = "/api/vendor-projects/{id}",
    params(("id" = String, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project", body = VendorProject),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor projects"
)]
pub async fn get_project(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let project: VendorProject =
        load(store.get_ref(), Collection::VendorProjects, &path, LABEL).await?;

    // inactive packages are only visible to their owner
    if project.status != ProjectStatus::Active {
        ensure_owner(&auth, &project).map_err(|_| AppError::not_found("Project not found"))?;
    }
    Ok(HttpResponse::Ok().json(project))
}

const PROJECT_FIELDS: &[FieldSpec] = &[
    field("title", FieldKind::Text),
    field("description", FieldKind::OptionalText),
    field("category", FieldKind::OptionalText),
    field("price", FieldKind::Number),
    field("deliveryDays", FieldKind::Count),
    field("status", FieldKind::Choice(is_variant::<ProjectStatus>)),
];

#[utoipa::path(
    put,
    path = "/api/vendor-projects/{id}",
    params(("id" = String, Path, description = "Project id")),
    request_body(content = Object, description = "Partial update: title, description, category, price, deliveryDays, status"),
    responses(
        (status = 200, description = "Updated project", body = VendorProject),
        (status = 400, description = "Field cannot be updated"),
        (status = 403, description = "Not your project"),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor projects"
)]
pub async fn update_project(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
    payload: web::Json<Value>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let project: VendorProject = load(store.get_ref(), Collection::VendorProjects, &id, LABEL).await?;
    ensure_owner(&auth, &project)?;

    let patch = build_patch(&payload, PROJECT_FIELDS)?;
    let doc = updated(
        store
            .update(Collection::VendorProjects, &id, None, patch)
            .await?,
        LABEL,
    )?;

    let project: VendorProject = from_document(doc)?;
    Ok(HttpResponse::Ok().json(project))
}

#[utoipa::path(
    delete,
    path = "/api/vendor-projects/{id}",
    params(("id" = String, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project deleted"),
        (status = 403, description = "Not your project"),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Vendor projects"
)]
pub async fn delete_project(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let project: VendorProject = load(store.get_ref(), Collection::VendorProjects, &id, LABEL).await?;
    ensure_owner(&auth, &project)?;

    delete_one(store.get_ref(), Collection::VendorProjects, &id, LABEL).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Project deleted" })))
}
