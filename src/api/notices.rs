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
use crate::model::notice::{Audience, Notice, NoticePriority};
use crate::store::{Collection, Order, Query, RecordStore, from_document, to_document};
use crate::utils::pagination::{NoticePage, Page, fetch_page, page_window};
use crate::utils::patch::{FieldKind, FieldSpec, build_patch, field, is_variant, required};

const LABEL: &str = "Notice";

/// Non-admins only see notices for everyone or for their own role.
fn can_read(auth: &AuthUser, notice: &Notice) -> bool {
    auth.is_admin() || notice.audience == Audience::All || notice.audience == Audience::from(auth.role)
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct NoticeFilter {
    pub priority: Option<NoticePriority>,
    /// Admins only; everyone else gets their own audience plus `all`
    pub audience: Option<Audience>,
    /// Substring of title or content
    pub search: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/notices",
    params(NoticeFilter),
    responses((status = 200, description = "Notices visible to the caller, newest first", body = NoticePage)),
    security(("bearer_auth" = [])),
    tag = "Notices"
)]
pub async fn list_notices(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    filter: web::Query<NoticeFilter>,
) -> AppResult<HttpResponse> {
    let scope = if auth.is_admin() {
        Query::new().eq_opt("audience", filter.audience.map(|a| a.to_string()))
    } else {
        Query::new().one_of(
            "audience",
            vec![
                json!(Audience::All.as_ref()),
                json!(Audience::from(auth.role).as_ref()),
            ],
        )
    };

    let query = scope
        .eq_opt("priority", filter.priority.map(|p| p.to_string()))
        .contains(&["title", "content"], filter.search.as_deref())
        .sort_by("createdAt", Order::Desc);

    let page: Page<Notice> = fetch_page(
        store.get_ref(),
        Collection::Notices,
        query,
        page_window(filter.page, filter.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotice {
    #[schema(example = "Office closed on Friday")]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub priority: Option<NoticePriority>,
    #[serde(default)]
    pub audience: Option<Audience>,
}

#[utoipa::path(
    post,
    path = "/api/notices",
    request_body = CreateNotice,
    responses(
        (status = 201, description = "Notice published", body = Notice),
        (status = 400, description = "Missing title or content"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Notices"
)]
pub async fn create_notice(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    payload: web::Json<CreateNotice>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let title = required(&payload.title, "Title and content are required")?;
    let content = required(&payload.content, "Title and content are required")?;

    let now = Utc::now();
    let notice = Notice {
        id: Uuid::new_v4().to_string(),
        title: title.to_string(),
        content: content.to_string(),
        priority: payload.priority.unwrap_or(NoticePriority::Normal),
        audience: payload.audience.unwrap_or(Audience::All),
        created_by: auth.email.clone(),
        created_at: now,
        updated_at: now,
    };

    store.insert(Collection::Notices, to_document(&notice)?).await?;
    info!(notice_id = %notice.id, audience = %notice.audience, "Notice published");

    Ok(HttpResponse::Created().json(notice))
}

#[utoipa::path(
    get,
    path = "/api/notices/{id}",
    params(("id" = String, Path, description = "Notice id")),
    responses(
        (status = 200, description = "Notice", body = Notice),
        (status = 404, description = "Notice not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notices"
)]
pub async fn get_notice(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let notice: Notice = load(store.get_ref(), Collection::Notices, &path, LABEL).await?;
    if !can_read(&auth, &notice) {
        return Err(AppError::not_found("Notice not found"));
    }
    Ok(HttpResponse::Ok().json(notice))
}

const NOTICE_FIELDS: &[FieldSpec] = &[
    field("title", FieldKind::Text),
    field("content", FieldKind::Text),
    field("priority", FieldKind::Choice(is_variant::<NoticePriority>)),
    field("audience", FieldKind::Choice(is_variant::<Audience>)),
];

#[utoipa::path(
    put,
    path = "/api/notices/{id}",
    params(("id" = String, Path, description = "Notice id")),
    request_body(content = Object, description = "Partial update: title, content, priority, audience"),
    responses(
        (status = 200, description = "Updated notice", body = Notice),
        (status = 400, description = "Field cannot be updated"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Notice not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notices"
)]
pub async fn update_notice(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
    payload: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let patch = build_patch(&payload, NOTICE_FIELDS)?;
    let doc = updated(
        store.update(Collection::Notices, &path, None, patch).await?,
        LABEL,
    )?;

    let notice: Notice = from_document(doc)?;
    Ok(HttpResponse::Ok().json(notice))
}

#[utoipa::path(
    delete,
    path = "/api/notices/{id}",
    params(("id" = String, Path, description = "Notice id")),
    responses(
        (status = 200, description = "Notice deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Notice not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notices"
)]
pub async fn delete_notice(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    delete_one(store.get_ref(), Collection::Notices, &path, LABEL).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Notice deleted" })))
}
