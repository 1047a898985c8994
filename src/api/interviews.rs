use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::{Value, json};
use utoipa::IntoParams;

use super::{StatusUpdate, delete_one, load, update_with_status};
use crate::auth::auth::AuthUser;
use crate::errors::{AppError, AppResult};
use crate::lifecycle::InterviewStatus;
use crate::lifecycle::workflow::{StatusChange, set_status};
use crate::model::account::account_key;
use crate::model::interview::{Interview, InterviewType};
use crate::model::job::Job;
use crate::model::role::Role;
use crate::store::{Collection, Order, Query, RecordStore, from_document};
use crate::utils::pagination::{InterviewPage, Page, fetch_page, page_window};
use crate::utils::patch::{FieldKind, FieldSpec, field, is_variant};

const LABEL: &str = "Interview";

async fn own_job_ids(auth: &AuthUser, store: &dyn RecordStore) -> AppResult<Vec<Value>> {
    let jobs = store
        .find(
            Collection::Jobs,
            &Query::new().eq("postedBy", account_key(&auth.email)),
        )
        .await?;
    Ok(jobs.into_iter().filter_map(|j| j.get("id").cloned()).collect())
}

async fn ensure_access(auth: &AuthUser, store: &dyn RecordStore, interview: &Interview) -> AppResult<()> {
    if auth.is_admin() {
        return Ok(());
    }
    let owns = auth.role == Role::Client
        && store
            .get(Collection::Jobs, &interview.job_id)
            .await?
            .map(from_document::<Job>)
            .transpose()?
            .is_some_and(|job| job.posted_by == account_key(&auth.email));
    if owns {
        Ok(())
    } else {
        Err(AppError::forbidden("You can only manage interviews for your own jobs"))
    }
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct InterviewFilter {
    pub job_id: Option<String>,
    /// Application id
    pub candidate_id: Option<String>,
    #[param(example = "scheduled")]
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<InterviewType>,
    /// Interviews on or after (YYYY-MM-DD)
    pub from: Option<String>,
    /// Interviews on or before (YYYY-MM-DD)
    pub to: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// Calendar view: soonest first.
#[utoipa::path(
    get,
    path = "/api/interviews",
    params(InterviewFilter),
    responses(
        (status = 200, description = "Interviews by date with status counts", body = InterviewPage),
        (status = 403, description = "Admins and clients only")
    ),
    security(("bearer_auth" = [])),
    tag = "Interviews"
)]
pub async fn list_interviews(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    filter: web::Query<InterviewFilter>,
) -> AppResult<HttpResponse> {
    let scope = match auth.role {
        Role::Admin => Query::new(),
        Role::Client => Query::new().one_of("jobId", own_job_ids(&auth, store.get_ref()).await?),
        _ => return Err(AppError::forbidden("Not allowed for this account type")),
    };

    let query = scope
        .eq_opt("jobId", filter.job_id.clone())
        .eq_opt("candidateId", filter.candidate_id.clone())
        .eq_opt("status", filter.status.clone())
        .eq_opt("type", filter.kind.map(|k| k.as_ref().to_string()))
        .range("date", filter.from.as_deref(), filter.to.as_deref())
        .sort_by("date", Order::Asc);

    let page: Page<Interview> = fetch_page(
        store.get_ref(),
        Collection::Interviews,
        query.clone(),
        page_window(filter.page, filter.per_page),
    )
    .await?
    .with_counts::<InterviewStatus>(store.get_ref(), Collection::Interviews, &query)
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/interviews/{id}",
    params(("id" = String, Path, description = "Interview id")),
    responses(
        (status = 200, description = "Interview", body = Interview),
        (status = 403, description = "Not an interview for your job"),
        (status = 404, description = "Interview not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Interviews"
)]
pub async fn get_interview(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let interview: Interview = load(store.get_ref(), Collection::Interviews, &path, LABEL).await?;
    ensure_access(&auth, store.get_ref(), &interview).await?;
    Ok(HttpResponse::Ok().json(interview))
}

const INTERVIEW_FIELDS: &[FieldSpec] = &[
    field("date", FieldKind::Date),
    field("time", FieldKind::Time),
    field("duration", FieldKind::Count),
    field("type", FieldKind::Choice(is_variant::<InterviewType>)),
    field("location", FieldKind::OptionalText),
    field("meetingLink", FieldKind::OptionalText),
    field("interviewer", FieldKind::Text),
    field("interviewerEmail", FieldKind::OptionalText),
    field("notes", FieldKind::OptionalText),
    field("agenda", FieldKind::OptionalText),
];

/// Edits the interview record only; the copy on the application is not
/// rewritten.
#[utoipa::path(
    put,
    path = "/api/interviews/{id}",
    params(("id" = String, Path, description = "Interview id")),
    request_body(content = Object, description = "Partial update of interview fields and/or status"),
    responses(
        (status = 200, description = "Updated interview", body = Interview),
        (status = 400, description = "Field cannot be updated"),
        (status = 404, description = "Interview not found"),
        (status = 409, description = "Transition not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Interviews"
)]
pub async fn update_interview(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
    payload: web::Json<Value>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let interview: Interview = load(store.get_ref(), Collection::Interviews, &id, LABEL).await?;
    ensure_access(&auth, store.get_ref(), &interview).await?;

    let doc = update_with_status::<InterviewStatus>(
        store.get_ref(),
        Collection::Interviews,
        LABEL,
        &id,
        &payload,
        INTERVIEW_FIELDS,
        &auth,
        None,
    )
    .await?;

    let interview: Interview = from_document(doc)?;
    Ok(HttpResponse::Ok().json(interview))
}

#[utoipa::path(
    put,
    path = "/api/interviews/{id}/status",
    params(("id" = String, Path, description = "Interview id")),
    request_body = StatusUpdate,
    responses(
        (status = 200, description = "Interview with its new status", body = Interview),
        (status = 400, description = "Unknown status"),
        (status = 404, description = "Interview not found"),
        (status = 409, description = "Transition not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Interviews"
)]
pub async fn set_interview_status(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
    payload: web::Json<StatusUpdate>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let interview: Interview = load(store.get_ref(), Collection::Interviews, &id, LABEL).await?;
    ensure_access(&auth, store.get_ref(), &interview).await?;

    let doc = set_status::<InterviewStatus>(
        store.get_ref(),
        StatusChange {
            collection: Collection::Interviews,
            label: LABEL,
            id: &id,
            target: &payload.status,
            force: payload.force,
            actor: auth.role,
        },
    )
    .await?;

    let interview: Interview = from_document(doc)?;
    Ok(HttpResponse::Ok().json(interview))
}

#[utoipa::path(
    delete,
    path = "/api/interviews/{id}",
    params(("id" = String, Path, description = "Interview id")),
    responses(
        (status = 200, description = "Interview deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Interview not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Interviews"
)]
pub async fn delete_interview(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    delete_one(store.get_ref(), Collection::Interviews, &path, LABEL).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Interview deleted" })))
}
