use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::jobs::ensure_job_owner;
use super::{StatusUpdate, delete_one, load, update_with_status};
use crate::auth::auth::AuthUser;
use crate::errors::{AppError, AppResult};
use crate::lifecycle::workflow::{InterviewDraft, StatusChange, schedule_interview, set_status};
use crate::lifecycle::{ApplicationStatus, Lifecycle};
use crate::model::account::account_key;
use crate::model::application::Application;
use crate::model::interview::Interview;
use crate::model::job::Job;
use crate::model::role::Role;
use crate::store::{
    Collection, InsertOutcome, Order, Query, RecordStore, from_document, to_document,
};
use crate::utils::pagination::{ApplicationPage, Page, fetch_page, page_window};
use crate::utils::patch::{FieldKind, FieldSpec, field, looks_like_email, required};

const LABEL: &str = "Application";

/// Candidate details sent from the job board.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationForm {
    #[schema(example = "Alex Morgan")]
    pub full_name: String,
    #[schema(example = "alex@example.com")]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub cover_letter: String,
    /// Opaque id returned by the upload service
    #[serde(default)]
    pub resume_id: Option<String>,
}

/// One application per candidate email and job.
fn application_key(job_id: &str, email: &str) -> String {
    format!("{job_id}|{}", account_key(email))
}

pub async fn submit_application(
    store: &dyn RecordStore,
    job_id: &str,
    form: ApplicationForm,
) -> AppResult<Application> {
    let full_name = required(&form.full_name, "Full name and email are required")?;
    let email = account_key(required(&form.email, "Full name and email are required")?);
    if !looks_like_email(&email) {
        return Err(AppError::validation("A valid email is required"));
    }

    let job: Job = load(store, Collection::Jobs, job_id, "Job").await?;

    let now = Utc::now();
    let application = Application {
        id: Uuid::new_v4().to_string(),
        job_id: job.id.clone(),
        full_name: full_name.to_string(),
        email: email.clone(),
        phone: form.phone.trim().to_string(),
        cover_letter: form.cover_letter,
        resume_id: form.resume_id.filter(|r| !r.trim().is_empty()),
        applied_at: now,
        updated_at: now,
        status: ApplicationStatus::initial().as_ref().to_string(),
        interview_schedule: None,
    };

    match store
        .insert_unique(
            Collection::Applications,
            &application_key(&job.id, &email),
            to_document(&application)?,
        )
        .await?
    {
        InsertOutcome::Inserted(_) => {
            info!(application_id = %application.id, job_id = %job.id, "Application received");
            Ok(application)
        }
        InsertOutcome::Exists(_) => Err(AppError::conflict("You have already applied for this job")),
    }
}

/// Applications the caller may see: all for admins, those on their own
/// jobs for clients.
async fn visible_scope(auth: &AuthUser, store: &dyn RecordStore) -> AppResult<Query> {
    match auth.role {
        Role::Admin => Ok(Query::new()),
        Role::Client => {
            let jobs = store
                .find(
                    Collection::Jobs,
                    &Query::new().eq("postedBy", account_key(&auth.email)),
                )
                .await?;
            let ids: Vec<Value> = jobs.into_iter().filter_map(|j| j.get("id").cloned()).collect();
            Ok(Query::new().one_of("jobId", ids))
        }
        _ => Err(AppError::forbidden("Not allowed for this account type")),
    }
}

async fn ensure_access(auth: &AuthUser, store: &dyn RecordStore, application: &Application) -> AppResult<()> {
    if auth.is_admin() {
        return Ok(());
    }
    let job: Job = load(store, Collection::Jobs, &application.job_id, "Job")
        .await
        .map_err(|_| AppError::forbidden("You can only manage applications for your own jobs"))?;
    ensure_job_owner(auth, &job)
        .map_err(|_| AppError::forbidden("You can only manage applications for your own jobs"))
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ApplicationFilter {
    pub job_id: Option<String>,
    #[param(example = "shortlisted")]
    pub status: Option<String>,
    pub email: Option<String>,
    /// Substring of the candidate name or email
    pub search: Option<String>,
    /// Applied on or after (YYYY-MM-DD)
    pub from: Option<String>,
    /// Applied on or before (YYYY-MM-DD)
    pub to: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/applications",
    params(ApplicationFilter),
    responses(
        (status = 200, description = "Applications, newest first, with status counts", body = ApplicationPage),
        (status = 403, description = "Admins and clients only")
    ),
    security(("bearer_auth" = [])),
    tag = "Applications"
)]
pub async fn list_applications(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    filter: web::Query<ApplicationFilter>,
) -> AppResult<HttpResponse> {
    let query = visible_scope(&auth, store.get_ref())
        .await?
        .eq_opt("jobId", filter.job_id.clone())
        .eq_opt("status", filter.status.clone())
        .eq_opt("email", filter.email.as_deref().map(account_key))
        .contains(&["fullName", "email"], filter.search.as_deref())
        .range("appliedAt", filter.from.as_deref(), filter.to.as_deref())
        .sort_by("appliedAt", Order::Desc);

    let page: Page<Application> = fetch_page(
        store.get_ref(),
        Collection::Applications,
        query.clone(),
        page_window(filter.page, filter.per_page),
    )
    .await?
    .with_counts::<ApplicationStatus>(store.get_ref(), Collection::Applications, &query)
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplication {
    pub job_id: String,
    #[serde(flatten)]
    pub form: ApplicationForm,
}

/// Admin or job owner records an application received elsewhere.
#[utoipa::path(
    post,
    path = "/api/applications",
    request_body = CreateApplication,
    responses(
        (status = 201, description = "Application created", body = Application),
        (status = 400, description = "Missing fullName or email"),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Candidate already applied")
    ),
    security(("bearer_auth" = [])),
    tag = "Applications"
)]
pub async fn create_application(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    payload: web::Json<CreateApplication>,
) -> AppResult<HttpResponse> {
    let CreateApplication { job_id, form } = payload.into_inner();
    let job: Job = load(store.get_ref(), Collection::Jobs, &job_id, "Job").await?;
    ensure_job_owner(&auth, &job)?;

    let application = submit_application(store.get_ref(), &job_id, form).await?;
    Ok(HttpResponse::Created().json(application))
}

#[utoipa::path(
    get,
    path = "/api/applications/{id}",
    params(("id" = String, Path, description = "Application id")),
    responses(
        (status = 200, description = "Application", body = Application),
        (status = 403, description = "Not an application for your job"),
        (status = 404, description = "Application not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Applications"
)]
pub async fn get_application(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let application: Application =
        load(store.get_ref(), Collection::Applications, &path, LABEL).await?;
    ensure_access(&auth, store.get_ref(), &application).await?;
    Ok(HttpResponse::Ok().json(application))
}

const APPLICATION_FIELDS: &[FieldSpec] = &[
    field("fullName", FieldKind::Text),
    field("phone", FieldKind::OptionalText),
    field("coverLetter", FieldKind::OptionalText),
    field("resumeId", FieldKind::OptionalText),
];

#[utoipa::path(
    put,
    path = "/api/applications/{id}",
    params(("id" = String, Path, description = "Application id")),
    request_body(content = Object, description = "Partial update: fullName, phone, coverLetter, resumeId, status"),
    responses(
        (status = 200, description = "Updated application", body = Application),
        (status = 400, description = "Field cannot be updated"),
        (status = 404, description = "Application not found"),
        (status = 409, description = "Transition not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Applications"
)]
pub async fn update_application(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
    payload: web::Json<Value>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let application: Application =
        load(store.get_ref(), Collection::Applications, &id, LABEL).await?;
    ensure_access(&auth, store.get_ref(), &application).await?;

    let doc = update_with_status::<ApplicationStatus>(
        store.get_ref(),
        Collection::Applications,
        LABEL,
        &id,
        &payload,
        APPLICATION_FIELDS,
        &auth,
        None,
    )
    .await?;

    let application: Application = from_document(doc)?;
    Ok(HttpResponse::Ok().json(application))
}

#[utoipa::path(
    put,
    path = "/api/applications/{id}/status",
    params(("id" = String, Path, description = "Application id")),
    request_body = StatusUpdate,
    responses(
        (status = 200, description = "Application with its new status", body = Application),
        (status = 400, description = "Unknown status"),
        (status = 403, description = "Force is admin only"),
        (status = 404, description = "Application not found"),
        (status = 409, description = "Transition not allowed or lost to a concurrent change")
    ),
    security(("bearer_auth" = [])),
    tag = "Applications"
)]
pub async fn set_application_status(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
    payload: web::Json<StatusUpdate>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let application: Application =
        load(store.get_ref(), Collection::Applications, &id, LABEL).await?;
    ensure_access(&auth, store.get_ref(), &application).await?;

    let doc = set_status::<ApplicationStatus>(
        store.get_ref(),
        StatusChange {
            collection: Collection::Applications,
            label: LABEL,
            id: &id,
            target: &payload.status,
            force: payload.force,
            actor: auth.role,
        },
    )
    .await?;

    let application: Application = from_document(doc)?;
    Ok(HttpResponse::Ok().json(application))
}

#[derive(Serialize, ToSchema)]
pub struct ScheduledInterview {
    pub application: Application,
    pub interview: Interview,
}

/// Creates the interview and moves the application to
/// `interview-scheduled` in one atomic write.
#[utoipa::path(
    post,
    path = "/api/applications/{id}/interview",
    params(("id" = String, Path, description = "Application id")),
    request_body = InterviewDraft,
    responses(
        (status = 201, description = "Interview scheduled", body = ScheduledInterview),
        (status = 400, description = "Invalid interview fields"),
        (status = 404, description = "Application not found"),
        (status = 409, description = "Application cannot be scheduled, or changed meanwhile")
    ),
    security(("bearer_auth" = [])),
    tag = "Applications"
)]
pub async fn schedule_application_interview(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
    payload: web::Json<InterviewDraft>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let application: Application =
        load(store.get_ref(), Collection::Applications, &id, LABEL).await?;
    ensure_access(&auth, store.get_ref(), &application).await?;

    let (application, interview) =
        schedule_interview(store.get_ref(), &id, payload.into_inner()).await?;

    Ok(HttpResponse::Created().json(ScheduledInterview {
        application,
        interview,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/applications/{id}",
    params(("id" = String, Path, description = "Application id")),
    responses(
        (status = 200, description = "Application deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Application not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Applications"
)]
pub async fn delete_application(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    delete_one(store.get_ref(), Collection::Applications, &path, LABEL).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Application deleted" })))
}
