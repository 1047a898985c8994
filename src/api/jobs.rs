use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::applications::{ApplicationForm, submit_application};
use super::{delete_one, load, updated};
use crate::auth::auth::AuthUser;
use crate::errors::{AppError, AppResult};
use crate::model::account::account_key;
use crate::model::application::Application;
use crate::model::job::Job;
use crate::model::role::Role;
use crate::store::{Collection, Order, Query, RecordStore, from_document, to_document};
use crate::utils::pagination::{JobPage, Page, fetch_page, page_window};
use crate::utils::patch::{FieldKind, FieldSpec, build_patch, field};

const LABEL: &str = "Job";

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct JobFilter {
    #[param(example = "Full-Time")]
    pub job_type: Option<String>,
    #[param(example = "Healthcare")]
    pub category: Option<String>,
    pub location: Option<String>,
    pub featured: Option<bool>,
    /// Substring of title, company, location or description
    pub search: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl JobFilter {
    fn query(&self) -> Query {
        Query::new()
            .eq_opt("jobType", self.job_type.clone())
            .eq_opt("category", self.category.clone())
            .eq_opt("featured", self.featured)
            .contains(&["location"], self.location.as_deref())
            .contains(
                &["title", "company", "location", "description"],
                self.search.as_deref(),
            )
    }
}

/// Job board for the marketing site. No token needed.
#[utoipa::path(
    get,
    path = "/api/public/jobs",
    params(JobFilter),
    responses((status = 200, description = "Open jobs, newest first", body = JobPage)),
    tag = "Jobs"
)]
pub async fn public_job_list(
    store: web::Data<dyn RecordStore>,
    filter: web::Query<JobFilter>,
) -> AppResult<HttpResponse> {
    let query = filter.query().sort_by("postedAt", Order::Desc);

    let page: Page<Job> = fetch_page(
        store.get_ref(),
        Collection::Jobs,
        query,
        page_window(filter.page, filter.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/public/jobs/{id}",
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job", body = Job),
        (status = 404, description = "Job not found")
    ),
    tag = "Jobs"
)]
pub async fn public_get_job(
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let job: Job = load(store.get_ref(), Collection::Jobs, &path, LABEL).await?;
    Ok(HttpResponse::Ok().json(job))
}

/// Candidate applies from the public site; the application starts as
/// `applied`.
#[utoipa::path(
    post,
    path = "/api/public/jobs/{id}/apply",
    params(("id" = String, Path, description = "Job id")),
    request_body = ApplicationForm,
    responses(
        (status = 201, description = "Application received", body = Application),
        (status = 400, description = "Missing fullName or email"),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Already applied for this job")
    ),
    tag = "Jobs"
)]
pub async fn apply_for_job(
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
    payload: web::Json<ApplicationForm>,
) -> AppResult<HttpResponse> {
    let application = submit_application(store.get_ref(), &path, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(application))
}

/// Clients see the jobs they posted; admins, vendors and employees see the
/// whole board.
#[utoipa::path(
    get,
    path = "/api/jobs",
    params(JobFilter),
    responses((status = 200, description = "Jobs, newest first", body = JobPage)),
    security(("bearer_auth" = [])),
    tag = "Jobs"
)]
pub async fn list_jobs(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    filter: web::Query<JobFilter>,
) -> AppResult<HttpResponse> {
    let mut query = filter.query();
    if auth.role == Role::Client {
        query = query.eq("postedBy", account_key(&auth.email));
    }

    let page: Page<Job> = fetch_page(
        store.get_ref(),
        Collection::Jobs,
        query.sort_by("postedAt", Order::Desc),
        page_window(filter.page, filter.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[derive(Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateJob {
    #[schema(example = "Nurse")]
    pub title: String,
    #[schema(example = "X")]
    pub company: String,
    #[schema(example = "Leeds")]
    pub location: String,
    #[schema(example = "Full-Time")]
    pub job_type: String,
    #[schema(example = "Healthcare")]
    pub category: String,
    pub description: String,
    pub salary: Option<String>,
    #[schema(example = "REF1")]
    pub job_reference: String,
    #[schema(example = 3)]
    pub vacancy: u32,
    pub featured: bool,
}

#[utoipa::path(
    post,
    path = "/api/jobs",
    request_body = CreateJob,
    responses(
        (status = 201, description = "Job posted", body = Job),
        (status = 400, description = "Missing required job fields"),
        (status = 403, description = "Admins and clients only")
    ),
    security(("bearer_auth" = [])),
    tag = "Jobs"
)]
pub async fn create_job(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    payload: web::Json<CreateJob>,
) -> AppResult<HttpResponse> {
    auth.require_any(&[Role::Client])?;

    let text_fields = [
        &payload.title,
        &payload.company,
        &payload.location,
        &payload.job_type,
        &payload.category,
        &payload.description,
        &payload.job_reference,
    ];
    if text_fields.iter().any(|f| f.trim().is_empty()) || payload.vacancy == 0 {
        return Err(AppError::validation("Missing required job fields"));
    }

    let now = Utc::now();
    let job = Job {
        id: Uuid::new_v4().to_string(),
        title: payload.title.trim().to_string(),
        company: payload.company.trim().to_string(),
        location: payload.location.trim().to_string(),
        job_type: payload.job_type.trim().to_string(),
        category: payload.category.trim().to_string(),
        description: payload.description.clone(),
        salary: payload.salary.clone(),
        job_reference: payload.job_reference.trim().to_string(),
        vacancy: payload.vacancy,
        featured: payload.featured && auth.is_admin(),
        posted_by: account_key(&auth.email),
        posted_at: now,
        updated_at: now,
    };

    store.insert(Collection::Jobs, to_document(&job)?).await?;
    info!(job_id = %job.id, posted_by = %job.posted_by, "Job posted");

    Ok(HttpResponse::Created().json(job))
}

#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job", body = Job),
        (status = 404, description = "Job not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Jobs"
)]
pub async fn get_job(
    _auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let job: Job = load(store.get_ref(), Collection::Jobs, &path, LABEL).await?;
    Ok(HttpResponse::Ok().json(job))
}

/// Admins or the client who posted the job.
pub(crate) fn ensure_job_owner(auth: &AuthUser, job: &Job) -> AppResult<()> {
    if auth.is_admin() || (auth.role == Role::Client && job.posted_by == account_key(&auth.email)) {
        Ok(())
    } else {
        Err(AppError::forbidden("You can only manage jobs you posted"))
    }
}

const CLIENT_FIELDS: &[FieldSpec] = &[
    field("title", FieldKind::Text),
    field("company", FieldKind::Text),
    field("location", FieldKind::Text),
    field("jobType", FieldKind::Text),
    field("category", FieldKind::Text),
    field("description", FieldKind::Text),
    field("salary", FieldKind::OptionalText),
    field("jobReference", FieldKind::Text),
    field("vacancy", FieldKind::Count),
];

const ADMIN_FIELDS: &[FieldSpec] = &[
    field("title", FieldKind::Text),
    field("company", FieldKind::Text),
    field("location", FieldKind::Text),
    field("jobType", FieldKind::Text),
    field("category", FieldKind::Text),
    field("description", FieldKind::Text),
    field("salary", FieldKind::OptionalText),
    field("jobReference", FieldKind::Text),
    field("vacancy", FieldKind::Count),
    field("featured", FieldKind::Bool),
];

#[utoipa::path(
    put,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job id")),
    request_body(content = Object, description = "Partial update of job fields; featured is admin only"),
    responses(
        (status = 200, description = "Updated job", body = Job),
        (status = 400, description = "Field cannot be updated"),
        (status = 403, description = "Not your job"),
        (status = 404, description = "Job not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Jobs"
)]
pub async fn update_job(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
    payload: web::Json<Value>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let job: Job = load(store.get_ref(), Collection::Jobs, &id, LABEL).await?;
    ensure_job_owner(&auth, &job)?;

    let fields = if auth.is_admin() { ADMIN_FIELDS } else { CLIENT_FIELDS };
    let patch = build_patch(&payload, fields)?;
    let doc = updated(store.update(Collection::Jobs, &id, None, patch).await?, LABEL)?;

    let job: Job = from_document(doc)?;
    Ok(HttpResponse::Ok().json(job))
}

/// Applications for the job are kept.
#[utoipa::path(
    delete,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job deleted"),
        (status = 403, description = "Not your job"),
        (status = 404, description = "Job not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Jobs"
)]
pub async fn delete_job(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let job: Job = load(store.get_ref(), Collection::Jobs, &id, LABEL).await?;
    ensure_job_owner(&auth, &job)?;

    delete_one(store.get_ref(), Collection::Jobs, &id, LABEL).await?;
    info!(job_id = %id, "Job deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Job deleted" })))
}

#[cfg(test)]
mod tests {
    use actix_web::http::{Method, StatusCode};
    use actix_web::test;
    use serde_json::{Value, json};

    use crate::api::test_support::{authed, request, seed_account, test_state, token_for};
    use crate::build_app;
    use crate::model::role::Role;

    fn nurse_job() -> Value {
        json!({
            "title": "Nurse",
            "company": "X",
            "location": "Leeds",
            "jobType": "Full-Time",
            "category": "Healthcare",
            "description": "Night shifts",
            "jobReference": "REF1",
            "vacancy": 3
        })
    }

    #[actix_web::test]
    async fn posted_job_is_listed_with_generated_fields() {
        let state = test_state();
        let client = seed_account(&state, "client@x.com", Role::Client).await;
        let token = token_for(&state, &client);
        let app = test::init_service(build_app(state)).await;

        let resp = test::call_service(
            &app,
            authed(Method::POST, "/api/jobs", &token)
                .set_json(nurse_job())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(resp).await;
        assert!(created["id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(created["postedAt"].is_string());
        assert_eq!(created["postedBy"], "client@x.com");

        let resp = test::call_service(&app, authed(Method::GET, "/api/jobs", &token).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let page: Value = test::read_body_json(resp).await;
        assert_eq!(page["total"], 1);
        assert_eq!(page["data"][0]["id"], created["id"]);
        assert_eq!(page["data"][0]["title"], "Nurse");
    }

    #[actix_web::test]
    async fn oversized_vacancy_is_rejected_before_it_is_stored() {
        let state = test_state();
        let admin = seed_account(&state, "admin@x.com", Role::Admin).await;
        let token = token_for(&state, &admin);
        let app = test::init_service(build_app(state)).await;

        let resp = test::call_service(
            &app,
            authed(Method::POST, "/api/jobs", &token)
                .set_json(nurse_job())
                .to_request(),
        )
        .await;
        let created: Value = test::read_body_json(resp).await;
        let id = created["id"].as_str().unwrap();

        let resp = test::call_service(
            &app,
            authed(Method::PUT, &format!("/api/jobs/{id}"), &token)
                .set_json(json!({ "vacancy": 5_000_000_000u64 }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(&app, request(Method::GET, "/api/public/jobs").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let page: Value = test::read_body_json(resp).await;
        assert_eq!(page["data"][0]["vacancy"], 3);
    }

    #[actix_web::test]
    async fn missing_fields_and_wrong_roles_are_rejected() {
        let state = test_state();
        let client = seed_account(&state, "client@x.com", Role::Client).await;
        let vendor = seed_account(&state, "vendor@x.com", Role::Vendor).await;
        let client_token = token_for(&state, &client);
        let vendor_token = token_for(&state, &vendor);
        let app = test::init_service(build_app(state)).await;

        let resp = test::call_service(
            &app,
            authed(Method::POST, "/api/jobs", &client_token)
                .set_json(json!({ "title": "Nurse" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Missing required job fields");

        let resp = test::call_service(
            &app,
            authed(Method::POST, "/api/jobs", &vendor_token)
                .set_json(nurse_job())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn public_board_accepts_one_application_per_candidate() {
        let state = test_state();
        let client = seed_account(&state, "client@x.com", Role::Client).await;
        let token = token_for(&state, &client);
        let app = test::init_service(build_app(state)).await;

        let resp = test::call_service(
            &app,
            authed(Method::POST, "/api/jobs", &token)
                .set_json(nurse_job())
                .to_request(),
        )
        .await;
        let job: Value = test::read_body_json(resp).await;
        let job_id = job["id"].as_str().unwrap();

        let resp = test::call_service(&app, request(Method::GET, "/api/public/jobs").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let page: Value = test::read_body_json(resp).await;
        assert_eq!(page["total"], 1);

        let form = json!({ "fullName": "Alex Morgan", "email": "Alex@Example.com" });
        let uri = format!("/api/public/jobs/{job_id}/apply");
        let resp = test::call_service(
            &app,
            request(Method::POST, &uri).set_json(&form).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let application: Value = test::read_body_json(resp).await;
        assert_eq!(application["status"], "applied");
        assert_eq!(application["email"], "alex@example.com");

        let resp = test::call_service(
            &app,
            request(Method::POST, &uri).set_json(&form).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn protected_routes_need_a_token() {
        let app = test::init_service(build_app(test_state())).await;
        let resp = test::call_service(&app, request(Method::GET, "/api/jobs").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
