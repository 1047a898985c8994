use actix_web::{HttpResponse, web};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{StatusUpdate, delete_one, load, update_with_status};
use crate::auth::auth::AuthUser;
use crate::errors::{AppError, AppResult};
use crate::lifecycle::balance::{LeaveBalance, derive_leave_balance};
use crate::lifecycle::workflow::{StatusChange, set_status};
use crate::lifecycle::{Lifecycle, RequestStatus};
use crate::model::leave_request::{LeaveRequest, LeaveType};
use crate::store::{Collection, Guard, Order, Query, RecordStore, from_document, to_document};
use crate::utils::pagination::{LeavePage, Page, fetch_page, page_window};
use crate::utils::patch::{FieldKind, FieldSpec, field, is_variant};

const LABEL: &str = "Leave request";

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeave {
    #[serde(rename = "type")]
    #[schema(example = "sick")]
    pub leave_type: LeaveType, // enum ensures Swagger dropdown
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-03", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[serde(default)]
    #[schema(example = "Flu")]
    pub reason: String,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct LeaveFilter {
    /// Filter by employee ID (admins only)
    pub employee_id: Option<String>,
    /// Filter by leave status
    #[param(example = "pending")]
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub leave_type: Option<LeaveType>,
    /// Leave starting on or after (YYYY-MM-DD)
    pub from: Option<String>,
    /// Leave starting on or before (YYYY-MM-DD)
    pub to: Option<String>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Pagination per page number
    pub per_page: Option<u64>,
}

/// Employees may only touch their own requests.
fn ensure_owner(auth: &AuthUser, request: &LeaveRequest) -> AppResult<()> {
    if auth.is_admin() || auth.employee_id()? == request.employee_id {
        Ok(())
    } else {
        Err(AppError::forbidden("You can only access your own leave requests"))
    }
}

/* =========================
List leave requests
========================= */
#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Leave requests, newest first, with status counts", body = LeavePage),
        (status = 403, description = "Admins and employees only")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    filter: web::Query<LeaveFilter>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee_scope(filter.employee_id.as_deref())?;

    let query = Query::new()
        .eq_opt("employeeId", employee_id)
        .eq_opt("status", filter.status.clone())
        .eq_opt("type", filter.leave_type.map(|t| t.to_string()))
        .range("startDate", filter.from.as_deref(), filter.to.as_deref())
        .sort_by("appliedDate", Order::Desc);

    let page: Page<LeaveRequest> = fetch_page(
        store.get_ref(),
        Collection::LeaveRequests,
        query.clone(),
        page_window(filter.page, filter.per_page),
    )
    .await?
    .with_counts::<RequestStatus>(store.get_ref(), Collection::LeaveRequests, &query)
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

/* =========================
Create leave request
========================= */
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(
        content = CreateLeave,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveRequest),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Employees only")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    payload: web::Json<CreateLeave>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee_id()?.to_string();

    if payload.start_date > payload.end_date {
        return Err(AppError::validation("startDate cannot be after endDate"));
    }

    let now = Utc::now();
    let request = LeaveRequest {
        id: Uuid::new_v4().to_string(),
        employee_id,
        leave_type: payload.leave_type,
        start_date: payload.start_date,
        end_date: payload.end_date,
        reason: payload.reason.trim().to_string(),
        status: RequestStatus::initial().as_ref().to_string(),
        applied_date: now,
        updated_at: now,
    };

    store
        .insert(Collection::LeaveRequests, to_document(&request)?)
        .await
        .map_err(|e| {
            error!(error = %e, employee_id = %request.employee_id, "Failed to create leave request");
            e
        })?;
    info!(leave_id = %request.id, days = request.days(), "Leave request submitted");

    Ok(HttpResponse::Created().json(request))
}

/* =========================
Get single leave request
========================= */
#[utoipa::path(
    get,
    path = "/api/leave/{id}",
    params(("id" = String, Path, description = "Leave request id")),
    responses(
        (status = 200, description = "Leave request", body = LeaveRequest),
        (status = 403, description = "Not your request"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let request: LeaveRequest = load(store.get_ref(), Collection::LeaveRequests, &path, LABEL).await?;
    ensure_owner(&auth, &request)?;
    Ok(HttpResponse::Ok().json(request))
}

const LEAVE_FIELDS: &[FieldSpec] = &[
    field("type", FieldKind::Choice(is_variant::<LeaveType>)),
    field("startDate", FieldKind::Date),
    field("endDate", FieldKind::Date),
    field("reason", FieldKind::OptionalText),
];

fn date_field(payload: &Value, name: &str, current: NaiveDate) -> NaiveDate {
    payload
        .get(name)
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .unwrap_or(current)
}

/* =========================
Update leave request
========================= */
/// Employees edit their own pending requests. A `status` in the body goes
/// through the lifecycle and is admin only.
#[utoipa::path(
    put,
    path = "/api/leave/{id}",
    params(("id" = String, Path, description = "Leave request id")),
    request_body(content = Object, description = "Partial update: type, startDate, endDate, reason; admins also status"),
    responses(
        (status = 200, description = "Updated leave request", body = LeaveRequest),
        (status = 400, description = "Invalid fields"),
        (status = 403, description = "Not your request"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Request is no longer pending, or transition not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn update_leave(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
    payload: web::Json<Value>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let request: LeaveRequest = load(store.get_ref(), Collection::LeaveRequests, &id, LABEL).await?;
    ensure_owner(&auth, &request)?;

    if !auth.is_admin() {
        if payload.get("status").is_some() {
            return Err(AppError::forbidden("Only admins can change a leave status"));
        }
        if request.status != RequestStatus::Pending.as_ref() {
            return Err(AppError::conflict("Only pending requests can be edited"));
        }
    }

    let start = date_field(&payload, "startDate", request.start_date);
    let end = date_field(&payload, "endDate", request.end_date);
    if start > end {
        return Err(AppError::validation("startDate cannot be after endDate"));
    }

    let doc = update_with_status::<RequestStatus>(
        store.get_ref(),
        Collection::LeaveRequests,
        LABEL,
        &id,
        &payload,
        LEAVE_FIELDS,
        &auth,
        // owners lose to a decision made after they loaded the request
        (!auth.is_admin()).then(|| Guard::equals("status", RequestStatus::Pending.as_ref())),
    )
    .await?;

    let request: LeaveRequest = from_document(doc)?;
    Ok(HttpResponse::Ok().json(request))
}

/* =========================
Delete leave request
========================= */
#[utoipa::path(
    delete,
    path = "/api/leave/{id}",
    params(("id" = String, Path, description = "Leave request id")),
    responses(
        (status = 200, description = "Leave request deleted"),
        (status = 403, description = "Not your request"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Only pending requests can be withdrawn")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn delete_leave(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let request: LeaveRequest = load(store.get_ref(), Collection::LeaveRequests, &id, LABEL).await?;
    ensure_owner(&auth, &request)?;
    if !auth.is_admin() && request.status != RequestStatus::Pending.as_ref() {
        return Err(AppError::conflict("Only pending requests can be withdrawn"));
    }

    delete_one(store.get_ref(), Collection::LeaveRequests, &id, LABEL).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Leave request deleted" })))
}

async fn move_leave(
    auth: &AuthUser,
    store: &dyn RecordStore,
    id: &str,
    target: &str,
    force: bool,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let doc = set_status::<RequestStatus>(
        store,
        StatusChange {
            collection: Collection::LeaveRequests,
            label: LABEL,
            id,
            target,
            force,
            actor: auth.role,
        },
    )
    .await?;

    let request: LeaveRequest = from_document(doc)?;
    Ok(HttpResponse::Ok().json(request))
}

#[utoipa::path(
    put,
    path = "/api/leave/{id}/status",
    params(("id" = String, Path, description = "Leave request id")),
    request_body = StatusUpdate,
    responses(
        (status = 200, description = "Leave request with its new status", body = LeaveRequest),
        (status = 400, description = "Unknown status"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Transition not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn set_leave_status(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
    payload: web::Json<StatusUpdate>,
) -> AppResult<HttpResponse> {
    move_leave(&auth, store.get_ref(), &path, &payload.status, payload.force).await
}

/* =========================
Approve leave
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{id}/approve",
    params(("id" = String, Path, description = "Leave request id")),
    responses(
        (status = 200, description = "Leave approved", body = LeaveRequest),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Request is not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    move_leave(&auth, store.get_ref(), &path, RequestStatus::Approved.as_ref(), false).await
}

/* =========================
Reject leave
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{id}/reject",
    params(("id" = String, Path, description = "Leave request id")),
    responses(
        (status = 200, description = "Leave rejected", body = LeaveRequest),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Request is not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    move_leave(&auth, store.get_ref(), &path, RequestStatus::Rejected.as_ref(), false).await
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BalanceQuery {
    /// Admins pick the employee; employees always get their own
    pub employee_id: Option<String>,
    /// Allowance year, defaults to the current one
    pub year: Option<i32>,
}

/* =========================
Leave balance
========================= */
#[utoipa::path(
    get,
    path = "/api/leave/balance",
    params(BalanceQuery),
    responses(
        (status = 200, description = "Remaining allowance per leave type", body = [LeaveBalance]),
        (status = 400, description = "employeeId is required for admins"),
        (status = 403, description = "Admins and employees only")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_balance(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    query: web::Query<BalanceQuery>,
) -> AppResult<HttpResponse> {
    let employee_id = auth
        .employee_scope(query.employee_id.as_deref())?
        .ok_or_else(|| AppError::validation("employeeId is required"))?;

    let requests = store
        .find(
            Collection::LeaveRequests,
            &Query::new().eq("employeeId", employee_id),
        )
        .await?
        .into_iter()
        .map(from_document)
        .collect::<Result<Vec<LeaveRequest>, _>>()?;

    let year = query.year.unwrap_or_else(|| Utc::now().year());
    Ok(HttpResponse::Ok().json(derive_leave_balance(&requests, year)))
}

#[cfg(test)]
mod tests {
    use actix_web::http::{Method, StatusCode};
    use actix_web::test;
    use serde_json::{Value, json};

    use crate::api::test_support::{authed, seed_account, test_state, token_for};
    use crate::build_app;
    use crate::model::role::Role;

    macro_rules! call_json {
        ($app:expr, $req:expr) => {{
            let resp = test::call_service(&$app, $req.to_request()).await;
            let status = resp.status();
            let body: Value = test::read_body_json(resp).await;
            (status, body)
        }};
    }

    fn remaining(balance: &Value, leave_type: &str) -> i64 {
        balance
            .as_array()
            .unwrap()
            .iter()
            .find(|b| b["type"] == leave_type)
            .and_then(|b| b["remaining"].as_i64())
            .unwrap()
    }

    #[actix_web::test]
    async fn approval_reduces_the_balance_by_inclusive_days() {
        let state = test_state();
        let employee = seed_account(&state, "staff@agency.test", Role::Employee).await;
        let admin = seed_account(&state, "admin@agency.test", Role::Admin).await;
        let staff = token_for(&state, &employee);
        let boss = token_for(&state, &admin);
        let app = test::init_service(build_app(state)).await;

        let (status, leave) = call_json!(
            app,
            authed(Method::POST, "/api/leave", &staff).set_json(json!({
                "type": "sick",
                "startDate": "2026-01-01",
                "endDate": "2026-01-03",
                "reason": "Flu"
            }))
        );
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(leave["status"], "pending");
        assert_eq!(leave["employeeId"], employee.id.as_str());
        let id = leave["id"].as_str().unwrap();

        let (_, before) = call_json!(app, authed(Method::GET, "/api/leave/balance?year=2026", &staff));
        assert_eq!(remaining(&before, "sick"), 10);

        let (status, approved) = call_json!(
            app,
            authed(Method::PUT, &format!("/api/leave/{id}/approve"), &boss)
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "approved");

        let (_, after) = call_json!(app, authed(Method::GET, "/api/leave/balance?year=2026", &staff));
        assert_eq!(remaining(&after, "sick"), 7);
        assert_eq!(remaining(&after, "casual"), 10);

        // a decided request cannot be approved again
        let (status, _) = call_json!(
            app,
            authed(Method::PUT, &format!("/api/leave/{id}/reject"), &boss)
        );
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn status_in_a_plain_update_is_admin_only() {
        let state = test_state();
        let employee = seed_account(&state, "staff@agency.test", Role::Employee).await;
        let admin = seed_account(&state, "admin@agency.test", Role::Admin).await;
        let staff = token_for(&state, &employee);
        let boss = token_for(&state, &admin);
        let app = test::init_service(build_app(state)).await;

        let (_, leave) = call_json!(
            app,
            authed(Method::POST, "/api/leave", &staff).set_json(json!({
                "type": "annual",
                "startDate": "2026-07-01",
                "endDate": "2026-07-05"
            }))
        );
        let uri = format!("/api/leave/{}", leave["id"].as_str().unwrap());

        let (status, _) = call_json!(
            app,
            authed(Method::PUT, &uri, &staff).set_json(json!({ "status": "approved" }))
        );
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call_json!(
            app,
            authed(Method::PUT, &uri, &staff).set_json(json!({ "reason": "Family trip" }))
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reason"], "Family trip");

        let (status, body) = call_json!(
            app,
            authed(Method::PUT, &uri, &boss).set_json(json!({ "status": "approved" }))
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "approved");

        // no longer pending, so the owner cannot edit it
        let (status, _) = call_json!(
            app,
            authed(Method::PUT, &uri, &staff).set_json(json!({ "reason": "Changed" }))
        );
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn bad_dates_and_unknown_fields_are_rejected() {
        let state = test_state();
        let employee = seed_account(&state, "staff@agency.test", Role::Employee).await;
        let staff = token_for(&state, &employee);
        let app = test::init_service(build_app(state)).await;

        let (status, _) = call_json!(
            app,
            authed(Method::POST, "/api/leave", &staff).set_json(json!({
                "type": "casual",
                "startDate": "2026-02-10",
                "endDate": "2026-02-01"
            }))
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, leave) = call_json!(
            app,
            authed(Method::POST, "/api/leave", &staff).set_json(json!({
                "type": "casual",
                "startDate": "2026-02-01",
                "endDate": "2026-02-02"
            }))
        );
        let uri = format!("/api/leave/{}", leave["id"].as_str().unwrap());

        let (status, body) = call_json!(
            app,
            authed(Method::PUT, &uri, &staff).set_json(json!({ "employeeId": "someone-else" }))
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Field 'employeeId' cannot be updated");

        let (status, _) = call_json!(
            app,
            authed(Method::PUT, &uri, &staff).set_json(json!({ "endDate": "2026-01-01" }))
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
