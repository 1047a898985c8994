use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{StatusUpdate, delete_one, load, update_with_status};
use crate::auth::auth::AuthUser;
use crate::errors::{AppError, AppResult};
use crate::lifecycle::workflow::{StatusChange, set_status};
use crate::lifecycle::{Lifecycle, RequestStatus};
use crate::model::loan_request::{LoanRequest, monthly_installment};
use crate::store::{Collection, Guard, Order, Query, RecordStore, from_document, to_document};
use crate::utils::pagination::{LoanPage, Page, fetch_page, page_window};
use crate::utils::patch::{FieldKind, FieldSpec, field, required};

const LABEL: &str = "Loan request";

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoan {
    #[serde(rename = "type")]
    #[schema(example = "personal")]
    pub loan_type: String,
    #[schema(example = 1200.0)]
    pub amount: f64,
    #[serde(default)]
    pub purpose: String,
    #[schema(example = 12)]
    pub repayment_months: u32,
    /// Computed from amount and months when omitted
    #[serde(default)]
    pub monthly_installment: Option<f64>,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct LoanFilter {
    /// Admins only
    pub employee_id: Option<String>,
    #[param(example = "pending")]
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub loan_type: Option<String>,
    /// Applied on or after (YYYY-MM-DD)
    pub from: Option<String>,
    /// Applied on or before (YYYY-MM-DD)
    pub to: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

fn ensure_owner(auth: &AuthUser, request: &LoanRequest) -> AppResult<()> {
    if auth.is_admin() || auth.employee_id()? == request.employee_id {
        Ok(())
    } else {
        Err(AppError::forbidden("You can only access your own loan requests"))
    }
}

#[utoipa::path(
    get,
    path = "/api/loans",
    params(LoanFilter),
    responses(
        (status = 200, description = "Loan requests, newest first, with status counts", body = LoanPage),
        (status = 403, description = "Admins and employees only")
    ),
    security(("bearer_auth" = [])),
    tag = "Loans"
)]
pub async fn loan_list(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    filter: web::Query<LoanFilter>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee_scope(filter.employee_id.as_deref())?;

    let query = Query::new()
        .eq_opt("employeeId", employee_id)
        .eq_opt("status", filter.status.clone())
        .eq_opt("type", filter.loan_type.clone())
        .range("appliedDate", filter.from.as_deref(), filter.to.as_deref())
        .sort_by("appliedDate", Order::Desc);

    let page: Page<LoanRequest> = fetch_page(
        store.get_ref(),
        Collection::LoanRequests,
        query.clone(),
        page_window(filter.page, filter.per_page),
    )
    .await?
    .with_counts::<RequestStatus>(store.get_ref(), Collection::LoanRequests, &query)
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/loans",
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan request submitted", body = LoanRequest),
        (status = 400, description = "Missing type, amount or repayment months"),
        (status = 403, description = "Employees only")
    ),
    security(("bearer_auth" = [])),
    tag = "Loans"
)]
pub async fn create_loan(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    payload: web::Json<CreateLoan>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee_id()?.to_string();

    let loan_type = required(&payload.loan_type, "Loan type, amount and repayment months are required")?;
    if !payload.amount.is_finite() || payload.amount <= 0.0 || payload.repayment_months == 0 {
        return Err(AppError::validation(
            "Loan type, amount and repayment months are required",
        ));
    }

    let now = Utc::now();
    let request = LoanRequest {
        id: Uuid::new_v4().to_string(),
        employee_id,
        loan_type: loan_type.to_string(),
        amount: payload.amount,
        purpose: payload.purpose.trim().to_string(),
        repayment_months: payload.repayment_months,
        monthly_installment: payload
            .monthly_installment
            .filter(|m| m.is_finite() && *m > 0.0)
            .unwrap_or_else(|| monthly_installment(payload.amount, payload.repayment_months)),
        status: RequestStatus::initial().as_ref().to_string(),
        applied_date: now,
        updated_at: now,
    };

    store
        .insert(Collection::LoanRequests, to_document(&request)?)
        .await?;
    info!(loan_id = %request.id, amount = request.amount, "Loan request submitted");

    Ok(HttpResponse::Created().json(request))
}

#[utoipa::path(
    get,
    path = "/api/loans/{id}",
    params(("id" = String, Path, description = "Loan request id")),
    responses(
        (status = 200, description = "Loan request", body = LoanRequest),
        (status = 403, description = "Not your request"),
        (status = 404, description = "Loan request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Loans"
)]
pub async fn get_loan(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let request: LoanRequest = load(store.get_ref(), Collection::LoanRequests, &path, LABEL).await?;
    ensure_owner(&auth, &request)?;
    Ok(HttpResponse::Ok().json(request))
}

const LOAN_FIELDS: &[FieldSpec] = &[
    field("type", FieldKind::Text),
    field("amount", FieldKind::Number),
    field("purpose", FieldKind::OptionalText),
    field("repaymentMonths", FieldKind::Count),
    field("monthlyInstallment", FieldKind::Number),
];

/// Same rules as leave: owners edit pending requests, status is admin
/// only. The installment follows amount and months unless given.
#[utoipa::path(
    put,
    path = "/api/loans/{id}",
    params(("id" = String, Path, description = "Loan request id")),
    request_body(content = Object, description = "Partial update: type, amount, purpose, repaymentMonths, monthlyInstallment; admins also status"),
    responses(
        (status = 200, description = "Updated loan request", body = LoanRequest),
        (status = 400, description = "Invalid fields"),
        (status = 403, description = "Not your request"),
        (status = 404, description = "Loan request not found"),
        (status = 409, description = "Request is no longer pending, or transition not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Loans"
)]
pub async fn update_loan(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
    payload: web::Json<Value>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let request: LoanRequest = load(store.get_ref(), Collection::LoanRequests, &id, LABEL).await?;
    ensure_owner(&auth, &request)?;

    if !auth.is_admin() {
        if payload.get("status").is_some() {
            return Err(AppError::forbidden("Only admins can change a loan status"));
        }
        if request.status != RequestStatus::Pending.as_ref() {
            return Err(AppError::conflict("Only pending requests can be edited"));
        }
    }

    let mut body = payload.into_inner();
    if let Some(obj) = body.as_object_mut() {
        let amount = obj.get("amount").and_then(Value::as_f64);
        let months = obj
            .get("repaymentMonths")
            .and_then(Value::as_u64)
            .and_then(|m| u32::try_from(m).ok());
        if months == Some(0) {
            return Err(AppError::validation("repaymentMonths must be at least 1"));
        }
        if amount.is_some_and(|a| a <= 0.0) {
            return Err(AppError::validation("amount must be greater than zero"));
        }
        if (amount.is_some() || months.is_some()) && !obj.contains_key("monthlyInstallment") {
            let installment = monthly_installment(
                amount.unwrap_or(request.amount),
                months.unwrap_or(request.repayment_months),
            );
            obj.insert("monthlyInstallment".into(), json!(installment));
        }
    }

    let doc = update_with_status::<RequestStatus>(
        store.get_ref(),
        Collection::LoanRequests,
        LABEL,
        &id,
        &body,
        LOAN_FIELDS,
        &auth,
        (!auth.is_admin()).then(|| Guard::equals("status", RequestStatus::Pending.as_ref())),
    )
    .await?;

    let request: LoanRequest = from_document(doc)?;
    Ok(HttpResponse::Ok().json(request))
}

#[utoipa::path(
    delete,
    path = "/api/loans/{id}",
    params(("id" = String, Path, description = "Loan request id")),
    responses(
        (status = 200, description = "Loan request deleted"),
        (status = 403, description = "Not your request"),
        (status = 404, description = "Loan request not found"),
        (status = 409, description = "Only pending requests can be withdrawn")
    ),
    security(("bearer_auth" = [])),
    tag = "Loans"
)]
pub async fn delete_loan(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let request: LoanRequest = load(store.get_ref(), Collection::LoanRequests, &id, LABEL).await?;
    ensure_owner(&auth, &request)?;
    if !auth.is_admin() && request.status != RequestStatus::Pending.as_ref() {
        return Err(AppError::conflict("Only pending requests can be withdrawn"));
    }

    delete_one(store.get_ref(), Collection::LoanRequests, &id, LABEL).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Loan request deleted" })))
}

async fn move_loan(
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
            collection: Collection::LoanRequests,
            label: LABEL,
            id,
            target,
            force,
            actor: auth.role,
        },
    )
    .await?;

    let request: LoanRequest = from_document(doc)?;
    Ok(HttpResponse::Ok().json(request))
}

#[utoipa::path(
    put,
    path = "/api/loans/{id}/status",
    params(("id" = String, Path, description = "Loan request id")),
    request_body = StatusUpdate,
    responses(
        (status = 200, description = "Loan request with its new status", body = LoanRequest),
        (status = 400, description = "Unknown status"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Loan request not found"),
        (status = 409, description = "Transition not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Loans"
)]
pub async fn set_loan_status(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
    payload: web::Json<StatusUpdate>,
) -> AppResult<HttpResponse> {
    move_loan(&auth, store.get_ref(), &path, &payload.status, payload.force).await
}

#[utoipa::path(
    put,
    path = "/api/loans/{id}/approve",
    params(("id" = String, Path, description = "Loan request id")),
    responses(
        (status = 200, description = "Loan approved", body = LoanRequest),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Loan request not found"),
        (status = 409, description = "Request is not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Loans"
)]
pub async fn approve_loan(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    move_loan(&auth, store.get_ref(), &path, RequestStatus::Approved.as_ref(), false).await
}

#[utoipa::path(
    put,
    path = "/api/loans/{id}/reject",
    params(("id" = String, Path, description = "Loan request id")),
    responses(
        (status = 200, description = "Loan rejected", body = LoanRequest),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Loan request not found"),
        (status = 409, description = "Request is not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Loans"
)]
pub async fn reject_loan(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    move_loan(&auth, store.get_ref(), &path, RequestStatus::Rejected.as_ref(), false).await
}
