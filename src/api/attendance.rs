use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{load, updated};
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::lifecycle::attendance::{MissingAttendance, derive_missing_attendance};
use crate::model::account::Account;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, attendance_key, worked_hours};
use crate::model::role::Role;
use crate::store::{
    Collection, Guard, InsertOutcome, Order, Query, RecordStore, UpdateOutcome, from_document,
    to_document,
};
use crate::utils::pagination::{AttendancePage, Page, fetch_page, page_window};

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AttendanceFilter {
    /// Admins only
    pub employee_id: Option<String>,
    pub status: Option<AttendanceStatus>,
    /// On or after (YYYY-MM-DD)
    pub from: Option<String>,
    /// On or before (YYYY-MM-DD)
    pub to: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendance {
    pub employee_id: String,
    #[schema(example = "2026-03-16", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default)]
    #[schema(example = "09:00")]
    pub check_in: Option<String>,
    #[serde(default)]
    #[schema(example = "17:30")]
    pub check_out: Option<String>,
}

fn clock_now() -> String {
    Utc::now().format("%H:%M").to_string()
}

async fn todays_record(store: &dyn RecordStore, employee_id: &str) -> AppResult<Option<AttendanceRecord>> {
    let key = attendance_key(employee_id, Utc::now().date_naive());
    Ok(store
        .find_by_key(Collection::Attendance, &key)
        .await?
        .map(from_document)
        .transpose()?)
}

#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceFilter),
    responses(
        (status = 200, description = "Attendance records, most recent day first", body = AttendancePage),
        (status = 403, description = "Admins and employees only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn attendance_list(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    filter: web::Query<AttendanceFilter>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee_scope(filter.employee_id.as_deref())?;

    let query = Query::new()
        .eq_opt("employeeId", employee_id)
        .eq_opt("status", filter.status.map(|s| s.to_string()))
        .range("date", filter.from.as_deref(), filter.to.as_deref())
        .sort_by("date", Order::Desc);

    let page: Page<AttendanceRecord> = fetch_page(
        store.get_ref(),
        Collection::Attendance,
        query,
        page_window(filter.page, filter.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance",
    responses(
        (status = 201, description = "Checked in for today", body = AttendanceRecord),
        (status = 403, description = "Employees only"),
        (status = 409, description = "Already checked in today")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee_id()?;
    let today = Utc::now().date_naive();

    let record = AttendanceRecord {
        id: Uuid::new_v4().to_string(),
        employee_id: employee_id.to_string(),
        date: today,
        status: AttendanceStatus::Present,
        check_in: Some(clock_now()),
        check_out: None,
        hours: None,
    };

    match store
        .insert_unique(
            Collection::Attendance,
            &attendance_key(employee_id, today),
            to_document(&record)?,
        )
        .await?
    {
        InsertOutcome::Inserted(_) => {
            info!(employee_id, date = %today, "Checked in");
            Ok(HttpResponse::Created().json(record))
        }
        InsertOutcome::Exists(_) => Err(AppError::conflict("Already checked in today")),
    }
}

/// Check-out endpoint
#[utoipa::path(
    put,
    path = "/api/attendance",
    responses(
        (status = 200, description = "Checked out; hours computed", body = AttendanceRecord),
        (status = 400, description = "No active check-in found for today"),
        (status = 403, description = "Employees only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee_id()?;
    let no_check_in = || AppError::validation("No active check-in found for today");

    let record = todays_record(store.get_ref(), employee_id)
        .await?
        .filter(|r| r.check_out.is_none())
        .ok_or_else(no_check_in)?;

    let check_out = clock_now();
    let hours = record
        .check_in
        .as_deref()
        .and_then(|start| worked_hours(start, &check_out));

    let mut patch = serde_json::Map::new();
    patch.insert("checkOut".into(), json!(check_out));
    patch.insert("hours".into(), json!(hours));

    // a concurrent check-out loses the guard and sees the same 400
    let doc = match store
        .update(
            Collection::Attendance,
            &record.id,
            Some(&Guard::missing("checkOut")),
            patch,
        )
        .await?
    {
        UpdateOutcome::Updated(doc) => doc,
        _ => return Err(no_check_in()),
    };

    let record: AttendanceRecord = from_document(doc)?;
    info!(employee_id, hours = ?record.hours, "Checked out");
    Ok(HttpResponse::Ok().json(record))
}

/// Admin upsert of one employee-day.
#[utoipa::path(
    post,
    path = "/api/attendance/mark",
    request_body = MarkAttendance,
    responses(
        (status = 200, description = "Existing day overwritten", body = AttendanceRecord),
        (status = 201, description = "Day recorded", body = AttendanceRecord),
        (status = 400, description = "Malformed times"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn mark_attendance(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    payload: web::Json<MarkAttendance>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let payload = payload.into_inner();

    let employee: Account = load(store.get_ref(), Collection::Users, &payload.employee_id, "Employee").await?;
    if employee.user_type != Role::Employee {
        return Err(AppError::not_found("Employee not found"));
    }

    for (name, value) in [("checkIn", &payload.check_in), ("checkOut", &payload.check_out)] {
        if value
            .as_deref()
            .is_some_and(|t| NaiveTime::parse_from_str(t, "%H:%M").is_err())
        {
            return Err(AppError::Validation(format!("{name} must be formatted as HH:MM")));
        }
    }

    let hours = match (&payload.check_in, &payload.check_out) {
        (Some(start), Some(end)) => Some(worked_hours(start, end).ok_or_else(|| {
            AppError::validation("checkIn and checkOut must be HH:MM with checkOut after checkIn")
        })?),
        _ => None,
    };

    let record = AttendanceRecord {
        id: Uuid::new_v4().to_string(),
        employee_id: payload.employee_id,
        date: payload.date,
        status: payload.status,
        check_in: payload.check_in,
        check_out: payload.check_out,
        hours,
    };
    let mut doc = to_document(&record)?;
    let key = attendance_key(&record.employee_id, record.date);

    match store.insert_unique(Collection::Attendance, &key, doc.clone()).await? {
        InsertOutcome::Inserted(_) => Ok(HttpResponse::Created().json(record)),
        InsertOutcome::Exists(existing) => {
            let existing: AttendanceRecord = from_document(existing)?;
            warn!(employee_id = %record.employee_id, date = %record.date, "Overwriting attendance day");
            doc.remove("id");
            let doc = updated(
                store
                    .update(Collection::Attendance, &existing.id, None, doc)
                    .await?,
                "Attendance record",
            )?;
            let record: AttendanceRecord = from_document(doc)?;
            Ok(HttpResponse::Ok().json(record))
        }
    }
}

/// Employees with no attendance for `ATTENDANCE_WINDOW_DAYS` or more.
#[utoipa::path(
    get,
    path = "/api/attendance/missing",
    responses(
        (status = 200, description = "Employees missing attendance", body = [MissingAttendance]),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn missing_attendance(
    auth: AuthUser,
    store: web::Data<dyn RecordStore>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let employees = store
        .find(
            Collection::Users,
            &Query::new().eq("userType", Role::Employee.to_string()),
        )
        .await?
        .into_iter()
        .map(from_document)
        .collect::<Result<Vec<Account>, _>>()?;

    let records = store
        .find(Collection::Attendance, &Query::new())
        .await?
        .into_iter()
        .map(from_document)
        .collect::<Result<Vec<AttendanceRecord>, _>>()?;

    let report = derive_missing_attendance(
        &employees,
        &records,
        config.attendance_window_days,
        Utc::now().date_naive(),
    );
    Ok(HttpResponse::Ok().json(report))
}

#[cfg(test)]
mod tests {
    use actix_web::http::{Method, StatusCode};
    use actix_web::test;
    use chrono::{Duration, Utc};
    use serde_json::{Value, json};

    use crate::api::test_support::{authed, seed_account, seed_employee, test_state, token_for};
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

    #[actix_web::test]
    async fn one_check_in_and_one_check_out_per_day() {
        let state = test_state();
        let employee = seed_account(&state, "staff@agency.test", Role::Employee).await;
        let staff = token_for(&state, &employee);
        let app = test::init_service(build_app(state)).await;

        let (status, record) = call_json!(app, authed(Method::POST, "/api/attendance", &staff));
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(record["status"], "present");
        assert!(record["checkIn"].is_string());

        let (status, body) = call_json!(app, authed(Method::POST, "/api/attendance", &staff));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Already checked in today");

        let (status, record) = call_json!(app, authed(Method::PUT, "/api/attendance", &staff));
        assert_eq!(status, StatusCode::OK);
        assert!(record["checkOut"].is_string());

        let (status, _) = call_json!(app, authed(Method::PUT, "/api/attendance", &staff));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, page) = call_json!(app, authed(Method::GET, "/api/attendance", &staff));
        assert_eq!(page["total"], 1);
    }

    #[actix_web::test]
    async fn marking_the_same_day_twice_overwrites_it() {
        let state = test_state();
        let admin = seed_account(&state, "admin@agency.test", Role::Admin).await;
        let employee = seed_account(&state, "staff@agency.test", Role::Employee).await;
        let boss = token_for(&state, &admin);
        let app = test::init_service(build_app(state)).await;

        let mark = |status: &str| {
            json!({
                "employeeId": employee.id,
                "date": "2026-03-02",
                "status": status,
                "checkIn": "09:00",
                "checkOut": "17:30"
            })
        };

        let (status, first) = call_json!(
            app,
            authed(Method::POST, "/api/attendance/mark", &boss).set_json(mark("present"))
        );
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["hours"], 8.5);

        let (status, second) = call_json!(
            app,
            authed(Method::POST, "/api/attendance/mark", &boss).set_json(mark("leave"))
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["status"], "leave");
        assert_eq!(second["id"], first["id"]);

        let uri = format!("/api/attendance?employeeId={}", employee.id);
        let (_, page) = call_json!(app, authed(Method::GET, &uri, &boss));
        assert_eq!(page["total"], 1);
    }

    #[actix_web::test]
    async fn a_lone_malformed_time_is_rejected() {
        let state = test_state();
        let admin = seed_account(&state, "admin@agency.test", Role::Admin).await;
        let employee = seed_account(&state, "staff@agency.test", Role::Employee).await;
        let boss = token_for(&state, &admin);
        let app = test::init_service(build_app(state)).await;

        let (status, body) = call_json!(
            app,
            authed(Method::POST, "/api/attendance/mark", &boss).set_json(json!({
                "employeeId": employee.id,
                "date": "2026-03-02",
                "status": "present",
                "checkIn": "nine-ish"
            }))
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "checkIn must be formatted as HH:MM");

        let (status, record) = call_json!(
            app,
            authed(Method::POST, "/api/attendance/mark", &boss).set_json(json!({
                "employeeId": employee.id,
                "date": "2026-03-02",
                "status": "present",
                "checkIn": "09:15"
            }))
        );
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(record["checkIn"], "09:15");
    }

    #[actix_web::test]
    async fn missing_report_skips_new_joiners_and_recent_marks() {
        let state = test_state();
        let today = Utc::now().date_naive();
        let admin = seed_account(&state, "admin@agency.test", Role::Admin).await;
        let idle = seed_employee(&state, "idle@agency.test", today - Duration::days(10)).await;
        let fresh = seed_employee(&state, "fresh@agency.test", today).await;
        let active = seed_employee(&state, "active@agency.test", today - Duration::days(30)).await;
        let boss = token_for(&state, &admin);
        let app = test::init_service(build_app(state)).await;

        let (status, _) = call_json!(
            app,
            authed(Method::POST, "/api/attendance/mark", &boss).set_json(json!({
                "employeeId": active.id,
                "date": (today - Duration::days(1)).to_string(),
                "status": "present"
            }))
        );
        assert_eq!(status, StatusCode::CREATED);

        let (status, report) = call_json!(app, authed(Method::GET, "/api/attendance/missing", &boss));
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = report
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["employeeId"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec![idle.id.as_str()]);
        assert!(!ids.contains(&fresh.id.as_str()));
        assert_eq!(report[0]["daysSinceLastMark"], 10);
    }

    #[actix_web::test]
    async fn missing_report_is_admin_only() {
        let state = test_state();
        let employee = seed_account(&state, "staff@agency.test", Role::Employee).await;
        let staff = token_for(&state, &employee);
        let app = test::init_service(build_app(state)).await;

        let (status, _) = call_json!(app, authed(Method::GET, "/api/attendance/missing", &staff));
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
