use crate::api::StatusUpdate;
use crate::api::applications::{ApplicationForm, CreateApplication, ScheduledInterview};
use crate::api::attendance::MarkAttendance;
use crate::api::connections::CreateConnection;
use crate::api::jobs::CreateJob;
use crate::api::leave_request::CreateLeave;
use crate::api::loan_request::CreateLoan;
use crate::api::notices::CreateNotice;
use crate::api::users::CreateAccount;
use crate::api::vendor_projects::CreateProject;
use crate::auth::handlers::EmailAvailability;
use crate::lifecycle::attendance::MissingAttendance;
use crate::lifecycle::balance::LeaveBalance;
use crate::lifecycle::counts::StatusCounts;
use crate::lifecycle::workflow::InterviewDraft;
use crate::model::account::Account;
use crate::model::application::{Application, InterviewSchedule};
use crate::model::attendance::{AttendanceRecord, AttendanceStatus};
use crate::model::connection::Connection;
use crate::model::interview::{Interview, InterviewType};
use crate::model::job::Job;
use crate::model::leave_request::{LeaveRequest, LeaveType};
use crate::model::loan_request::LoanRequest;
use crate::model::notice::{Audience, Notice, NoticePriority};
use crate::model::role::Role;
use crate::model::vendor_project::{ProjectStatus, VendorProject};
use crate::models::{LoginReqDto, LoginResponse, RegisterReq};
use crate::utils::pagination::{
    AccountPage, ApplicationPage, AttendancePage, ConnectionPage, InterviewPage, JobPage,
    LeavePage, LoanPage, NoticePage, VendorProjectPage,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TalentDesk API",
        version = "1.0.0",
        description = r#"
## Recruitment agency dashboard

One backend for the four sides of a staffing agency.

### 🔹 Key Features
- **Admins** manage accounts, jobs, notices and every workflow
- **Clients** post jobs and follow their applicants through interviews
- **Vendors** keep a client book and publish project showcases
- **Employees** request leave and loans and check in for attendance
- **Candidates** browse the public job board and apply without an account

### 🔁 Status workflows
Applications, interviews, leave and loan requests move through fixed
transition tables. Illegal moves answer `409`; admins may force one.
List endpoints return per-status counts next to each page.

### 🔐 Security
Most endpoints are protected using **JWT Bearer authentication**.
Refresh tokens are single use.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::auth::handlers::email_available,
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,

        crate::api::users::list_accounts,
        crate::api::users::create_account,
        crate::api::users::get_account,
        crate::api::users::update_account,
        crate::api::users::delete_account,

        crate::api::connections::list_connections,
        crate::api::connections::create_connection,
        crate::api::connections::delete_connection,

        crate::api::vendor_projects::list_projects,
        crate::api::vendor_projects::create_project,
        crate::api::vendor_projects::get_project,
        crate::api::vendor_projects::update_project,
        crate::api::vendor_projects::delete_project,

        crate::api::jobs::public_job_list,
        crate::api::jobs::public_get_job,
        crate::api::jobs::apply_for_job,
        crate::api::jobs::list_jobs,
        crate::api::jobs::create_job,
        crate::api::jobs::get_job,
        crate::api::jobs::update_job,
        crate::api::jobs::delete_job,

        crate::api::applications::list_applications,
        crate::api::applications::create_application,
        crate::api::applications::get_application,
        crate::api::applications::update_application,
        crate::api::applications::set_application_status,
        crate::api::applications::schedule_application_interview,
        crate::api::applications::delete_application,

        crate::api::interviews::list_interviews,
        crate::api::interviews::get_interview,
        crate::api::interviews::update_interview,
        crate::api::interviews::set_interview_status,
        crate::api::interviews::delete_interview,

        crate::api::notices::list_notices,
        crate::api::notices::create_notice,
        crate::api::notices::get_notice,
        crate::api::notices::update_notice,
        crate::api::notices::delete_notice,

        crate::api::leave_request::leave_list,
        crate::api::leave_request::create_leave,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::update_leave,
        crate::api::leave_request::delete_leave,
        crate::api::leave_request::set_leave_status,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::leave_balance,

        crate::api::loan_request::loan_list,
        crate::api::loan_request::create_loan,
        crate::api::loan_request::get_loan,
        crate::api::loan_request::update_loan,
        crate::api::loan_request::delete_loan,
        crate::api::loan_request::set_loan_status,
        crate::api::loan_request::approve_loan,
        crate::api::loan_request::reject_loan,

        crate::api::attendance::attendance_list,
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::mark_attendance,
        crate::api::attendance::missing_attendance
    ),
    components(
        schemas(
            RegisterReq,
            LoginReqDto,
            LoginResponse,
            EmailAvailability,
            Role,
            Account,
            AccountPage,
            CreateAccount,
            Connection,
            ConnectionPage,
            CreateConnection,
            VendorProject,
            VendorProjectPage,
            ProjectStatus,
            CreateProject,
            Job,
            JobPage,
            CreateJob,
            Application,
            ApplicationPage,
            ApplicationForm,
            CreateApplication,
            InterviewSchedule,
            InterviewDraft,
            ScheduledInterview,
            Interview,
            InterviewPage,
            InterviewType,
            Notice,
            NoticePage,
            NoticePriority,
            Audience,
            CreateNotice,
            LeaveRequest,
            LeavePage,
            LeaveType,
            CreateLeave,
            LeaveBalance,
            LoanRequest,
            LoanPage,
            CreateLoan,
            AttendanceRecord,
            AttendancePage,
            AttendanceStatus,
            MarkAttendance,
            MissingAttendance,
            StatusUpdate,
            StatusCounts
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and token rotation"),
        (name = "Users", description = "Account management APIs"),
        (name = "Connections", description = "Vendor client book"),
        (name = "Vendor projects", description = "Vendor project showcase"),
        (name = "Jobs", description = "Job postings and the public job board"),
        (name = "Applications", description = "Candidate applications and their pipeline"),
        (name = "Interviews", description = "Interview scheduling and outcomes"),
        (name = "Notices", description = "Audience-targeted announcements"),
        (name = "Leave", description = "Leave management APIs"),
        (name = "Loans", description = "Loan request APIs"),
        (name = "Attendance", description = "Attendance management APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_documented_route_sits_under_api() {
        let doc = ApiDoc::openapi();
        assert!(!doc.paths.paths.is_empty());
        assert!(doc.paths.paths.keys().all(|p| p.starts_with("/api/")));
        assert!(doc.paths.paths.contains_key("/api/leave/balance"));
        assert!(doc.paths.paths.contains_key("/api/attendance/missing"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
