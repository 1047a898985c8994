use serde::Serialize;
use serde::de::DeserializeOwned;
use utoipa::ToSchema;

use crate::errors::AppResult;
use crate::lifecycle::Lifecycle;
use crate::lifecycle::counts::{StatusCounts, UNKNOWN};
use crate::model::{
    account::Account, application::Application, attendance::AttendanceRecord,
    connection::Connection, interview::Interview, job::Job, leave_request::LeaveRequest,
    loan_request::LoanRequest, notice::Notice, vendor_project::VendorProject,
};
use crate::store::{Collection, Query, RecordStore, from_document};

pub const DEFAULT_PER_PAGE: u64 = 20;
pub const MAX_PER_PAGE: u64 = 100;

/// 1-based page and clamped page size.
pub fn page_window(page: Option<u64>, per_page: Option<u64>) -> (u64, u64) {
    (
        page.unwrap_or(1).max(1),
        per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
    )
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[aliases(
    AccountPage = Page<Account>,
    ConnectionPage = Page<Connection>,
    VendorProjectPage = Page<VendorProject>,
    JobPage = Page<Job>,
    ApplicationPage = Page<Application>,
    InterviewPage = Page<Interview>,
    NoticePage = Page<Notice>,
    LeavePage = Page<LeaveRequest>,
    LoanPage = Page<LoanRequest>,
    AttendancePage = Page<AttendanceRecord>
)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 20)]
    pub per_page: u64,
    #[schema(example = 1)]
    pub total: u64,
    /// Status breakdown of the whole filtered set, not just this page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<StatusCounts>,
}

/// Runs `query` for one page and counts the full filtered set.
pub async fn fetch_page<T: DeserializeOwned>(
    store: &dyn RecordStore,
    collection: Collection,
    query: Query,
    (page, per_page): (u64, u64),
) -> AppResult<Page<T>> {
    let total = store.count(collection, &query.unpaged()).await?;
    let data = store
        .find(collection, &query.page(page, per_page))
        .await?
        .into_iter()
        .map(from_document)
        .collect::<Result<Vec<T>, _>>()?;

    Ok(Page {
        data,
        page,
        per_page,
        total,
        counts: None,
    })
}

impl<T> Page<T> {
    /// Attaches the status breakdown, grouped by the store in one pass.
    pub async fn with_counts<S: Lifecycle>(
        mut self,
        store: &dyn RecordStore,
        collection: Collection,
        query: &Query,
    ) -> AppResult<Self> {
        let groups = store
            .group_count(collection, &query.unpaged(), "status")
            .await?;
        let mut counts = StatusCounts::empty::<S>();
        for (raw, n) in &groups {
            // documents without a status
            let raw = if raw.is_empty() { UNKNOWN } else { raw.as_str() };
            counts.add::<S>(raw, *n);
        }
        self.counts = Some(counts);
        Ok(self)
    }
}
