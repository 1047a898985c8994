use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Sick,
    Casual,
    Vacation,
    Annual,
    Maternity,
}

impl LeaveType {
    /// Yearly allowance in days.
    pub fn allowance(self) -> i64 {
        match self {
            LeaveType::Sick => 10,
            LeaveType::Casual => 10,
            LeaveType::Vacation => 15,
            LeaveType::Annual => 20,
            LeaveType::Maternity => 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    pub id: String,
    pub employee_id: String,
    #[serde(rename = "type")]
    pub leave_type: LeaveType,
    #[schema(value_type = String, format = "date", example = "2026-03-02")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date", example = "2026-03-04")]
    pub end_date: NaiveDate,
    #[serde(default)]
    pub reason: String,
    #[schema(example = "pending")]
    pub status: String,
    #[schema(value_type = String, format = "date-time")]
    pub applied_date: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl LeaveRequest {
    /// Inclusive length in days.
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}
