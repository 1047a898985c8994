use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum InterviewType {
    Video,
    Phone,
    InPerson,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Interview {
    pub id: String,
    /// Application id.
    pub candidate_id: String,
    pub job_id: String,
    #[schema(value_type = String, format = "date", example = "2026-02-03")]
    pub date: NaiveDate,
    #[schema(example = "10:30")]
    pub time: String,
    /// Minutes.
    #[schema(example = 45)]
    pub duration: u32,
    #[serde(rename = "type")]
    pub kind: InterviewType,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub meeting_link: Option<String>,
    pub interviewer: String,
    #[serde(default)]
    pub interviewer_email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub agenda: Option<String>,
    #[schema(example = "scheduled")]
    pub status: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}
