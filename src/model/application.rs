use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::interview::{Interview, InterviewType};

/// Interview details copied onto the application when it is scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSchedule {
    pub interview_id: String,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub time: String,
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
}

impl From<&Interview> for InterviewSchedule {
    fn from(interview: &Interview) -> Self {
        Self {
            interview_id: interview.id.clone(),
            date: interview.date,
            time: interview.time.clone(),
            duration: interview.duration,
            kind: interview.kind,
            location: interview.location.clone(),
            meeting_link: interview.meeting_link.clone(),
            interviewer: interview.interviewer.clone(),
            interviewer_email: interview.interviewer_email.clone(),
            notes: interview.notes.clone(),
            agenda: interview.agenda.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub job_id: String,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub cover_letter: String,
    /// Opaque blob-storage id of the uploaded CV.
    #[serde(default)]
    pub resume_id: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub applied_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
    #[schema(example = "applied")]
    pub status: String,
    #[serde(default)]
    pub interview_schedule: Option<InterviewSchedule>,
}
