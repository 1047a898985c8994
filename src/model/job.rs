use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(
    example = json!({
        "id": "0f6f5f52-9a55-4d8b-8f57-3c1c1c6b2f10",
        "title": "Nurse",
        "company": "X",
        "location": "Leeds",
        "jobType": "Full-Time",
        "category": "Healthcare",
        "description": "Ward nurse, rotating shifts",
        "salary": "£32,000",
        "jobReference": "REF1",
        "vacancy": 3,
        "featured": false,
        "postedBy": "client@x.com",
        "postedAt": "2026-01-01T09:00:00Z",
        "updatedAt": "2026-01-01T09:00:00Z"
    })
)]
pub struct Job {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub job_type: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub salary: Option<String>,
    pub job_reference: String,
    pub vacancy: u32,
    #[serde(default)]
    pub featured: bool,
    pub posted_by: String,
    #[schema(value_type = String, format = "date-time")]
    pub posted_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}
