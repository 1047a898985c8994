use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Vendor ↔ client/admin link. At most one per `(vendorEmail, userEmail)`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub vendor_email: String,
    pub user_email: String,
    #[serde(rename = "type")]
    #[schema(example = "client")]
    pub kind: String,
    #[serde(default)]
    pub notes: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

pub fn connection_key(vendor_email: &str, user_email: &str) -> String {
    format!(
        "{}|{}",
        vendor_email.trim().to_lowercase(),
        user_email.trim().to_lowercase()
    )
}
