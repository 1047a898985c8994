use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::role::Role;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(
    example = json!({
        "id": "5b0e8c1e-6a0c-4b8e-9f0e-1f2a3b4c5d6e",
        "email": "jane@acme.co.uk",
        "name": "Jane Smith",
        "userType": "Client",
        "company": "Acme Care",
        "phone": "+44 113 496 0000",
        "notes": null,
        "joinDate": null,
        "createdAt": "2026-01-01T09:00:00Z",
        "updatedAt": "2026-01-01T09:00:00Z"
    })
)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub name: String,
    pub user_type: Role,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Employees only; drives the missing-attendance report.
    #[serde(default)]
    #[schema(value_type = Option<String>, format = "date")]
    pub join_date: Option<NaiveDate>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

/// Login view of an account document. `passwordHash` never leaves the
/// store through [`Account`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub id: String,
    pub email: String,
    pub name: String,
    pub user_type: Role,
    #[serde(default)]
    pub password_hash: Option<String>,
}

/// Unique key of an account in the `users` collection.
pub fn account_key(email: &str) -> String {
    email.trim().to_lowercase()
}
