use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Leave,
    Weekend,
    Holiday,
}

/// One day for one employee; unique per `(employeeId, date)`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub employee_id: String,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default)]
    #[schema(example = "09:02")]
    pub check_in: Option<String>,
    #[serde(default)]
    #[schema(example = "17:31")]
    pub check_out: Option<String>,
    #[serde(default)]
    #[schema(example = 8.48)]
    pub hours: Option<f64>,
}

pub fn attendance_key(employee_id: &str, date: NaiveDate) -> String {
    format!("{employee_id}|{date}")
}

/// Worked hours between two `HH:MM` stamps, rounded to hundredths.
/// `None` when either stamp is malformed or check-out precedes check-in.
pub fn worked_hours(check_in: &str, check_out: &str) -> Option<f64> {
    let start = NaiveTime::parse_from_str(check_in, "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(check_out, "%H:%M").ok()?;
    let minutes = (end - start).num_minutes();
    if minutes < 0 {
        return None;
    }
    Some((minutes as f64 / 60.0 * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hours_between_stamps() {
        assert_eq!(worked_hours("09:00", "17:30"), Some(8.5));
        assert_eq!(worked_hours("09:02", "17:31"), Some(8.48));
        assert_eq!(worked_hours("17:00", "09:00"), None);
        assert_eq!(worked_hours("9am", "17:00"), None);
    }
}
