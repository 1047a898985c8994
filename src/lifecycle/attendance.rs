use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::{account::Account, attendance::AttendanceRecord};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MissingAttendance {
    pub employee_id: String,
    pub name: String,
    pub email: String,
    #[schema(value_type = Option<String>, format = "date")]
    pub last_marked: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub join_date: Option<NaiveDate>,
    pub days_since_last_mark: i64,
}

/// Employees who have gone `window_days` or more without an attendance
/// record.
///
/// * joined today (or later): never reported
/// * has records: baseline is the later of the last record and the join
///   date, reported when `today - baseline >= window_days`
/// * no records: reported once at least one day has passed since joining
/// * neither records nor join date: nothing to measure, not reported
pub fn derive_missing_attendance(
    employees: &[Account],
    records: &[AttendanceRecord],
    window_days: i64,
    today: NaiveDate,
) -> Vec<MissingAttendance> {
    let mut last_marked: HashMap<&str, NaiveDate> = HashMap::new();
    for record in records {
        last_marked
            .entry(record.employee_id.as_str())
            .and_modify(|d| *d = (*d).max(record.date))
            .or_insert(record.date);
    }

    employees
        .iter()
        .filter_map(|employee| {
            let join_date = employee.join_date;
            if join_date.is_some_and(|joined| (today - joined).num_days() <= 0) {
                return None;
            }

            let last = last_marked.get(employee.id.as_str()).copied();
            let days = match (last, join_date) {
                (Some(last), joined) => {
                    let baseline = joined.map_or(last, |j| j.max(last));
                    let days = (today - baseline).num_days();
                    (days >= window_days).then_some(days)?
                }
                (None, Some(joined)) => (today - joined).num_days(),
                (None, None) => return None,
            };

            Some(MissingAttendance {
                employee_id: employee.id.clone(),
                name: employee.name.clone(),
                email: employee.email.clone(),
                last_marked: last,
                join_date,
                days_since_last_mark: days,
            })
        })
        .collect()
}
