use std::str::FromStr;

use chrono::Datelike;
use serde::Serialize;
use strum::IntoEnumIterator;
use utoipa::ToSchema;

use super::RequestStatus;
use crate::model::leave_request::{LeaveRequest, LeaveType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaveBalance {
    #[serde(rename = "type")]
    pub leave_type: LeaveType,
    pub total: i64,
    pub used: i64,
    pub remaining: i64,
}

/// Remaining allowance per leave type for `year`, derived from one
/// employee's requests. Only approved (or completed) requests starting in
/// that year are deducted.
pub fn derive_leave_balance(requests: &[LeaveRequest], year: i32) -> Vec<LeaveBalance> {
    LeaveType::iter()
        .map(|leave_type| {
            let used: i64 = requests
                .iter()
                .filter(|r| r.leave_type == leave_type && r.start_date.year() == year)
                .filter(|r| {
                    RequestStatus::from_str(&r.status).is_ok_and(RequestStatus::consumes_balance)
                })
                .map(LeaveRequest::days)
                .sum();
            let total = leave_type.allowance();
            LeaveBalance {
                leave_type,
                total,
                used,
                remaining: (total - used).max(0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn leave(leave_type: LeaveType, start: (u32, u32), end: (u32, u32), status: &str) -> LeaveRequest {
        LeaveRequest {
            id: "L1".into(),
            employee_id: "e1".into(),
            leave_type,
            start_date: NaiveDate::from_ymd_opt(2026, start.0, start.1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, end.0, end.1).unwrap(),
            reason: String::new(),
            status: status.into(),
            applied_date: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn balance_for(balances: &[LeaveBalance], leave_type: LeaveType) -> &LeaveBalance {
        balances.iter().find(|b| b.leave_type == leave_type).unwrap()
    }

    #[test]
    fn approved_leave_is_deducted_inclusively() {
        let requests = [leave(LeaveType::Annual, (3, 2), (3, 4), "approved")];
        let balances = derive_leave_balance(&requests, 2026);
        let annual = balance_for(&balances, LeaveType::Annual);
        assert_eq!(annual.used, 3);
        assert_eq!(annual.remaining, 17);
        assert_eq!(balance_for(&balances, LeaveType::Sick).remaining, 10);
    }

    #[test]
    fn pending_and_rejected_leave_is_free() {
        let requests = [
            leave(LeaveType::Sick, (1, 5), (1, 6), "pending"),
            leave(LeaveType::Sick, (1, 7), (1, 8), "rejected"),
            leave(LeaveType::Sick, (1, 9), (1, 9), "completed"),
        ];
        let sick = derive_leave_balance(&requests, 2026)
            .into_iter()
            .find(|b| b.leave_type == LeaveType::Sick)
            .unwrap();
        assert_eq!(sick.used, 1);
        assert_eq!(sick.remaining, 9);
    }

    #[test]
    fn remaining_never_goes_negative() {
        let requests = [leave(LeaveType::Casual, (1, 1), (1, 31), "approved")];
        let casual = derive_leave_balance(&requests, 2026)
            .into_iter()
            .find(|b| b.leave_type == LeaveType::Casual)
            .unwrap();
        assert_eq!(casual.used, 31);
        assert_eq!(casual.remaining, 0);
    }

    #[test]
    fn allowance_resets_each_year() {
        let mut last_year = leave(LeaveType::Vacation, (12, 20), (12, 31), "approved");
        last_year.start_date = NaiveDate::from_ymd_opt(2025, 12, 20).unwrap();
        last_year.end_date = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        let requests = [last_year, leave(LeaveType::Vacation, (2, 2), (2, 3), "approved")];

        let this_year = derive_leave_balance(&requests, 2026);
        assert_eq!(balance_for(&this_year, LeaveType::Vacation).used, 2);
        assert_eq!(balance_for(&this_year, LeaveType::Vacation).remaining, 13);

        let previous = derive_leave_balance(&requests, 2025);
        assert_eq!(balance_for(&previous, LeaveType::Vacation).used, 12);
    }

    #[test]
    fn every_leave_type_is_listed() {
        assert_eq!(derive_leave_balance(&[], 2026).len(), 5);
    }
}
