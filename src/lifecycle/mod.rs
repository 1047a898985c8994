//! Status lifecycles for applications, leave/loan requests and interviews.
//!
//! Status fields are stored as plain strings; everything that moves a
//! status parses it into one of the enums below and checks the edge
//! against the entity's transition table. Admins may force any edge, but
//! never a value outside the enum.

pub mod attendance;
pub mod balance;
pub mod counts;
pub mod workflow;

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::errors::AppError;

pub trait Lifecycle: Copy + Eq + FromStr + AsRef<str> + IntoEnumIterator + 'static {
    /// Human name used in error messages.
    const ENTITY: &'static str;

    fn initial() -> Self;

    fn can_transition(self, to: Self) -> bool;

    fn is_terminal(self) -> bool;

    fn parse(value: &str) -> Result<Self, AppError> {
        Self::from_str(value).map_err(|_| {
            let allowed: Vec<String> = Self::iter().map(|s| s.as_ref().to_string()).collect();
            AppError::Validation(format!(
                "Invalid {} status '{}'. Allowed: {}",
                Self::ENTITY,
                value,
                allowed.join(", ")
            ))
        })
    }
}

/// Rejects edges missing from the table unless `force` is set.
pub fn check_transition<S: Lifecycle>(from: S, to: S, force: bool) -> Result<(), AppError> {
    if force || from.can_transition(to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition {
            from: from.as_ref().to_string(),
            to: to.as_ref().to_string(),
        })
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ApplicationStatus {
    Applied,
    Shortlisted,
    InterviewScheduled,
    Hired,
    Rejected,
    Completed,
}

impl Lifecycle for ApplicationStatus {
    const ENTITY: &'static str = "application";

    fn initial() -> Self {
        ApplicationStatus::Applied
    }

    fn can_transition(self, to: Self) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, to),
            (Applied, Shortlisted | InterviewScheduled | Rejected)
                | (Shortlisted, InterviewScheduled | Rejected)
                // rescheduling keeps the status
                | (InterviewScheduled, InterviewScheduled | Hired | Rejected)
                | (Hired, Completed)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, ApplicationStatus::Rejected | ApplicationStatus::Completed)
    }
}

/// Shared by leave and loan requests.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
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
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl RequestStatus {
    /// Approved time off counts against the balance, including once it
    /// has been taken.
    pub fn consumes_balance(self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Completed)
    }
}

impl Lifecycle for RequestStatus {
    const ENTITY: &'static str = "request";

    fn initial() -> Self {
        RequestStatus::Pending
    }

    fn can_transition(self, to: Self) -> bool {
        use RequestStatus::*;
        matches!(
            (self, to),
            (Pending, Approved | Rejected) | (Approved, Completed)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Rejected | RequestStatus::Completed)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
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
pub enum InterviewStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl Lifecycle for InterviewStatus {
    const ENTITY: &'static str = "interview";

    fn initial() -> Self {
        InterviewStatus::Scheduled
    }

    fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (
                InterviewStatus::Scheduled,
                InterviewStatus::Completed | InterviewStatus::Cancelled
            )
        )
    }

    fn is_terminal(self) -> bool {
        !matches!(self, InterviewStatus::Scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reachable<S: Lifecycle>(from: S) -> Vec<S> {
        S::iter().filter(|to| from.can_transition(*to)).collect()
    }

    #[test]
    fn application_happy_path_is_permitted() {
        use ApplicationStatus::*;
        let path = [Applied, Shortlisted, InterviewScheduled, Hired, Completed];
        for pair in path.windows(2) {
            assert!(check_transition(pair[0], pair[1], false).is_ok(), "{pair:?}");
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for status in ApplicationStatus::iter().filter(|s| s.is_terminal()) {
            assert!(reachable(status).is_empty(), "{status}");
        }
        for status in RequestStatus::iter().filter(|s| s.is_terminal()) {
            assert!(reachable(status).is_empty(), "{status}");
        }
        for status in InterviewStatus::iter().filter(|s| s.is_terminal()) {
            assert!(reachable(status).is_empty(), "{status}");
        }
    }

    #[test]
    fn rejected_application_cannot_be_hired_without_force() {
        let err = check_transition(ApplicationStatus::Rejected, ApplicationStatus::Hired, false)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert!(
            check_transition(ApplicationStatus::Rejected, ApplicationStatus::Hired, true).is_ok()
        );
    }

    #[test]
    fn requests_are_decided_once() {
        use RequestStatus::*;
        assert_eq!(reachable(Pending), vec![Approved, Rejected]);
        assert_eq!(reachable(Approved), vec![Completed]);
        assert!(!Approved.can_transition(Rejected));
    }

    #[test]
    fn every_initial_state_is_not_terminal() {
        assert!(!ApplicationStatus::initial().is_terminal());
        assert!(!RequestStatus::initial().is_terminal());
        assert!(!InterviewStatus::initial().is_terminal());
    }

    #[test]
    fn parse_uses_wire_names() {
        assert_eq!(
            ApplicationStatus::parse("interview-scheduled").unwrap(),
            ApplicationStatus::InterviewScheduled
        );
        assert_eq!(
            serde_json::to_value(ApplicationStatus::InterviewScheduled).unwrap(),
            "interview-scheduled"
        );
        let err = RequestStatus::parse("maybe").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid request status 'maybe'. Allowed: pending, approved, rejected, completed"
        );
    }
}
