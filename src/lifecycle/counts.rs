use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use super::Lifecycle;

/// Bucket for stored values outside the status enum.
pub const UNKNOWN: &str = "unknown";

/// Per-status totals behind the dashboard stats cards. Every status of the
/// enum is present, zero or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
}

impl StatusCounts {
    pub fn empty<S: Lifecycle>() -> Self {
        Self {
            total: 0,
            by_status: S::iter().map(|s| (s.as_ref().to_string(), 0)).collect(),
        }
    }

    pub fn add<S: Lifecycle>(&mut self, raw: &str, n: u64) {
        let key = match S::from_str(raw) {
            Ok(status) => status.as_ref().to_string(),
            Err(_) => UNKNOWN.to_string(),
        };
        *self.by_status.entry(key).or_insert(0) += n;
        self.total += n;
    }

    pub fn get(&self, status: &str) -> u64 {
        self.by_status.get(status).copied().unwrap_or(0)
    }

    /// Builds counts from store-side `GROUP BY status` results.
    pub fn from_groups<S: Lifecycle>(groups: &BTreeMap<String, u64>) -> Self {
        let mut counts = Self::empty::<S>();
        for (raw, n) in groups {
            counts.add::<S>(raw, *n);
        }
        counts
    }
}

pub fn derive_counts<'a, S: Lifecycle>(statuses: impl IntoIterator<Item = &'a str>) -> StatusCounts {
    let mut counts = StatusCounts::empty::<S>();
    for raw in statuses {
        counts.add::<S>(raw, 1);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{ApplicationStatus, RequestStatus};

    #[test]
    fn buckets_sum_to_input_length() {
        let statuses = [
            "applied",
            "applied",
            "hired",
            "interview-scheduled",
            "archived",
            "",
            "rejected",
        ];
        let counts = derive_counts::<ApplicationStatus>(statuses);

        assert_eq!(counts.total, statuses.len() as u64);
        assert_eq!(counts.by_status.values().sum::<u64>(), statuses.len() as u64);
        assert_eq!(counts.get("applied"), 2);
        assert_eq!(counts.get("interview-scheduled"), 1);
        assert_eq!(counts.get(UNKNOWN), 2);
        assert_eq!(counts.get("shortlisted"), 0);
    }

    #[test]
    fn order_does_not_matter() {
        let a = derive_counts::<RequestStatus>(["pending", "approved", "pending", "x"]);
        let b = derive_counts::<RequestStatus>(["x", "pending", "pending", "approved"]);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_input_lists_every_status() {
        let counts = derive_counts::<RequestStatus>([]);
        assert_eq!(counts.total, 0);
        assert_eq!(counts.by_status.len(), 4);
        assert!(!counts.by_status.contains_key(UNKNOWN));
    }

    #[test]
    fn grouped_counts_fold_unknowns() {
        let groups = BTreeMap::from([
            ("pending".to_string(), 3),
            ("".to_string(), 1),
            ("legacy".to_string(), 2),
        ]);
        let counts = StatusCounts::from_groups::<RequestStatus>(&groups);
        assert_eq!(counts.total, 6);
        assert_eq!(counts.get("pending"), 3);
        assert_eq!(counts.get(UNKNOWN), 3);
    }
}
