use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanRequest {
    pub id: String,
    pub employee_id: String,
    #[serde(rename = "type")]
    #[schema(example = "personal")]
    pub loan_type: String,
    #[schema(example = 1200.0)]
    pub amount: f64,
    #[serde(default)]
    pub purpose: String,
    #[schema(example = 12)]
    pub repayment_months: u32,
    #[schema(example = 100.0)]
    pub monthly_installment: f64,
    #[schema(example = "pending")]
    pub status: String,
    #[schema(value_type = String, format = "date-time")]
    pub applied_date: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

/// Rounded to pennies.
pub fn monthly_installment(amount: f64, repayment_months: u32) -> f64 {
    if repayment_months == 0 {
        return amount;
    }
    (amount / f64::from(repayment_months) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installment_rounds_to_two_places() {
        assert_eq!(monthly_installment(1200.0, 12), 100.0);
        assert_eq!(monthly_installment(1000.0, 3), 333.33);
        assert_eq!(monthly_installment(500.0, 0), 500.0);
    }
}
