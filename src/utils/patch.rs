use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Utc};
use serde_json::{Value, json};

use crate::errors::{AppError, AppResult};
use crate::store::Document;

/// How an updatable field is validated before it reaches the store.
#[derive(Clone, Copy)]
pub enum FieldKind {
    /// Non-blank string.
    Text,
    /// String or null.
    OptionalText,
    /// `YYYY-MM-DD`.
    Date,
    OptionalDate,
    /// `HH:MM`.
    Time,
    /// Non-negative integer that fits the `u32` model fields.
    Count,
    /// Non-negative number.
    Number,
    Bool,
    /// Stored trimmed and lowercased.
    Email,
    /// String accepted by the given parser, usually [`is_variant`].
    Choice(fn(&str) -> bool),
}

#[derive(Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

pub const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

pub fn is_variant<E: FromStr>(value: &str) -> bool {
    E::from_str(value).is_ok()
}

/// Builds a merge patch from a partial update body. Only whitelisted
/// fields are accepted; `updatedAt` is always bumped.
pub fn build_patch(payload: &Value, fields: &[FieldSpec]) -> AppResult<Document> {
    let obj = payload
        .as_object()
        .ok_or_else(|| AppError::validation("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(AppError::validation("No fields provided for update"));
    }

    let mut patch = Document::new();
    for (key, value) in obj {
        let spec = fields
            .iter()
            .find(|f| f.name == key)
            .ok_or_else(|| AppError::Validation(format!("Field '{key}' cannot be updated")))?;
        patch.insert(key.clone(), check_value(spec, value)?);
    }

    patch.insert("updatedAt".into(), json!(Utc::now()));
    Ok(patch)
}

fn check_value(spec: &FieldSpec, value: &Value) -> AppResult<Value> {
    let invalid = |what: &str| AppError::Validation(format!("Field '{}' {what}", spec.name));

    match spec.kind {
        FieldKind::Text => match value.as_str().map(str::trim) {
            Some(s) if !s.is_empty() => Ok(json!(s)),
            _ => Err(invalid("must be a non-empty string")),
        },
        FieldKind::OptionalText => match value {
            Value::Null | Value::String(_) => Ok(value.clone()),
            _ => Err(invalid("must be a string or null")),
        },
        FieldKind::Date => value
            .as_str()
            .filter(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
            .map(|s| json!(s))
            .ok_or_else(|| invalid("must be a date (YYYY-MM-DD)")),
        FieldKind::OptionalDate => match value {
            Value::Null => Ok(Value::Null),
            Value::String(s) if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() => Ok(json!(s)),
            _ => Err(invalid("must be a date (YYYY-MM-DD) or null")),
        },
        FieldKind::Time => value
            .as_str()
            .filter(|s| NaiveTime::parse_from_str(s, "%H:%M").is_ok())
            .map(|s| json!(s))
            .ok_or_else(|| invalid("must be a time (HH:MM)")),
        FieldKind::Count => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(|n| json!(n))
            .ok_or_else(|| invalid("must be a non-negative integer below 2^32")),
        FieldKind::Number => value
            .as_f64()
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| json!(n))
            .ok_or_else(|| invalid("must be a non-negative number")),
        FieldKind::Bool => value
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| invalid("must be true or false")),
        FieldKind::Email => value
            .as_str()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| looks_like_email(s))
            .map(Value::String)
            .ok_or_else(|| invalid("must be an email address")),
        FieldKind::Choice(accepts) => value
            .as_str()
            .filter(|s| accepts(s))
            .map(|s| json!(s))
            .ok_or_else(|| invalid("has an unsupported value")),
    }
}

pub fn looks_like_email(value: &str) -> bool {
    let mut parts = value.split('@');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(domain), None) if !local.is_empty() && domain.contains('.')
    )
}

/// Trimmed value of a required text field, or a 400 with `message`.
pub fn required<'a>(value: &'a str, message: &str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        Err(AppError::validation(message))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::vendor_project::ProjectStatus;

    const FIELDS: &[FieldSpec] = &[
        field("title", FieldKind::Text),
        field("vacancy", FieldKind::Count),
        field("notes", FieldKind::OptionalText),
        field("startDate", FieldKind::Date),
    ];

    #[test]
    fn accepts_whitelisted_fields_and_bumps_updated_at() {
        let patch = build_patch(&json!({ "title": "  Nurse ", "notes": null }), FIELDS).unwrap();
        assert_eq!(patch["title"], "Nurse");
        assert_eq!(patch["notes"], Value::Null);
        assert!(patch.contains_key("updatedAt"));
    }

    #[test]
    fn rejects_protected_and_unknown_fields() {
        let err = build_patch(&json!({ "id": "x" }), FIELDS).unwrap_err();
        assert_eq!(err.to_string(), "Field 'id' cannot be updated");
        assert!(build_patch(&json!({}), FIELDS).is_err());
        assert!(build_patch(&json!([1, 2]), FIELDS).is_err());
    }

    #[test]
    fn validates_value_shapes() {
        assert!(build_patch(&json!({ "vacancy": -1 }), FIELDS).is_err());
        assert!(build_patch(&json!({ "vacancy": 5_000_000_000u64 }), FIELDS).is_err());
        assert!(build_patch(&json!({ "vacancy": u32::MAX }), FIELDS).is_ok());
        assert!(build_patch(&json!({ "startDate": "03/02/2026" }), FIELDS).is_err());
        assert!(build_patch(&json!({ "title": "" }), FIELDS).is_err());

        let status = [field("status", FieldKind::Choice(is_variant::<ProjectStatus>))];
        assert!(build_patch(&json!({ "status": "paused" }), &status).is_ok());
        assert!(build_patch(&json!({ "status": "deleted" }), &status).is_err());
    }

    #[test]
    fn email_shape() {
        assert!(looks_like_email("jane@acme.co.uk"));
        assert!(!looks_like_email("jane"));
        assert!(!looks_like_email("@acme.com"));
        assert!(!looks_like_email("a@b@c.com"));
    }
}
