use std::cmp::Ordering;

use serde_json::Value;

use super::Document;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Exact JSON equality on one field.
    Eq { field: String, value: Value },
    /// Case-insensitive substring match on any of the fields.
    Contains { fields: Vec<String>, needle: String },
    /// Inclusive range over an ISO-8601 string field. The upper bound is
    /// compared on the bound's length, so `to = "2026-01-31"` includes
    /// `"2026-01-31T18:00:00Z"`.
    Range {
        field: String,
        from: Option<String>,
        to: Option<String>,
    },
    /// Field value is one of the given values.
    In { field: String, values: Vec<Value> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Filter + single-key sort + pagination. Unset sort means insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub conditions: Vec<Condition>,
    pub sort: Option<(String, Order)>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn eq_opt<V: Into<Value>>(self, field: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.eq(field, v),
            None => self,
        }
    }

    pub fn contains(mut self, fields: &[&str], needle: Option<&str>) -> Self {
        if let Some(needle) = needle.map(str::trim).filter(|n| !n.is_empty()) {
            self.conditions.push(Condition::Contains {
                fields: fields.iter().map(|f| f.to_string()).collect(),
                needle: needle.to_lowercase(),
            });
        }
        self
    }

    pub fn range(mut self, field: &str, from: Option<&str>, to: Option<&str>) -> Self {
        if from.is_some() || to.is_some() {
            self.conditions.push(Condition::Range {
                field: field.to_string(),
                from: from.map(str::to_string),
                to: to.map(str::to_string),
            });
        }
        self
    }

    pub fn one_of(mut self, field: &str, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::In {
            field: field.to_string(),
            values,
        });
        self
    }

    pub fn sort_by(mut self, field: &str, order: Order) -> Self {
        self.sort = Some((field.to_string(), order));
        self
    }

    /// 1-based page.
    pub fn page(mut self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.limit = Some(per_page);
        self.offset = (page - 1) * per_page;
        self
    }

    /// Same filter without sort or pagination, used for totals and counts.
    pub fn unpaged(&self) -> Self {
        Self {
            conditions: self.conditions.clone(),
            sort: None,
            limit: None,
            offset: 0,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| condition_matches(c, doc))
    }

    /// Sorts and paginates already-filtered documents in place.
    pub fn arrange(&self, docs: &mut Vec<Document>) {
        if let Some((field, order)) = &self.sort {
            docs.sort_by(|a, b| {
                let ord = compare_values(a.get(field), b.get(field));
                match order {
                    Order::Asc => ord,
                    Order::Desc => ord.reverse(),
                }
            });
        }

        let offset = usize::try_from(self.offset).unwrap_or(usize::MAX);
        if offset > 0 {
            docs.drain(..offset.min(docs.len()));
        }
        if let Some(limit) = self.limit {
            docs.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
    }
}

fn condition_matches(condition: &Condition, doc: &Document) -> bool {
    match condition {
        Condition::Eq { field, value } => doc.get(field) == Some(value),
        Condition::Contains { fields, needle } => fields.iter().any(|f| {
            doc.get(f)
                .and_then(Value::as_str)
                .is_some_and(|s| s.to_lowercase().contains(needle.as_str()))
        }),
        Condition::Range { field, from, to } => {
            let Some(value) = doc.get(field).and_then(Value::as_str) else {
                return false;
            };
            let above = from.as_deref().is_none_or(|from| value >= from);
            let below = to.as_deref().is_none_or(|to| {
                let end = value
                    .char_indices()
                    .nth(to.chars().count())
                    .map_or(value.len(), |(i, _)| i);
                &value[..end] <= to
            });
            above && below
        }
        Condition::In { field, values } => doc.get(field).is_some_and(|v| values.contains(v)),
    }
}

/// Missing values sort last in ascending order.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::String(x)), Some(Value::String(y))) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn unset_filters_are_ignored() {
        let q = Query::new()
            .eq_opt::<String>("status", None)
            .contains(&["title"], Some("   "))
            .range("date", None, None);
        assert!(q.conditions.is_empty());
        assert!(q.matches(&doc(json!({ "title": "anything" }))));
    }

    #[test]
    fn contains_is_case_insensitive_across_fields() {
        let q = Query::new().contains(&["title", "company"], Some("NURSE"));
        assert!(q.matches(&doc(json!({ "title": "Staff Nurse", "company": "X" }))));
        assert!(q.matches(&doc(json!({ "title": "Carer", "company": "Nurses Ltd" }))));
        assert!(!q.matches(&doc(json!({ "title": "Carer", "company": "X" }))));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let q = Query::new().range("date", Some("2026-01-10"), Some("2026-01-12"));
        assert!(q.matches(&doc(json!({ "date": "2026-01-10" }))));
        assert!(q.matches(&doc(json!({ "date": "2026-01-12T17:00:00Z" }))));
        assert!(!q.matches(&doc(json!({ "date": "2026-01-13" }))));
        assert!(!q.matches(&doc(json!({ "date": "2026-01-09" }))));
        assert!(!q.matches(&doc(json!({}))));
    }

    #[test]
    fn one_of_checks_membership() {
        let q = Query::new().one_of("audience", vec![json!("all"), json!("vendor")]);
        assert!(q.matches(&doc(json!({ "audience": "vendor" }))));
        assert!(!q.matches(&doc(json!({ "audience": "admin" }))));
    }

    #[test]
    fn arrange_sorts_then_paginates() {
        let mut docs = vec![
            doc(json!({ "name": "carol" })),
            doc(json!({ "name": "Alice" })),
            doc(json!({})),
            doc(json!({ "name": "bob" })),
        ];
        let q = Query::new().sort_by("name", Order::Asc).page(1, 3);
        q.arrange(&mut docs);
        let names: Vec<_> = docs.iter().map(|d| d.get("name").cloned()).collect();
        assert_eq!(
            names,
            vec![Some(json!("Alice")), Some(json!("bob")), Some(json!("carol"))]
        );

        let mut docs = vec![doc(json!({ "n": 1 })), doc(json!({ "n": 2 })), doc(json!({ "n": 3 }))];
        Query::new().page(2, 2).arrange(&mut docs);
        assert_eq!(docs, vec![doc(json!({ "n": 3 }))]);
    }
}
