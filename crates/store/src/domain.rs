//! Search predicates and options.
//!
//! A `Domain` is an AND-combined list of `(field, operator, value)` predicates,
//! serialized on the wire as `[[field, op, value], ...]`. `matches` evaluates the
//! same semantics locally for the in-memory store.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::record::Record;

/// Predicate operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    /// Pattern match as written (`%` and `_` wildcards, anchored).
    #[serde(rename = "=like")]
    EqLike,
    /// Case-sensitive containment (pattern is wrapped in `%...%`).
    #[serde(rename = "like")]
    Like,
    /// Case-insensitive containment.
    #[serde(rename = "ilike")]
    ILike,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "in")]
    In,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::EqLike => "=like",
            Op::Like => "like",
            Op::ILike => "ilike",
            Op::Ge => ">=",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Lt => "<",
            Op::In => "in",
        }
    }
}

/// One `(field, op, value)` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: Op,
    pub value: JsonValue,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: Op, value: impl Into<JsonValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn to_wire(&self) -> JsonValue {
        json!([self.field, self.op.as_str(), self.value])
    }

    pub fn matches(&self, record: &Record) -> bool {
        let actual = comparable(record.get(&self.field));
        match self.op {
            Op::Eq => loose_eq(&actual, &self.value),
            Op::Ne => !loose_eq(&actual, &self.value),
            Op::EqLike => text_match(&actual, &self.value, false, false),
            Op::Like => text_match(&actual, &self.value, true, false),
            Op::ILike => text_match(&actual, &self.value, true, true),
            Op::Ge => compare(&actual, &self.value).is_some_and(|o| o != Ordering::Less),
            Op::Le => compare(&actual, &self.value).is_some_and(|o| o != Ordering::Greater),
            Op::Gt => compare(&actual, &self.value) == Some(Ordering::Greater),
            Op::Lt => compare(&actual, &self.value) == Some(Ordering::Less),
            Op::In => self
                .value
                .as_array()
                .is_some_and(|items| items.iter().any(|v| loose_eq(&actual, v))),
        }
    }
}

/// AND-combined predicate list. The empty domain matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Domain {
    predicates: Vec<Predicate>,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, op: Op, value: impl Into<JsonValue>) -> Self {
        self.predicates.push(Predicate::new(field, op, value));
        self
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn to_wire(&self) -> JsonValue {
        JsonValue::Array(self.predicates.iter().map(Predicate::to_wire).collect())
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }
}

/// Sort direction of an order hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Single-key order hint (`"id desc"` on the wire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    pub fn to_wire(&self) -> String {
        match self.direction {
            Direction::Asc => format!("{} asc", self.field),
            Direction::Desc => format!("{} desc", self.field),
        }
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let left = comparable(a.get(&self.field));
        let right = comparable(b.get(&self.field));
        let ord = compare(&left, &right).unwrap_or(Ordering::Equal);
        match self.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    }
}

/// Search options: projection, order hint, limit, inactive records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    /// Fields to return. Empty means every field; `id` is always returned.
    pub fields: Vec<String>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
    /// Also return archived records (`active = false`).
    pub include_inactive: bool,
}

impl SearchOptions {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn order(mut self, order: OrderBy) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn include_inactive(mut self) -> Self {
        self.include_inactive = true;
        self
    }

    /// Keyword arguments of a `search_read` call.
    pub fn to_wire(&self) -> JsonValue {
        let mut kwargs = serde_json::Map::new();
        if !self.fields.is_empty() {
            kwargs.insert("fields".into(), json!(self.fields));
        }
        if let Some(order) = &self.order {
            kwargs.insert("order".into(), json!(order.to_wire()));
        }
        if let Some(limit) = self.limit {
            kwargs.insert("limit".into(), json!(limit));
        }
        if self.include_inactive {
            kwargs.insert("context".into(), json!({ "active_test": false }));
        }
        JsonValue::Object(kwargs)
    }
}

// Relational fields compare by their id.
fn comparable(value: Option<&JsonValue>) -> JsonValue {
    match value {
        None | Some(JsonValue::Null) => JsonValue::Bool(false),
        Some(JsonValue::Array(pair))
            if pair.len() == 2 && pair[0].is_i64() && pair[1].is_string() =>
        {
            pair[0].clone()
        }
        Some(v) => v.clone(),
    }
}

fn loose_eq(actual: &JsonValue, expected: &JsonValue) -> bool {
    match (actual, expected) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64() == b.as_f64(),
        (JsonValue::Array(items), v) if !v.is_array() => items.iter().any(|i| i == v),
        _ => actual == expected,
    }
}

fn compare(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn text_match(actual: &JsonValue, pattern: &JsonValue, contains: bool, fold: bool) -> bool {
    let (Some(text), Some(pattern)) = (actual.as_str(), pattern.as_str()) else {
        return false;
    };
    let pattern = if contains {
        format!("%{pattern}%")
    } else {
        pattern.to_string()
    };
    if fold {
        wildcard_match(&text.to_lowercase(), &pattern.to_lowercase())
    } else {
        wildcard_match(text, &pattern)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Token {
    Any,
    One,
    Lit(char),
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut out = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        out.push(match c {
            '%' => Token::Any,
            '_' => Token::One,
            '\\' => Token::Lit(chars.next().unwrap_or('\\')),
            other => Token::Lit(other),
        });
    }
    out
}

/// SQL `LIKE` matching: `%` is any run, `_` is any single char, `\` escapes.
fn wildcard_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern = tokenize(pattern);
    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(Token::One) => {
                t += 1;
                p += 1;
            }
            Some(Token::Lit(c)) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            Some(Token::Any) => {
                star = Some((p, t));
                p += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    while pattern.get(p) == Some(&Token::Any) {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(v: JsonValue) -> Record {
        Record::from_value(v).unwrap()
    }

    #[test]
    fn prefix_like_is_anchored_but_like_is_containment() {
        let r = rec(json!({ "name": "VDE-1001" }));
        assert!(Predicate::new("name", Op::EqLike, "VDE%").matches(&r));
        assert!(!Predicate::new("name", Op::EqLike, "DE%").matches(&r));
        assert!(Predicate::new("name", Op::Like, "DE-10").matches(&r));
        assert!(!Predicate::new("name", Op::Like, "de-10").matches(&r));
        assert!(Predicate::new("name", Op::ILike, "de-10").matches(&r));
    }

    #[test]
    fn date_window_is_inclusive() {
        let domain = Domain::new()
            .with("invoice_date", Op::Ge, "2025-11-01")
            .with("invoice_date", Op::Le, "2025-12-31");
        assert!(domain.matches(&rec(json!({ "invoice_date": "2025-11-01" }))));
        assert!(domain.matches(&rec(json!({ "invoice_date": "2025-12-31" }))));
        assert!(!domain.matches(&rec(json!({ "invoice_date": "2026-01-01" }))));
        assert!(!domain.matches(&rec(json!({ "invoice_date": false }))));
    }

    #[test]
    fn relational_equality_compares_ids() {
        let r = rec(json!({ "move_id": [10, "VDE-1001"], "tax_ids": [1, 5] }));
        assert!(Predicate::new("move_id", Op::Eq, 10).matches(&r));
        assert!(!Predicate::new("move_id", Op::Eq, 11).matches(&r));
        assert!(Predicate::new("tax_ids", Op::Eq, 5).matches(&r));
        assert!(Predicate::new("move_id", Op::In, json!([3, 10])).matches(&r));
    }

    #[test]
    fn missing_field_equals_false() {
        let r = rec(json!({ "name": "x" }));
        assert!(Predicate::new("vat", Op::Eq, false).matches(&r));
        assert!(Predicate::new("vat", Op::Ne, "BE1").matches(&r));
    }

    #[test]
    fn wire_shapes() {
        let domain = Domain::new()
            .with("name", Op::EqLike, "VDE%")
            .with("state", Op::Eq, "posted");
        assert_eq!(
            domain.to_wire(),
            json!([["name", "=like", "VDE%"], ["state", "=", "posted"]])
        );
        let opts = SearchOptions::fields(["id", "name"])
            .order(OrderBy::desc("id"))
            .limit(1)
            .include_inactive();
        assert_eq!(
            opts.to_wire(),
            json!({
                "fields": ["id", "name"],
                "order": "id desc",
                "limit": 1,
                "context": { "active_test": false },
            })
        );
    }

    #[test]
    fn wildcards() {
        assert!(wildcard_match("FBM404-1", "%404%"));
        assert!(wildcard_match("abc", "a_c"));
        assert!(wildcard_match("", "%"));
        assert!(!wildcard_match("abc", "a_"));
        assert!(wildcard_match("a%b", "a%b"));
        assert!(wildcard_match("V_E-1", "V\\_E%"));
        assert!(!wildcard_match("VXE-1", "V\\_E%"));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn escape(raw: &str) -> String {
            raw.replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_")
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: an escaped prefix followed by `%` matches exactly the
            /// strings that start with that prefix.
            #[test]
            fn escaped_prefix_matches_only_its_prefix(
                prefix in "[A-Z_%\\\\]{0,6}",
                text in "[A-Z0-9_%\\\\]{0,12}"
            ) {
                let pattern = format!("{}%", escape(&prefix));
                prop_assert_eq!(wildcard_match(&text, &pattern), text.starts_with(&prefix));
                let with_prefix = format!("{prefix}{text}");
                prop_assert!(wildcard_match(&with_prefix, &pattern));
            }
        }
    }
}
