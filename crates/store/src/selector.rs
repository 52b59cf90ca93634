//! Batch selection: filter specification → ordered matching records.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use erpfix_core::RecordType;

use crate::domain::{Domain, Op, OrderBy, Predicate, SearchOptions};
use crate::record::Record;
use crate::r#trait::{RecordStore, StoreError};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive date window on one field. Either bound may be open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    pub field: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Filter specification for one batch.
///
/// All criteria combine with AND. Results come back `id desc` so a batch is
/// processed in the same order on every run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFilter {
    record_type: RecordType,
    name_prefix: Option<String>,
    state: Option<String>,
    window: Option<DateWindow>,
    extra: Vec<Predicate>,
    fields: Vec<String>,
}

impl BatchFilter {
    pub fn new(record_type: RecordType) -> Self {
        Self {
            record_type,
            name_prefix: None,
            state: None,
            window: None,
            extra: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn date_window(
        mut self,
        field: impl Into<String>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Self {
        self.window = Some(DateWindow {
            field: field.into(),
            from,
            to,
        });
        self
    }

    pub fn with(mut self, field: impl Into<String>, op: Op, value: impl Into<JsonValue>) -> Self {
        self.extra.push(Predicate::new(field, op, value));
        self
    }

    /// Fields the downstream stage needs.
    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn domain(&self) -> Domain {
        let mut domain = Domain::new();
        if let Some(prefix) = &self.name_prefix {
            domain.push(Predicate::new("name", Op::EqLike, format!("{}%", escape_like(prefix))));
        }
        if let Some(state) = &self.state {
            domain.push(Predicate::new("state", Op::Eq, state.as_str()));
        }
        for p in &self.extra {
            domain.push(p.clone());
        }
        if let Some(w) = &self.window {
            if let Some(from) = w.from {
                domain.push(Predicate::new(
                    w.field.as_str(),
                    Op::Ge,
                    from.format(DATE_FORMAT).to_string(),
                ));
            }
            if let Some(to) = w.to {
                domain.push(Predicate::new(
                    w.field.as_str(),
                    Op::Le,
                    to.format(DATE_FORMAT).to_string(),
                ));
            }
        }
        domain
    }

    pub fn options(&self) -> SearchOptions {
        SearchOptions::fields(self.fields.iter().cloned()).order(OrderBy::desc("id"))
    }

    /// Run the selection. No match is an empty vector.
    pub fn select<S>(&self, store: &S) -> Result<Vec<Record>, StoreError>
    where
        S: RecordStore + ?Sized,
    {
        store.search(self.record_type, &self.domain(), &self.options())
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
