//! Strongly-typed identifiers used across the workspace.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a record in the remote record store.
///
/// The store owns the numbering; ids are opaque to the workflows. Synthetic ids
/// handed out by dry-run creates are negative so they can never collide with a
/// real record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> i64 {
        self.0
    }

    pub fn is_synthetic(&self) -> bool {
        self.0 < 0
    }
}

impl core::fmt::Display for RecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for RecordId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .trim()
            .parse::<i64>()
            .map_err(|e| DomainError::invalid_id(format!("RecordId: {e}")))?;
        Ok(Self(raw))
    }
}

/// Record-type tag. Each tag maps to exactly one model of the remote store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Invoice,
    InvoiceLine,
    Order,
    Partner,
    Currency,
    Country,
    FiscalPosition,
    Journal,
    Picking,
}

impl RecordType {
    /// Model name on the wire.
    pub fn model_name(&self) -> &'static str {
        match self {
            RecordType::Invoice => "account.move",
            RecordType::InvoiceLine => "account.move.line",
            RecordType::Order => "sale.order",
            RecordType::Partner => "res.partner",
            RecordType::Currency => "res.currency",
            RecordType::Country => "res.country",
            RecordType::FiscalPosition => "account.fiscal.position",
            RecordType::Journal => "account.journal",
            RecordType::Picking => "stock.picking",
        }
    }
}

impl core::fmt::Display for RecordType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.model_name())
    }
}

/// Correlation id of one pipeline run (shows up on every log line of the run).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Uses UUIDv7 (time-ordered) so runs sort by start time in log search.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_types_display_as_model_names() {
        assert_eq!(RecordType::InvoiceLine.to_string(), "account.move.line");
        assert_eq!(RecordType::FiscalPosition.model_name(), "account.fiscal.position");
    }

    #[test]
    fn record_id_parses_and_rejects_garbage() {
        assert_eq!(" 42 ".parse::<RecordId>().unwrap(), RecordId::new(42));
        match "abc".parse::<RecordId>().unwrap_err() {
            DomainError::InvalidId(msg) if msg.starts_with("RecordId") => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn synthetic_ids_are_negative() {
        assert!(RecordId::new(-1).is_synthetic());
        assert!(!RecordId::new(7).is_synthetic());
    }
}
