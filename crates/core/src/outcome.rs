//! Per-item reconciliation outcomes and run-level tallies.
//!
//! Outcomes are created during a run and discarded after reporting.

use serde::{Deserialize, Serialize};

/// Classification of one processed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    /// Nothing to do (already correct / skipped).
    NoFixNeeded,
    /// An existing record was corrected in place.
    Fixed,
    /// A new record was materialized.
    Created,
    /// The expected record does not exist.
    NotFound,
    /// A precondition failed or the remote store faulted.
    Error,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::NoFixNeeded => "no-fix-needed",
            OutcomeKind::Fixed => "fixed",
            OutcomeKind::Created => "created",
            OutcomeKind::NotFound => "not-found",
            OutcomeKind::Error => "error",
        }
    }
}

impl core::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one item plus a free-text reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// Human handle of the item (invoice name, marketplace order id, ...).
    pub item: String,
    pub kind: OutcomeKind,
    pub reason: String,
}

impl ItemOutcome {
    pub fn new(item: impl Into<String>, kind: OutcomeKind, reason: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            kind,
            reason: reason.into(),
        }
    }

    pub fn no_fix_needed(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(item, OutcomeKind::NoFixNeeded, reason)
    }

    pub fn fixed(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(item, OutcomeKind::Fixed, reason)
    }

    pub fn created(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(item, OutcomeKind::Created, reason)
    }

    pub fn not_found(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(item, OutcomeKind::NotFound, reason)
    }

    pub fn error(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(item, OutcomeKind::Error, reason)
    }
}

/// Run-level tally by outcome kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTally {
    pub processed: u64,
    pub no_fix_needed: u64,
    pub fixed: u64,
    pub created: u64,
    pub not_found: u64,
    pub errors: u64,
}

impl OutcomeTally {
    pub fn record(&mut self, kind: OutcomeKind) {
        self.processed += 1;
        match kind {
            OutcomeKind::NoFixNeeded => self.no_fix_needed += 1,
            OutcomeKind::Fixed => self.fixed += 1,
            OutcomeKind::Created => self.created += 1,
            OutcomeKind::NotFound => self.not_found += 1,
            OutcomeKind::Error => self.errors += 1,
        }
    }

    pub fn count(&self, kind: OutcomeKind) -> u64 {
        match kind {
            OutcomeKind::NoFixNeeded => self.no_fix_needed,
            OutcomeKind::Fixed => self.fixed,
            OutcomeKind::Created => self.created,
            OutcomeKind::NotFound => self.not_found,
            OutcomeKind::Error => self.errors,
        }
    }
}

/// Ordered outcomes of a run plus their tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcomes: Vec<ItemOutcome>,
    pub tally: OutcomeTally,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: ItemOutcome) {
        self.tally.record(outcome.kind);
        self.outcomes.push(outcome);
    }

    /// Classifications only, in processing order.
    pub fn kinds(&self) -> Vec<(String, OutcomeKind)> {
        self.outcomes
            .iter()
            .map(|o| (o.item.clone(), o.kind))
            .collect()
    }
}
