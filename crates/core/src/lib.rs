//! `erpfix-core`: shared building blocks.
//!
//! Pure types only (ids, outcomes, errors). No IO.

pub mod error;
pub mod id;
pub mod outcome;

pub use error::{DomainError, DomainResult};
pub use id::{RecordId, RecordType, RunId};
pub use outcome::{ItemOutcome, OutcomeKind, OutcomeTally, RunReport};
