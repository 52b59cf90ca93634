//! Resolution of state-transition calls.
//!
//! An `Ambiguous` reply is never taken as success or as failure: the record's
//! `state` is re-read and compared with the state the transition should have
//! produced.

use tracing::{debug, warn};

use erpfix_core::{RecordId, RecordType};

use crate::r#trait::{CallOutcome, RecordStore};

/// Final verdict on a transition call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The transition took effect. `confirmed` is set when that was established
    /// by a confirmatory read rather than by the reply itself.
    Applied { confirmed: bool },
    /// The transition did not take effect (or could not be shown to have).
    NotApplied(String),
}

impl Resolution {
    pub fn is_applied(&self) -> bool {
        matches!(self, Resolution::Applied { .. })
    }
}

/// Resolve the outcome of a call that should leave record `id` in
/// `expected_state`.
pub fn resolve_transition<S>(
    store: &S,
    record_type: RecordType,
    id: RecordId,
    outcome: CallOutcome,
    expected_state: &str,
) -> Resolution
where
    S: RecordStore + ?Sized,
{
    match outcome {
        CallOutcome::Success => Resolution::Applied { confirmed: false },
        CallOutcome::Failure(reason) => Resolution::NotApplied(reason),
        CallOutcome::Ambiguous(detail) => {
            debug!(%record_type, %id, %detail, "ambiguous reply, re-reading state");
            match store.read_one(record_type, id, &["state"]) {
                Ok(Some(record)) => {
                    let state = record.text_or_empty("state");
                    if state == expected_state {
                        Resolution::Applied { confirmed: true }
                    } else {
                        Resolution::NotApplied(format!(
                            "state is '{state}' after call, expected '{expected_state}'"
                        ))
                    }
                }
                Ok(None) => Resolution::NotApplied(format!("{record_type}({id}) vanished")),
                Err(err) => {
                    warn!(%record_type, %id, error = %err, "confirmatory read failed");
                    Resolution::NotApplied(format!("confirmatory read failed: {err}"))
                }
            }
        }
    }
}
