use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use erpfix_core::{RecordId, RecordType};

use crate::domain::{Domain, Op, SearchOptions};
use crate::record::{Record, Values};

/// Record store operation error.
///
/// These are **infrastructure errors** (transport, remote faults, decoding).
/// Business outcomes such as "record not found" are not errors: a search that
/// matches nothing returns an empty vector.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The request never produced a reply (connection refused, DNS, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote store rejected the call.
    #[error("remote fault: {0}")]
    Fault(String),

    /// A reply arrived but could not be decoded.
    #[error("undecodable reply: {0}")]
    Decode(String),

    /// The connect handshake was refused.
    #[error("authentication failed: {0}")]
    Authentication(String),
}

/// Result of a mutating call.
///
/// `Ambiguous` means the reply cannot tell success from failure (e.g. the
/// remote side applied the change but could not serialize its `None` return
/// value). Callers must resolve it with a confirmatory read; see
/// [`crate::confirm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure(String),
    Ambiguous(String),
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success)
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, CallOutcome::Ambiguous(_))
    }
}

impl core::fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CallOutcome::Success => f.write_str("success"),
            CallOutcome::Failure(reason) => write!(f, "failure: {reason}"),
            CallOutcome::Ambiguous(detail) => write!(f, "ambiguous: {detail}"),
        }
    }
}

/// The remote record store (an ERP-like backend).
///
/// Four primitives plus named actions. Every call is one blocking round trip;
/// implementations must not retry mutating calls on their own, since a retry of
/// an applied-but-ambiguous action is not idempotent in general.
///
/// ## Implementation Requirements
///
/// - `search` returns an empty vector (not an error) when nothing matches.
/// - `search` always includes `id` in each returned record.
/// - `write` replaces the listed fields on every id; x2many fields accept the
///   `replace_all` command.
/// - `invoke_action` runs a named state transition on every id.
pub trait RecordStore: Send + Sync {
    fn search(
        &self,
        record_type: RecordType,
        domain: &Domain,
        options: &SearchOptions,
    ) -> Result<Vec<Record>, StoreError>;

    fn write(&self, record_type: RecordType, ids: &[RecordId], values: &Values) -> CallOutcome;

    fn create(&self, record_type: RecordType, values: &Values) -> Result<RecordId, StoreError>;

    fn invoke_action(&self, record_type: RecordType, action: &str, ids: &[RecordId])
    -> CallOutcome;

    /// Field metadata of a record type (`{name: {string, type, relation}}`).
    fn fields_get(&self, record_type: RecordType) -> Result<Values, StoreError>;

    /// Fetch one record by id with the given projection.
    fn read_one(
        &self,
        record_type: RecordType,
        id: RecordId,
        fields: &[&str],
    ) -> Result<Option<Record>, StoreError> {
        let domain = Domain::new().with("id", Op::Eq, JsonValue::from(id.get()));
        let options = SearchOptions::fields(fields.iter().copied()).limit(1);
        Ok(self.search(record_type, &domain, &options)?.into_iter().next())
    }
}

impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    fn search(
        &self,
        record_type: RecordType,
        domain: &Domain,
        options: &SearchOptions,
    ) -> Result<Vec<Record>, StoreError> {
        (**self).search(record_type, domain, options)
    }

    fn write(&self, record_type: RecordType, ids: &[RecordId], values: &Values) -> CallOutcome {
        (**self).write(record_type, ids, values)
    }

    fn create(&self, record_type: RecordType, values: &Values) -> Result<RecordId, StoreError> {
        (**self).create(record_type, values)
    }

    fn invoke_action(
        &self,
        record_type: RecordType,
        action: &str,
        ids: &[RecordId],
    ) -> CallOutcome {
        (**self).invoke_action(record_type, action, ids)
    }

    fn fields_get(&self, record_type: RecordType) -> Result<Values, StoreError> {
        (**self).fields_get(record_type)
    }
}

impl<S> RecordStore for &S
where
    S: RecordStore + ?Sized,
{
    fn search(
        &self,
        record_type: RecordType,
        domain: &Domain,
        options: &SearchOptions,
    ) -> Result<Vec<Record>, StoreError> {
        (**self).search(record_type, domain, options)
    }

    fn write(&self, record_type: RecordType, ids: &[RecordId], values: &Values) -> CallOutcome {
        (**self).write(record_type, ids, values)
    }

    fn create(&self, record_type: RecordType, values: &Values) -> Result<RecordId, StoreError> {
        (**self).create(record_type, values)
    }

    fn invoke_action(
        &self,
        record_type: RecordType,
        action: &str,
        ids: &[RecordId],
    ) -> CallOutcome {
        (**self).invoke_action(record_type, action, ids)
    }

    fn fields_get(&self, record_type: RecordType) -> Result<Values, StoreError> {
        (**self).fields_get(record_type)
    }
}
