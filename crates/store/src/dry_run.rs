//! Dry-run adapter.
//!
//! Reads pass through; mutating calls are swallowed and reported as successful.
//! Pipelines run unchanged on top of it, so a dry run takes exactly the same
//! decisions (and bumps exactly the same counters) as a live run on the same
//! snapshot.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use tracing::info;

use erpfix_core::{RecordId, RecordType};

use crate::domain::{Domain, SearchOptions};
use crate::record::{Record, Values};
use crate::r#trait::{CallOutcome, RecordStore, StoreError};

/// A mutating call that was suppressed.
#[derive(Debug, Clone, PartialEq)]
pub enum SuppressedCall {
    Write {
        record_type: RecordType,
        ids: Vec<RecordId>,
        values: Values,
    },
    Create {
        record_type: RecordType,
        synthetic_id: RecordId,
        values: Values,
    },
    Action {
        record_type: RecordType,
        action: String,
        ids: Vec<RecordId>,
    },
}

/// Wraps a store and suppresses all of its mutating calls.
pub struct DryRunStore<S> {
    inner: S,
    next_synthetic: AtomicI64,
    suppressed: Mutex<Vec<SuppressedCall>>,
}

impl<S> DryRunStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            next_synthetic: AtomicI64::new(-1),
            suppressed: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn suppressed(&self) -> Vec<SuppressedCall> {
        self.suppressed
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn remember(&self, call: SuppressedCall) {
        if let Ok(mut calls) = self.suppressed.lock() {
            calls.push(call);
        }
    }
}

impl<S: RecordStore> RecordStore for DryRunStore<S> {
    fn search(
        &self,
        record_type: RecordType,
        domain: &Domain,
        options: &SearchOptions,
    ) -> Result<Vec<Record>, StoreError> {
        self.inner.search(record_type, domain, options)
    }

    fn write(&self, record_type: RecordType, ids: &[RecordId], values: &Values) -> CallOutcome {
        info!(%record_type, ?ids, ?values, "dry run: write suppressed");
        self.remember(SuppressedCall::Write {
            record_type,
            ids: ids.to_vec(),
            values: values.clone(),
        });
        CallOutcome::Success
    }

    fn create(&self, record_type: RecordType, values: &Values) -> Result<RecordId, StoreError> {
        let synthetic_id = RecordId::new(self.next_synthetic.fetch_sub(1, Ordering::Relaxed));
        info!(%record_type, %synthetic_id, "dry run: create suppressed");
        self.remember(SuppressedCall::Create {
            record_type,
            synthetic_id,
            values: values.clone(),
        });
        Ok(synthetic_id)
    }

    fn invoke_action(
        &self,
        record_type: RecordType,
        action: &str,
        ids: &[RecordId],
    ) -> CallOutcome {
        info!(%record_type, action, ?ids, "dry run: action suppressed");
        self.remember(SuppressedCall::Action {
            record_type,
            action: action.to_string(),
            ids: ids.to_vec(),
        });
        CallOutcome::Success
    }

    fn fields_get(&self, record_type: RecordType) -> Result<Values, StoreError> {
        self.inner.fields_get(record_type)
    }
}
