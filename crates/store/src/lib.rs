//! `erpfix-store`: access to the remote record store.
//!
//! The [`RecordStore`] trait is the seam every pipeline works against. Three
//! implementations live here:
//!
//! - [`OdooClient`]: JSON-RPC against a live instance
//! - [`InMemoryRecordStore`]: tests and local experiments
//! - [`DryRunStore`]: wraps another store and suppresses its mutations

pub mod confirm;
pub mod domain;
pub mod dry_run;
pub mod in_memory;
pub mod jsonrpc;
pub mod record;
pub mod selector;
pub mod r#trait;

pub use confirm::{Resolution, resolve_transition};
pub use domain::{Direction, Domain, Op, OrderBy, Predicate, SearchOptions};
pub use dry_run::{DryRunStore, SuppressedCall};
pub use in_memory::{Fault, InMemoryRecordStore, Mutation};
pub use jsonrpc::{ConnectionConfig, OdooClient};
pub use record::{Record, Values, decode_replace_all, replace_all};
pub use selector::{BatchFilter, DateWindow};
pub use r#trait::{CallOutcome, RecordStore, StoreError};
