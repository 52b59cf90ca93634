//! Business-buyer partner reconciliation.
//!
//! Reads a marketplace order report, and makes sure every business order in the
//! ERP is billed to a partner that carries the buyer's VAT number and company
//! status.

pub mod input;
pub mod partner;
pub mod reconcile;

pub use input::{
    B2bOrder, InputError, OrderReport, OrderRow, ShippingAddress, read_orders,
    read_orders_from_path,
};
pub use partner::{
    GenericPartnerPatterns, NewCompanyPartner, Partner, PartnerDecision, PartnerUpdate, decide,
    normalize_vat,
};
pub use reconcile::{PartnerReconciler, ReconcileConfig, ReconcileRun, ReconcileStats};
