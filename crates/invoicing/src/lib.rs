//! Invoice tax correction.
//!
//! Posted customer invoices that carry a known-incorrect tax code are reset to
//! draft, have the offending line taxes replaced by the domestic code of the
//! invoice's jurisdiction, and are posted again.

pub mod correction;
pub mod invoice;
pub mod tax_map;

pub use correction::{
    FixProgress, TaxCorrectionConfig, TaxCorrectionRun, TaxCorrectionStats, TaxCorrector,
    should_report_progress,
};
pub use invoice::{CorrectionPlan, InvoiceLine, InvoiceSnapshot, InvoiceState, plan_correction};
pub use tax_map::{PrefixRule, TaxMapping};
