//! Subcommand execution against a connected store.

use std::sync::Arc;

use anyhow::{Context, Result};

use erpfix_core::RecordId;
use erpfix_invoicing::{TaxCorrectionConfig, TaxCorrector};
use erpfix_maintenance as maintenance;
use erpfix_parties::{OrderReport, PartnerReconciler, ReconcileConfig};
use erpfix_store::RecordStore;

use crate::report;

type Store = Arc<dyn RecordStore>;

pub fn fix_taxes(store: Store, config: TaxCorrectionConfig, dry_run: bool) {
    let corrector = TaxCorrector::new(store, config);
    let run = corrector.run_with(|progress| println!("{}", report::fix_progress(progress)));
    print!("{}", report::tax_correction(&run, dry_run));
}

pub fn b2b_partners(store: Store, orders: &OrderReport, config: ReconcileConfig, dry_run: bool) {
    let mut reconciler = PartnerReconciler::new(store, config);
    let run = reconciler.run(&orders.orders);
    print!("{}", report::partner_reconciliation(&run, dry_run));
}

pub fn activate_currencies(store: Store, codes: &[String], dry_run: bool) {
    let run = maintenance::activate_currencies(store.as_ref(), codes);
    print!("{}", report::currency_activation(&run, dry_run));
}

pub fn rename_fiscal_position(store: Store, id: RecordId, name: &str) {
    let result = maintenance::rename_fiscal_position(store.as_ref(), id, name);
    print!("{}", report::rename(&result));
}

pub fn cancel_delivery(store: Store, order: &str, dry_run: bool) {
    let run = maintenance::cancel_delivery(store.as_ref(), order);
    print!("{}", report::cancel_delivery(&run, dry_run));
}

pub fn inspect_config(
    store: Store,
    fragment: &str,
    fiscal_position: Option<RecordId>,
    journal: Option<RecordId>,
) -> Result<()> {
    let snapshot = maintenance::inspect_config(store.as_ref(), fragment, fiscal_position, journal)
        .context("reading accounting configuration")?;
    print!("{}", report::config_snapshot(&snapshot));
    Ok(())
}

pub fn order_fields(store: Store, fragment: &str, order: Option<RecordId>) -> Result<()> {
    let fields = maintenance::order_fields(store.as_ref(), fragment, order)
        .context("reading sale order fields")?;
    print!("{}", report::order_fields(&fields));
    Ok(())
}
