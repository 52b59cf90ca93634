//! Tax correction pipeline.
//!
//! Per invoice: `PostedWrong → Draft → PostedCorrect`, with `Failed` reachable
//! from every transition. Invoices are selected one prefix batch at a time,
//! in the mapping's prefix order.

use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, error, info, info_span, instrument, warn};

use erpfix_core::{ItemOutcome, OutcomeKind, RecordId, RecordType, RunId, RunReport};
use erpfix_store::{
    BatchFilter, CallOutcome, Domain, Op, Record, RecordStore, Resolution, SearchOptions,
    resolve_transition,
};

use crate::invoice::{
    CorrectionPlan, INVOICE_FIELDS, InvoiceSnapshot, InvoiceState, LINE_FIELDS, plan_correction,
};
use crate::tax_map::TaxMapping;

/// Progress is reported for each of the first fixes up to this ordinal...
const PROGRESS_HEAD: u64 = 50;
/// ...and for every n-th fix after it.
const PROGRESS_EVERY: u64 = 100;

/// Options for one tax correction run.
#[derive(Debug, Clone)]
pub struct TaxCorrectionConfig {
    pub mapping: TaxMapping,
    /// Inclusive invoice-date window. `None` leaves that side open.
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Sleep after every `pause_every` fixed invoices. Zero disables pacing.
    pub pause_every: u64,
    pub pause: Duration,
    /// Pacing applies to live runs only.
    pub pacing: bool,
}

impl Default for TaxCorrectionConfig {
    fn default() -> Self {
        Self {
            mapping: TaxMapping::default(),
            date_from: NaiveDate::from_ymd_opt(2025, 11, 1),
            date_to: NaiveDate::from_ymd_opt(2025, 12, 31),
            pause_every: 20,
            pause: Duration::from_millis(200),
            pacing: true,
        }
    }
}

/// Run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaxCorrectionStats {
    pub checked: u64,
    pub fixed: u64,
    pub lines_fixed: u64,
    pub skipped: u64,
    pub reset_errors: u64,
    pub repost_errors: u64,
    pub errors: u64,
}

/// Result of a whole run.
#[derive(Debug, Clone)]
pub struct TaxCorrectionRun {
    pub run_id: RunId,
    pub stats: TaxCorrectionStats,
    pub report: RunReport,
}

/// Emitted for every fix that passes the progress throttle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixProgress<'a> {
    pub ordinal: u64,
    pub invoice: &'a str,
    pub lines: usize,
}

pub fn should_report_progress(ordinal: u64) -> bool {
    ordinal <= PROGRESS_HEAD || ordinal % PROGRESS_EVERY == 0
}

/// Drives the correction over every configured prefix batch.
pub struct TaxCorrector<S> {
    store: S,
    config: TaxCorrectionConfig,
}

impl<S: RecordStore> TaxCorrector<S> {
    pub fn new(store: S, config: TaxCorrectionConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &TaxCorrectionConfig {
        &self.config
    }

    /// Selection filter for one prefix batch.
    pub fn batch_filter(&self, prefix: &str) -> BatchFilter {
        BatchFilter::new(RecordType::Invoice)
            .name_prefix(prefix)
            .state(InvoiceState::Posted.as_str())
            .with("move_type", Op::Eq, "out_invoice")
            .date_window("invoice_date", self.config.date_from, self.config.date_to)
            .project(INVOICE_FIELDS.iter().copied())
    }

    pub fn run(&self) -> TaxCorrectionRun {
        self.run_with(|_| {})
    }

    /// Run every batch, calling `on_fix` for throttled progress.
    pub fn run_with(&self, mut on_fix: impl FnMut(&FixProgress<'_>)) -> TaxCorrectionRun {
        let run_id = RunId::new();
        let span = info_span!("fix_taxes", run_id = %run_id);
        let _guard = span.enter();

        let mut stats = TaxCorrectionStats::default();
        let mut report = RunReport::new();

        for rule in self.config.mapping.prefixes() {
            let Some(tax) = self.config.mapping.domestic_tax(&rule.country) else {
                continue;
            };
            info!(prefix = %rule.prefix, country = %rule.country, %tax, "processing batch");

            let invoices = match self.batch_filter(&rule.prefix).select(&self.store) {
                Ok(invoices) => invoices,
                Err(err) => {
                    error!(prefix = %rule.prefix, error = %err, "batch selection failed");
                    stats.errors += 1;
                    report.push(ItemOutcome::error(
                        format!("{}*", rule.prefix),
                        format!("selection failed: {err}"),
                    ));
                    continue;
                }
            };
            info!(prefix = %rule.prefix, found = invoices.len(), "batch selected");

            for invoice in &invoices {
                let (outcome, lines) = self.process(invoice, &mut stats);
                if outcome.kind == OutcomeKind::Fixed {
                    if should_report_progress(stats.fixed) {
                        on_fix(&FixProgress {
                            ordinal: stats.fixed,
                            invoice: &outcome.item,
                            lines,
                        });
                    }
                    self.pace(stats.fixed);
                }
                report.push(outcome);
            }
        }

        info!(
            checked = stats.checked,
            fixed = stats.fixed,
            lines_fixed = stats.lines_fixed,
            skipped = stats.skipped,
            reset_errors = stats.reset_errors,
            repost_errors = stats.repost_errors,
            errors = stats.errors,
            "tax correction finished"
        );

        TaxCorrectionRun {
            run_id,
            stats,
            report,
        }
    }

    fn pace(&self, fixed: u64) {
        if self.config.pacing && self.config.pause_every > 0 && fixed % self.config.pause_every == 0
        {
            debug!(fixed, pause = ?self.config.pause, "pacing");
            thread::sleep(self.config.pause);
        }
    }

    /// Take one selected invoice through the state machine.
    pub fn correct_invoice(&self, invoice: &Record, stats: &mut TaxCorrectionStats) -> ItemOutcome {
        self.process(invoice, stats).0
    }

    /// Outcome plus the number of lines corrected on a fix.
    #[instrument(skip(self, invoice, stats), fields(invoice = %invoice.text_or_empty("name")))]
    fn process(&self, invoice: &Record, stats: &mut TaxCorrectionStats) -> (ItemOutcome, usize) {
        stats.checked += 1;
        let name = invoice.text_or_empty("name").to_string();

        let snapshot = match self.snapshot(invoice) {
            Ok(snapshot) => snapshot,
            Err(reason) => {
                warn!(%reason, "could not read invoice");
                stats.errors += 1;
                return (ItemOutcome::error(name, reason), 0);
            }
        };

        let plan = match plan_correction(&snapshot, &self.config.mapping) {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                debug!("no offending line");
                stats.skipped += 1;
                return (ItemOutcome::no_fix_needed(name, "no line carries the incorrect tax"), 0);
            }
            Err(err) => {
                warn!(error = %err, "cannot plan correction");
                stats.errors += 1;
                return (ItemOutcome::error(name, err.to_string()), 0);
            }
        };

        // PostedWrong -> Draft
        let reset = self
            .store
            .invoke_action(RecordType::Invoice, "button_draft", &[plan.invoice]);
        if let Resolution::NotApplied(reason) = resolve_transition(
            &self.store,
            RecordType::Invoice,
            plan.invoice,
            reset,
            InvoiceState::Draft.as_str(),
        ) {
            warn!(%reason, "reset to draft failed");
            stats.reset_errors += 1;
            return (ItemOutcome::error(name, format!("reset to draft failed: {reason}")), 0);
        }

        // Draft: replace offending tax sets
        if let Err(reason) = self.rewrite_lines(&plan, stats) {
            error!(%reason, "line correction failed, invoice left in draft");
            stats.errors += 1;
            return (
                ItemOutcome::error(name, format!("{reason}; invoice left in draft, not reposted")),
                0,
            );
        }

        // Draft -> PostedCorrect
        let repost = self
            .store
            .invoke_action(RecordType::Invoice, "action_post", &[plan.invoice]);
        if let Resolution::NotApplied(reason) = resolve_transition(
            &self.store,
            RecordType::Invoice,
            plan.invoice,
            repost,
            InvoiceState::Posted.as_str(),
        ) {
            warn!(%reason, "repost failed, invoice left in draft with corrected taxes");
            stats.repost_errors += 1;
            return (
                ItemOutcome::error(
                    name,
                    format!("repost failed: {reason}; left in draft with corrected taxes"),
                ),
                0,
            );
        }

        stats.fixed += 1;
        info!(lines = plan.lines.len(), tax = %plan.domestic_tax, "invoice corrected");
        let lines = plan.lines.len();
        (
            ItemOutcome::fixed(name, format!("{lines} lines -> tax {}", plan.domestic_tax)),
            lines,
        )
    }

    fn snapshot(&self, invoice: &Record) -> Result<InvoiceSnapshot, String> {
        let id = invoice.id().ok_or("selected invoice has no id")?;
        let domain = Domain::new()
            .with("move_id", Op::Eq, id.get())
            .with("display_type", Op::Eq, "product");
        let lines = self
            .store
            .search(
                RecordType::InvoiceLine,
                &domain,
                &SearchOptions::fields(LINE_FIELDS.iter().copied()),
            )
            .map_err(|e| format!("reading lines failed: {e}"))?;
        InvoiceSnapshot::from_records(invoice, &lines).map_err(|e| e.to_string())
    }

    fn rewrite_lines(
        &self,
        plan: &CorrectionPlan,
        stats: &mut TaxCorrectionStats,
    ) -> Result<(), String> {
        let mut values = erpfix_store::Values::new();
        values.insert(
            "tax_ids".into(),
            erpfix_store::replace_all(&[plan.domestic_tax]),
        );

        for line in &plan.lines {
            match self.store.write(RecordType::InvoiceLine, &[*line], &values) {
                CallOutcome::Success => {}
                CallOutcome::Failure(reason) => {
                    return Err(format!("line {line} write failed: {reason}"));
                }
                CallOutcome::Ambiguous(detail) => {
                    if !self.line_has_only(*line, plan.domestic_tax) {
                        return Err(format!("line {line} write unconfirmed: {detail}"));
                    }
                }
            }
            stats.lines_fixed += 1;
        }
        Ok(())
    }

    fn line_has_only(&self, line: RecordId, tax: RecordId) -> bool {
        match self
            .store
            .read_one(RecordType::InvoiceLine, line, &["tax_ids"])
        {
            Ok(Some(record)) => {
                record.ids("tax_ids").into_iter().collect::<BTreeSet<_>>() == BTreeSet::from([tax])
            }
            Ok(None) => false,
            Err(err) => {
                warn!(%line, error = %err, "confirmatory read failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_throttle() {
        let reported: Vec<u64> = (1..=450).filter(|n| should_report_progress(*n)).collect();
        assert_eq!(reported.len(), 50 + 4);
        assert!(reported.contains(&50));
        assert!(!reported.contains(&51));
        assert!(reported.contains(&100));
        assert!(reported.contains(&400));
    }

    #[test]
    fn default_window_is_november_to_december_2025() {
        let cfg = TaxCorrectionConfig::default();
        assert_eq!(cfg.date_from, NaiveDate::from_ymd_opt(2025, 11, 1));
        assert_eq!(cfg.date_to, NaiveDate::from_ymd_opt(2025, 12, 31));
        assert_eq!(cfg.pause_every, 20);
    }
}
