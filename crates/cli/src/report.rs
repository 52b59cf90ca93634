//! Human-readable run summaries for stdout.

use std::fmt::Write;

use erpfix_core::{OutcomeKind, RunReport};
use erpfix_invoicing::{FixProgress, TaxCorrectionRun};
use erpfix_maintenance::{
    ActivationRun, CancelDeliveryRun, ConfigSnapshot, OrderFieldsReport, RenameResult,
};
use erpfix_parties::ReconcileRun;
use erpfix_store::Record;

const RULE: &str = "============================================================";

fn banner(out: &mut String, title: &str, dry_run: bool) {
    let _ = writeln!(out, "{RULE}");
    if dry_run {
        let _ = writeln!(out, "{title} (DRY RUN)");
    } else {
        let _ = writeln!(out, "{title}");
    }
    let _ = writeln!(out, "{RULE}");
}

/// Items that need attention: errors first, then not-found.
fn problems(out: &mut String, report: &RunReport) {
    for kind in [OutcomeKind::Error, OutcomeKind::NotFound] {
        for outcome in report.outcomes.iter().filter(|o| o.kind == kind) {
            let _ = writeln!(out, "  [{kind}] {}: {}", outcome.item, outcome.reason);
        }
    }
}

pub fn fix_progress(progress: &FixProgress<'_>) -> String {
    format!(
        "  [{}] {}: {} line(s) fixed",
        progress.ordinal, progress.invoice, progress.lines
    )
}

pub fn tax_correction(run: &TaxCorrectionRun, dry_run: bool) -> String {
    let stats = &run.stats;
    let mut out = String::new();
    banner(&mut out, "TAX CORRECTION SUMMARY", dry_run);
    let _ = writeln!(out, "Run:                    {}", run.run_id);
    let _ = writeln!(out, "Invoices checked:       {}", stats.checked);
    let _ = writeln!(out, "Invoices fixed:         {}", stats.fixed);
    let _ = writeln!(out, "Lines fixed:            {}", stats.lines_fixed);
    let _ = writeln!(out, "Skipped (no bad tax):   {}", stats.skipped);
    let _ = writeln!(out, "Reset-to-draft errors:  {}", stats.reset_errors);
    let _ = writeln!(
        out,
        "Repost errors:          {} (lines corrected, left in draft, not counted as fixed)",
        stats.repost_errors
    );
    let _ = writeln!(out, "Other errors:           {}", stats.errors);
    if stats.repost_errors > 0 {
        let _ = writeln!(out, "Invoices left in draft need a manual repost:");
    }
    problems(&mut out, &run.report);
    out
}

pub fn partner_reconciliation(run: &ReconcileRun, dry_run: bool) -> String {
    let stats = &run.stats;
    let mut out = String::new();
    banner(&mut out, "B2B PARTNER SUMMARY", dry_run);
    let _ = writeln!(out, "Run:              {}", run.run_id);
    let _ = writeln!(out, "Orders processed: {}", stats.processed);
    let _ = writeln!(out, "Partners updated: {}", stats.updated);
    let _ = writeln!(out, "Partners created: {}", stats.created);
    let _ = writeln!(out, "Already correct:  {}", stats.already_correct);
    let _ = writeln!(out, "Not found:        {}", stats.not_found);
    let _ = writeln!(out, "Errors:           {}", stats.errors);
    problems(&mut out, &run.report);
    out
}

pub fn currency_activation(run: &ActivationRun, dry_run: bool) -> String {
    let mut out = String::new();
    banner(&mut out, "CURRENCY ACTIVATION", dry_run);
    for outcome in &run.report.outcomes {
        let _ = writeln!(out, "  {:<4} {:<14} {}", outcome.item, outcome.kind, outcome.reason);
    }
    let _ = writeln!(out, "Active currencies:");
    for (code, status) in &run.verification {
        match status {
            Some(status) => {
                let rate = status
                    .rate
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let _ = writeln!(out, "  {code:<4} {:<4} rate {rate}", status.symbol);
            }
            None => {
                let _ = writeln!(out, "  {code:<4} NOT ACTIVE");
            }
        }
    }
    out
}

pub fn rename(result: &RenameResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} [{}] {}",
        result.outcome.item, result.outcome.kind, result.outcome.reason
    );
    if let Some(before) = &result.before {
        let _ = writeln!(out, "  before: {before}");
    }
    if let Some(after) = &result.after {
        let _ = writeln!(out, "  after:  {after}");
    }
    out
}

pub fn cancel_delivery(run: &CancelDeliveryRun, dry_run: bool) -> String {
    let mut out = String::new();
    banner(&mut out, "CANCEL DELIVERY", dry_run);
    if let Some(order) = run.order {
        let _ = writeln!(out, "Order id {order}, {} picking(s):", run.pickings.len());
    }
    for picking in &run.pickings {
        let _ = writeln!(
            out,
            "  {} [{}] {}",
            picking.name,
            picking.state,
            picking.picking_type.as_deref().unwrap_or("-")
        );
    }
    for outcome in &run.report.outcomes {
        let _ = writeln!(out, "  {} -> {}: {}", outcome.item, outcome.kind, outcome.reason);
    }
    if let Some(state) = &run.final_state {
        let _ = writeln!(out, "Final order state: {state}");
    }
    out
}

fn record_line(record: &Record, fields: &[&str]) -> String {
    let mut line = record
        .id()
        .map(|id| format!("[{id}]"))
        .unwrap_or_else(|| "[?]".to_string());
    for field in fields {
        let value = match record.get(field) {
            Some(value) => record
                .many2one_name(field)
                .map(str::to_string)
                .or_else(|| value.as_str().map(str::to_string))
                .unwrap_or_else(|| value.to_string()),
            None => continue,
        };
        let _ = write!(line, " {field}={value}");
    }
    line
}

pub fn config_snapshot(snapshot: &ConfigSnapshot) -> String {
    const FP: [&str; 4] = ["name", "country_id", "country_group_id", "auto_apply"];
    const JOURNAL: [&str; 3] = ["name", "code", "type"];

    let mut out = String::new();
    let _ = writeln!(out, "Fiscal positions ({}):", snapshot.fiscal_positions.len());
    for fp in &snapshot.fiscal_positions {
        let _ = writeln!(out, "  {}", record_line(fp, &FP));
    }
    if let Some(fp) = &snapshot.fiscal_position {
        let _ = writeln!(out, "Selected fiscal position:\n  {}", record_line(fp, &FP));
    }
    let _ = writeln!(out, "Sale journals ({}):", snapshot.sale_journals.len());
    for journal in &snapshot.sale_journals {
        let _ = writeln!(out, "  {}", record_line(journal, &JOURNAL));
    }
    if let Some(journal) = &snapshot.journal {
        let _ = writeln!(out, "Selected journal:\n  {}", record_line(journal, &JOURNAL));
    }
    out
}

pub fn order_fields(report: &OrderFieldsReport) -> String {
    let mut out = String::new();
    if report.fields.is_empty() {
        let _ = writeln!(out, "No matching fields.");
        return out;
    }
    for field in &report.fields {
        let _ = write!(out, "  {:<30} {:<12} {}", field.name, field.kind, field.label);
        if let Some(relation) = &field.relation {
            let _ = write!(out, " -> {relation}");
        }
        out.push('\n');
    }
    if let Some(order) = &report.order {
        let names: Vec<&str> = report.fields.iter().map(|f| f.name.as_str()).collect();
        let _ = writeln!(out, "Order {}:", order.text_or_empty("name"));
        let _ = writeln!(out, "  {}", record_line(order, &names));
    }
    out
}
