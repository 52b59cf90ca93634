//! Turning command-line arguments and local files into run configurations.
//!
//! Everything here happens before the ERP connection is opened, so a bad
//! mapping file or a missing order report fails fast.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;

use erpfix_invoicing::{TaxCorrectionConfig, TaxMapping};
use erpfix_maintenance::DEFAULT_CURRENCIES;
use erpfix_parties::{OrderReport, ReconcileConfig, read_orders_from_path};

pub fn tax_correction(
    mapping: Option<&Path>,
    from: NaiveDate,
    to: NaiveDate,
    pause_every: u64,
    pause_seconds: f64,
    dry_run: bool,
) -> Result<TaxCorrectionConfig> {
    if from > to {
        bail!("--from {from} is after --to {to}");
    }
    let pause = Duration::try_from_secs_f64(pause_seconds)
        .with_context(|| format!("invalid --pause-seconds {pause_seconds}"))?;

    let mapping = match mapping {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading tax mapping {}", path.display()))?;
            TaxMapping::from_json_str(&raw)
                .with_context(|| format!("parsing tax mapping {}", path.display()))?
        }
        None => TaxMapping::default(),
    };

    Ok(TaxCorrectionConfig {
        mapping,
        date_from: Some(from),
        date_to: Some(to),
        pause_every,
        pause,
        pacing: !dry_run,
    })
}

pub fn order_report(path: &Path) -> Result<OrderReport> {
    let report = read_orders_from_path(path)
        .with_context(|| format!("loading order report {}", path.display()))?;
    println!(
        "Read {} rows, {} business orders, {} malformed rows skipped",
        report.rows_read,
        report.orders.len(),
        report.malformed_rows
    );
    Ok(report)
}

pub fn reconcile(order_prefix: String) -> ReconcileConfig {
    ReconcileConfig {
        order_prefix,
        ..ReconcileConfig::default()
    }
}

/// Requested codes upper-cased and de-duplicated, or the default list.
pub fn currency_codes(requested: Vec<String>) -> Vec<String> {
    if requested.is_empty() {
        return DEFAULT_CURRENCIES.iter().map(|c| c.to_string()).collect();
    }
    let mut codes: Vec<String> = Vec::with_capacity(requested.len());
    for code in requested {
        let code = code.trim().to_uppercase();
        if !code.is_empty() && !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}
