//! `erpfix`: batch repairs and inspections against a hosted ERP.
//!
//! Connection settings come from the environment (`ERP_URL`, `ERP_DB`,
//! `ERP_USERNAME`, `ERP_PASSWORD`/`ERP_API_KEY`). Every mutating command honors
//! `--dry-run`: all reads and decisions happen, no write reaches the ERP.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use erpfix_core::RecordId;
use erpfix_store::{ConnectionConfig, DryRunStore, OdooClient, RecordStore};

mod commands;
mod config;
mod report;

#[derive(Parser, Debug)]
#[command(name = "erpfix")]
#[command(about = "Inspect and repair ERP records over JSON-RPC", long_about = None)]
struct Cli {
    /// Perform every read and decision but suppress all writes
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replace a wrongly applied tax on posted invoices (draft, fix, repost)
    FixTaxes {
        /// JSON mapping file (incorrect_tax, prefixes, domestic_taxes)
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// First invoice date to consider (YYYY-MM-DD)
        #[arg(long, default_value = "2025-11-01")]
        from: NaiveDate,

        /// Last invoice date to consider (YYYY-MM-DD)
        #[arg(long, default_value = "2025-12-31")]
        to: NaiveDate,

        /// Pause after this many fixed invoices (0 disables pacing)
        #[arg(long, default_value_t = 20)]
        pause_every: u64,

        /// Length of each pause, in seconds
        #[arg(long, default_value_t = 0.2)]
        pause_seconds: f64,
    },

    /// Attach VAT and company data from a marketplace order report to partners
    B2bPartners {
        /// Tab-separated order report
        file: Option<PathBuf>,

        /// Prefix the ERP puts in front of marketplace order ids
        #[arg(long, default_value = "FBM")]
        order_prefix: String,
    },

    /// Activate currencies (including inactive ones) by ISO code
    ActivateCurrencies {
        /// Currency code; repeat for several (default: marketplace currencies)
        #[arg(long = "currency")]
        currencies: Vec<String>,
    },

    /// Rename a fiscal position
    RenameFiscalPosition {
        #[arg(long)]
        id: RecordId,

        #[arg(long)]
        name: String,
    },

    /// Cancel an order, trying its done deliveries first
    CancelDelivery {
        /// Exact order name
        #[arg(long)]
        order: String,
    },

    /// Show fiscal positions and sale journals
    InspectConfig {
        /// Fiscal-position name fragment
        #[arg(long, default_value = "export")]
        fragment: String,

        #[arg(long)]
        fiscal_position: Option<RecordId>,

        #[arg(long)]
        journal: Option<RecordId>,
    },

    /// List sale order fields matching a fragment and their values on one order
    OrderFields {
        #[arg(long, default_value = "journal")]
        fragment: String,

        #[arg(long)]
        order: Option<RecordId>,
    },
}

fn connect(dry_run: bool) -> Result<Arc<dyn RecordStore>> {
    let config = ConnectionConfig::from_env().context("loading ERP connection settings")?;
    let client = OdooClient::connect(&config)
        .with_context(|| format!("connecting to {} (db {})", config.url, config.database))?;
    println!("Connected to {} as uid {}", config.url, client.uid());

    if dry_run {
        println!("*** DRY RUN - no changes will be made ***");
        Ok(Arc::new(DryRunStore::new(client)))
    } else {
        Ok(Arc::new(client))
    }
}

fn run(cli: Cli) -> Result<()> {
    let dry_run = cli.dry_run;
    match cli.command {
        Commands::FixTaxes {
            mapping,
            from,
            to,
            pause_every,
            pause_seconds,
        } => {
            let config = config::tax_correction(
                mapping.as_deref(),
                from,
                to,
                pause_every,
                pause_seconds,
                dry_run,
            )?;
            let store = connect(dry_run)?;
            commands::fix_taxes(store, config, dry_run);
        }
        Commands::B2bPartners { file, order_prefix } => {
            let Some(file) = file else {
                bail!("no order report given (usage: erpfix b2b-partners <FILE>)");
            };
            let orders = config::order_report(&file)?;
            let store = connect(dry_run)?;
            commands::b2b_partners(store, &orders, config::reconcile(order_prefix), dry_run);
        }
        Commands::ActivateCurrencies { currencies } => {
            let store = connect(dry_run)?;
            commands::activate_currencies(store, &config::currency_codes(currencies), dry_run);
        }
        Commands::RenameFiscalPosition { id, name } => {
            let store = connect(dry_run)?;
            commands::rename_fiscal_position(store, id, &name);
        }
        Commands::CancelDelivery { order } => {
            let store = connect(dry_run)?;
            commands::cancel_delivery(store, &order, dry_run);
        }
        Commands::InspectConfig {
            fragment,
            fiscal_position,
            journal,
        } => {
            let store = connect(dry_run)?;
            commands::inspect_config(store, &fragment, fiscal_position, journal)?;
        }
        Commands::OrderFields { fragment, order } => {
            let store = connect(dry_run)?;
            commands::order_fields(store, &fragment, order)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    erpfix_observability::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "aborted");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_dry_run_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["erpfix", "b2b-partners", "orders.tsv", "--dry-run"]).unwrap();
        assert!(cli.dry_run);
        match cli.command {
            Commands::B2bPartners { file, order_prefix } => {
                assert_eq!(file, Some(PathBuf::from("orders.tsv")));
                assert_eq!(order_prefix, "FBM");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn fix_taxes_defaults() {
        let cli = Cli::try_parse_from(["erpfix", "fix-taxes"]).unwrap();
        match cli.command {
            Commands::FixTaxes {
                mapping,
                from,
                to,
                pause_every,
                pause_seconds,
            } => {
                assert!(mapping.is_none());
                assert_eq!(from, NaiveDate::from_ymd_opt(2025, 11, 1).unwrap());
                assert_eq!(to, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
                assert_eq!(pause_every, 20);
                assert_eq!(pause_seconds, 0.2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn record_ids_are_parsed() {
        let cli = Cli::try_parse_from([
            "erpfix",
            "rename-fiscal-position",
            "--id",
            "71",
            "--name",
            "EX*VAT | Régime Export",
        ])
        .unwrap();
        match cli.command {
            Commands::RenameFiscalPosition { id, .. } => assert_eq!(id, RecordId::new(71)),
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["erpfix", "rename-fiscal-position", "--id", "x", "--name", "n"]).is_err());
    }

    #[test]
    fn repeated_currency_flags() {
        let cli = Cli::try_parse_from([
            "erpfix",
            "activate-currencies",
            "--currency",
            "GBP",
            "--currency",
            "chf",
        ])
        .unwrap();
        match cli.command {
            Commands::ActivateCurrencies { currencies } => assert_eq!(currencies, vec!["GBP", "chf"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
