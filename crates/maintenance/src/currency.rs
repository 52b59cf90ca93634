//! Currency activation.

use serde_json::json;
use tracing::{info, info_span, warn};

use erpfix_core::{ItemOutcome, RecordId, RecordType, RunId, RunReport};
use erpfix_store::{CallOutcome, Domain, Op, Record, RecordStore, SearchOptions, Values};

/// Currencies the marketplace countries settle in.
pub const DEFAULT_CURRENCIES: [&str; 8] = ["GBP", "PLN", "CZK", "SEK", "DKK", "HUF", "RON", "BGN"];

/// Active currency as seen by the verification pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyStatus {
    pub code: String,
    pub symbol: String,
    pub rate: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ActivationRun {
    pub run_id: RunId,
    pub report: RunReport,
    /// One entry per requested code; `None` when not active afterwards.
    pub verification: Vec<(String, Option<CurrencyStatus>)>,
}

fn find_currency<S: RecordStore + ?Sized>(
    store: &S,
    code: &str,
    active_only: bool,
) -> Result<Option<Record>, erpfix_store::StoreError> {
    let mut domain = Domain::new().with("name", Op::Eq, code);
    let mut options = SearchOptions::fields(["name", "symbol", "active", "rate"]).limit(1);
    if active_only {
        domain = domain.with("active", Op::Eq, true);
    } else {
        options = options.include_inactive();
    }
    Ok(store
        .search(RecordType::Currency, &domain, &options)?
        .into_iter()
        .next())
}

fn is_active<S: RecordStore + ?Sized>(
    store: &S,
    id: RecordId,
) -> Result<bool, erpfix_store::StoreError> {
    let domain = Domain::new().with("id", Op::Eq, id.get());
    let options = SearchOptions::fields(["active"]).limit(1).include_inactive();
    Ok(store
        .search(RecordType::Currency, &domain, &options)?
        .first()
        .is_some_and(|c| c.flag("active")))
}

/// Make sure every currency in `codes` is active, then verify.
pub fn activate_currencies<S: RecordStore + ?Sized>(store: &S, codes: &[String]) -> ActivationRun {
    let run_id = RunId::new();
    let span = info_span!("activate_currencies", run_id = %run_id);
    let _guard = span.enter();

    let mut report = RunReport::new();
    for code in codes {
        let outcome = match find_currency(store, code, false) {
            Err(err) => ItemOutcome::error(code, format!("lookup failed: {err}")),
            Ok(None) => ItemOutcome::not_found(code, "not in database, create it manually"),
            Ok(Some(currency)) if currency.flag("active") => {
                ItemOutcome::no_fix_needed(code, "already active")
            }
            Ok(Some(currency)) => {
                let Some(id) = currency.id() else {
                    report.push(ItemOutcome::error(code, "currency without id"));
                    continue;
                };
                let mut values = Values::new();
                values.insert("active".into(), json!(true));
                match store.write(RecordType::Currency, &[id], &values) {
                    CallOutcome::Failure(reason) => {
                        warn!(%code, %reason, "activation failed");
                        ItemOutcome::error(code, reason)
                    }
                    CallOutcome::Success => {
                        info!(%code, "currency activated");
                        ItemOutcome::fixed(code, "activated")
                    }
                    CallOutcome::Ambiguous(detail) => match is_active(store, id) {
                        Ok(true) => {
                            info!(%code, "currency activated (confirmed by read)");
                            ItemOutcome::fixed(code, "activated")
                        }
                        Ok(false) => {
                            warn!(%code, %detail, "ambiguous reply and currency still inactive");
                            ItemOutcome::error(code, format!("not activated: {detail}"))
                        }
                        Err(err) => ItemOutcome::error(code, format!("confirmatory read failed: {err}")),
                    },
                }
            }
        };
        report.push(outcome);
    }

    let verification = codes
        .iter()
        .map(|code| {
            let status = find_currency(store, code, true).ok().flatten().map(|c| CurrencyStatus {
                code: code.clone(),
                symbol: c.text_or_empty("symbol").to_string(),
                rate: c.number("rate"),
            });
            (code.clone(), status)
        })
        .collect();

    ActivationRun {
        run_id,
        report,
        verification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erpfix_core::OutcomeKind;
    use erpfix_store::InMemoryRecordStore;

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn inactive_currencies_are_activated_and_verified() {
        let store = InMemoryRecordStore::new();
        store.insert(
            RecordType::Currency,
            json!({ "name": "GBP", "symbol": "£", "active": true, "rate": 0.85 }),
        );
        store.insert(
            RecordType::Currency,
            json!({ "name": "PLN", "symbol": "zł", "active": false, "rate": 4.3 }),
        );

        let run = activate_currencies(&store, &codes(&["GBP", "PLN", "XXX"]));

        assert_eq!(
            run.report.kinds(),
            vec![
                ("GBP".to_string(), OutcomeKind::NoFixNeeded),
                ("PLN".to_string(), OutcomeKind::Fixed),
                ("XXX".to_string(), OutcomeKind::NotFound),
            ]
        );
        let pln = run.verification[1].1.as_ref().unwrap();
        assert_eq!(pln.symbol, "zł");
        assert_eq!(pln.rate, Some(4.3));
        assert!(run.verification[2].1.is_none());
    }

    #[test]
    fn rejected_write_is_an_error() {
        let store = InMemoryRecordStore::new();
        let sek = store.insert(RecordType::Currency, json!({ "name": "SEK", "active": false }));
        store.inject_write_fault(
            RecordType::Currency,
            sek,
            erpfix_store::Fault::Fail("access denied".into()),
        );

        let run = activate_currencies(&store, &codes(&["SEK"]));
        assert_eq!(run.report.tally.errors, 1);
        assert!(run.verification[0].1.is_none());
    }

    #[test]
    fn ambiguous_write_is_confirmed_by_reading_active() {
        let store = InMemoryRecordStore::new();
        let gbp = store.insert(RecordType::Currency, json!({ "name": "GBP", "active": false }));
        let pln = store.insert(RecordType::Currency, json!({ "name": "PLN", "active": false }));
        store.inject_write_fault(RecordType::Currency, gbp, erpfix_store::Fault::AmbiguousNotApplied);
        store.inject_write_fault(RecordType::Currency, pln, erpfix_store::Fault::AmbiguousApplied);

        let run = activate_currencies(&store, &codes(&["GBP", "PLN"]));

        assert_eq!(
            run.report.kinds(),
            vec![
                ("GBP".to_string(), OutcomeKind::Error),
                ("PLN".to_string(), OutcomeKind::Fixed),
            ]
        );
        assert!(run.verification[0].1.is_none());
        assert!(run.verification[1].1.is_some());
    }

    #[test]
    fn default_list_covers_marketplace_currencies() {
        assert_eq!(DEFAULT_CURRENCIES.len(), 8);
        assert!(DEFAULT_CURRENCIES.contains(&"GBP"));
        assert!(DEFAULT_CURRENCIES.contains(&"BGN"));
    }
}
