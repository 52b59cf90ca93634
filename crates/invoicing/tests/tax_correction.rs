use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;

use erpfix_core::{OutcomeKind, RecordId, RecordType};
use erpfix_invoicing::{TaxCorrectionConfig, TaxCorrectionRun, TaxCorrector, TaxMapping};
use erpfix_store::{DryRunStore, Fault, InMemoryRecordStore, Mutation};

const BE_VAT_21: i64 = 1;
const DE_VAT_19: i64 = 135;

fn config() -> TaxCorrectionConfig {
    TaxCorrectionConfig {
        pacing: false,
        pause: Duration::ZERO,
        ..TaxCorrectionConfig::default()
    }
}

fn seed_invoice(store: &InMemoryRecordStore, name: &str, date: &str, lines: &[&[i64]]) -> RecordId {
    let id = store.insert(
        RecordType::Invoice,
        json!({
            "name": name,
            "state": "posted",
            "move_type": "out_invoice",
            "invoice_date": date,
        }),
    );
    for taxes in lines {
        store.insert(
            RecordType::InvoiceLine,
            json!({ "move_id": id.get(), "display_type": "product", "tax_ids": taxes }),
        );
    }
    id
}

fn line_taxes(store: &InMemoryRecordStore, invoice: RecordId) -> Vec<Vec<RecordId>> {
    store
        .all(RecordType::InvoiceLine)
        .iter()
        .filter(|l| l.many2one("move_id") == Some(invoice))
        .map(|l| l.ids("tax_ids"))
        .collect()
}

fn state(store: &InMemoryRecordStore, invoice: RecordId) -> String {
    store
        .get(RecordType::Invoice, invoice)
        .map(|r| r.text_or_empty("state").to_string())
        .unwrap_or_default()
}

fn run(store: &InMemoryRecordStore) -> TaxCorrectionRun {
    TaxCorrector::new(store, config()).run()
}

#[test]
fn vde_invoice_with_belgian_vat_is_corrected_and_reposted() {
    let store = InMemoryRecordStore::new();
    let id = seed_invoice(&store, "VDE-1001", "2025-11-14", &[&[BE_VAT_21]]);

    let result = run(&store);

    assert_eq!(result.stats.checked, 1);
    assert_eq!(result.stats.fixed, 1);
    assert_eq!(result.stats.lines_fixed, 1);
    assert_eq!(result.report.kinds(), vec![("VDE-1001".to_string(), OutcomeKind::Fixed)]);
    assert_eq!(state(&store, id), "posted");
    assert_eq!(line_taxes(&store, id), vec![vec![RecordId::new(DE_VAT_19)]]);

    let actions: Vec<String> = store
        .mutations()
        .into_iter()
        .filter_map(|m| match m {
            Mutation::Action { action, .. } => Some(action),
            _ => None,
        })
        .collect();
    assert_eq!(actions, vec!["button_draft", "action_post"]);
}

#[test]
fn clean_invoice_is_skipped_and_untouched() {
    let store = InMemoryRecordStore::new();
    let id = seed_invoice(&store, "VFR-1", "2025-12-01", &[&[122], &[122, 9]]);

    let result = run(&store);

    assert_eq!(result.stats.skipped, 1);
    assert_eq!(result.stats.fixed, 0);
    assert_eq!(store.mutation_count(), 0);
    assert_eq!(state(&store, id), "posted");
}

#[test]
fn second_run_fixes_nothing() {
    let store = InMemoryRecordStore::new();
    seed_invoice(&store, "VDE-1", "2025-11-02", &[&[BE_VAT_21], &[DE_VAT_19]]);
    seed_invoice(&store, "VPL-2", "2025-12-30", &[&[BE_VAT_21], &[BE_VAT_21]]);

    let first = run(&store);
    assert_eq!(first.stats.fixed, 2);
    assert_eq!(first.stats.lines_fixed, 3);

    let second = run(&store);
    assert_eq!(second.stats.fixed, 0);
    assert_eq!(second.stats.skipped, 2);
}

#[test]
fn only_product_lines_and_in_window_out_invoices_are_considered() {
    let store = InMemoryRecordStore::new();
    let section = seed_invoice(&store, "VDE-10", "2025-11-20", &[&[DE_VAT_19]]);
    store.insert(
        RecordType::InvoiceLine,
        json!({ "move_id": section.get(), "display_type": "line_section", "tax_ids": [BE_VAT_21] }),
    );
    let early = seed_invoice(&store, "VDE-11", "2025-10-31", &[&[BE_VAT_21]]);
    let refund = store.insert(
        RecordType::Invoice,
        json!({ "name": "VDE-12", "state": "posted", "move_type": "out_refund", "invoice_date": "2025-11-20" }),
    );
    store.insert(
        RecordType::InvoiceLine,
        json!({ "move_id": refund.get(), "display_type": "product", "tax_ids": [BE_VAT_21] }),
    );

    let result = run(&store);

    assert_eq!(result.stats.checked, 1);
    assert_eq!(result.stats.skipped, 1);
    assert_eq!(store.mutation_count(), 0);
    assert_eq!(line_taxes(&store, early), vec![vec![RecordId::new(BE_VAT_21)]]);
}

#[test]
fn repost_failure_leaves_draft_with_corrected_taxes() {
    let store = InMemoryRecordStore::new();
    let id = seed_invoice(&store, "VIT-5", "2025-11-05", &[&[BE_VAT_21]]);
    store.inject_action_fault("action_post", id, Fault::Fail("period locked".into()));

    let result = run(&store);

    assert_eq!(result.stats.repost_errors, 1);
    assert_eq!(result.stats.fixed, 0);
    assert_eq!(result.stats.lines_fixed, 1);
    assert_eq!(state(&store, id), "draft");
    assert_eq!(line_taxes(&store, id), vec![vec![RecordId::new(180)]]);
    match &result.report.outcomes[0] {
        o if o.kind == OutcomeKind::Error && o.reason.contains("period locked") => {}
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn ambiguous_reset_that_applied_proceeds() {
    let store = InMemoryRecordStore::new();
    let id = seed_invoice(&store, "VNL-3", "2025-11-05", &[&[BE_VAT_21]]);
    store.inject_action_fault("button_draft", id, Fault::AmbiguousApplied);
    store.inject_action_fault("action_post", id, Fault::AmbiguousApplied);

    let result = run(&store);

    assert_eq!(result.stats.fixed, 1);
    assert_eq!(result.stats.reset_errors, 0);
    assert_eq!(state(&store, id), "posted");
    assert_eq!(line_taxes(&store, id), vec![vec![RecordId::new(136)]]);
}

#[test]
fn ambiguous_reset_that_did_not_apply_is_a_reset_error() {
    let store = InMemoryRecordStore::new();
    let id = seed_invoice(&store, "VCZ-8", "2025-12-24", &[&[BE_VAT_21]]);
    store.inject_action_fault("button_draft", id, Fault::AmbiguousNotApplied);

    let result = run(&store);

    assert_eq!(result.stats.reset_errors, 1);
    assert_eq!(result.stats.lines_fixed, 0);
    assert_eq!(state(&store, id), "posted");
    assert_eq!(line_taxes(&store, id), vec![vec![RecordId::new(BE_VAT_21)]]);
}

#[test]
fn line_write_failure_stops_before_repost() {
    let store = InMemoryRecordStore::new();
    let id = seed_invoice(&store, "VGB-4", "2025-11-30", &[&[BE_VAT_21]]);
    let line = store
        .all(RecordType::InvoiceLine)
        .iter()
        .find_map(|l| l.id())
        .unwrap();
    store.inject_write_fault(RecordType::InvoiceLine, line, Fault::Fail("tax locked".into()));

    let result = run(&store);

    assert_eq!(result.stats.errors, 1);
    assert_eq!(result.stats.fixed, 0);
    assert_eq!(state(&store, id), "draft");
    assert!(!store.mutations().iter().any(|m| matches!(
        m,
        Mutation::Action { action, .. } if action == "action_post"
    )));
}

#[test]
fn failed_line_read_counts_as_error_and_batch_continues() {
    let store = InMemoryRecordStore::new();
    seed_invoice(&store, "VDE-1", "2025-11-02", &[&[BE_VAT_21]]);
    seed_invoice(&store, "VDE-2", "2025-11-03", &[&[BE_VAT_21]]);
    store.inject_search_fault(RecordType::InvoiceLine, "connection reset");

    let result = run(&store);

    assert_eq!(result.stats.checked, 2);
    assert_eq!(result.stats.errors, 2);
    assert_eq!(store.mutation_count(), 0);
}

#[test]
fn custom_mapping_and_window_are_honored() {
    let mapping = TaxMapping::from_json_str(
        r#"{ "incorrect_tax": 50, "prefixes": [{ "prefix": "INV/AT", "country": "AT" }], "domestic_taxes": { "AT": 51 } }"#,
    )
    .unwrap();
    let store = InMemoryRecordStore::new();
    let id = seed_invoice(&store, "INV/AT/0001", "2024-03-01", &[&[50, 7]]);

    let cfg = TaxCorrectionConfig {
        mapping,
        date_from: None,
        date_to: None,
        ..config()
    };
    let result = TaxCorrector::new(&store, cfg).run();

    assert_eq!(result.stats.fixed, 1);
    assert_eq!(line_taxes(&store, id), vec![vec![RecordId::new(51)]]);
}

#[test]
fn progress_is_reported_per_fix() {
    let store = InMemoryRecordStore::new();
    seed_invoice(&store, "VDE-1", "2025-11-02", &[&[BE_VAT_21], &[BE_VAT_21]]);
    seed_invoice(&store, "VDE-2", "2025-11-03", &[&[DE_VAT_19]]);

    let mut seen = Vec::new();
    TaxCorrector::new(&store, config()).run_with(|p| {
        seen.push((p.ordinal, p.invoice.to_string(), p.lines));
    });

    assert_eq!(seen, vec![(1, "VDE-1".to_string(), 2)]);
}

#[test]
fn dry_run_classifies_like_live_run_without_mutating() {
    let seed = |store: &InMemoryRecordStore| {
        seed_invoice(store, "VDE-1", "2025-11-02", &[&[BE_VAT_21]]);
        seed_invoice(store, "VDE-2", "2025-11-03", &[&[DE_VAT_19]]);
        seed_invoice(store, "VFR-3", "2025-12-03", &[&[BE_VAT_21], &[BE_VAT_21]]);
    };
    let live_store = InMemoryRecordStore::new();
    seed(&live_store);
    let dry_inner = InMemoryRecordStore::new();
    seed(&dry_inner);

    let live = run(&live_store);
    let dry_store = DryRunStore::new(&dry_inner);
    let dry = TaxCorrector::new(&dry_store, config()).run();

    assert_eq!(dry.report.kinds(), live.report.kinds());
    assert_eq!(dry.stats, live.stats);
    assert_eq!(dry_inner.mutation_count(), 0);
    assert!(live_store.mutation_count() > 0);
}

fn tax_set() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(prop_oneof![Just(BE_VAT_21), Just(DE_VAT_19), 2i64..10], 0..3)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Property: after a run no product line in scope carries the incorrect
    /// tax, every invoice is posted, and a second run fixes nothing.
    #[test]
    fn correction_is_complete_and_idempotent(
        invoices in prop::collection::vec(prop::collection::vec(tax_set(), 1..4), 1..6)
    ) {
        let store = InMemoryRecordStore::new();
        let mut ids = Vec::new();
        for (n, lines) in invoices.iter().enumerate() {
            let refs: Vec<&[i64]> = lines.iter().map(Vec::as_slice).collect();
            ids.push(seed_invoice(&store, &format!("VDE-{n}"), "2025-11-15", &refs));
        }

        let first = run(&store);
        let needing_fix = invoices
            .iter()
            .filter(|lines| lines.iter().any(|t| t.contains(&BE_VAT_21)))
            .count() as u64;
        prop_assert_eq!(first.stats.fixed, needing_fix);
        prop_assert_eq!(first.stats.skipped, invoices.len() as u64 - needing_fix);

        for id in &ids {
            prop_assert_eq!(state(&store, *id), "posted");
            for taxes in line_taxes(&store, *id) {
                prop_assert!(!taxes.contains(&RecordId::new(BE_VAT_21)));
            }
        }

        let second = run(&store);
        prop_assert_eq!(second.stats.fixed, 0);
    }

    /// Property: dry and live runs classify every invoice identically.
    #[test]
    fn dry_and_live_runs_agree(
        invoices in prop::collection::vec(prop::collection::vec(tax_set(), 1..3), 1..5)
    ) {
        let live_store = InMemoryRecordStore::new();
        let dry_inner = InMemoryRecordStore::new();
        for (n, lines) in invoices.iter().enumerate() {
            let refs: Vec<&[i64]> = lines.iter().map(Vec::as_slice).collect();
            seed_invoice(&live_store, &format!("VPL-{n}"), "2025-12-01", &refs);
            seed_invoice(&dry_inner, &format!("VPL-{n}"), "2025-12-01", &refs);
        }

        let live = run(&live_store);
        let dry = TaxCorrector::new(DryRunStore::new(&dry_inner), config()).run();

        prop_assert_eq!(dry.report.kinds(), live.report.kinds());
        prop_assert_eq!(dry_inner.mutation_count(), 0);
    }
}
