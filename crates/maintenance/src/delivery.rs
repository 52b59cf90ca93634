//! Cancelling an order together with its deliveries.

use tracing::{info, info_span, warn};

use erpfix_core::{ItemOutcome, RecordId, RecordType, RunId, RunReport};
use erpfix_store::{Domain, Op, RecordStore, Resolution, SearchOptions, resolve_transition};

const CANCELLED: &str = "cancel";

/// A delivery of the order, as listed before any cancel attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickingSummary {
    pub id: RecordId,
    pub name: String,
    pub state: String,
    pub picking_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CancelDeliveryRun {
    pub run_id: RunId,
    pub order: Option<RecordId>,
    pub pickings: Vec<PickingSummary>,
    /// One outcome per done picking, then one for the order.
    pub report: RunReport,
    pub final_state: Option<String>,
}

/// Cancel the order named exactly `order_name`, trying its done deliveries
/// first. A failed picking cancel is reported and does not stop the order
/// cancel.
pub fn cancel_delivery<S: RecordStore + ?Sized>(store: &S, order_name: &str) -> CancelDeliveryRun {
    let run_id = RunId::new();
    let span = info_span!("cancel_delivery", run_id = %run_id, order = %order_name);
    let _guard = span.enter();

    let mut run = CancelDeliveryRun {
        run_id,
        order: None,
        pickings: Vec::new(),
        report: RunReport::new(),
        final_state: None,
    };

    let found = store.search(
        RecordType::Order,
        &Domain::new().with("name", Op::Eq, order_name),
        &SearchOptions::fields(["name", "state"]).limit(1),
    );
    let order = match found.map(|hits| hits.into_iter().next().and_then(|r| r.id())) {
        Ok(Some(id)) => id,
        Ok(None) => {
            run.report
                .push(ItemOutcome::not_found(order_name, "no order with that name"));
            return run;
        }
        Err(err) => {
            run.report
                .push(ItemOutcome::error(order_name, format!("lookup failed: {err}")));
            return run;
        }
    };
    run.order = Some(order);

    let pickings = store.search(
        RecordType::Picking,
        &Domain::new().with("sale_id", Op::Eq, order.get()),
        &SearchOptions::fields(["name", "state", "picking_type_id"]),
    );
    match pickings {
        Ok(records) => {
            run.pickings = records
                .iter()
                .filter_map(|r| {
                    Some(PickingSummary {
                        id: r.id()?,
                        name: r.text_or_empty("name").to_string(),
                        state: r.text_or_empty("state").to_string(),
                        picking_type: r.many2one_name("picking_type_id").map(str::to_string),
                    })
                })
                .collect();
        }
        Err(err) => warn!(error = %err, "listing deliveries failed"),
    }

    for picking in run.pickings.iter().filter(|p| p.state == "done") {
        let outcome = store.invoke_action(RecordType::Picking, "action_cancel", &[picking.id]);
        let item = match resolve_transition(store, RecordType::Picking, picking.id, outcome, CANCELLED) {
            Resolution::Applied { .. } => ItemOutcome::fixed(picking.name.clone(), "cancelled"),
            Resolution::NotApplied(reason) => {
                warn!(picking = %picking.name, %reason, "picking cancel failed, a return may be needed");
                ItemOutcome::error(picking.name.clone(), format!("cancel failed: {reason}"))
            }
        };
        run.report.push(item);
    }

    let outcome = store.invoke_action(RecordType::Order, "action_cancel", &[order]);
    let item = match resolve_transition(store, RecordType::Order, order, outcome, CANCELLED) {
        Resolution::Applied { .. } => {
            info!("order cancelled");
            ItemOutcome::fixed(order_name, "order cancelled")
        }
        Resolution::NotApplied(reason) => {
            warn!(%reason, "order cancel failed");
            ItemOutcome::error(order_name, format!("order cancel failed: {reason}"))
        }
    };
    run.report.push(item);

    run.final_state = store
        .read_one(RecordType::Order, order, &["state"])
        .ok()
        .flatten()
        .map(|r| r.text_or_empty("state").to_string());
    run
}
