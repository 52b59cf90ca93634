//! B2B partner reconciliation pipeline.
//!
//! For each business order of the marketplace report: find the ERP order, read
//! its billing partner, and either enrich that partner or (for a generic
//! marketplace partner) create a dedicated company partner and point the order
//! at it.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info, info_span, instrument, warn};

use erpfix_core::{ItemOutcome, RecordId, RecordType, RunId, RunReport};
use erpfix_store::{CallOutcome, Domain, Op, Record, RecordStore, SearchOptions, StoreError, Values};

use crate::input::B2bOrder;
use crate::partner::{
    GenericPartnerPatterns, NewCompanyPartner, PARTNER_FIELDS, Partner, PartnerDecision,
    PartnerUpdate, decide,
};

/// Order fields that reference partners. All three are rewritten together.
pub const ORDER_PARTNER_FIELDS: [&str; 3] =
    ["partner_id", "partner_invoice_id", "partner_shipping_id"];

/// Options for one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Prefix the ERP puts in front of marketplace order ids.
    pub order_prefix: String,
    pub generic: GenericPartnerPatterns,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            order_prefix: "FBM".to_string(),
            generic: GenericPartnerPatterns::default(),
        }
    }
}

/// Run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub processed: u64,
    pub updated: u64,
    pub created: u64,
    pub not_found: u64,
    pub already_correct: u64,
    pub errors: u64,
}

#[derive(Debug, Clone)]
pub struct ReconcileRun {
    pub run_id: RunId,
    pub stats: ReconcileStats,
    pub report: RunReport,
}

pub struct PartnerReconciler<S> {
    store: S,
    config: ReconcileConfig,
    countries: HashMap<String, Option<RecordId>>,
}

impl<S: RecordStore> PartnerReconciler<S> {
    pub fn new(store: S, config: ReconcileConfig) -> Self {
        Self {
            store,
            config,
            countries: HashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn run(&mut self, orders: &[B2bOrder]) -> ReconcileRun {
        let run_id = RunId::new();
        let span = info_span!("b2b_partners", run_id = %run_id);
        let _guard = span.enter();

        let mut stats = ReconcileStats::default();
        let mut report = RunReport::new();
        info!(orders = orders.len(), "reconciling business orders");

        for order in orders {
            stats.processed += 1;
            let outcome = self.reconcile(order, &mut stats);
            report.push(outcome);
        }

        info!(
            processed = stats.processed,
            updated = stats.updated,
            created = stats.created,
            not_found = stats.not_found,
            already_correct = stats.already_correct,
            errors = stats.errors,
            "partner reconciliation finished"
        );
        ReconcileRun {
            run_id,
            stats,
            report,
        }
    }

    /// Reconcile one order; counters are bumped here.
    #[instrument(skip(self, order, stats), fields(order = %order.order_id))]
    pub fn reconcile(&mut self, order: &B2bOrder, stats: &mut ReconcileStats) -> ItemOutcome {
        let item = order.order_id.clone();
        let fail = |stats: &mut ReconcileStats, reason: String| {
            warn!(%reason, "order failed");
            stats.errors += 1;
            ItemOutcome::error(item.clone(), reason)
        };

        if order.order_id.is_empty() {
            return fail(stats, "row without order id".to_string());
        }

        let erp_order = match self.find_order(&order.order_id) {
            Ok(Some(found)) => found,
            Ok(None) => {
                info!("order not found");
                stats.not_found += 1;
                return ItemOutcome::not_found(item, "no matching ERP order");
            }
            Err(err) => return fail(stats, format!("order lookup failed: {err}")),
        };
        let Some(order_id) = erp_order.id() else {
            return fail(stats, "ERP order without id".to_string());
        };

        let Some(partner_id) = erp_order.many2one("partner_id") else {
            return fail(stats, "no partner on order".to_string());
        };

        let partner = match self.store.read_one(RecordType::Partner, partner_id, PARTNER_FIELDS) {
            Ok(Some(record)) => match Partner::from_record(&record) {
                Ok(partner) => partner,
                Err(err) => return fail(stats, err.to_string()),
            },
            Ok(None) => return fail(stats, format!("partner {partner_id} not found")),
            Err(err) => return fail(stats, format!("partner read failed: {err}")),
        };
        debug!(%partner_id, partner = %partner.name, vat = ?partner.vat, "current partner");

        match decide(&partner, order, &self.config.generic) {
            PartnerDecision::AlreadyCorrect(reason) => {
                stats.already_correct += 1;
                ItemOutcome::no_fix_needed(item, reason)
            }
            PartnerDecision::Update(update) => match self.update_partner(&partner, &update) {
                Ok(()) => {
                    info!(%partner_id, ?update, "partner updated");
                    stats.updated += 1;
                    ItemOutcome::fixed(item, describe_update(&update))
                }
                Err(reason) => fail(stats, reason),
            },
            PartnerDecision::CreateCompany(new) => match self.create_company(order_id, &new) {
                Ok(created) => {
                    info!(partner_id = %created, name = %new.name, "company partner created");
                    stats.created += 1;
                    ItemOutcome::created(
                        item,
                        format!("partner {} ({})", new.name, new.vat.as_deref().unwrap_or("no VAT")),
                    )
                }
                Err(reason) => fail(stats, reason),
            },
        }
    }

    /// First order matching `{prefix}{id}`, then the bare id.
    fn find_order(&self, marketplace_id: &str) -> Result<Option<Record>, StoreError> {
        let patterns = [
            format!("{}{}", self.config.order_prefix, marketplace_id),
            marketplace_id.to_string(),
        ];
        let options = SearchOptions::fields(
            std::iter::once("name").chain(ORDER_PARTNER_FIELDS.iter().copied()),
        )
        .limit(1);

        for pattern in patterns {
            let domain = Domain::new().with("name", Op::ILike, pattern.as_str());
            if let Some(found) = self
                .store
                .search(RecordType::Order, &domain, &options)?
                .into_iter()
                .next()
            {
                debug!(%pattern, order = %found.text_or_empty("name"), "order matched");
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Country id for an ISO code; memoized for the lifetime of the reconciler.
    pub fn country_id(&mut self, code: &str) -> Result<Option<RecordId>, StoreError> {
        let code = code.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Ok(None);
        }
        if let Some(cached) = self.countries.get(&code) {
            return Ok(*cached);
        }
        let found = self
            .store
            .search(
                RecordType::Country,
                &Domain::new().with("code", Op::Eq, code.as_str()),
                &SearchOptions::fields(["id"]).limit(1),
            )?
            .first()
            .and_then(Record::id);
        self.countries.insert(code, found);
        Ok(found)
    }

    fn update_partner(&self, partner: &Partner, update: &PartnerUpdate) -> Result<(), String> {
        let mut values = Values::new();
        if let Some(vat) = &update.vat {
            values.insert("vat".into(), json!(vat));
        }
        if update.mark_company {
            values.insert("is_company".into(), json!(true));
            values.insert("company_type".into(), json!("company"));
        }

        match self.store.write(RecordType::Partner, &[partner.id], &values) {
            CallOutcome::Success => Ok(()),
            CallOutcome::Failure(reason) => Err(format!("partner write failed: {reason}")),
            CallOutcome::Ambiguous(detail) => {
                if self.fields_match(RecordType::Partner, partner.id, &values) {
                    Ok(())
                } else {
                    Err(format!("partner write unconfirmed: {detail}"))
                }
            }
        }
    }

    fn create_company(&mut self, order: RecordId, new: &NewCompanyPartner) -> Result<RecordId, String> {
        let country = self
            .country_id(&new.address.country_code)
            .map_err(|e| format!("country lookup failed: {e}"))?;

        let mut values = Values::new();
        values.insert("name".into(), json!(new.name));
        values.insert("is_company".into(), json!(true));
        values.insert("company_type".into(), json!("company"));
        values.insert("street".into(), json!(new.address.street));
        values.insert("street2".into(), text_or_false(&new.address.street2));
        values.insert("city".into(), json!(new.address.city));
        values.insert("zip".into(), json!(new.address.zip));
        values.insert(
            "country_id".into(),
            country.map_or(JsonValue::Bool(false), |id| json!(id.get())),
        );
        if let Some(vat) = &new.vat {
            values.insert("vat".into(), json!(vat));
        }

        let created = self
            .store
            .create(RecordType::Partner, &values)
            .map_err(|e| format!("partner create failed: {e}"))?;

        let mut refs = Values::new();
        for field in ORDER_PARTNER_FIELDS {
            refs.insert(field.into(), json!(created.get()));
        }
        match self.store.write(RecordType::Order, &[order], &refs) {
            CallOutcome::Success => Ok(created),
            CallOutcome::Ambiguous(_) if self.fields_match(RecordType::Order, order, &refs) => {
                Ok(created)
            }
            outcome => Err(format!(
                "partner {created} created but order not repointed: {outcome}"
            )),
        }
    }

    /// Confirmatory read after an ambiguous write.
    fn fields_match(&self, record_type: RecordType, id: RecordId, values: &Values) -> bool {
        let fields: Vec<&str> = values.keys().map(String::as_str).collect();
        match self.store.read_one(record_type, id, &fields) {
            Ok(Some(record)) => values.iter().all(|(field, want)| {
                let have = record.get(field);
                have == Some(want)
                    || (want.is_i64() && record.many2one(field).map(|r| r.get()) == want.as_i64())
            }),
            Ok(None) => false,
            Err(err) => {
                warn!(%record_type, %id, error = %err, "confirmatory read failed");
                false
            }
        }
    }
}

fn text_or_false(value: &str) -> JsonValue {
    if value.is_empty() {
        JsonValue::Bool(false)
    } else {
        json!(value)
    }
}

fn describe_update(update: &PartnerUpdate) -> String {
    match (&update.vat, update.mark_company) {
        (Some(vat), true) => format!("set VAT {vat}, marked as company"),
        (Some(vat), false) => format!("set VAT {vat}"),
        (None, _) => "marked as company".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erpfix_store::InMemoryRecordStore;

    #[test]
    fn country_lookups_are_cached() {
        let store = InMemoryRecordStore::new();
        let de = store.insert(RecordType::Country, json!({ "code": "DE", "name": "Germany" }));
        let mut rec = PartnerReconciler::new(&store, ReconcileConfig::default());

        assert_eq!(rec.country_id("de").unwrap(), Some(de));
        store.inject_search_fault(RecordType::Country, "should not be called again");
        assert_eq!(rec.country_id("DE").unwrap(), Some(de));
        assert_eq!(rec.country_id("").unwrap(), None);
    }

    #[test]
    fn unknown_country_is_none() {
        let store = InMemoryRecordStore::new();
        let mut rec = PartnerReconciler::new(&store, ReconcileConfig::default());
        assert_eq!(rec.country_id("XX").unwrap(), None);
    }

    #[test]
    fn update_description() {
        let both = PartnerUpdate {
            vat: Some("DE1".into()),
            mark_company: true,
        };
        assert_eq!(describe_update(&both), "set VAT DE1, marked as company");
    }
}
