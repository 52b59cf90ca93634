//! Read-only inspection of accounting configuration and order metadata.

use serde::Serialize;
use serde_json::Value as JsonValue;

use erpfix_core::{RecordId, RecordType};
use erpfix_store::{Domain, Op, Record, RecordStore, SearchOptions, StoreError};

const FISCAL_POSITION_FIELDS: [&str; 4] = ["name", "country_id", "country_group_id", "auto_apply"];
const JOURNAL_FIELDS: [&str; 3] = ["name", "code", "type"];

/// Fiscal positions and sale journals.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub fiscal_positions: Vec<Record>,
    pub fiscal_position: Option<Record>,
    pub sale_journals: Vec<Record>,
    pub journal: Option<Record>,
}

/// Fiscal positions whose name contains `fragment` (case-insensitive), one
/// fiscal position and one journal by id, and every sale journal.
pub fn inspect_config<S: RecordStore + ?Sized>(
    store: &S,
    fragment: &str,
    fiscal_position: Option<RecordId>,
    journal: Option<RecordId>,
) -> Result<ConfigSnapshot, StoreError> {
    let fiscal_positions = store.search(
        RecordType::FiscalPosition,
        &Domain::new().with("name", Op::ILike, fragment),
        &SearchOptions::fields(FISCAL_POSITION_FIELDS),
    )?;
    let fiscal_position = match fiscal_position {
        Some(id) => store.read_one(RecordType::FiscalPosition, id, &FISCAL_POSITION_FIELDS)?,
        None => None,
    };
    let sale_journals = store.search(
        RecordType::Journal,
        &Domain::new().with("type", Op::Eq, "sale"),
        &SearchOptions::fields(JOURNAL_FIELDS),
    )?;
    let journal = match journal {
        Some(id) => store.read_one(RecordType::Journal, id, &JOURNAL_FIELDS)?,
        None => None,
    };

    Ok(ConfigSnapshot {
        fiscal_positions,
        fiscal_position,
        sale_journals,
        journal,
    })
}

/// Metadata of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub label: String,
    pub kind: String,
    pub relation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderFieldsReport {
    /// Matching fields, sorted by name.
    pub fields: Vec<FieldInfo>,
    /// Values of those fields on the requested order.
    pub order: Option<Record>,
}

/// Order fields whose technical name contains `fragment`, plus their values on
/// one order.
pub fn order_fields<S: RecordStore + ?Sized>(
    store: &S,
    fragment: &str,
    order: Option<RecordId>,
) -> Result<OrderFieldsReport, StoreError> {
    let needle = fragment.to_lowercase();
    let mut fields: Vec<FieldInfo> = store
        .fields_get(RecordType::Order)?
        .into_iter()
        .filter(|(name, _)| name.to_lowercase().contains(&needle))
        .map(|(name, meta)| FieldInfo {
            label: meta_text(&meta, "string"),
            kind: meta_text(&meta, "type"),
            relation: meta
                .get("relation")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            name,
        })
        .collect();
    fields.sort_by(|a, b| a.name.cmp(&b.name));

    let order = match order {
        Some(id) if !fields.is_empty() => {
            let names: Vec<&str> = std::iter::once("name")
                .chain(fields.iter().map(|f| f.name.as_str()))
                .collect();
            store.read_one(RecordType::Order, id, &names)?
        }
        _ => None,
    };

    Ok(OrderFieldsReport { fields, order })
}

fn meta_text(meta: &JsonValue, key: &str) -> String {
    meta.get(key)
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string()
}
