use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use erpfix_core::{DomainError, DomainResult, RecordId};
use erpfix_store::Record;

use crate::tax_map::TaxMapping;

/// Fields fetched for an invoice header.
pub const INVOICE_FIELDS: &[&str] = &["name", "state"];
/// Fields fetched for an invoice line.
pub const LINE_FIELDS: &[&str] = &["name", "tax_ids"];

/// Invoice lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceState {
    Draft,
    Posted,
    Cancel,
}

impl InvoiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceState::Draft => "draft",
            InvoiceState::Posted => "posted",
            InvoiceState::Cancel => "cancel",
        }
    }
}

impl core::fmt::Display for InvoiceState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for InvoiceState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(InvoiceState::Draft),
            "posted" => Ok(InvoiceState::Posted),
            "cancel" => Ok(InvoiceState::Cancel),
            other => Err(DomainError::validation(format!("unknown invoice state '{other}'"))),
        }
    }
}

/// Product line of an invoice with its current tax set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceLine {
    pub id: RecordId,
    pub tax_ids: BTreeSet<RecordId>,
}

impl InvoiceLine {
    pub fn from_record(record: &Record) -> DomainResult<Self> {
        let id = record
            .id()
            .ok_or_else(|| DomainError::validation("invoice line without id"))?;
        Ok(Self {
            id,
            tax_ids: record.ids("tax_ids").into_iter().collect(),
        })
    }

    pub fn carries(&self, tax: RecordId) -> bool {
        self.tax_ids.contains(&tax)
    }
}

/// Invoice header plus its product lines, as read at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceSnapshot {
    pub id: RecordId,
    pub name: String,
    pub state: InvoiceState,
    pub lines: Vec<InvoiceLine>,
}

impl InvoiceSnapshot {
    pub fn from_records(header: &Record, lines: &[Record]) -> DomainResult<Self> {
        let id = header
            .id()
            .ok_or_else(|| DomainError::validation("invoice without id"))?;
        let state = header.text_or_empty("state").parse()?;
        let lines = lines
            .iter()
            .map(InvoiceLine::from_record)
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(Self {
            id,
            name: header.text_or_empty("name").to_string(),
            state,
            lines,
        })
    }

    /// Lines carrying `tax`, in line order.
    pub fn offending_lines(&self, tax: RecordId) -> Vec<RecordId> {
        self.lines
            .iter()
            .filter(|line| line.carries(tax))
            .map(|line| line.id)
            .collect()
    }
}

/// What a correction of one invoice will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionPlan {
    pub invoice: RecordId,
    pub name: String,
    pub domestic_tax: RecordId,
    /// Lines whose tax set is replaced by `{domestic_tax}`.
    pub lines: Vec<RecordId>,
}

/// Decide whether `snapshot` needs correcting.
///
/// `Ok(None)` when no product line carries the incorrect code. An invoice whose
/// name matches no configured prefix cannot be assigned a jurisdiction and is
/// rejected.
pub fn plan_correction(
    snapshot: &InvoiceSnapshot,
    mapping: &TaxMapping,
) -> DomainResult<Option<CorrectionPlan>> {
    let lines = snapshot.offending_lines(mapping.incorrect_tax());
    if lines.is_empty() {
        return Ok(None);
    }
    let domestic_tax = mapping.tax_for_invoice(&snapshot.name).ok_or_else(|| {
        DomainError::invariant(format!("no jurisdiction for invoice '{}'", snapshot.name))
    })?;
    Ok(Some(CorrectionPlan {
        invoice: snapshot.id,
        name: snapshot.name.clone(),
        domestic_tax,
        lines,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(name: &str, lines: serde_json::Value) -> InvoiceSnapshot {
        let header = Record::from_value(json!({ "id": 10, "name": name, "state": "posted" })).unwrap();
        let lines: Vec<Record> = lines
            .as_array()
            .unwrap()
            .iter()
            .cloned()
            .map(|v| Record::from_value(v).unwrap())
            .collect();
        InvoiceSnapshot::from_records(&header, &lines).unwrap()
    }

    #[test]
    fn only_lines_with_incorrect_tax_are_planned() {
        let snap = snapshot(
            "VFR-77",
            json!([
                { "id": 1, "tax_ids": [1] },
                { "id": 2, "tax_ids": [122] },
                { "id": 3, "tax_ids": [1, 44] },
                { "id": 4, "tax_ids": false },
            ]),
        );
        let plan = plan_correction(&snap, &TaxMapping::default()).unwrap().unwrap();
        assert_eq!(plan.domestic_tax, RecordId::new(122));
        assert_eq!(plan.lines, vec![RecordId::new(1), RecordId::new(3)]);
    }

    #[test]
    fn clean_invoice_needs_no_plan() {
        let snap = snapshot("VDE-1", json!([{ "id": 1, "tax_ids": [135] }]));
        assert_eq!(plan_correction(&snap, &TaxMapping::default()).unwrap(), None);
    }

    #[test]
    fn unmapped_prefix_is_an_invariant_violation() {
        let snap = snapshot("INV-1", json!([{ "id": 1, "tax_ids": [1] }]));
        let err = plan_correction(&snap, &TaxMapping::default()).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("INV-1") => {}
            _ => panic!("Expected invariant violation for unmapped invoice"),
        }
    }

    #[test]
    fn unknown_state_is_rejected() {
        let header = Record::from_value(json!({ "id": 1, "name": "VDE-1", "state": "weird" })).unwrap();
        assert!(InvoiceSnapshot::from_records(&header, &[]).is_err());
    }
}
