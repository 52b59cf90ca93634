//! Record snapshots as returned by the remote store.
//!
//! The store speaks a loosely-typed field map. Accessors here decode its
//! conventions: relational (many2one) fields arrive as `[id, "display name"]` or
//! `false`, empty text fields arrive as `false`, and x2many fields arrive as id
//! lists.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

use erpfix_core::RecordId;

/// Field values for `write`/`create` calls.
pub type Values = Map<String, JsonValue>;

/// Transient snapshot of one remote record (projection of its fields).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, JsonValue>);

impl Record {
    pub fn new(fields: Map<String, JsonValue>) -> Self {
        Self(fields)
    }

    pub fn from_value(value: JsonValue) -> Option<Self> {
        match value {
            JsonValue::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<RecordId> {
        self.0.get("id").and_then(JsonValue::as_i64).map(RecordId::new)
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, JsonValue> {
        self.0
    }

    /// Text value; `None` for missing, `false` and `null`.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(JsonValue::as_str)
    }

    /// Text value, empty string when unset.
    pub fn text_or_empty(&self, field: &str) -> &str {
        self.text(field).unwrap_or("")
    }

    /// Boolean flag; anything but `true` reads as `false`.
    pub fn flag(&self, field: &str) -> bool {
        matches!(self.0.get(field), Some(JsonValue::Bool(true)))
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(JsonValue::as_f64)
    }

    /// Id of a relational field (`[id, name]`, a bare id, or `false`).
    pub fn many2one(&self, field: &str) -> Option<RecordId> {
        match self.0.get(field)? {
            JsonValue::Array(pair) => pair.first().and_then(JsonValue::as_i64).map(RecordId::new),
            JsonValue::Number(n) => n.as_i64().map(RecordId::new),
            _ => None,
        }
    }

    /// Display name carried by a relational field, when the store sent one.
    pub fn many2one_name(&self, field: &str) -> Option<&str> {
        match self.0.get(field)? {
            JsonValue::Array(pair) => pair.get(1).and_then(JsonValue::as_str),
            _ => None,
        }
    }

    /// Ids of an x2many field. Missing or `false` reads as empty.
    pub fn ids(&self, field: &str) -> Vec<RecordId> {
        match self.0.get(field) {
            Some(JsonValue::Array(items)) => items
                .iter()
                .filter_map(JsonValue::as_i64)
                .map(RecordId::new)
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl From<Map<String, JsonValue>> for Record {
    fn from(value: Map<String, JsonValue>) -> Self {
        Self(value)
    }
}

/// x2many command replacing the whole relation with `ids` (`(6, 0, ids)`).
pub fn replace_all(ids: &[RecordId]) -> JsonValue {
    let raw: Vec<i64> = ids.iter().map(RecordId::get).collect();
    json!([[6, 0, raw]])
}

/// Decode a `replace_all` command back into ids. Any other shape is `None`.
pub fn decode_replace_all(value: &JsonValue) -> Option<Vec<RecordId>> {
    let commands = value.as_array()?;
    let last = commands.last()?.as_array()?;
    if last.len() != 3 || last[0].as_i64()? != 6 {
        return None;
    }
    let ids = last[2]
        .as_array()?
        .iter()
        .filter_map(JsonValue::as_i64)
        .map(RecordId::new)
        .collect();
    Some(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(v: JsonValue) -> Record {
        Record::from_value(v).unwrap()
    }

    #[test]
    fn relational_fields_decode_in_all_wire_shapes() {
        let r = rec(json!({
            "id": 7,
            "partner_id": [42, "Amazon | Generic"],
            "partner_invoice_id": 43,
            "partner_shipping_id": false,
        }));
        assert_eq!(r.id(), Some(RecordId::new(7)));
        assert_eq!(r.many2one("partner_id"), Some(RecordId::new(42)));
        assert_eq!(r.many2one_name("partner_id"), Some("Amazon | Generic"));
        assert_eq!(r.many2one("partner_invoice_id"), Some(RecordId::new(43)));
        assert_eq!(r.many2one("partner_shipping_id"), None);
        assert_eq!(r.many2one("missing"), None);
    }

    #[test]
    fn false_text_reads_as_unset() {
        let r = rec(json!({ "vat": false, "name": "ACME" , "is_company": true }));
        assert_eq!(r.text("vat"), None);
        assert_eq!(r.text_or_empty("vat"), "");
        assert_eq!(r.text("name"), Some("ACME"));
        assert!(r.flag("is_company"));
        assert!(!r.flag("active"));
    }

    #[test]
    fn replace_all_command_round_trips() {
        let cmd = replace_all(&[RecordId::new(135)]);
        assert_eq!(cmd, json!([[6, 0, [135]]]));
        assert_eq!(decode_replace_all(&cmd), Some(vec![RecordId::new(135)]));
        assert_eq!(decode_replace_all(&json!([1, 2])), None);
    }
}
