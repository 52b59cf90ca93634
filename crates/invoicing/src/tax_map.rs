//! Country-to-tax mapping.
//!
//! Tax jurisdiction is derived from the invoice-name prefix (`VDE-1001` → `DE`),
//! never from the customer's address.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use erpfix_core::{DomainError, DomainResult, RecordId};

/// One invoice-name prefix and the country it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRule {
    pub prefix: String,
    pub country: String,
}

/// On-disk shape of a mapping file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaxMappingFile {
    incorrect_tax: i64,
    prefixes: Vec<PrefixRule>,
    domestic_taxes: BTreeMap<String, i64>,
}

/// Validated mapping: prefix → country → domestic tax code, plus the one tax
/// code known to be wrong.
///
/// Invariants (checked on construction):
/// - every prefix is non-empty, unique, and not a prefix of another prefix
/// - every prefix's country has exactly one domestic tax code
/// - no domestic tax code equals the incorrect code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TaxMappingFile", into = "TaxMappingFile")]
pub struct TaxMapping {
    incorrect_tax: RecordId,
    prefixes: Vec<PrefixRule>,
    domestic_taxes: BTreeMap<String, RecordId>,
}

impl TaxMapping {
    pub fn new(
        incorrect_tax: RecordId,
        prefixes: Vec<PrefixRule>,
        domestic_taxes: BTreeMap<String, RecordId>,
    ) -> DomainResult<Self> {
        for (i, rule) in prefixes.iter().enumerate() {
            if rule.prefix.trim().is_empty() {
                return Err(DomainError::configuration("empty invoice prefix"));
            }
            for other in &prefixes[i + 1..] {
                if rule.prefix.starts_with(&other.prefix) || other.prefix.starts_with(&rule.prefix)
                {
                    return Err(DomainError::configuration(format!(
                        "prefixes '{}' and '{}' overlap",
                        rule.prefix, other.prefix
                    )));
                }
            }
            match domestic_taxes.get(&rule.country) {
                None => {
                    return Err(DomainError::configuration(format!(
                        "prefix '{}' maps to country '{}' which has no domestic tax",
                        rule.prefix, rule.country
                    )));
                }
                Some(tax) if *tax == incorrect_tax => {
                    return Err(DomainError::configuration(format!(
                        "domestic tax of '{}' is the incorrect tax {incorrect_tax}",
                        rule.country
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            incorrect_tax,
            prefixes,
            domestic_taxes,
        })
    }

    /// Parse and validate a JSON mapping file.
    pub fn from_json_str(raw: &str) -> DomainResult<Self> {
        serde_json::from_str(raw).map_err(|e| DomainError::configuration(e.to_string()))
    }

    pub fn incorrect_tax(&self) -> RecordId {
        self.incorrect_tax
    }

    /// Prefix rules in processing order.
    pub fn prefixes(&self) -> &[PrefixRule] {
        &self.prefixes
    }

    pub fn domestic_tax(&self, country: &str) -> Option<RecordId> {
        self.domestic_taxes.get(country).copied()
    }

    /// Rule whose prefix starts `invoice_name`, if any.
    pub fn rule_for_invoice(&self, invoice_name: &str) -> Option<&PrefixRule> {
        self.prefixes
            .iter()
            .find(|rule| invoice_name.starts_with(&rule.prefix))
    }

    /// Domestic tax for an invoice, derived from its name prefix.
    pub fn tax_for_invoice(&self, invoice_name: &str) -> Option<RecordId> {
        self.rule_for_invoice(invoice_name)
            .and_then(|rule| self.domestic_tax(&rule.country))
    }
}

impl Default for TaxMapping {
    /// Marketplace VAT table: Belgian 21% (`1`) applied in error, replaced by
    /// each marketplace country's standard rate.
    fn default() -> Self {
        let prefixes = [
            ("VDE", "DE"),
            ("VFR", "FR"),
            ("VIT", "IT"),
            ("VNL", "NL"),
            ("VPL", "PL"),
            ("VCZ", "CZ"),
            ("VGB", "GB"),
        ]
        .into_iter()
        .map(|(prefix, country)| PrefixRule {
            prefix: prefix.to_string(),
            country: country.to_string(),
        })
        .collect();

        let domestic_taxes = [
            ("DE", 135),
            ("FR", 122),
            ("IT", 180),
            ("NL", 136),
            ("PL", 194),
            ("CZ", 187),
            ("GB", 182),
        ]
        .into_iter()
        .map(|(country, tax)| (country.to_string(), RecordId::new(tax)))
        .collect();

        Self {
            incorrect_tax: RecordId::new(1),
            prefixes,
            domestic_taxes,
        }
    }
}

impl TryFrom<TaxMappingFile> for TaxMapping {
    type Error = DomainError;

    fn try_from(file: TaxMappingFile) -> Result<Self, Self::Error> {
        let domestic = file
            .domestic_taxes
            .into_iter()
            .map(|(country, tax)| (country, RecordId::new(tax)))
            .collect();
        Self::new(RecordId::new(file.incorrect_tax), file.prefixes, domestic)
    }
}

impl From<TaxMapping> for TaxMappingFile {
    fn from(mapping: TaxMapping) -> Self {
        Self {
            incorrect_tax: mapping.incorrect_tax.get(),
            prefixes: mapping.prefixes,
            domestic_taxes: mapping
                .domestic_taxes
                .into_iter()
                .map(|(country, tax)| (country, tax.get()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(prefix: &str, country: &str) -> PrefixRule {
        PrefixRule {
            prefix: prefix.into(),
            country: country.into(),
        }
    }

    #[test]
    fn default_table_is_valid() {
        let d = TaxMapping::default();
        let rebuilt = TaxMapping::new(
            d.incorrect_tax(),
            d.prefixes().to_vec(),
            d.domestic_taxes.clone(),
        )
        .unwrap();
        assert_eq!(rebuilt, d);
        assert_eq!(d.tax_for_invoice("VDE-1001"), Some(RecordId::new(135)));
        assert_eq!(d.tax_for_invoice("VGB/2025/77"), Some(RecordId::new(182)));
        assert_eq!(d.tax_for_invoice("INV-1"), None);
    }

    #[test]
    fn prefix_without_domestic_tax_is_rejected() {
        let err = TaxMapping::new(
            RecordId::new(1),
            vec![rule("VES", "ES")],
            BTreeMap::from([("DE".to_string(), RecordId::new(135))]),
        )
        .unwrap_err();
        match err {
            DomainError::Configuration(msg) if msg.contains("VES") => {}
            _ => panic!("Expected configuration error for unmapped country"),
        }
    }

    #[test]
    fn overlapping_prefixes_are_rejected() {
        let err = TaxMapping::new(
            RecordId::new(1),
            vec![rule("VD", "DE"), rule("VDE", "DE")],
            BTreeMap::from([("DE".to_string(), RecordId::new(135))]),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[test]
    fn domestic_tax_equal_to_incorrect_tax_is_rejected() {
        let err = TaxMapping::new(
            RecordId::new(1),
            vec![rule("VBE", "BE")],
            BTreeMap::from([("BE".to_string(), RecordId::new(1))]),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[test]
    fn json_file_round_trips_through_validation() {
        let raw = r#"{
            "incorrect_tax": 7,
            "prefixes": [{ "prefix": "VAT-", "country": "AT" }],
            "domestic_taxes": { "AT": 301, "CH": 302 }
        }"#;
        let mapping = TaxMapping::from_json_str(raw).unwrap();
        assert_eq!(mapping.incorrect_tax(), RecordId::new(7));
        assert_eq!(mapping.tax_for_invoice("VAT-9"), Some(RecordId::new(301)));

        let bad = r#"{ "incorrect_tax": 7, "prefixes": [{ "prefix": "VES", "country": "ES" }], "domestic_taxes": {} }"#;
        assert!(matches!(
            TaxMapping::from_json_str(bad),
            Err(DomainError::Configuration(_))
        ));
    }
}
