use serde::{Deserialize, Serialize};

use erpfix_core::{DomainError, DomainResult, RecordId};
use erpfix_store::Record;

use crate::input::{B2bOrder, ShippingAddress};

/// Fields fetched for a partner.
pub const PARTNER_FIELDS: &[&str] = &["name", "vat", "company_type", "is_company"];

/// Name conventions of shared marketplace partners.
///
/// Such a partner stands for many unrelated buyers and must never be mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericPartnerPatterns {
    /// Substrings that mark a generic partner anywhere in its name.
    pub contains: Vec<String>,
    /// Prefixes that mark a generic partner.
    pub starts_with: Vec<String>,
}

impl Default for GenericPartnerPatterns {
    fn default() -> Self {
        Self {
            contains: vec!["AMZ_B2C".to_string(), "AMZ_B2B".to_string()],
            starts_with: vec!["Amazon |".to_string()],
        }
    }
}

impl GenericPartnerPatterns {
    pub fn is_generic(&self, name: &str) -> bool {
        self.contains.iter().any(|p| name.contains(p.as_str()))
            || self.starts_with.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// VAT number with all whitespace removed.
pub fn normalize_vat(vat: &str) -> String {
    vat.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Partner as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partner {
    pub id: RecordId,
    pub name: String,
    pub vat: Option<String>,
    pub is_company: bool,
}

impl Partner {
    pub fn from_record(record: &Record) -> DomainResult<Self> {
        let id = record
            .id()
            .ok_or_else(|| DomainError::validation("partner without id"))?;
        Ok(Self {
            id,
            name: record.text_or_empty("name").to_string(),
            vat: record
                .text("vat")
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            is_company: record.flag("is_company"),
        })
    }
}

/// Company partner to create for a business buyer hidden behind a generic partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCompanyPartner {
    pub name: String,
    pub vat: Option<String>,
    pub address: ShippingAddress,
}

/// Targeted update of an existing partner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartnerUpdate {
    /// Only ever set when the partner has no VAT.
    pub vat: Option<String>,
    pub mark_company: bool,
}

impl PartnerUpdate {
    pub fn is_empty(&self) -> bool {
        self.vat.is_none() && !self.mark_company
    }
}

/// What reconciliation should do with one order's partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartnerDecision {
    AlreadyCorrect(&'static str),
    Update(PartnerUpdate),
    CreateCompany(NewCompanyPartner),
}

/// Decide how to reconcile `partner` with the business identity in `order`.
///
/// Pure. A generic partner is never the target of an update, and an existing
/// VAT is never replaced.
pub fn decide(
    partner: &Partner,
    order: &B2bOrder,
    patterns: &GenericPartnerPatterns,
) -> PartnerDecision {
    if patterns.is_generic(&partner.name) {
        if order.vat.is_none() && order.company.is_none() {
            return PartnerDecision::AlreadyCorrect("generic partner, no business data");
        }
        return PartnerDecision::CreateCompany(NewCompanyPartner {
            name: order
                .company
                .clone()
                .unwrap_or_else(|| order.recipient_name.clone()),
            vat: order.vat.clone(),
            address: order.shipping.clone(),
        });
    }

    if let (Some(have), Some(want)) = (&partner.vat, &order.vat) {
        if normalize_vat(have) == normalize_vat(want) {
            return PartnerDecision::AlreadyCorrect("VAT already set");
        }
    }

    let update = PartnerUpdate {
        vat: match &partner.vat {
            None => order.vat.clone(),
            Some(_) => None,
        },
        mark_company: order.company.is_some() && !partner.is_company,
    };
    if update.is_empty() {
        PartnerDecision::AlreadyCorrect("no updates needed")
    } else {
        PartnerDecision::Update(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn partner(name: &str, vat: Option<&str>, is_company: bool) -> Partner {
        Partner {
            id: RecordId::new(7),
            name: name.into(),
            vat: vat.map(str::to_string),
            is_company,
        }
    }

    fn order(vat: Option<&str>, company: Option<&str>) -> B2bOrder {
        B2bOrder {
            order_id: "302-1".into(),
            vat: vat.map(str::to_string),
            company: company.map(str::to_string),
            recipient_name: "Max Mustermann".into(),
            ..B2bOrder::default()
        }
    }

    #[test]
    fn generic_patterns() {
        let p = GenericPartnerPatterns::default();
        assert!(p.is_generic("Amazon | Generic"));
        assert!(p.is_generic("Customer AMZ_B2B DE"));
        assert!(p.is_generic("AMZ_B2C"));
        assert!(!p.is_generic("My Amazon | Shop"));
        assert!(!p.is_generic("ACME GmbH"));
    }

    #[test]
    fn generic_partner_with_business_data_gets_a_new_company() {
        let d = decide(
            &partner("Amazon | Generic", None, false),
            &order(Some("DE123456789"), None),
            &GenericPartnerPatterns::default(),
        );
        match d {
            PartnerDecision::CreateCompany(new) => {
                assert_eq!(new.name, "Max Mustermann");
                assert_eq!(new.vat.as_deref(), Some("DE123456789"));
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn generic_partner_without_business_data_is_left_alone() {
        let d = decide(
            &partner("AMZ_B2C", None, false),
            &order(None, None),
            &GenericPartnerPatterns::default(),
        );
        assert!(matches!(d, PartnerDecision::AlreadyCorrect(_)));
    }

    #[test]
    fn whitespace_is_ignored_when_comparing_vat() {
        let d = decide(
            &partner("ACME", Some("DE 123 456 789"), true),
            &order(Some("DE123456789"), Some("ACME")),
            &GenericPartnerPatterns::default(),
        );
        assert_eq!(d, PartnerDecision::AlreadyCorrect("VAT already set"));
    }

    #[test]
    fn existing_different_vat_only_gets_company_flag() {
        let d = decide(
            &partner("ACME", Some("FR999"), false),
            &order(Some("DE123456789"), Some("ACME SAS")),
            &GenericPartnerPatterns::default(),
        );
        assert_eq!(
            d,
            PartnerDecision::Update(PartnerUpdate {
                vat: None,
                mark_company: true,
            })
        );
    }

    #[test]
    fn missing_vat_is_filled() {
        let d = decide(
            &partner("Jane Doe", None, true),
            &order(Some("NL0001"), None),
            &GenericPartnerPatterns::default(),
        );
        assert_eq!(
            d,
            PartnerDecision::Update(PartnerUpdate {
                vat: Some("NL0001".into()),
                mark_company: false,
            })
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: an existing VAT is never part of an update.
        #[test]
        fn existing_vat_is_never_overwritten(
            have in "[A-Z]{2}[0-9 ]{3,10}",
            want in proptest::option::of("[A-Z]{2}[0-9]{3,10}"),
            company in proptest::option::of("[A-Za-z ]{1,20}"),
            is_company in any::<bool>(),
        ) {
            let d = decide(
                &partner("Some Buyer", Some(&have), is_company),
                &order(want.as_deref(), company.as_deref()),
                &GenericPartnerPatterns::default(),
            );
            match d {
                PartnerDecision::Update(update) => prop_assert_eq!(update.vat, None),
                PartnerDecision::AlreadyCorrect(_) => {}
                PartnerDecision::CreateCompany(_) => prop_assert!(false, "non-generic partner replaced"),
            }
        }

        /// Property: a generic partner is never the target of an update.
        #[test]
        fn generic_partner_is_never_updated(
            suffix in "[A-Za-z ]{0,12}",
            vat in proptest::option::of("[A-Z]{2}[0-9]{3,10}"),
            company in proptest::option::of("[A-Za-z]{1,12}"),
        ) {
            let name = format!("Amazon |{suffix}");
            let d = decide(
                &partner(&name, None, false),
                &order(vat.as_deref(), company.as_deref()),
                &GenericPartnerPatterns::default(),
            );
            prop_assert!(!matches!(d, PartnerDecision::Update(_)));
        }
    }
}
