//! Marketplace order report (tab-separated) parsing.
//!
//! The report has a header row naming its columns. Rows may be shorter or longer
//! than the header; absent columns and columns that are not valid UTF-8 read as
//! empty. Quoting is disabled: a `"` is an ordinary character in these files.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ByteRecord, ReaderBuilder};
use thiserror::Error;
use tracing::{debug, warn};

/// Input error: the file could not be opened or its header could not be read.
///
/// Rows the reader cannot split are not errors; they are skipped and counted.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unreadable order report: {0}")]
    Csv(#[from] csv::Error),
}

/// One raw report row. Only the columns reconciliation reads are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderRow {
    pub order_id: String,
    pub is_business_order: String,
    pub is_iba: String,
    pub buyer_company_name: String,
    pub buyer_vat_number: String,
    pub invoice_business_legal_name: String,
    pub invoice_business_tax_id: String,
    pub buyer_tax_registration_id: String,
    pub recipient_name: String,
    pub ship_address_1: String,
    pub ship_address_2: String,
    pub ship_city: String,
    pub ship_postal_code: String,
    pub ship_country: String,
}

impl OrderRow {
    fn from_record(columns: &ColumnIndex, record: &ByteRecord) -> Self {
        let text = |name: &str| columns.text(record, name);
        Self {
            order_id: text("order-id"),
            is_business_order: text("is-business-order"),
            is_iba: text("is-iba"),
            buyer_company_name: text("buyer-company-name"),
            buyer_vat_number: text("buyer-vat-number"),
            invoice_business_legal_name: text("invoice-business-legal-name"),
            invoice_business_tax_id: text("invoice-business-tax-id"),
            buyer_tax_registration_id: text("buyer-tax-registration-id"),
            recipient_name: text("recipient-name"),
            ship_address_1: text("ship-address-1"),
            ship_address_2: text("ship-address-2"),
            ship_city: text("ship-city"),
            ship_postal_code: text("ship-postal-code"),
            ship_country: text("ship-country"),
        }
    }

    pub fn is_business(&self) -> bool {
        self.is_business_order.trim().eq_ignore_ascii_case("true")
    }
}

/// Shipping address as printed on the order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShippingAddress {
    pub street: String,
    pub street2: String,
    pub city: String,
    pub zip: String,
    /// ISO 3166-1 alpha-2 code, upper-cased. Empty when unknown.
    pub country_code: String,
}

/// A business order with its identity candidates already resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct B2bOrder {
    pub order_id: String,
    /// First non-empty of buyer VAT number, invoice business tax id, buyer tax
    /// registration id.
    pub vat: Option<String>,
    /// Invoice business legal name, else buyer company name.
    pub company: Option<String>,
    pub recipient_name: String,
    pub is_iba: bool,
    pub shipping: ShippingAddress,
}

fn first_non_empty<'a>(candidates: impl IntoIterator<Item = &'a str>) -> Option<String> {
    candidates
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

impl From<&OrderRow> for B2bOrder {
    fn from(row: &OrderRow) -> Self {
        Self {
            order_id: row.order_id.trim().to_string(),
            vat: first_non_empty([
                row.buyer_vat_number.as_str(),
                row.invoice_business_tax_id.as_str(),
                row.buyer_tax_registration_id.as_str(),
            ]),
            company: first_non_empty([
                row.invoice_business_legal_name.as_str(),
                row.buyer_company_name.as_str(),
            ]),
            recipient_name: row.recipient_name.trim().to_string(),
            is_iba: row.is_iba.trim().eq_ignore_ascii_case("true"),
            shipping: ShippingAddress {
                street: row.ship_address_1.trim().to_string(),
                street2: row.ship_address_2.trim().to_string(),
                city: row.ship_city.trim().to_string(),
                zip: row.ship_postal_code.trim().to_string(),
                country_code: row.ship_country.trim().to_ascii_uppercase(),
            },
        }
    }
}

/// Parsed report: business orders in file order plus bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderReport {
    pub orders: Vec<B2bOrder>,
    pub rows_read: usize,
    pub malformed_rows: usize,
}

/// Header name to column position. The first occurrence of a name wins.
struct ColumnIndex(HashMap<String, usize>);

impl ColumnIndex {
    fn new(headers: &ByteRecord) -> Self {
        let mut positions = HashMap::new();
        for (i, name) in headers.iter().enumerate() {
            positions
                .entry(String::from_utf8_lossy(name).trim().to_string())
                .or_insert(i);
        }
        Self(positions)
    }

    /// Text of one column; missing or undecodable columns read as empty.
    fn text(&self, record: &ByteRecord, column: &str) -> String {
        let Some(raw) = self.0.get(column).and_then(|&i| record.get(i)) else {
            return String::new();
        };
        match std::str::from_utf8(raw) {
            Ok(text) => text.to_string(),
            Err(_) => {
                debug!(column, "undecodable column read as empty");
                String::new()
            }
        }
    }
}

/// Parse a report from any reader.
pub fn read_orders<R: Read>(reader: R) -> Result<OrderReport, InputError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    // Surface a broken header as a hard error; row errors are skipped below.
    let columns = ColumnIndex::new(rdr.byte_headers()?);

    let mut report = OrderReport::default();
    for (line, rec) in rdr.byte_records().enumerate() {
        report.rows_read += 1;
        match rec.map(|record| OrderRow::from_record(&columns, &record)) {
            Ok(row) if row.is_business() => report.orders.push(B2bOrder::from(&row)),
            Ok(_) => {}
            Err(err) => {
                warn!(row = line + 1, error = %err, "skipping malformed row");
                report.malformed_rows += 1;
            }
        }
    }
    debug!(
        rows = report.rows_read,
        business = report.orders.len(),
        malformed = report.malformed_rows,
        "order report parsed"
    );
    Ok(report)
}

/// Parse a report file.
pub fn read_orders_from_path(path: &Path) -> Result<OrderReport, InputError> {
    let file = File::open(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_orders(file)
}
