//! One-off administrative operations against the record store.

pub mod currency;
pub mod delivery;
pub mod fiscal;
pub mod inspect;

pub use currency::{ActivationRun, CurrencyStatus, DEFAULT_CURRENCIES, activate_currencies};
pub use delivery::{CancelDeliveryRun, PickingSummary, cancel_delivery};
pub use fiscal::{RenameResult, rename_fiscal_position};
pub use inspect::{ConfigSnapshot, FieldInfo, OrderFieldsReport, inspect_config, order_fields};
