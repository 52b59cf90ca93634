use serde_json::json;
use tracing::{info, warn};

use erpfix_core::{ItemOutcome, RecordId, RecordType};
use erpfix_store::{CallOutcome, RecordStore, Values};

/// Before/after view of a rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameResult {
    pub outcome: ItemOutcome,
    pub before: Option<String>,
    /// Name read back after the write.
    pub after: Option<String>,
}

/// Rename fiscal position `id` to `new_name`.
pub fn rename_fiscal_position<S: RecordStore + ?Sized>(
    store: &S,
    id: RecordId,
    new_name: &str,
) -> RenameResult {
    let item = format!("fiscal position {id}");
    let read_name = |store: &S| {
        store
            .read_one(RecordType::FiscalPosition, id, &["name"])
            .map(|r| r.map(|r| r.text_or_empty("name").to_string()))
    };

    let before = match read_name(store) {
        Ok(Some(name)) => name,
        Ok(None) => {
            return RenameResult {
                outcome: ItemOutcome::not_found(item, "no such fiscal position"),
                before: None,
                after: None,
            };
        }
        Err(err) => {
            return RenameResult {
                outcome: ItemOutcome::error(item, format!("read failed: {err}")),
                before: None,
                after: None,
            };
        }
    };

    if before == new_name {
        return RenameResult {
            outcome: ItemOutcome::no_fix_needed(item, "already named"),
            after: Some(before.clone()),
            before: Some(before),
        };
    }

    let mut values = Values::new();
    values.insert("name".into(), json!(new_name));
    let written = store.write(RecordType::FiscalPosition, &[id], &values);
    let after = read_name(store).ok().flatten();
    let outcome = match written {
        CallOutcome::Failure(reason) => {
            warn!(%id, %reason, "rename failed");
            ItemOutcome::error(item, reason)
        }
        CallOutcome::Ambiguous(detail) if after.as_deref() != Some(new_name) => {
            warn!(%id, %detail, "ambiguous reply and name unchanged");
            ItemOutcome::error(item, format!("rename not applied: {detail}"))
        }
        CallOutcome::Success | CallOutcome::Ambiguous(_) => {
            info!(%id, from = %before, to = %new_name, "fiscal position renamed");
            ItemOutcome::fixed(item, format!("'{before}' -> '{new_name}'"))
        }
    };

    RenameResult {
        outcome,
        before: Some(before),
        after,
    }
}
