use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::{Map, Value as JsonValue, json};

use erpfix_core::{RecordId, RecordType};

use crate::domain::{Domain, SearchOptions};
use crate::record::{Record, Values, decode_replace_all};
use crate::r#trait::{CallOutcome, RecordStore, StoreError};

/// Reply text the remote store produces when an action returns `None` over a
/// transport that cannot encode it.
pub const MARSHAL_NONE_FAULT: &str = "cannot marshal None unless allow_none is enabled";

/// Fault to inject into a mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The call is rejected; nothing changes.
    Fail(String),
    /// The change is applied but the reply is ambiguous.
    AmbiguousApplied,
    /// Nothing changes and the reply is ambiguous.
    AmbiguousNotApplied,
}

/// A mutating call that reached the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Write {
        record_type: RecordType,
        ids: Vec<RecordId>,
        values: Values,
    },
    Create {
        record_type: RecordType,
        id: RecordId,
    },
    Action {
        record_type: RecordType,
        action: String,
        ids: Vec<RecordId>,
    },
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<RecordType, BTreeMap<RecordId, Map<String, JsonValue>>>,
    last_id: i64,
    action_faults: HashMap<(String, RecordId), Fault>,
    write_faults: HashMap<(RecordType, RecordId), Fault>,
    search_faults: HashMap<RecordType, String>,
    create_faults: HashMap<RecordType, String>,
    mutations: Vec<Mutation>,
}

/// In-memory record store.
///
/// Intended for tests/dev. Evaluates domains locally, implements the draft/post
/// and cancel transitions, and can inject faults into individual calls.
/// Every mutating call that reaches it is logged (see [`Self::mutations`]).
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: RwLock<State>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without logging a mutation. Uses `values["id"]` when set,
    /// otherwise the next free id.
    pub fn insert(&self, record_type: RecordType, values: JsonValue) -> RecordId {
        let mut fields = match values {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        let id = match fields.get("id").and_then(JsonValue::as_i64) {
            Some(raw) => {
                state.last_id = state.last_id.max(raw);
                RecordId::new(raw)
            }
            None => {
                state.last_id += 1;
                RecordId::new(state.last_id)
            }
        };
        fields.insert("id".into(), json!(id.get()));
        state
            .tables
            .entry(record_type)
            .or_default()
            .insert(id, fields);
        id
    }

    /// Current snapshot of one record.
    pub fn get(&self, record_type: RecordType, id: RecordId) -> Option<Record> {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        state
            .tables
            .get(&record_type)
            .and_then(|t| t.get(&id))
            .cloned()
            .map(Record::new)
    }

    /// All records of a type, ascending by id.
    pub fn all(&self, record_type: RecordType) -> Vec<Record> {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        state
            .tables
            .get(&record_type)
            .map(|t| t.values().cloned().map(Record::new).collect())
            .unwrap_or_default()
    }

    pub fn inject_action_fault(&self, action: &str, id: RecordId, fault: Fault) {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        state.action_faults.insert((action.to_string(), id), fault);
    }

    pub fn inject_write_fault(&self, record_type: RecordType, id: RecordId, fault: Fault) {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        state.write_faults.insert((record_type, id), fault);
    }

    /// Every search on `record_type` fails with a transport error.
    pub fn inject_search_fault(&self, record_type: RecordType, message: &str) {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        state.search_faults.insert(record_type, message.to_string());
    }

    pub fn inject_create_fault(&self, record_type: RecordType, message: &str) {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        state.create_faults.insert(record_type, message.to_string());
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        state.action_faults.clear();
        state.write_faults.clear();
        state.search_faults.clear();
        state.create_faults.clear();
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        state.mutations.clone()
    }

    pub fn mutation_count(&self) -> usize {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        state.mutations.len()
    }

    fn apply_values(row: &mut Map<String, JsonValue>, values: &Values) {
        for (field, value) in values {
            if field == "id" {
                continue;
            }
            let stored = match decode_replace_all(value) {
                Some(ids) => json!(ids.iter().map(RecordId::get).collect::<Vec<_>>()),
                None => value.clone(),
            };
            row.insert(field.clone(), stored);
        }
    }

    fn apply_action(
        record_type: RecordType,
        action: &str,
        row: &mut Map<String, JsonValue>,
    ) -> Result<(), String> {
        let state = row
            .get("state")
            .and_then(JsonValue::as_str)
            .unwrap_or("")
            .to_string();
        let next = match (record_type, action) {
            (RecordType::Invoice, "button_draft") => "draft",
            (RecordType::Invoice, "action_post") => {
                if state != "draft" {
                    return Err(format!("only draft entries can be posted (state '{state}')"));
                }
                "posted"
            }
            (
                RecordType::Invoice | RecordType::Order | RecordType::Picking,
                "action_cancel",
            ) => {
                if state == "done" {
                    return Err("cannot cancel a done transfer".to_string());
                }
                "cancel"
            }
            _ => return Err(format!("{record_type} has no action '{action}'")),
        };
        row.insert("state".into(), json!(next));
        Ok(())
    }
}

fn project(fields: &Map<String, JsonValue>, wanted: &[String]) -> Record {
    if wanted.is_empty() {
        return Record::new(fields.clone());
    }
    let mut out = Map::new();
    if let Some(id) = fields.get("id") {
        out.insert("id".into(), id.clone());
    }
    for name in wanted {
        let value = fields.get(name).cloned().unwrap_or(JsonValue::Bool(false));
        out.insert(name.clone(), value);
    }
    Record::new(out)
}

impl RecordStore for InMemoryRecordStore {
    fn search(
        &self,
        record_type: RecordType,
        domain: &Domain,
        options: &SearchOptions,
    ) -> Result<Vec<Record>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Fault("lock poisoned".to_string()))?;

        if let Some(message) = state.search_faults.get(&record_type) {
            return Err(StoreError::Transport(message.clone()));
        }

        let Some(table) = state.tables.get(&record_type) else {
            return Ok(vec![]);
        };

        let mut hits: Vec<Record> = table
            .values()
            .map(|fields| Record::new(fields.clone()))
            .filter(|r| options.include_inactive || r.get("active") != Some(&JsonValue::Bool(false)))
            .filter(|r| domain.matches(r))
            .collect();

        if let Some(order) = &options.order {
            hits.sort_by(|a, b| order.compare(a, b));
        }
        if let Some(limit) = options.limit {
            hits.truncate(limit);
        }

        Ok(hits
            .iter()
            .map(|r| project(r.fields(), &options.fields))
            .collect())
    }

    fn write(&self, record_type: RecordType, ids: &[RecordId], values: &Values) -> CallOutcome {
        let Ok(mut state) = self.state.write() else {
            return CallOutcome::Failure("lock poisoned".to_string());
        };

        let mut ambiguous = false;
        for id in ids {
            match state.write_faults.get(&(record_type, *id)).cloned() {
                Some(Fault::Fail(reason)) => return CallOutcome::Failure(reason),
                Some(Fault::AmbiguousNotApplied) => {
                    return CallOutcome::Ambiguous(MARSHAL_NONE_FAULT.to_string());
                }
                Some(Fault::AmbiguousApplied) => ambiguous = true,
                None => {}
            }
            let exists = state
                .tables
                .get(&record_type)
                .is_some_and(|t| t.contains_key(id));
            if !exists {
                return CallOutcome::Failure(format!("{record_type}({id}) does not exist"));
            }
        }

        if let Some(table) = state.tables.get_mut(&record_type) {
            for id in ids {
                if let Some(row) = table.get_mut(id) {
                    Self::apply_values(row, values);
                }
            }
        }
        state.mutations.push(Mutation::Write {
            record_type,
            ids: ids.to_vec(),
            values: values.clone(),
        });

        if ambiguous {
            CallOutcome::Ambiguous(MARSHAL_NONE_FAULT.to_string())
        } else {
            CallOutcome::Success
        }
    }

    fn create(&self, record_type: RecordType, values: &Values) -> Result<RecordId, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Fault("lock poisoned".to_string()))?;

        if let Some(message) = state.create_faults.get(&record_type) {
            return Err(StoreError::Fault(message.clone()));
        }

        state.last_id += 1;
        let id = RecordId::new(state.last_id);
        let mut row = Map::new();
        row.insert("id".into(), json!(id.get()));
        Self::apply_values(&mut row, values);
        state.tables.entry(record_type).or_default().insert(id, row);
        state.mutations.push(Mutation::Create { record_type, id });

        Ok(id)
    }

    fn invoke_action(
        &self,
        record_type: RecordType,
        action: &str,
        ids: &[RecordId],
    ) -> CallOutcome {
        let Ok(mut state) = self.state.write() else {
            return CallOutcome::Failure("lock poisoned".to_string());
        };

        let mut ambiguous = false;
        for id in ids {
            match state.action_faults.get(&(action.to_string(), *id)).cloned() {
                Some(Fault::Fail(reason)) => return CallOutcome::Failure(reason),
                Some(Fault::AmbiguousNotApplied) => {
                    return CallOutcome::Ambiguous(MARSHAL_NONE_FAULT.to_string());
                }
                Some(Fault::AmbiguousApplied) => ambiguous = true,
                None => {}
            }
        }

        let Some(table) = state.tables.get_mut(&record_type) else {
            return CallOutcome::Failure(format!("{record_type} has no records"));
        };
        // Validate every id first so a failing batch changes nothing.
        let mut staged = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(row) = table.get(id) else {
                return CallOutcome::Failure(format!("{record_type}({id}) does not exist"));
            };
            let mut row = row.clone();
            if let Err(reason) = Self::apply_action(record_type, action, &mut row) {
                return CallOutcome::Failure(reason);
            }
            staged.push((*id, row));
        }
        for (id, row) in staged {
            table.insert(id, row);
        }
        state.mutations.push(Mutation::Action {
            record_type,
            action: action.to_string(),
            ids: ids.to_vec(),
        });

        if ambiguous {
            CallOutcome::Ambiguous(MARSHAL_NONE_FAULT.to_string())
        } else {
            CallOutcome::Success
        }
    }

    fn fields_get(&self, record_type: RecordType) -> Result<Values, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Fault("lock poisoned".to_string()))?;

        let mut out = Map::new();
        for row in state.tables.get(&record_type).into_iter().flat_map(|t| t.values()) {
            for (name, value) in row {
                let kind = match value {
                    JsonValue::Bool(_) => "boolean",
                    JsonValue::Number(n) if n.is_i64() => "integer",
                    JsonValue::Number(_) => "float",
                    JsonValue::String(_) => "char",
                    JsonValue::Array(_) => "many2one",
                    _ => "unknown",
                };
                out.entry(name.clone())
                    .or_insert_with(|| json!({ "string": name, "type": kind }));
            }
        }
        Ok(out)
    }
}
