//! JSON-RPC client for an Odoo-style record store.
//!
//! One blocking HTTP round trip per call against `{url}/jsonrpc`, using the
//! `common.authenticate` handshake and `object.execute_kw` for everything else.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info, warn};

use erpfix_core::{DomainError, DomainResult, RecordId, RecordType};

use crate::domain::{Domain, SearchOptions};
use crate::record::{Record, Values};
use crate::r#trait::{CallOutcome, RecordStore, StoreError};

/// Connection settings. Loading them (env, files) is the caller's job.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout; `None` keeps the transport default.
    pub timeout: Option<Duration>,
}

const DEFAULT_URL: &str = "http://localhost:8069";

impl ConnectionConfig {
    /// Read `ERP_URL`, `ERP_DB`, `ERP_USERNAME`, `ERP_PASSWORD` (or `ERP_API_KEY`)
    /// and the optional `ERP_TIMEOUT_SECS` from the process environment.
    pub fn from_env() -> DomainResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DomainResult<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| DomainError::configuration(format!("{key} is not set")))
        };

        let timeout = match get("ERP_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(raw.parse().map_err(|e| {
                DomainError::configuration(format!("ERP_TIMEOUT_SECS '{raw}': {e}"))
            })?)),
            None => None,
        };

        Ok(Self {
            url: get("ERP_URL").unwrap_or_else(|| DEFAULT_URL.to_string()),
            database: require("ERP_DB")?,
            username: require("ERP_USERNAME")?,
            password: get("ERP_PASSWORD")
                .or_else(|| get("ERP_API_KEY"))
                .ok_or_else(|| DomainError::configuration("ERP_PASSWORD (or ERP_API_KEY) is not set"))?,
            timeout,
        })
    }
}

impl core::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: RpcParams<'a>,
    id: u64,
}

#[derive(Debug, Serialize)]
struct RpcParams<'a> {
    service: &'a str,
    method: &'a str,
    args: JsonValue,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<JsonValue>,
    #[serde(default)]
    error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
struct RpcFault {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcFaultData>,
}

#[derive(Debug, Deserialize)]
struct RpcFaultData {
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
}

impl RpcFault {
    fn describe(&self) -> String {
        match &self.data {
            Some(d) if !d.message.is_empty() => format!("{}: {}", d.name, d.message),
            _ => self.message.clone(),
        }
    }
}

/// Low-level failure of one call, before it is mapped onto the store contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RpcError {
    /// The request was never delivered.
    Unreachable(String),
    /// The request may have been delivered but no usable reply came back.
    NoReply(String),
    /// The remote side answered with a fault.
    Fault(String),
    /// A reply arrived but is not a JSON-RPC response.
    Undecodable(String),
}

impl RpcError {
    /// Faults that do not tell whether the call took effect.
    fn is_ambiguous(&self) -> bool {
        match self {
            RpcError::NoReply(_) | RpcError::Undecodable(_) => true,
            RpcError::Fault(msg) => msg.contains("cannot marshal None"),
            RpcError::Unreachable(_) => false,
        }
    }

    fn into_store_error(self) -> StoreError {
        match self {
            RpcError::Unreachable(m) | RpcError::NoReply(m) => StoreError::Transport(m),
            RpcError::Fault(m) => StoreError::Fault(m),
            RpcError::Undecodable(m) => StoreError::Decode(m),
        }
    }

    fn into_outcome(self) -> CallOutcome {
        if self.is_ambiguous() {
            let detail = match self {
                RpcError::NoReply(m) | RpcError::Undecodable(m) | RpcError::Fault(m) => m,
                RpcError::Unreachable(m) => m,
            };
            CallOutcome::Ambiguous(detail)
        } else {
            CallOutcome::Failure(self.into_store_error().to_string())
        }
    }
}

/// Decode a JSON-RPC reply body into its `result`.
pub(crate) fn parse_reply(body: &str) -> Result<JsonValue, RpcError> {
    let reply: RpcResponse =
        serde_json::from_str(body).map_err(|e| RpcError::Undecodable(e.to_string()))?;
    if let Some(fault) = reply.error {
        return Err(RpcError::Fault(fault.describe()));
    }
    Ok(reply.result.unwrap_or(JsonValue::Null))
}

/// Authenticated JSON-RPC client.
pub struct OdooClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    database: String,
    password: String,
    uid: i64,
    next_id: AtomicU64,
}

impl OdooClient {
    /// Connect and authenticate once. Every later call reuses the uid.
    pub fn connect(config: &ConnectionConfig) -> Result<Self, StoreError> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let mut client = Self {
            http,
            endpoint: format!("{}/jsonrpc", config.url.trim_end_matches('/')),
            database: config.database.clone(),
            password: config.password.clone(),
            uid: 0,
            next_id: AtomicU64::new(1),
        };

        let reply = client
            .call(
                "common",
                "authenticate",
                json!([config.database, config.username, config.password, {}]),
            )
            .map_err(|e| StoreError::Authentication(e.into_store_error().to_string()))?;

        match reply.as_i64() {
            Some(uid) if uid > 0 => {
                client.uid = uid;
                info!(url = %config.url, db = %config.database, uid, "connected");
                Ok(client)
            }
            _ => Err(StoreError::Authentication(format!(
                "credentials rejected for '{}'",
                config.username
            ))),
        }
    }

    pub fn uid(&self) -> i64 {
        self.uid
    }

    fn call(&self, service: &str, method: &str, args: JsonValue) -> Result<JsonValue, RpcError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "call",
            params: RpcParams {
                service,
                method,
                args,
            },
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_connect() || e.is_builder() {
                    RpcError::Unreachable(e.to_string())
                } else {
                    RpcError::NoReply(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| RpcError::NoReply(e.to_string()))?;

        if !status.is_success() {
            return Err(RpcError::Fault(format!("HTTP {status}: {}", truncate(&body, 200))));
        }
        parse_reply(&body)
    }

    fn execute_kw(
        &self,
        record_type: RecordType,
        method: &str,
        args: JsonValue,
        kwargs: JsonValue,
    ) -> Result<JsonValue, RpcError> {
        debug!(model = record_type.model_name(), method, "execute_kw");
        self.call(
            "object",
            "execute_kw",
            json!([
                self.database,
                self.uid,
                self.password,
                record_type.model_name(),
                method,
                args,
                kwargs,
            ]),
        )
    }
}

fn raw_ids(ids: &[RecordId]) -> Vec<i64> {
    ids.iter().map(RecordId::get).collect()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

impl RecordStore for OdooClient {
    fn search(
        &self,
        record_type: RecordType,
        domain: &Domain,
        options: &SearchOptions,
    ) -> Result<Vec<Record>, StoreError> {
        let reply = self
            .execute_kw(record_type, "search_read", json!([domain.to_wire()]), options.to_wire())
            .map_err(RpcError::into_store_error)?;

        match reply {
            JsonValue::Array(rows) => rows
                .into_iter()
                .map(|row| {
                    Record::from_value(row)
                        .ok_or_else(|| StoreError::Decode("search_read row is not an object".into()))
                })
                .collect(),
            other => Err(StoreError::Decode(format!(
                "search_read returned {other}, expected a list"
            ))),
        }
    }

    fn write(&self, record_type: RecordType, ids: &[RecordId], values: &Values) -> CallOutcome {
        match self.execute_kw(record_type, "write", json!([raw_ids(ids), values]), json!({})) {
            Ok(JsonValue::Bool(true)) => CallOutcome::Success,
            Ok(other) => CallOutcome::Ambiguous(format!("write returned {other}")),
            Err(err) => {
                warn!(%record_type, ?ids, error = ?err, "write failed");
                err.into_outcome()
            }
        }
    }

    fn create(&self, record_type: RecordType, values: &Values) -> Result<RecordId, StoreError> {
        let reply = self
            .execute_kw(record_type, "create", json!([values]), json!({}))
            .map_err(RpcError::into_store_error)?;
        reply
            .as_i64()
            .map(RecordId::new)
            .ok_or_else(|| StoreError::Decode(format!("create returned {reply}, expected an id")))
    }

    fn invoke_action(
        &self,
        record_type: RecordType,
        action: &str,
        ids: &[RecordId],
    ) -> CallOutcome {
        // Actions return anything (often nothing); only faults are meaningful.
        match self.execute_kw(record_type, action, json!([raw_ids(ids)]), json!({})) {
            Ok(_) => CallOutcome::Success,
            Err(err) => {
                warn!(%record_type, action, ?ids, error = ?err, "action failed");
                err.into_outcome()
            }
        }
    }

    fn fields_get(&self, record_type: RecordType) -> Result<Values, StoreError> {
        let reply = self
            .execute_kw(
                record_type,
                "fields_get",
                json!([]),
                json!({ "attributes": ["string", "type", "relation"] }),
            )
            .map_err(RpcError::into_store_error)?;
        match reply {
            JsonValue::Object(map) => Ok(map),
            other => Err(StoreError::Decode(format!(
                "fields_get returned {other}, expected an object"
            ))),
        }
    }
}
