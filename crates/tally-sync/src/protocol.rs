//! # Sync Wire Protocol
//!
//! Request and response bodies of the REST sync endpoints.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Sync REST Contract                                 │
//! │                                                                         │
//! │  PUSH                                                                  │
//! │  ────                                                                  │
//! │  POST /sync/batch                                                      │
//! │    { changes: { clientes: [...], productos: [...] },                   │
//! │      deviceId: "device-…", timestamp: 1700000000000 }                  │
//! │  ◄── { success: true, data: { serverTimestamp, processed } }           │
//! │                                                                         │
//! │  PULL                                                                  │
//! │  ────                                                                  │
//! │  GET /sync/pull?lastSync=1700000000000&tables=clientes,productos       │
//! │  ◄── { success: true, data: { updates: { clientes: [...] },            │
//! │                               serverTimestamp } }                       │
//! │                                                                         │
//! │  HEALTH                                                                │
//! │  ──────                                                                │
//! │  GET /health ◄── any 2xx                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Envelopes also accept the Spanish keys (`exito`, `datos`, `mensaje`)
//! some servers still send.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use tally_core::{Collection, Record};

// =============================================================================
// Envelope
// =============================================================================

/// `{ success, data, message }` wrapper around every response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(alias = "exito")]
    pub success: bool,

    #[serde(alias = "datos")]
    pub data: Option<T>,

    #[serde(default, alias = "mensaje")]
    pub message: Option<String>,
}

// =============================================================================
// Push
// =============================================================================

/// Body of `POST /sync/batch`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    /// Dirty records keyed by wire collection name. Empty collections are omitted.
    pub changes: BTreeMap<String, Vec<Record>>,
    pub device_id: String,
    /// Client time of the request (epoch millis).
    pub timestamp: i64,
}

impl BatchRequest {
    pub fn new(device_id: impl Into<String>, timestamp: i64) -> Self {
        BatchRequest {
            changes: BTreeMap::new(),
            device_id: device_id.into(),
            timestamp,
        }
    }

    /// Adds a collection's dirty set; empty sets are skipped.
    pub fn add(&mut self, collection: Collection, records: Vec<Record>) {
        if !records.is_empty() {
            self.changes
                .entry(collection.wire_name().to_string())
                .or_default()
                .extend(records);
        }
    }

    pub fn record_count(&self) -> usize {
        self.changes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }
}

/// `data` of a successful batch response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAck {
    /// Checkpoint the server issued for this batch.
    #[serde(default)]
    pub server_timestamp: Option<i64>,

    /// Per-collection `{created, updated, deleted}` counts, informational only.
    #[serde(default)]
    pub processed: Option<Value>,

    #[serde(default)]
    pub errors: Vec<Value>,
}

// =============================================================================
// Pull
// =============================================================================

/// Query of `GET /sync/pull`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullQuery {
    pub last_sync: i64,
    pub tables: Vec<Collection>,
}

impl PullQuery {
    /// `tables` as the comma-separated wire names the server expects.
    pub fn tables_param(&self) -> String {
        self.tables
            .iter()
            .map(Collection::wire_name)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Query pairs for the request URL.
    pub fn to_pairs(&self) -> [(&'static str, String); 2] {
        [
            ("lastSync", self.last_sync.to_string()),
            ("tables", self.tables_param()),
        ]
    }
}

/// `data` of a successful pull response.
///
/// Records stay as raw JSON here; the engine normalises them one by one so a
/// single bad record does not fail the whole pull.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullData {
    #[serde(default)]
    pub updates: BTreeMap<String, Vec<Value>>,

    #[serde(default)]
    pub server_timestamp: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn test_batch_request_shape() {
        let mut request = BatchRequest::new("device-1", 42);
        request.add(
            Collection::Customers,
            vec![Record::new_local("u-1", "biz", Map::new(), 1)],
        );
        request.add(Collection::Products, vec![]);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["deviceId"], "device-1");
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["changes"]["clientes"][0]["id_uuid"], "u-1");
        assert!(json["changes"].get("productos").is_none());
        assert_eq!(request.record_count(), 1);
    }

    #[test]
    fn test_envelope_accepts_both_languages() {
        let english: ApiEnvelope<BatchAck> =
            serde_json::from_value(json!({"success": true, "data": {"serverTimestamp": 9}}))
                .unwrap();
        assert!(english.success);
        assert_eq!(english.data.unwrap().server_timestamp, Some(9));

        let spanish: ApiEnvelope<PullData> = serde_json::from_value(json!({
            "exito": true,
            "mensaje": "ok",
            "datos": {"updates": {"clientes": [{"uuid": "u"}]}, "serverTimestamp": 10}
        }))
        .unwrap();
        let data = spanish.data.unwrap();
        assert_eq!(data.updates["clientes"].len(), 1);
        assert_eq!(data.server_timestamp, Some(10));
        assert_eq!(spanish.message.as_deref(), Some("ok"));
    }

    #[test]
    fn test_pull_query_params() {
        let query = PullQuery {
            last_sync: 0,
            tables: vec![Collection::Customers, Collection::CountedItems],
        };
        assert_eq!(query.tables_param(), "clientes,productos_contados");
        assert_eq!(query.to_pairs()[0], ("lastSync", "0".to_string()));
    }
}
