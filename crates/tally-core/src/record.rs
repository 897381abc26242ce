//! # Sync Record
//!
//! The generic record shape every collection shares.
//!
//! ## Identity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Record Identity                                 │
//! │                                                                         │
//! │  uuid      client-generated at creation, immutable, matches local and   │
//! │            server copies before they agree on a local id                │
//! │                                                                         │
//! │  local_id  primary key in the local store: the server id once known,    │
//! │            otherwise equal to uuid                                      │
//! │                                                                         │
//! │  Created locally:   local_id = uuid = "7f3c…"                          │
//! │  Pulled back:       local_id = "42" (server id), uuid = "7f3c…"        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Shape
//! ```json
//! { "_id": "7f3c…", "id_uuid": "7f3c…", "business_id": "b-1",
//!   "is_dirty": 1, "sync_status": "pending", "last_updated": 1700000000000,
//!   "nombre": "Tienda Sol", "telefono": "555-0100" }
//! ```
//! Entity fields are flattened next to the sync columns and are opaque to the
//! engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::types::SyncStatus;

/// Field that marks a record as a tombstone for the server.
pub const TOMBSTONE_FIELD: &str = "deleted";

/// Keys owned by the sync engine; entity fields may not use them.
pub const RESERVED_FIELDS: [&str; 8] = [
    "_id",
    "id",
    "uuid",
    "id_uuid",
    "business_id",
    "is_dirty",
    "sync_status",
    "last_updated",
];

/// A record in one of the synced collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Local primary key.
    #[serde(rename = "_id")]
    pub local_id: String,

    /// Immutable client-generated identifier.
    #[serde(rename = "id_uuid")]
    pub uuid: String,

    /// Owning tenant/business.
    pub business_id: String,

    /// True while the record has local changes the server has not confirmed.
    #[serde(with = "dirty_flag")]
    pub is_dirty: bool,

    /// Redundant copy of `is_dirty` for filtering.
    pub sync_status: SyncStatus,

    /// Client-side mutation timestamp (epoch millis, strictly increasing per device).
    pub last_updated: i64,

    /// Entity-specific fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Builds a freshly created local record: dirty, pending, keyed by its uuid.
    pub fn new_local(
        uuid: impl Into<String>,
        business_id: impl Into<String>,
        fields: Map<String, Value>,
        now_millis: i64,
    ) -> Self {
        let uuid = uuid.into();
        Record {
            local_id: uuid.clone(),
            uuid,
            business_id: business_id.into(),
            is_dirty: true,
            sync_status: SyncStatus::Pending,
            last_updated: now_millis,
            fields,
        }
    }

    /// Normalises a record returned by `/sync/pull`.
    ///
    /// ## Normalisation Rules
    /// - `local_id`: `_id`, else `id`, else the uuid (numbers are stringified)
    /// - `uuid`: `uuid`, else `id_uuid`; a record without either is rejected
    /// - `business_id`: taken from the record, else `default_business_id`
    /// - `last_updated`: `last_updated`, else a numeric `updated_at`, else 0
    /// - the result is always clean (`is_dirty = false`, `synced`)
    pub fn from_remote(value: Value, default_business_id: &str) -> Result<Self, CoreError> {
        let Value::Object(mut map) = value else {
            return Err(CoreError::InvalidRecord(
                "pulled record is not a JSON object".into(),
            ));
        };

        // Remove every reserved key so none of them leak into `fields`.
        let uuid_plain = take_string(&mut map, "uuid");
        let uuid_prefixed = take_string(&mut map, "id_uuid");
        let local_underscore = take_string(&mut map, "_id");
        let local_plain = take_string(&mut map, "id");
        let business_id = take_string(&mut map, "business_id");
        let last_updated = map
            .remove("last_updated")
            .and_then(|v| v.as_i64())
            .or_else(|| map.get("updated_at").and_then(Value::as_i64))
            .unwrap_or(0);
        map.remove("is_dirty");
        map.remove("sync_status");

        let uuid = uuid_plain
            .or(uuid_prefixed)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CoreError::InvalidRecord("pulled record has no uuid".into()))?;

        let local_id = local_underscore
            .or(local_plain)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid.clone());

        Ok(Record {
            local_id,
            uuid,
            business_id: business_id.unwrap_or_else(|| default_business_id.to_string()),
            is_dirty: false,
            sync_status: SyncStatus::Synced,
            last_updated,
            fields: map,
        })
    }

    /// Merges edited entity fields and marks the record dirty.
    pub fn apply_edit(&mut self, fields: Map<String, Value>, now_millis: i64) {
        for (key, value) in fields {
            self.fields.insert(key, value);
        }
        self.mark_dirty(now_millis);
    }

    /// Turns the record into a tombstone the next push mirrors to the server.
    pub fn mark_deleted(&mut self, now_millis: i64) {
        self.fields.insert(TOMBSTONE_FIELD.to_string(), Value::from(1));
        self.mark_dirty(now_millis);
    }

    /// Flags the record as having unsynced local changes.
    pub fn mark_dirty(&mut self, now_millis: i64) {
        self.is_dirty = true;
        self.sync_status = SyncStatus::Pending;
        self.last_updated = now_millis;
    }

    /// Flags the record as matching the server copy.
    pub fn mark_synced(&mut self) {
        self.is_dirty = false;
        self.sync_status = SyncStatus::Synced;
    }

    /// True if the record is a deletion marker.
    pub fn is_tombstone(&self) -> bool {
        match self.fields.get(TOMBSTONE_FIELD) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            _ => false,
        }
    }
}

/// Takes a key out of the map as a string, stringifying numbers.
fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `is_dirty` travels as `0`/`1` but is accepted as a bool too.
mod dirty_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Flag {
            Bool(bool),
            Int(i64),
        }

        Ok(match Flag::deserialize(deserializer)? {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_new_local_is_dirty_and_keyed_by_uuid() {
        let record = Record::new_local("u-1", "biz", fields(json!({"nombre": "Ana"})), 10);
        assert_eq!(record.local_id, "u-1");
        assert!(record.is_dirty);
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.last_updated, 10);
    }

    #[test]
    fn test_wire_shape() {
        let record = Record::new_local("u-1", "biz", fields(json!({"nombre": "Ana"})), 10);
        let wire = serde_json::to_value(&record).unwrap();
        assert_eq!(wire["_id"], "u-1");
        assert_eq!(wire["id_uuid"], "u-1");
        assert_eq!(wire["is_dirty"], 1);
        assert_eq!(wire["sync_status"], "pending");
        assert_eq!(wire["nombre"], "Ana");

        let back: Record = serde_json::from_value(wire).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_from_remote_prefers_server_id() {
        let remote = json!({
            "id": 42,
            "uuid": "u-1",
            "business_id": "biz",
            "nombre": "Ana",
            "updated_at": 1_700_000_000_000_i64
        });
        let record = Record::from_remote(remote, "fallback").unwrap();
        assert_eq!(record.local_id, "42");
        assert_eq!(record.uuid, "u-1");
        assert_eq!(record.business_id, "biz");
        assert!(!record.is_dirty);
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.last_updated, 1_700_000_000_000);
        assert!(!record.fields.contains_key("id"));
        assert!(!record.fields.contains_key("uuid"));
        assert_eq!(record.fields["nombre"], "Ana");
    }

    #[test]
    fn test_from_remote_falls_back_to_uuid_and_default_business() {
        let remote = json!({"id_uuid": "u-9", "is_dirty": 1, "nombre": "Ben"});
        let record = Record::from_remote(remote, "biz-default").unwrap();
        assert_eq!(record.local_id, "u-9");
        assert_eq!(record.business_id, "biz-default");
        assert!(!record.is_dirty);
        assert!(!record.fields.contains_key("is_dirty"));
    }

    #[test]
    fn test_from_remote_rejects_missing_uuid() {
        assert!(Record::from_remote(json!({"id": 1}), "biz").is_err());
        assert!(Record::from_remote(json!(["not", "an", "object"]), "biz").is_err());
    }

    #[test]
    fn test_edit_and_tombstone() {
        let mut record = Record::from_remote(json!({"uuid": "u-1", "nombre": "A"}), "b").unwrap();
        record.apply_edit(fields(json!({"nombre": "B", "telefono": "1"})), 99);
        assert!(record.is_dirty);
        assert_eq!(record.fields["nombre"], "B");
        assert_eq!(record.last_updated, 99);
        assert!(!record.is_tombstone());

        record.mark_deleted(100);
        assert!(record.is_tombstone());
        assert_eq!(record.last_updated, 100);
    }
}
