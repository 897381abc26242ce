//! # Record Validation
//!
//! Checks applied on the local write path before anything reaches the store.
//!
//! ## Validation Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Local Write Validation                               │
//! │                                                                         │
//! │  Entity fields   no reserved sync key (_id, uuid, is_dirty, ...)        │
//! │  uuid            non-empty                                              │
//! │  local_id        non-empty                                              │
//! │  business_id     non-empty (every record has exactly one owner)         │
//! │  sync_status     pending ⇔ is_dirty                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::record::{Record, RESERVED_FIELDS};
use crate::types::SyncStatus;

/// Rejects entity fields that collide with sync-managed keys.
pub fn validate_fields(fields: &Map<String, Value>) -> Result<(), ValidationError> {
    if let Some(key) = fields.keys().find(|k| RESERVED_FIELDS.contains(&k.as_str())) {
        return Err(ValidationError::ReservedField { field: key.clone() });
    }
    Ok(())
}

/// Validates a complete record before it is written.
pub fn validate_record(record: &Record) -> Result<(), ValidationError> {
    require_non_empty("uuid", &record.uuid)?;
    require_non_empty("local_id", &record.local_id)?;
    require_non_empty("business_id", &record.business_id)?;

    if record.sync_status != SyncStatus::from_dirty(record.is_dirty) {
        return Err(ValidationError::InconsistentStatus {
            local_id: record.local_id.clone(),
            status: record.sync_status.to_string(),
            is_dirty: record.is_dirty,
        });
    }

    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Record {
        Record::new_local("u-1", "biz", Map::new(), 1)
    }

    #[test]
    fn test_reserved_fields_rejected() {
        let fields = json!({"nombre": "A", "is_dirty": 0}).as_object().cloned().unwrap();
        assert_eq!(
            validate_fields(&fields),
            Err(ValidationError::ReservedField {
                field: "is_dirty".into()
            })
        );

        let ok = json!({"nombre": "A"}).as_object().cloned().unwrap();
        assert!(validate_fields(&ok).is_ok());
    }

    #[test]
    fn test_valid_record() {
        assert!(validate_record(&record()).is_ok());
    }

    #[test]
    fn test_empty_business_rejected() {
        let mut r = record();
        r.business_id = " ".into();
        assert!(matches!(
            validate_record(&r),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_inconsistent_status_rejected() {
        let mut r = record();
        r.sync_status = SyncStatus::Synced;
        assert!(matches!(
            validate_record(&r),
            Err(ValidationError::InconsistentStatus { .. })
        ));
    }
}
