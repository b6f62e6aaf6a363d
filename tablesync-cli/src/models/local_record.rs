use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tablesync_core::{DirtyState, RecordId, RemoteRecord, ZoneId};

/// A row of the local table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalRecord {
    pub name: String,
    pub record_type: String,
    pub fields: Map<String, Value>,
    pub dirty_state: DirtyState,
    /// Remote save time of the last synced version.
    pub modified_at: Option<DateTime<Utc>>,
    /// Time of the last local write.
    pub updated_at: DateTime<Utc>,
}

impl LocalRecord {
    /// Remote-shaped copy of this row in `zone`.
    pub fn to_remote(&self, zone: &ZoneId) -> RemoteRecord {
        RemoteRecord {
            id: RecordId::new(zone.clone(), self.name.clone()),
            record_type: self.record_type.clone(),
            fields: self.fields.clone(),
            modified_at: self.modified_at,
        }
    }

    /// True when the row has local changes not yet pushed.
    pub fn is_pending(&self) -> bool {
        self.dirty_state.is_dirty()
    }
}

/// Parses a `key=value` field argument.
///
/// Values that parse as JSON keep their type (`count=3`, `done=true`);
/// anything else is stored as a string.
pub fn parse_field(arg: &str) -> Result<(String, Value), String> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", arg))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("field name missing in '{}'", arg));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
