//! Persisted record format.
//!
//! A queue document is a versioned container:
//!
//! ```text
//! {
//!   "version": "1.0.0",
//!   "items": [ { "id": "...", "kind": "...", "payload": ... }, ... ],
//!   "lastSaved": 1700000000000
//! }
//! ```
//!
//! There is no automatic migration. A document carrying any other version
//! is rejected with [`StorageError::UnsupportedMigration`].

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current queue document version.
pub const STORAGE_VERSION: &str = "1.0.0";

/// The durable representation of one work unit.
///
/// `kind` is the type tag used to pick a decoder on replay; `payload` is
/// opaque to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnableRecord {
    /// Dedup and removal key.
    pub id: String,
    /// Type tag.
    pub kind: String,
    /// Opaque key/value payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RunnableRecord {
    /// Creates a new record.
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            payload,
        }
    }
}

/// The versioned container written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedQueue {
    /// Format version.
    pub version: String,
    /// Pending records in acceptance order.
    pub items: Vec<RunnableRecord>,
    /// Unix time in milliseconds of the last write.
    #[serde(rename = "lastSaved")]
    pub last_saved: u64,
}

impl PersistedQueue {
    /// Creates a container at the current version, stamped now.
    pub fn new(items: Vec<RunnableRecord>) -> Self {
        Self {
            version: STORAGE_VERSION.to_string(),
            items,
            last_saved: now_millis(),
        }
    }

    /// Encodes the container as pretty JSON.
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decodes and validates a container.
    ///
    /// Structural problems are reported before version problems, so a
    /// document with no `version` string is unreadable rather than
    /// unsupported.
    pub fn decode(data: &[u8]) -> StorageResult<Self> {
        let document: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| StorageError::UnreadableStorage(e.to_string()))?;

        let version = document
            .get("version")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StorageError::UnreadableStorage("missing version".into()))?;

        if !document.get("items").is_some_and(|v| v.is_array()) {
            return Err(StorageError::UnreadableStorage("missing items".into()));
        }

        if version != STORAGE_VERSION {
            return Err(StorageError::UnsupportedMigration {
                version: version.to_string(),
            });
        }

        serde_json::from_value(document).map_err(|e| StorageError::UnreadableStorage(e.to_string()))
    }
}

impl Default for PersistedQueue {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
