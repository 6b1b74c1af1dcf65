// =============================================================================
// Envelope serializer — schema_version injection on write, migration on read
// =============================================================================

use serde_json::{Map, Value};
use thiserror::Error;

use crate::persistence::migration::{MigrationChain, MigrationError};
use crate::persistence::snapshot::{SnapshotDoc, SnapshotError, SnapshotValue};

/// Version written into every new envelope.
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum SerializerError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("snapshot JSON is not an object")]
    NotAnObject,
    #[error("snapshot JSON parse failed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Serialises snapshot documents to canonical JSON and back, upgrading old
/// schema versions through the migration chain on the way in.
pub struct JsonSerializer {
    migration_chain: MigrationChain,
}

impl JsonSerializer {
    pub fn new(migration_chain: MigrationChain) -> Self {
        Self { migration_chain }
    }

    /// Serialise with `schema_version` injected. Output keys are sorted, so
    /// identical logical state yields byte-identical JSON.
    pub fn serialize(&self, data: &SnapshotDoc) -> Result<String, SerializerError> {
        let mut envelope = Map::new();
        envelope.insert(
            "schema_version".to_string(),
            Value::Number(CURRENT_SCHEMA_VERSION.into()),
        );
        for (key, value) in data {
            if key == "schema_version" {
                continue;
            }
            envelope.insert(key.clone(), value.to_json(key)?);
        }
        Ok(serde_json::to_string(&Value::Object(envelope))?)
    }

    /// Parse, decode and migrate an envelope up to the current schema
    /// version. A missing `schema_version` is treated as version 1.
    pub fn deserialize(&self, json_str: &str) -> Result<SnapshotDoc, SerializerError> {
        let value: Value = serde_json::from_str(json_str)?;
        let Value::Object(obj) = value else {
            return Err(SerializerError::NotAnObject);
        };

        let mut doc = SnapshotDoc::new();
        for (key, value) in &obj {
            doc.insert(key.clone(), SnapshotValue::from_json(value)?);
        }

        let version = match doc.get("schema_version") {
            Some(SnapshotValue::Int(v)) => *v,
            _ => 1,
        };
        if version < CURRENT_SCHEMA_VERSION {
            doc = self
                .migration_chain
                .migrate(doc, version, CURRENT_SCHEMA_VERSION)?;
            doc.insert(
                "schema_version".to_string(),
                SnapshotValue::Int(CURRENT_SCHEMA_VERSION),
            );
        }

        Ok(doc)
    }
}

impl std::fmt::Debug for JsonSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSerializer")
            .field("migration_chain", &self.migration_chain)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
