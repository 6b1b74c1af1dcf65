// =============================================================================
// State repository — append-only strategy snapshots in SQLite, with optional
// zlib compression of large payloads
// =============================================================================
//
// Table: strategy_state(strategy_name, snapshot_json, schema_version,
// saved_at). Newest row per strategy wins on load. Payloads above the
// compression threshold are stored as "ZLIB:" + base64(zlib(json)) when that
// is actually smaller; the raw JSON is kept otherwise.
//
// Connections come from an injected factory, one per operation; the
// background writer owns the factory's connection for the duration of its
// write.
// =============================================================================

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info};

use crate::persistence::serializer::{JsonSerializer, SerializerError, CURRENT_SCHEMA_VERSION};
use crate::persistence::snapshot::{format_datetime, SnapshotDoc};

pub const COMPRESSION_PREFIX: &str = "ZLIB:";
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 10 * 1024;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum PersistenceError {
    /// No snapshot rows exist for the strategy.
    #[error("no persisted state for strategy {strategy_name}")]
    ArchiveNotFound { strategy_name: String },

    /// A row exists but cannot be decoded back into a snapshot.
    #[error("corrupt state for strategy {strategy_name}: {source}")]
    Corruption {
        strategy_name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Serializer(#[from] SerializerError),
}

// =============================================================================
// Connection factory
// =============================================================================

/// Hands out one SQLite connection per operation and guarantees the schema
/// exists.
#[derive(Debug, Clone)]
pub struct DatabaseFactory {
    path: PathBuf,
}

impl DatabaseFactory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn open(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS strategy_state (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                strategy_name TEXT NOT NULL,
                snapshot_json TEXT NOT NULL,
                schema_version INTEGER NOT NULL,
                saved_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(conn)
    }
}

// =============================================================================
// Repository
// =============================================================================

pub struct StateRepository {
    serializer: Arc<JsonSerializer>,
    factory: Arc<DatabaseFactory>,
    compression_threshold: usize,
}

impl StateRepository {
    pub fn new(
        serializer: Arc<JsonSerializer>,
        factory: Arc<DatabaseFactory>,
        compression_threshold: usize,
    ) -> Self {
        Self {
            serializer,
            factory,
            compression_threshold,
        }
    }

    pub fn serializer(&self) -> &JsonSerializer {
        &self.serializer
    }

    // -------------------------------------------------------------------------
    // Save
    // -------------------------------------------------------------------------

    /// Serialise and append a snapshot row.
    pub fn save(&self, strategy_name: &str, data: &SnapshotDoc) -> Result<(), PersistenceError> {
        let json_str = self.serializer.serialize(data)?;
        self.save_raw(strategy_name, &json_str)
    }

    /// Append an already-serialised snapshot (the auto-save path, which
    /// serialises once for the digest and reuses the string).
    pub fn save_raw(&self, strategy_name: &str, json_str: &str) -> Result<(), PersistenceError> {
        let (payload, compressed) = self.maybe_compress(json_str);
        self.insert_row(strategy_name, &payload, &Utc::now().naive_utc())?;
        info!(
            strategy_name,
            compressed,
            bytes = payload.len(),
            "strategy state saved"
        );
        Ok(())
    }

    fn insert_row(
        &self,
        strategy_name: &str,
        payload: &str,
        saved_at: &NaiveDateTime,
    ) -> Result<(), PersistenceError> {
        let conn = self.factory.open()?;
        conn.execute(
            "INSERT INTO strategy_state (strategy_name, snapshot_json, schema_version, saved_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                strategy_name,
                payload,
                CURRENT_SCHEMA_VERSION,
                format_datetime(saved_at)
            ],
        )?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Load
    // -------------------------------------------------------------------------

    fn newest_payload(&self, strategy_name: &str) -> Result<Option<String>, PersistenceError> {
        let conn = self.factory.open()?;
        let payload = conn
            .query_row(
                "SELECT snapshot_json FROM strategy_state
                 WHERE strategy_name = ?1
                 ORDER BY saved_at DESC, id DESC
                 LIMIT 1",
                params![strategy_name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(payload)
    }

    /// Load the newest snapshot, migrating it to the current schema.
    ///
    /// No rows → `ArchiveNotFound`. Decompression, parse or decode failure →
    /// `Corruption` (never swallowed).
    pub fn load(&self, strategy_name: &str) -> Result<SnapshotDoc, PersistenceError> {
        let Some(payload) = self.newest_payload(strategy_name)? else {
            debug!(strategy_name, "no persisted state found");
            return Err(PersistenceError::ArchiveNotFound {
                strategy_name: strategy_name.to_string(),
            });
        };

        let json_str =
            self.maybe_decompress(&payload)
                .map_err(|source| PersistenceError::Corruption {
                    strategy_name: strategy_name.to_string(),
                    source,
                })?;

        let doc = self
            .serializer
            .deserialize(&json_str)
            .map_err(|source| PersistenceError::Corruption {
                strategy_name: strategy_name.to_string(),
                source: Box::new(source),
            })?;

        info!(strategy_name, "strategy state loaded");
        Ok(doc)
    }

    /// Check the newest row: decompresses if needed, parses the JSON, and
    /// requires a `schema_version` key. `Ok(false)` when no row exists or
    /// the payload fails any of those.
    pub fn verify_integrity(&self, strategy_name: &str) -> Result<bool, PersistenceError> {
        let Some(payload) = self.newest_payload(strategy_name)? else {
            return Ok(false);
        };
        let Ok(json_str) = self.maybe_decompress(&payload) else {
            return Ok(false);
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&json_str) else {
            return Ok(false);
        };
        Ok(value.get("schema_version").is_some())
    }

    // -------------------------------------------------------------------------
    // Cleanup
    // -------------------------------------------------------------------------

    /// Delete rows older than `keep_days`, always sparing the newest row of
    /// the strategy. Returns the number of rows deleted.
    pub fn cleanup(&self, strategy_name: &str, keep_days: i64) -> Result<usize, PersistenceError> {
        let cutoff = Utc::now().naive_utc() - ChronoDuration::days(keep_days);
        let conn = self.factory.open()?;
        let deleted = conn.execute(
            "DELETE FROM strategy_state
             WHERE strategy_name = ?1
               AND saved_at < ?2
               AND id != (
                   SELECT id FROM strategy_state
                   WHERE strategy_name = ?1
                   ORDER BY saved_at DESC, id DESC
                   LIMIT 1
               )",
            params![strategy_name, format_datetime(&cutoff)],
        )?;
        info!(strategy_name, deleted, keep_days, "old snapshots cleaned up");
        Ok(deleted)
    }

    // -------------------------------------------------------------------------
    // Compression
    // -------------------------------------------------------------------------

    /// Compress payloads above the threshold; keep the raw JSON when the
    /// compressed form would not actually be smaller.
    fn maybe_compress(&self, json_str: &str) -> (String, bool) {
        let raw_bytes = json_str.as_bytes();
        if raw_bytes.len() <= self.compression_threshold {
            return (json_str.to_string(), false);
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        if encoder.write_all(raw_bytes).is_err() {
            return (json_str.to_string(), false);
        }
        let Ok(compressed) = encoder.finish() else {
            return (json_str.to_string(), false);
        };

        if compressed.len() >= raw_bytes.len() {
            return (json_str.to_string(), false);
        }

        (format!("{COMPRESSION_PREFIX}{}", BASE64.encode(compressed)), true)
    }

    fn maybe_decompress(
        &self,
        stored: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let Some(encoded) = stored.strip_prefix(COMPRESSION_PREFIX) else {
            return Ok(stored.to_string());
        };
        let compressed = BASE64.decode(encoded)?;
        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        let mut json_str = String::new();
        decoder.read_to_string(&mut json_str)?;
        Ok(json_str)
    }
}

impl std::fmt::Debug for StateRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateRepository")
            .field("factory", &self.factory)
            .field("compression_threshold", &self.compression_threshold)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
