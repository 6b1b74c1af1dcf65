// =============================================================================
// Schema migration chain — ordered, append-only N → N+1 upgrades
// =============================================================================
//
// Each registered function upgrades exactly one version step. `migrate`
// composes the steps in order; a gap in the chain is a fatal error because a
// snapshot would otherwise be half-upgraded.
// =============================================================================

use std::collections::HashMap;

use thiserror::Error;

use crate::persistence::snapshot::SnapshotDoc;

/// One version upgrade: takes the document at version N, returns it at N+1.
pub type MigrationFn = Box<dyn Fn(SnapshotDoc) -> SnapshotDoc + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("migration from version {from_version} already registered")]
    AlreadyRegistered { from_version: i64 },
    #[error("missing migration from version {from_version} to {}", from_version + 1)]
    MissingStep { from_version: i64 },
}

/// Keyed collection of single-step migrations.
#[derive(Default)]
pub struct MigrationChain {
    migrations: HashMap<i64, MigrationFn>,
}

impl MigrationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the upgrade from `from_version` to `from_version + 1`.
    /// Registration is append-only: re-registering a step is an error.
    pub fn register(
        &mut self,
        from_version: i64,
        migration: MigrationFn,
    ) -> Result<(), MigrationError> {
        if self.migrations.contains_key(&from_version) {
            return Err(MigrationError::AlreadyRegistered { from_version });
        }
        self.migrations.insert(from_version, migration);
        Ok(())
    }

    /// Run the chain from `from_version` up to `to_version`. A no-op when
    /// `from_version >= to_version`.
    pub fn migrate(
        &self,
        data: SnapshotDoc,
        from_version: i64,
        to_version: i64,
    ) -> Result<SnapshotDoc, MigrationError> {
        if from_version >= to_version {
            return Ok(data);
        }

        let mut result = data;
        for version in from_version..to_version {
            let migration = self
                .migrations
                .get(&version)
                .ok_or(MigrationError::MissingStep { from_version: version })?;
            result = migration(result);
        }
        Ok(result)
    }
}

impl std::fmt::Debug for MigrationChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut versions: Vec<&i64> = self.migrations.keys().collect();
        versions.sort();
        f.debug_struct("MigrationChain")
            .field("registered_from_versions", &versions)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
