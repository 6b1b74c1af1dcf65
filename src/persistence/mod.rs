// =============================================================================
// Persistence — tagged snapshot model, schema migrations, SQLite state
// repository, and the auto-save loop
// =============================================================================

pub mod autosave;
pub mod migration;
pub mod repository;
pub mod serializer;
pub mod snapshot;
