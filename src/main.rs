// =============================================================================
// Volaris Options Nexus — Main Entry Point
// =============================================================================
//
// Boot order: env + logging → config → state repository → restore the engine
// from the newest snapshot (or start fresh) → auto-save ticker → run until
// ctrl-c, then force-save the final state.
//
// The trading pipeline itself (market data in, signals, order routing) is
// driven by external gateways; this process hosts the domain core and its
// persistence loop.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod combination;
mod config;
mod engine;
mod events;
mod hedging;
mod market;
mod orders;
mod persistence;
mod risk;
mod selection;
mod types;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::engine::StrategyEngine;
use crate::persistence::autosave::AutoSaveService;
use crate::persistence::migration::MigrationChain;
use crate::persistence::repository::{DatabaseFactory, PersistenceError, StateRepository};
use crate::persistence::serializer::JsonSerializer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Volaris Options Nexus — Starting Up              ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    // ── 2. Configuration ─────────────────────────────────────────────────
    let config_path =
        std::env::var("VOLARIS_CONFIG").unwrap_or_else(|_| "volaris_config.json".to_string());
    let config = match EngineConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %config_path, error = %e, "config not loaded, using defaults");
            EngineConfig::default()
        }
    };
    let strategy_name = config.strategy_name.clone();
    let persistence_cfg = config.persistence;

    // ── 3. Persistence stack ─────────────────────────────────────────────
    // Schema migrations are registered here, in version order, as the
    // format evolves. Version 1 is current; the chain starts empty.
    let migrations = MigrationChain::new();
    let serializer = Arc::new(JsonSerializer::new(migrations));
    let factory = Arc::new(DatabaseFactory::new(&config.database_path));
    let repository = Arc::new(StateRepository::new(
        Arc::clone(&serializer),
        factory,
        persistence_cfg.compression_threshold_bytes,
    ));

    // ── 4. Restore or start fresh ────────────────────────────────────────
    let engine = match repository.load(&strategy_name) {
        Ok(doc) => {
            info!(strategy = %strategy_name, "restoring engine from snapshot");
            StrategyEngine::from_snapshot(config, &doc)?
        }
        Err(PersistenceError::ArchiveNotFound { .. }) => {
            info!(strategy = %strategy_name, "no snapshot found, starting fresh");
            StrategyEngine::new(config)?
        }
        Err(e) => {
            // A corrupt or unreadable state store is fatal at boot; the
            // repository never swallows a parse failure.
            error!(strategy = %strategy_name, error = %e, "state restore failed");
            return Err(e.into());
        }
    };
    let engine = Arc::new(Mutex::new(engine));

    let mut auto_save = AutoSaveService::new(
        Arc::clone(&repository),
        strategy_name.clone(),
        persistence_cfg.auto_save_interval_s,
        persistence_cfg.cleanup_interval_h,
        persistence_cfg.keep_days,
    );

    info!(
        strategy = %strategy_name,
        combinations = engine.lock().combinations().len(),
        save_interval_s = persistence_cfg.auto_save_interval_s,
        "engine ready"
    );

    // ── 5. Auto-save loop until shutdown ─────────────────────────────────
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let engine = Arc::clone(&engine);
                auto_save.maybe_save(move || engine.lock().to_snapshot());
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "ctrl-c handler failed");
                }
                break;
            }
        }
    }

    // ── 6. Final save ────────────────────────────────────────────────────
    info!(strategy = %strategy_name, "shutting down, forcing final save");
    {
        let engine = Arc::clone(&engine);
        auto_save.force_save(move || engine.lock().to_snapshot()).await;
    }
    auto_save.shutdown().await;
    info!("shutdown complete");

    Ok(())
}
