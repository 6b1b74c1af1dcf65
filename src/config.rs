// =============================================================================
// Engine configuration — every tunable of the trading core, loadable from a
// JSON file with atomic save
// =============================================================================
//
// Every section and every field carries a `#[serde(default)]` so that a
// partial (or empty) config file keeps working as new knobs are added. The
// sections mirror the recognized configuration surface: position_sizing,
// option_selector, future_selector, combination_risk, stop_loss, liquidity,
// hedging (delta / gamma / vega), persistence.
//
// Persistence uses the tmp + rename pattern so a crash mid-write can never
// corrupt the config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::combination::risk::CombinationRiskConfig;
use crate::hedging::delta::{GammaScalpConfig, HedgingConfig};
use crate::hedging::vega::VegaHedgingConfig;
use crate::orders::AdvancedOrdersConfig;
use crate::risk::liquidity::LiquidityMonitorConfig;
use crate::risk::sizing::PositionSizingConfig;
use crate::risk::stop_loss::StopLossConfig;
use crate::selection::future_selector::FutureSelectorConfig;
use crate::selection::option_selector::OptionSelectorConfig;
use crate::types::RiskThresholds;

// =============================================================================
// Default-value helpers
// =============================================================================

fn default_strategy_name() -> String {
    "volaris".to_string()
}

fn default_database_path() -> String {
    "volaris_state.db".to_string()
}

fn default_contract_multiplier() -> f64 {
    10.0
}

fn default_auto_save_interval_s() -> f64 {
    60.0
}

fn default_compression_threshold_bytes() -> usize {
    10 * 1024
}

fn default_cleanup_interval_h() -> f64 {
    24.0
}

fn default_keep_days() -> i64 {
    7
}

// =============================================================================
// Sections
// =============================================================================

/// Hedging engines grouped the way the config file nests them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HedgingSection {
    #[serde(default)]
    pub delta_hedging: HedgingConfig,
    #[serde(default)]
    pub gamma_scalping: GammaScalpConfig,
    #[serde(default)]
    pub vega_hedging: VegaHedgingConfig,
}

/// Snapshot persistence cadence and retention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_auto_save_interval_s")]
    pub auto_save_interval_s: f64,
    #[serde(default = "default_compression_threshold_bytes")]
    pub compression_threshold_bytes: usize,
    #[serde(default = "default_cleanup_interval_h")]
    pub cleanup_interval_h: f64,
    #[serde(default = "default_keep_days")]
    pub keep_days: i64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            auto_save_interval_s: default_auto_save_interval_s(),
            compression_threshold_bytes: default_compression_threshold_bytes(),
            cleanup_interval_h: default_cleanup_interval_h(),
            keep_days: default_keep_days(),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the Volaris engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_strategy_name")]
    pub strategy_name: String,

    /// SQLite file backing the state repository.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Contract multiplier of the traded option series.
    #[serde(default = "default_contract_multiplier")]
    pub contract_multiplier: f64,

    #[serde(default)]
    pub position_sizing: PositionSizingConfig,

    #[serde(default)]
    pub option_selector: OptionSelectorConfig,

    #[serde(default)]
    pub future_selector: FutureSelectorConfig,

    #[serde(default)]
    pub combination_risk: CombinationRiskConfig,

    #[serde(default)]
    pub risk_thresholds: RiskThresholds,

    #[serde(default)]
    pub stop_loss: StopLossConfig,

    #[serde(default)]
    pub liquidity: LiquidityMonitorConfig,

    #[serde(default)]
    pub hedging: HedgingSection,

    #[serde(default)]
    pub advanced_orders: AdvancedOrdersConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        // Route through serde so the field defaults live in exactly one
        // place (the `default = "..."` attributes).
        serde_json::from_str("{}").expect("empty config deserialises")
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so that the caller can decide to fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            strategy = %config.strategy_name,
            "engine config loaded"
        );
        Ok(config)
    }

    /// Persist the configuration atomically (write `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
