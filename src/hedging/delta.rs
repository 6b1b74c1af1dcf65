// =============================================================================
// Delta hedging engine and gamma-scalp rebalancer
// =============================================================================
//
// Both hedge with a linear instrument (futures), so unlike the Vega engine
// there are no cross-Greek impacts to account for. The Delta engine keeps
// portfolio Delta inside a band around a target; the gamma scalper
// re-flattens Delta whenever gamma-induced drift crosses the rebalance
// threshold, harvesting the move.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::hedging::round_half_to_even;
use crate::types::{Direction, Offset, OrderInstruction, OrderType, PortfolioGreeks};

// =============================================================================
// Delta hedging
// =============================================================================

fn default_hedging_band() -> f64 {
    0.5
}

fn default_instrument_delta() -> f64 {
    1.0
}

fn default_instrument_multiplier() -> f64 {
    10.0
}

/// Delta hedge target, band, and hedge-instrument parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgingConfig {
    #[serde(default)]
    pub target_delta: f64,
    #[serde(default = "default_hedging_band")]
    pub hedging_band: f64,
    #[serde(default)]
    pub hedge_instrument_vt_symbol: String,
    #[serde(default = "default_instrument_delta")]
    pub hedge_instrument_delta: f64,
    #[serde(default = "default_instrument_multiplier")]
    pub hedge_instrument_multiplier: f64,
}

impl Default for HedgingConfig {
    fn default() -> Self {
        Self {
            target_delta: 0.0,
            hedging_band: default_hedging_band(),
            hedge_instrument_vt_symbol: String::new(),
            hedge_instrument_delta: default_instrument_delta(),
            hedge_instrument_multiplier: default_instrument_multiplier(),
        }
    }
}

/// Outcome of a Delta hedging check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HedgeResult {
    pub should_hedge: bool,
    pub hedge_volume: i64,
    pub hedge_direction: Option<Direction>,
    pub instruction: Option<OrderInstruction>,
    pub rejected: bool,
    #[serde(default)]
    pub reject_reason: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct DeltaHedgingEngine {
    config: HedgingConfig,
}

impl DeltaHedgingEngine {
    pub fn new(config: HedgingConfig) -> Self {
        Self { config }
    }

    /// Hedge when |total_delta − target| exceeds the band.
    /// Lots = round((target − total) / (instrument_delta · multiplier)),
    /// half-to-even.
    pub fn check_and_hedge(
        &self,
        portfolio_greeks: &PortfolioGreeks,
        current_price: f64,
    ) -> HedgeResult {
        let cfg = &self.config;

        if cfg.hedge_instrument_multiplier <= 0.0 {
            warn!("delta hedge rejected: non-positive contract multiplier");
            return HedgeResult {
                rejected: true,
                reject_reason: "invalid config: multiplier <= 0".to_string(),
                ..HedgeResult::default()
            };
        }
        if cfg.hedge_instrument_delta == 0.0 {
            warn!("delta hedge rejected: hedge instrument delta is zero");
            return HedgeResult {
                rejected: true,
                reject_reason: "hedge instrument delta is zero".to_string(),
                ..HedgeResult::default()
            };
        }
        if current_price <= 0.0 {
            warn!(current_price, "delta hedge rejected: invalid price");
            return HedgeResult {
                rejected: true,
                reject_reason: "current price <= 0".to_string(),
                ..HedgeResult::default()
            };
        }

        let delta_diff = portfolio_greeks.total_delta - cfg.target_delta;
        if delta_diff.abs() <= cfg.hedging_band {
            debug!(
                delta_diff = format!("{delta_diff:.4}"),
                band = cfg.hedging_band,
                "delta inside tolerance band"
            );
            return HedgeResult {
                reason: "delta within tolerance band".to_string(),
                ..HedgeResult::default()
            };
        }

        let denominator = cfg.hedge_instrument_delta * cfg.hedge_instrument_multiplier;
        let raw_volume = (cfg.target_delta - portfolio_greeks.total_delta) / denominator;
        if !raw_volume.is_finite() {
            return HedgeResult {
                reason: "hedge volume overflow".to_string(),
                ..HedgeResult::default()
            };
        }
        let lots = round_half_to_even(raw_volume) as i64;
        if lots == 0 {
            return HedgeResult {
                reason: "hedge volume rounds to zero".to_string(),
                ..HedgeResult::default()
            };
        }

        let direction = if lots > 0 {
            Direction::Long
        } else {
            Direction::Short
        };
        let hedge_volume = lots.abs();

        info!(
            hedge_volume,
            direction = %direction,
            delta_before = format!("{:.4}", portfolio_greeks.total_delta),
            "delta hedge generated"
        );

        HedgeResult {
            should_hedge: true,
            hedge_volume,
            hedge_direction: Some(direction),
            instruction: Some(OrderInstruction {
                vt_symbol: cfg.hedge_instrument_vt_symbol.clone(),
                direction,
                offset: Offset::Open,
                volume: hedge_volume,
                price: current_price,
                signal: "delta_hedge".to_string(),
                order_type: OrderType::Limit,
            }),
            rejected: false,
            reject_reason: String::new(),
            reason: format!("delta drift {delta_diff:.4} beyond band {}", cfg.hedging_band),
        }
    }
}

// =============================================================================
// Gamma scalping
// =============================================================================

fn default_rebalance_threshold() -> f64 {
    0.3
}

/// Gamma-scalp rebalance threshold and instrument parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GammaScalpConfig {
    #[serde(default = "default_rebalance_threshold")]
    pub rebalance_threshold: f64,
    #[serde(default)]
    pub hedge_instrument_vt_symbol: String,
    #[serde(default = "default_instrument_delta")]
    pub hedge_instrument_delta: f64,
    #[serde(default = "default_instrument_multiplier")]
    pub hedge_instrument_multiplier: f64,
}

impl Default for GammaScalpConfig {
    fn default() -> Self {
        Self {
            rebalance_threshold: default_rebalance_threshold(),
            hedge_instrument_vt_symbol: String::new(),
            hedge_instrument_delta: default_instrument_delta(),
            hedge_instrument_multiplier: default_instrument_multiplier(),
        }
    }
}

/// Outcome of a gamma-scalp check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScalpResult {
    pub should_rebalance: bool,
    pub rebalance_volume: i64,
    pub rebalance_direction: Option<Direction>,
    pub instruction: Option<OrderInstruction>,
    pub rejected: bool,
    #[serde(default)]
    pub reject_reason: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct GammaScalper {
    config: GammaScalpConfig,
}

impl GammaScalper {
    pub fn new(config: GammaScalpConfig) -> Self {
        Self { config }
    }

    /// Rebalance the portfolio back to flat Delta once |total_delta| crosses
    /// the threshold.
    pub fn check_rebalance(
        &self,
        portfolio_greeks: &PortfolioGreeks,
        current_price: f64,
    ) -> ScalpResult {
        let cfg = &self.config;

        if cfg.hedge_instrument_multiplier <= 0.0 || cfg.hedge_instrument_delta == 0.0 {
            warn!("gamma scalp rejected: invalid hedge instrument parameters");
            return ScalpResult {
                rejected: true,
                reject_reason: "invalid hedge instrument parameters".to_string(),
                ..ScalpResult::default()
            };
        }
        if current_price <= 0.0 {
            return ScalpResult {
                rejected: true,
                reject_reason: "current price <= 0".to_string(),
                ..ScalpResult::default()
            };
        }

        if portfolio_greeks.total_delta.abs() < cfg.rebalance_threshold {
            return ScalpResult {
                reason: "delta drift below rebalance threshold".to_string(),
                ..ScalpResult::default()
            };
        }

        let raw_volume = -portfolio_greeks.total_delta
            / (cfg.hedge_instrument_delta * cfg.hedge_instrument_multiplier);
        let lots = round_half_to_even(raw_volume) as i64;
        if lots == 0 {
            return ScalpResult {
                reason: "rebalance volume rounds to zero".to_string(),
                ..ScalpResult::default()
            };
        }

        let direction = if lots > 0 {
            Direction::Long
        } else {
            Direction::Short
        };
        let rebalance_volume = lots.abs();

        info!(
            rebalance_volume,
            direction = %direction,
            delta = format!("{:.4}", portfolio_greeks.total_delta),
            "gamma scalp rebalance generated"
        );

        ScalpResult {
            should_rebalance: true,
            rebalance_volume,
            rebalance_direction: Some(direction),
            instruction: Some(OrderInstruction {
                vt_symbol: cfg.hedge_instrument_vt_symbol.clone(),
                direction,
                offset: Offset::Open,
                volume: rebalance_volume,
                price: current_price,
                signal: "gamma_scalp".to_string(),
                order_type: OrderType::Limit,
            }),
            rejected: false,
            reject_reason: String::new(),
            reason: format!(
                "delta {:.4} beyond rebalance threshold {}",
                portfolio_greeks.total_delta, cfg.rebalance_threshold
            ),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
