// =============================================================================
// Vega hedging engine
// =============================================================================
//
// Watches portfolio Vega against a target band and sizes an option hedge
// when the exposure drifts out. Unlike Delta hedging the instrument is an
// option, so the hedge drags Delta, Gamma and Theta along with it; those
// impacts are computed and reported alongside the instruction.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::events::{DomainEvent, VegaHedgeExecuted};
use crate::hedging::round_half_to_even;
use crate::types::{Direction, Offset, OrderInstruction, OrderType, PortfolioGreeks};

// =============================================================================
// Configuration
// =============================================================================

fn default_hedging_band() -> f64 {
    50.0
}

fn default_instrument_vega() -> f64 {
    0.1
}

fn default_instrument_delta() -> f64 {
    0.5
}

fn default_instrument_gamma() -> f64 {
    0.01
}

fn default_instrument_theta() -> f64 {
    -0.05
}

fn default_instrument_multiplier() -> f64 {
    10.0
}

/// Vega hedge target, tolerance band, and per-lot instrument Greeks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VegaHedgingConfig {
    #[serde(default)]
    pub target_vega: f64,
    #[serde(default = "default_hedging_band")]
    pub hedging_band: f64,
    #[serde(default)]
    pub hedge_instrument_vt_symbol: String,
    #[serde(default = "default_instrument_vega")]
    pub hedge_instrument_vega: f64,
    #[serde(default = "default_instrument_delta")]
    pub hedge_instrument_delta: f64,
    #[serde(default = "default_instrument_gamma")]
    pub hedge_instrument_gamma: f64,
    #[serde(default = "default_instrument_theta")]
    pub hedge_instrument_theta: f64,
    #[serde(default = "default_instrument_multiplier")]
    pub hedge_instrument_multiplier: f64,
}

impl Default for VegaHedgingConfig {
    fn default() -> Self {
        Self {
            target_vega: 0.0,
            hedging_band: default_hedging_band(),
            hedge_instrument_vt_symbol: String::new(),
            hedge_instrument_vega: default_instrument_vega(),
            hedge_instrument_delta: default_instrument_delta(),
            hedge_instrument_gamma: default_instrument_gamma(),
            hedge_instrument_theta: default_instrument_theta(),
            hedge_instrument_multiplier: default_instrument_multiplier(),
        }
    }
}

// =============================================================================
// Result
// =============================================================================

/// Outcome of one hedging check. `rejected` marks invalid configuration;
/// `should_hedge = false` with `rejected = false` is the quiet no-op path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VegaHedgeResult {
    pub should_hedge: bool,
    pub hedge_volume: i64,
    pub hedge_direction: Option<Direction>,
    pub instruction: Option<OrderInstruction>,
    pub delta_impact: f64,
    pub gamma_impact: f64,
    pub theta_impact: f64,
    pub rejected: bool,
    #[serde(default)]
    pub reject_reason: String,
    #[serde(default)]
    pub reason: String,
}

impl VegaHedgeResult {
    fn rejected(reason: &str) -> Self {
        Self {
            rejected: true,
            reject_reason: reason.to_string(),
            ..Self::default()
        }
    }

    fn no_hedge(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
            ..Self::default()
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Clone)]
pub struct VegaHedgingEngine {
    config: VegaHedgingConfig,
}

impl VegaHedgingEngine {
    pub fn new(config: VegaHedgingConfig) -> Self {
        Self { config }
    }

    /// Check the portfolio's Vega drift and produce a hedge if warranted.
    ///
    /// Lots = round((target − total) / (instrument_vega · multiplier)),
    /// half-to-even; numeric overflow or a zero rounding result degrades to
    /// `should_hedge = false`, never an error.
    pub fn check_and_hedge(
        &self,
        portfolio_greeks: &PortfolioGreeks,
        current_price: f64,
    ) -> (VegaHedgeResult, Vec<DomainEvent>) {
        let cfg = &self.config;

        if cfg.hedge_instrument_multiplier <= 0.0 {
            warn!("vega hedge rejected: non-positive contract multiplier");
            return (VegaHedgeResult::rejected("invalid config: multiplier <= 0"), vec![]);
        }
        if cfg.hedge_instrument_vega == 0.0 {
            warn!("vega hedge rejected: hedge instrument vega is zero");
            return (VegaHedgeResult::rejected("hedge instrument vega is zero"), vec![]);
        }
        if current_price <= 0.0 {
            warn!(current_price, "vega hedge rejected: invalid price");
            return (VegaHedgeResult::rejected("current price <= 0"), vec![]);
        }

        let vega_diff = portfolio_greeks.total_vega - cfg.target_vega;
        if vega_diff.abs() <= cfg.hedging_band {
            debug!(
                vega_diff = format!("{vega_diff:.4}"),
                band = cfg.hedging_band,
                "vega inside tolerance band"
            );
            return (VegaHedgeResult::no_hedge("vega within tolerance band"), vec![]);
        }

        let denominator = cfg.hedge_instrument_vega * cfg.hedge_instrument_multiplier;
        let raw_volume = (cfg.target_vega - portfolio_greeks.total_vega) / denominator;
        if !raw_volume.is_finite() {
            return (VegaHedgeResult::no_hedge("hedge volume overflow"), vec![]);
        }

        let lots = round_half_to_even(raw_volume) as i64;
        if lots == 0 {
            return (VegaHedgeResult::no_hedge("hedge volume rounds to zero"), vec![]);
        }

        let (direction, direction_sign) = if lots > 0 {
            (Direction::Long, 1.0)
        } else {
            (Direction::Short, -1.0)
        };
        let hedge_volume = lots.abs();

        let impact = |per_lot: f64| -> f64 {
            hedge_volume as f64 * per_lot * cfg.hedge_instrument_multiplier * direction_sign
        };
        let delta_impact = impact(cfg.hedge_instrument_delta);
        let gamma_impact = impact(cfg.hedge_instrument_gamma);
        let theta_impact = impact(cfg.hedge_instrument_theta);

        let instruction = OrderInstruction {
            vt_symbol: cfg.hedge_instrument_vt_symbol.clone(),
            direction,
            offset: Offset::Open,
            volume: hedge_volume,
            price: current_price,
            signal: "vega_hedge".to_string(),
            order_type: OrderType::Limit,
        };

        let portfolio_vega_after = portfolio_greeks.total_vega
            + hedge_volume as f64
                * cfg.hedge_instrument_vega
                * cfg.hedge_instrument_multiplier
                * direction_sign;

        info!(
            hedge_volume,
            direction = %direction,
            vega_before = format!("{:.4}", portfolio_greeks.total_vega),
            vega_after = format!("{portfolio_vega_after:.4}"),
            delta_impact = format!("{delta_impact:.4}"),
            "vega hedge generated"
        );

        let event = DomainEvent::VegaHedgeExecuted(VegaHedgeExecuted {
            hedge_volume,
            hedge_direction: direction,
            portfolio_vega_before: portfolio_greeks.total_vega,
            portfolio_vega_after,
            hedge_instrument: cfg.hedge_instrument_vt_symbol.clone(),
            delta_impact,
            gamma_impact,
            theta_impact,
        });

        let result = VegaHedgeResult {
            should_hedge: true,
            hedge_volume,
            hedge_direction: Some(direction),
            instruction: Some(instruction),
            delta_impact,
            gamma_impact,
            theta_impact,
            rejected: false,
            reject_reason: String::new(),
            reason: format!(
                "vega drift {vega_diff:.4} beyond band {}",
                cfg.hedging_band
            ),
        };

        (result, vec![event])
    }
}

// =============================================================================
// Tests
// =============================================================================
