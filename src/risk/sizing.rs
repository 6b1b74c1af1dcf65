// =============================================================================
// Position sizing — lot count for a new short-option position under margin,
// margin-usage and portfolio-Greek bounds
// =============================================================================
//
// The final volume is the minimum of three independent upper bounds, clamped
// to [0, max_volume_per_order]:
//   1. margin volume:  floor(available_funds / margin_per_lot)
//   2. usage volume:   largest n with (used + n·margin)/equity ≤ usage_limit
//   3. greeks volume:  per-dimension budget (limit − |portfolio|) divided by
//      the per-lot footprint, minimum across dimensions
//
// Rejections happen in that order, each with a stable reason string.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{
    Direction, GreeksResult, Offset, OrderInstruction, OrderType, PortfolioGreeks, Position,
    RiskThresholds,
};

// =============================================================================
// Configuration
// =============================================================================

fn default_max_positions() -> usize {
    5
}

fn default_global_daily_limit() -> i64 {
    50
}

fn default_contract_daily_limit() -> i64 {
    2
}

fn default_margin_ratio() -> f64 {
    0.12
}

fn default_min_margin_ratio() -> f64 {
    0.07
}

fn default_margin_usage_limit() -> f64 {
    0.6
}

fn default_max_volume_per_order() -> i64 {
    10
}

/// Position-sizing knobs; every field has a serde default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionSizingConfig {
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    #[serde(default = "default_global_daily_limit")]
    pub global_daily_limit: i64,
    #[serde(default = "default_contract_daily_limit")]
    pub contract_daily_limit: i64,
    #[serde(default = "default_margin_ratio")]
    pub margin_ratio: f64,
    #[serde(default = "default_min_margin_ratio")]
    pub min_margin_ratio: f64,
    #[serde(default = "default_margin_usage_limit")]
    pub margin_usage_limit: f64,
    #[serde(default = "default_max_volume_per_order")]
    pub max_volume_per_order: i64,
}

impl Default for PositionSizingConfig {
    fn default() -> Self {
        Self {
            max_positions: default_max_positions(),
            global_daily_limit: default_global_daily_limit(),
            contract_daily_limit: default_contract_daily_limit(),
            margin_ratio: default_margin_ratio(),
            min_margin_ratio: default_min_margin_ratio(),
            margin_usage_limit: default_margin_usage_limit(),
            max_volume_per_order: default_max_volume_per_order(),
        }
    }
}

// =============================================================================
// Result
// =============================================================================

/// Full sizing breakdown: the per-dimension intermediate volumes and Greek
/// budgets survive into the result for audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingResult {
    pub passed: bool,
    pub final_volume: i64,
    pub margin_per_lot: f64,
    pub margin_volume: i64,
    pub usage_volume: i64,
    pub greeks_volume: i64,
    pub delta_budget: f64,
    pub gamma_budget: f64,
    pub vega_budget: f64,
    #[serde(default)]
    pub reject_reason: String,
}

impl SizingResult {
    fn rejected(reason: &str, margin_per_lot: f64) -> Self {
        Self {
            passed: false,
            final_volume: 0,
            margin_per_lot,
            margin_volume: 0,
            usage_volume: 0,
            greeks_volume: 0,
            delta_budget: 0.0,
            gamma_budget: 0.0,
            vega_budget: 0.0,
            reject_reason: reason.to_string(),
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// Lot sizing plus the daily open-limit gate for the short-option strategy.
#[derive(Debug, Clone)]
pub struct PositionSizingService {
    config: PositionSizingConfig,
}

impl PositionSizingService {
    pub fn new(config: PositionSizingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PositionSizingConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Margin estimate
    // -------------------------------------------------------------------------

    /// Exchange-style short-option margin per lot:
    /// premium + max(underlying·mult·margin_ratio − OTM_amount,
    ///              underlying·mult·min_margin_ratio)
    ///
    /// OTM amount: puts max(strike − underlying, 0)·mult,
    ///             calls max(underlying − strike, 0)·mult.
    pub fn estimate_margin(
        &self,
        contract_price: f64,
        underlying_price: f64,
        strike_price: f64,
        option_type: crate::types::OptionType,
        multiplier: f64,
    ) -> f64 {
        let out_of_money = match option_type {
            crate::types::OptionType::Put => (strike_price - underlying_price).max(0.0) * multiplier,
            crate::types::OptionType::Call => {
                (underlying_price - strike_price).max(0.0) * multiplier
            }
        };

        let premium = contract_price * multiplier;
        premium
            + (underlying_price * multiplier * self.config.margin_ratio - out_of_money)
                .max(underlying_price * multiplier * self.config.min_margin_ratio)
    }

    // -------------------------------------------------------------------------
    // Three-bound sizing
    // -------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn compute_sizing(
        &self,
        account_balance: f64,
        total_equity: f64,
        used_margin: f64,
        contract_price: f64,
        underlying_price: f64,
        strike_price: f64,
        option_type: crate::types::OptionType,
        multiplier: f64,
        greeks: &GreeksResult,
        portfolio_greeks: &PortfolioGreeks,
        risk_thresholds: &RiskThresholds,
    ) -> SizingResult {
        let margin_per_lot = self.estimate_margin(
            contract_price,
            underlying_price,
            strike_price,
            option_type,
            multiplier,
        );
        if !(margin_per_lot > 0.0) || !margin_per_lot.is_finite() {
            return SizingResult::rejected("margin estimate invalid", margin_per_lot);
        }

        let margin_volume = (account_balance / margin_per_lot).floor() as i64;
        if margin_volume < 1 {
            return SizingResult::rejected("insufficient funds", margin_per_lot);
        }

        let usage_headroom = self.config.margin_usage_limit * total_equity - used_margin;
        let usage_volume = (usage_headroom / margin_per_lot).floor() as i64;
        if usage_volume < 1 {
            return SizingResult::rejected("margin usage exceeded", margin_per_lot);
        }

        // Per-dimension Greek budgets. A zero per-lot footprint leaves that
        // dimension unbounded.
        let delta_budget = risk_thresholds.portfolio_delta_limit - portfolio_greeks.total_delta.abs();
        let gamma_budget = risk_thresholds.portfolio_gamma_limit - portfolio_greeks.total_gamma.abs();
        let vega_budget = risk_thresholds.portfolio_vega_limit - portfolio_greeks.total_vega.abs();

        let dims = [
            ("delta", greeks.delta, delta_budget),
            ("gamma", greeks.gamma, gamma_budget),
            ("vega", greeks.vega, vega_budget),
        ];

        let mut greeks_volume = i64::MAX;
        let mut violated: Vec<&str> = Vec::new();
        for (name, per_lot, budget) in dims {
            if per_lot == 0.0 {
                continue;
            }
            let lots = (budget / (per_lot * multiplier).abs()).floor() as i64;
            if lots < 1 {
                violated.push(name);
            }
            greeks_volume = greeks_volume.min(lots.max(0));
        }
        if !violated.is_empty() {
            let mut result = SizingResult::rejected(
                &format!("greeks exceeded ({})", violated.join(", ")),
                margin_per_lot,
            );
            result.margin_volume = margin_volume;
            result.usage_volume = usage_volume;
            result.delta_budget = delta_budget;
            result.gamma_budget = gamma_budget;
            result.vega_budget = vega_budget;
            return result;
        }

        let final_volume = margin_volume
            .min(usage_volume)
            .min(greeks_volume)
            .min(self.config.max_volume_per_order)
            .max(0);

        info!(
            final_volume,
            margin_volume,
            usage_volume,
            greeks_volume,
            margin_per_lot = format!("{margin_per_lot:.2}"),
            "position sizing computed"
        );

        SizingResult {
            passed: final_volume >= 1,
            final_volume,
            margin_per_lot,
            margin_volume,
            usage_volume,
            greeks_volume,
            delta_budget,
            gamma_budget,
            vega_budget,
            reject_reason: String::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Daily-limit gated instruction generation
    // -------------------------------------------------------------------------

    /// Gate a new short-open against position-count and daily limits, then
    /// emit a one-lot short OPEN instruction.
    ///
    /// Returns `None` (no trade) when: active positions ≥ max_positions, a
    /// daily limit would be exceeded, the symbol is already held, or the
    /// contract price is non-positive.
    pub fn calculate_open_instruction(
        &self,
        signal: &str,
        vt_symbol: &str,
        contract_price: f64,
        current_positions: &[Position],
        daily_open_count: i64,
        contract_open_count: i64,
    ) -> Option<OrderInstruction> {
        let active: Vec<&Position> = current_positions.iter().filter(|p| p.is_active).collect();
        if active.len() >= self.config.max_positions {
            debug!(vt_symbol, active = active.len(), "open refused: max positions reached");
            return None;
        }
        if daily_open_count + 1 > self.config.global_daily_limit {
            debug!(vt_symbol, daily_open_count, "open refused: global daily limit");
            return None;
        }
        if contract_open_count + 1 > self.config.contract_daily_limit {
            debug!(vt_symbol, contract_open_count, "open refused: contract daily limit");
            return None;
        }
        if active.iter().any(|p| p.vt_symbol == vt_symbol) {
            debug!(vt_symbol, "open refused: symbol already held");
            return None;
        }
        if contract_price <= 0.0 {
            debug!(vt_symbol, contract_price, "open refused: invalid contract price");
            return None;
        }

        Some(OrderInstruction {
            vt_symbol: vt_symbol.to_string(),
            direction: Direction::Short,
            offset: Offset::Open,
            volume: 1,
            price: contract_price,
            signal: signal.to_string(),
            order_type: OrderType::Limit,
        })
    }

    /// Close instruction for an active position: full volume, long close.
    pub fn calculate_close_instruction(
        &self,
        position: &Position,
        close_price: f64,
        signal: &str,
    ) -> Option<OrderInstruction> {
        if !position.is_active || position.volume <= 0 {
            return None;
        }
        Some(OrderInstruction {
            vt_symbol: position.vt_symbol.clone(),
            direction: position.direction.reversed(),
            offset: Offset::Close,
            volume: position.volume,
            price: close_price,
            signal: signal.to_string(),
            order_type: OrderType::Limit,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
