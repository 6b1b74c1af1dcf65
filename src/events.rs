// =============================================================================
// Domain events — immutable records of state changes, drained FIFO by the
// application layer
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::Direction;

/// Emitted when `sync_status` moves a combination to a new lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinationStatusChanged {
    pub combination_id: String,
    pub old_status: String,
    pub new_status: String,
    pub combination_type: String,
}

/// Emitted when the Vega hedging engine decides to hedge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegaHedgeExecuted {
    pub hedge_volume: i64,
    pub hedge_direction: Direction,
    pub portfolio_vega_before: f64,
    pub portfolio_vega_after: f64,
    pub hedge_instrument: String,
    pub delta_impact: f64,
    pub gamma_impact: f64,
    pub theta_impact: f64,
}

/// Emitted when a single position crosses a fixed or trailing stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLossTriggered {
    pub vt_symbol: String,
    /// "fixed" or "trailing".
    pub trigger_type: String,
    pub current_loss: f64,
    pub threshold: f64,
    pub current_price: f64,
    pub open_price: f64,
    pub message: String,
}

/// Emitted when the day's portfolio loss exceeds the daily limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStopLossTriggered {
    pub total_loss: f64,
    pub daily_limit: f64,
    pub positions_to_close: Vec<String>,
    pub message: String,
}

/// Emitted when a position's or the portfolio's Greeks cross the configured
/// thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreeksRiskBreached {
    /// "position" or "portfolio".
    pub scope: String,
    /// Offending contract; empty for portfolio-scope breaches.
    pub vt_symbol: String,
    pub reason: String,
}

/// Emitted when a held contract's liquidity score falls below threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityDeteriorated {
    pub vt_symbol: String,
    pub current_score: f64,
    pub threshold: f64,
    pub trend: String,
    pub message: String,
}

/// Union of every domain event the core can produce. Consumers dispatch on
/// the variant; producers push into an aggregate's pending queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    CombinationStatusChanged(CombinationStatusChanged),
    VegaHedgeExecuted(VegaHedgeExecuted),
    StopLossTriggered(StopLossTriggered),
    PortfolioStopLossTriggered(PortfolioStopLossTriggered),
    GreeksRiskBreached(GreeksRiskBreached),
    LiquidityDeteriorated(LiquidityDeteriorated),
}
