// =============================================================================
// Stop-loss manager — fixed, trailing and portfolio-level stops
// =============================================================================
//
// Per position, PnL = (current − open) × volume × multiplier ×
// direction_sign. Fixed stops fire on absolute loss or loss as a fraction of
// open value; trailing stops fire on drawdown from peak profit (only once a
// position has actually been in profit). The portfolio stop compares the
// day's equity drawdown against a hard limit and names every active position
// for closing.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::events::{PortfolioStopLossTriggered, StopLossTriggered};
use crate::types::Position;

// =============================================================================
// Configuration
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_fixed_stop_loss_amount() -> f64 {
    10_000.0
}

fn default_fixed_stop_loss_percent() -> f64 {
    0.5
}

fn default_trailing_stop_percent() -> f64 {
    0.3
}

fn default_daily_loss_limit() -> f64 {
    50_000.0
}

fn default_multiplier() -> f64 {
    10_000.0
}

/// Stop-loss thresholds and feature switches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopLossConfig {
    #[serde(default = "default_true")]
    pub enable_fixed_stop: bool,
    /// Absolute loss per position that trips the fixed stop.
    #[serde(default = "default_fixed_stop_loss_amount")]
    pub fixed_stop_loss_amount: f64,
    /// Loss as a fraction of open value that trips the fixed stop.
    #[serde(default = "default_fixed_stop_loss_percent")]
    pub fixed_stop_loss_percent: f64,

    #[serde(default = "default_true")]
    pub enable_trailing_stop: bool,
    /// Drawdown fraction from peak profit that trips the trailing stop.
    #[serde(default = "default_trailing_stop_percent")]
    pub trailing_stop_percent: f64,

    #[serde(default = "default_true")]
    pub enable_portfolio_stop: bool,
    /// Maximum tolerated equity loss since the daily start.
    #[serde(default = "default_daily_loss_limit")]
    pub daily_loss_limit: f64,

    /// Contract multiplier applied in the per-position PnL formula.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for StopLossConfig {
    fn default() -> Self {
        Self {
            enable_fixed_stop: true,
            fixed_stop_loss_amount: default_fixed_stop_loss_amount(),
            fixed_stop_loss_percent: default_fixed_stop_loss_percent(),
            enable_trailing_stop: true,
            trailing_stop_percent: default_trailing_stop_percent(),
            enable_portfolio_stop: true,
            daily_loss_limit: default_daily_loss_limit(),
            multiplier: default_multiplier(),
        }
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Monitors position and portfolio losses against the configured stops.
#[derive(Debug, Clone)]
pub struct StopLossManager {
    config: StopLossConfig,
}

impl StopLossManager {
    pub fn new(config: StopLossConfig) -> Self {
        Self { config }
    }

    /// Mark-to-market PnL for one position.
    pub fn position_pnl(&self, position: &Position, current_price: f64) -> f64 {
        (current_price - position.open_price)
            * position.volume as f64
            * self.config.multiplier
            * position.direction.sign()
    }

    /// Check one position against the fixed and trailing stops.
    ///
    /// `peak_profit` is the highest PnL the position has reached; the caller
    /// tracks it across ticks. Fixed stops take priority over trailing.
    pub fn check_position_stop_loss(
        &self,
        position: &Position,
        current_price: f64,
        peak_profit: f64,
    ) -> Option<StopLossTriggered> {
        if !position.is_active || position.volume <= 0 {
            return None;
        }

        let pnl = self.position_pnl(position, current_price);

        if self.config.enable_fixed_stop {
            if let Some(trigger) = self.check_fixed_stop(position, current_price, pnl) {
                return Some(trigger);
            }
        }

        if self.config.enable_trailing_stop && peak_profit > 0.0 {
            if let Some(trigger) =
                self.check_trailing_stop(position, current_price, pnl, peak_profit)
            {
                return Some(trigger);
            }
        }

        None
    }

    fn check_fixed_stop(
        &self,
        position: &Position,
        current_price: f64,
        pnl: f64,
    ) -> Option<StopLossTriggered> {
        if pnl >= 0.0 {
            return None;
        }
        let loss = -pnl;

        if loss >= self.config.fixed_stop_loss_amount {
            let message = format!(
                "fixed stop (amount): loss {loss:.2} >= {:.2}",
                self.config.fixed_stop_loss_amount
            );
            warn!(vt_symbol = %position.vt_symbol, loss, "fixed stop-loss triggered");
            return Some(StopLossTriggered {
                vt_symbol: position.vt_symbol.clone(),
                trigger_type: "fixed".to_string(),
                current_loss: loss,
                threshold: self.config.fixed_stop_loss_amount,
                current_price,
                open_price: position.open_price,
                message,
            });
        }

        let open_value = position.open_price * position.volume as f64 * self.config.multiplier;
        if open_value > 0.0 {
            let loss_percent = loss / open_value;
            if loss_percent >= self.config.fixed_stop_loss_percent {
                let message = format!(
                    "fixed stop (percent): loss fraction {loss_percent:.4} >= {:.4}",
                    self.config.fixed_stop_loss_percent
                );
                warn!(vt_symbol = %position.vt_symbol, loss_percent, "fixed stop-loss triggered");
                return Some(StopLossTriggered {
                    vt_symbol: position.vt_symbol.clone(),
                    trigger_type: "fixed".to_string(),
                    current_loss: loss,
                    threshold: self.config.fixed_stop_loss_percent * open_value,
                    current_price,
                    open_price: position.open_price,
                    message,
                });
            }
        }

        None
    }

    fn check_trailing_stop(
        &self,
        position: &Position,
        current_price: f64,
        pnl: f64,
        peak_profit: f64,
    ) -> Option<StopLossTriggered> {
        let drawdown = peak_profit - pnl;
        let drawdown_percent = drawdown / peak_profit;

        if drawdown_percent >= self.config.trailing_stop_percent {
            let message = format!(
                "trailing stop: drawdown {drawdown_percent:.4} from peak {peak_profit:.2} >= {:.4}",
                self.config.trailing_stop_percent
            );
            warn!(vt_symbol = %position.vt_symbol, drawdown, peak_profit, "trailing stop-loss triggered");
            return Some(StopLossTriggered {
                vt_symbol: position.vt_symbol.clone(),
                trigger_type: "trailing".to_string(),
                current_loss: drawdown,
                threshold: self.config.trailing_stop_percent * peak_profit,
                current_price,
                open_price: position.open_price,
                message,
            });
        }
        None
    }

    /// Portfolio stop: fires when the day's equity loss exceeds the limit,
    /// listing every active position for closing.
    pub fn check_portfolio_stop_loss(
        &self,
        positions: &[Position],
        daily_start_equity: f64,
        current_equity: f64,
    ) -> Option<PortfolioStopLossTriggered> {
        if !self.config.enable_portfolio_stop {
            return None;
        }

        let total_loss = daily_start_equity - current_equity;
        if total_loss > self.config.daily_loss_limit {
            let positions_to_close: Vec<String> = positions
                .iter()
                .filter(|p| p.is_active)
                .map(|p| p.vt_symbol.clone())
                .collect();
            let message = format!(
                "portfolio stop: daily loss {total_loss:.2} exceeds limit {:.2}",
                self.config.daily_loss_limit
            );
            info!(
                total_loss,
                limit = self.config.daily_loss_limit,
                count = positions_to_close.len(),
                "portfolio stop-loss triggered"
            );
            return Some(PortfolioStopLossTriggered {
                total_loss,
                daily_limit: self.config.daily_loss_limit,
                positions_to_close,
                message,
            });
        }
        None
    }
}

// =============================================================================
// Tests
// =============================================================================
