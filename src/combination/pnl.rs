// =============================================================================
// Combination-level P&L
// =============================================================================
//
// Per leg: unrealized = (current − open) × volume × multiplier ×
// direction_sign. A leg without a current price contributes zero and is
// flagged `price_available = false`. Realized P&L is looked up from an
// optional per-symbol map supplied by the fill pipeline.
// =============================================================================

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::combination::entity::Combination;

/// P&L detail for a single leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegPnL {
    pub vt_symbol: String,
    pub unrealized_pnl: f64,
    pub price_available: bool,
    #[serde(default)]
    pub realized_pnl: f64,
}

/// Aggregated P&L across a combination's legs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationPnL {
    pub total_unrealized_pnl: f64,
    pub total_realized_pnl: f64,
    pub leg_details: Vec<LegPnL>,
    pub timestamp: NaiveDateTime,
}

/// Per-leg mark-to-market against the current price map.
#[derive(Debug, Default)]
pub struct CombinationPnLCalculator;

impl CombinationPnLCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn calculate(
        &self,
        combination: &Combination,
        current_prices: &HashMap<String, f64>,
        multiplier: f64,
        realized_pnl_map: Option<&HashMap<String, f64>>,
        now: NaiveDateTime,
    ) -> CombinationPnL {
        let mut leg_details = Vec::with_capacity(combination.legs.len());
        let mut total_unrealized = 0.0;
        let mut total_realized = 0.0;

        for leg in &combination.legs {
            let realized = realized_pnl_map
                .and_then(|m| m.get(&leg.vt_symbol).copied())
                .unwrap_or(0.0);
            total_realized += realized;

            match current_prices.get(&leg.vt_symbol) {
                Some(&current_price) => {
                    let pnl = (current_price - leg.open_price)
                        * leg.volume as f64
                        * multiplier
                        * leg.direction_sign();
                    total_unrealized += pnl;
                    leg_details.push(LegPnL {
                        vt_symbol: leg.vt_symbol.clone(),
                        unrealized_pnl: pnl,
                        price_available: true,
                        realized_pnl: realized,
                    });
                }
                None => {
                    leg_details.push(LegPnL {
                        vt_symbol: leg.vt_symbol.clone(),
                        unrealized_pnl: 0.0,
                        price_available: false,
                        realized_pnl: realized,
                    });
                }
            }
        }

        CombinationPnL {
            total_unrealized_pnl: total_unrealized,
            total_realized_pnl: total_realized,
            leg_details,
            timestamp: now,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
