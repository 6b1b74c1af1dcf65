// =============================================================================
// Combination facade — Greeks, P&L and risk composed into one evaluation
// =============================================================================
//
// Steps run in order: Greeks → P&L → risk. The risk check always consumes the
// Greeks computed in this call, never a cached value. An error in any step
// propagates unchanged and skips the later steps.
// =============================================================================

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::combination::entity::Combination;
use crate::combination::greeks::{CombinationGreeks, CombinationGreeksCalculator};
use crate::combination::pnl::{CombinationPnL, CombinationPnLCalculator};
use crate::combination::risk::CombinationRiskChecker;
use crate::types::{GreeksResult, RiskCheckResult};

/// The full evaluation of one combination at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationEvaluation {
    pub greeks: CombinationGreeks,
    pub pnl: CombinationPnL,
    pub risk_result: RiskCheckResult,
}

/// High-level evaluation entry point over the three combination services.
pub struct CombinationFacade {
    greeks_calculator: CombinationGreeksCalculator,
    pnl_calculator: CombinationPnLCalculator,
    risk_checker: CombinationRiskChecker,
}

impl CombinationFacade {
    pub fn new(
        greeks_calculator: CombinationGreeksCalculator,
        pnl_calculator: CombinationPnLCalculator,
        risk_checker: CombinationRiskChecker,
    ) -> Self {
        Self {
            greeks_calculator,
            pnl_calculator,
            risk_checker,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &self,
        combination: &Combination,
        greeks_map: &HashMap<String, GreeksResult>,
        current_prices: &HashMap<String, f64>,
        multiplier: f64,
        realized_pnl_map: Option<&HashMap<String, f64>>,
        now: NaiveDateTime,
    ) -> CombinationEvaluation {
        let greeks = self
            .greeks_calculator
            .calculate(combination, greeks_map, multiplier);
        let pnl = self.pnl_calculator.calculate(
            combination,
            current_prices,
            multiplier,
            realized_pnl_map,
            now,
        );
        let risk_result = self.risk_checker.check(&greeks);

        CombinationEvaluation {
            greeks,
            pnl,
            risk_result,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
