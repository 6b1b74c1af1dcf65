// =============================================================================
// Combination-level Greeks aggregation
// =============================================================================
//
// Per leg: weight = volume × multiplier × direction_sign, then each Greek
// accumulates greek_per_unit × weight. A leg whose Greeks are missing or
// unsuccessful is recorded in `failed_legs` and skipped — partial failure
// never aborts the aggregate.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::combination::entity::Combination;
use crate::types::GreeksResult;

/// Aggregated Greeks for one combination, plus the legs that could not be
/// priced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinationGreeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    #[serde(default)]
    pub failed_legs: Vec<String>,
}

/// Weighted sum of per-leg Greeks across a combination.
#[derive(Debug, Default)]
pub struct CombinationGreeksCalculator;

impl CombinationGreeksCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn calculate(
        &self,
        combination: &Combination,
        greeks_map: &HashMap<String, GreeksResult>,
        multiplier: f64,
    ) -> CombinationGreeks {
        let mut totals = CombinationGreeks::default();

        for leg in &combination.legs {
            let greeks = match greeks_map.get(&leg.vt_symbol) {
                Some(g) if g.success => g,
                _ => {
                    totals.failed_legs.push(leg.vt_symbol.clone());
                    continue;
                }
            };

            let weight = leg.volume as f64 * multiplier * leg.direction_sign();
            totals.delta += greeks.delta * weight;
            totals.gamma += greeks.gamma * weight;
            totals.theta += greeks.theta * weight;
            totals.vega += greeks.vega * weight;
        }

        totals
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combination::entity::{Combination, CombinationStatus, CombinationType, Leg};
    use crate::types::{Direction, OptionType};
    use chrono::NaiveDate;

    fn leg(vt_symbol: &str, option_type: OptionType, direction: Direction, volume: i64) -> Leg {
        Leg {
            vt_symbol: vt_symbol.to_string(),
            option_type,
            strike_price: 2800.0,
            expiry_date: "2025-06-15".to_string(),
            direction,
            volume,
            open_price: 100.0,
        }
    }

    fn combo(legs: Vec<Leg>) -> Combination {
        Combination {
            combination_id: "combo-1".to_string(),
            combination_type: CombinationType::Custom,
            underlying_vt_symbol: "m2506.DCE".to_string(),
            legs,
            status: CombinationStatus::Active,
            create_time: NaiveDate::from_ymd_opt(2025, 1, 15)
                .unwrap()
                .and_hms_opt(10, 30, 0)
                .unwrap(),
            close_time: None,
        }
    }

    #[test]
    fn short_straddle_aggregation_matches_hand_computation() {
        // Short 1 call (Δ 0.5, Γ 0.02, Θ -0.1, V 8) and short 1 put
        // (Δ -0.4, Γ 0.03, Θ -0.05, V 7), multiplier 10.
        let combination = combo(vec![
            leg("call", OptionType::Call, Direction::Short, 1),
            leg("put", OptionType::Put, Direction::Short, 1),
        ]);
        let mut greeks_map = HashMap::new();
        greeks_map.insert("call".to_string(), GreeksResult::ok(0.5, 0.02, -0.1, 8.0));
        greeks_map.insert("put".to_string(), GreeksResult::ok(-0.4, 0.03, -0.05, 7.0));

        let calc = CombinationGreeksCalculator::new();
        let result = calc.calculate(&combination, &greeks_map, 10.0);

        assert!((result.delta - -1.0).abs() < 1e-9);
        assert!((result.gamma - -0.5).abs() < 1e-9);
        assert!((result.theta - 1.5).abs() < 1e-9);
        assert!((result.vega - -150.0).abs() < 1e-9);
        assert!(result.failed_legs.is_empty());
    }

    #[test]
    fn flipping_direction_flips_every_contribution() {
        let greeks = GreeksResult::ok(0.5, 0.02, -0.1, 8.0);
        let mut greeks_map = HashMap::new();
        greeks_map.insert("call".to_string(), greeks);

        let calc = CombinationGreeksCalculator::new();
        let long = calc.calculate(
            &combo(vec![leg("call", OptionType::Call, Direction::Long, 2)]),
            &greeks_map,
            10.0,
        );
        let short = calc.calculate(
            &combo(vec![leg("call", OptionType::Call, Direction::Short, 2)]),
            &greeks_map,
            10.0,
        );

        assert!((long.delta + short.delta).abs() < 1e-9);
        assert!((long.gamma + short.gamma).abs() < 1e-9);
        assert!((long.theta + short.theta).abs() < 1e-9);
        assert!((long.vega + short.vega).abs() < 1e-9);
    }

    #[test]
    fn failed_and_missing_legs_are_recorded_and_skipped() {
        let combination = combo(vec![
            leg("priced", OptionType::Call, Direction::Long, 1),
            leg("failed", OptionType::Put, Direction::Long, 1),
            leg("missing", OptionType::Put, Direction::Long, 1),
        ]);
        let mut greeks_map = HashMap::new();
        greeks_map.insert("priced".to_string(), GreeksResult::ok(0.3, 0.01, -0.02, 5.0));
        greeks_map.insert("failed".to_string(), GreeksResult::failed());

        let calc = CombinationGreeksCalculator::new();
        let result = calc.calculate(&combination, &greeks_map, 10.0);

        assert_eq!(result.failed_legs, vec!["failed", "missing"]);
        // Only the priced leg contributes.
        assert!((result.delta - 3.0).abs() < 1e-9);
        assert!((result.vega - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_combination_yields_zero_greeks() {
        let combination = combo(vec![]);
        let calc = CombinationGreeksCalculator::new();
        let result = calc.calculate(&combination, &HashMap::new(), 10.0);
        assert_eq!(result, CombinationGreeks::default());
    }

    #[test]
    fn aggregate_equals_sum_of_single_leg_runs() {
        let legs = vec![
            leg("a", OptionType::Call, Direction::Long, 2),
            leg("b", OptionType::Put, Direction::Short, 3),
        ];
        let mut greeks_map = HashMap::new();
        greeks_map.insert("a".to_string(), GreeksResult::ok(0.4, 0.02, -0.03, 6.0));
        greeks_map.insert("b".to_string(), GreeksResult::ok(-0.3, 0.04, -0.01, 4.0));

        let calc = CombinationGreeksCalculator::new();
        let whole = calc.calculate(&combo(legs.clone()), &greeks_map, 10.0);

        let mut sum_delta = 0.0;
        let mut sum_vega = 0.0;
        for single in legs {
            let part = calc.calculate(&combo(vec![single]), &greeks_map, 10.0);
            sum_delta += part.delta;
            sum_vega += part.vega;
        }

        assert!((whole.delta - sum_delta).abs() < 1e-9);
        assert!((whole.vega - sum_vega).abs() < 1e-9);
    }
}
