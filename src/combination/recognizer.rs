// =============================================================================
// Combination recognizer — maps a raw position structure to a combination
// type by priority-ordered table lookup
// =============================================================================
//
// Priority: IRON_CONDOR → STRADDLE → STRANGLE → VERTICAL_SPREAD →
// CALENDAR_SPREAD. First match wins; anything unmatched is CUSTOM.
//
// Missing contract data, an empty position list, or mixed underlyings all
// degrade to CUSTOM rather than erroring — recognition is a best-effort
// classification, never a gate.
// =============================================================================

use std::collections::HashMap;

use crate::combination::entity::CombinationType;
use crate::combination::rules::{
    validate_calendar_spread, validate_iron_condor, validate_straddle, validate_strangle,
    validate_vertical_spread, LegStructure, StructureValidator,
};
use crate::market::OptionContract;
use crate::types::Position;

/// One row of the recognition table: a candidate type, its required leg
/// count, and the structural rule it must satisfy.
struct MatchRule {
    combination_type: CombinationType,
    leg_count: usize,
    validator: StructureValidator,
}

/// Priority-ordered recognition rules. Table order IS the priority.
const RULES: [MatchRule; 5] = [
    MatchRule {
        combination_type: CombinationType::IronCondor,
        leg_count: 4,
        validator: validate_iron_condor,
    },
    MatchRule {
        combination_type: CombinationType::Straddle,
        leg_count: 2,
        validator: validate_straddle,
    },
    MatchRule {
        combination_type: CombinationType::Strangle,
        leg_count: 2,
        validator: validate_strangle,
    },
    MatchRule {
        combination_type: CombinationType::VerticalSpread,
        leg_count: 2,
        validator: validate_vertical_spread,
    },
    MatchRule {
        combination_type: CombinationType::CalendarSpread,
        leg_count: 2,
        validator: validate_calendar_spread,
    },
];

/// Deterministic structure → type classifier.
#[derive(Debug, Default)]
pub struct CombinationRecognizer;

impl CombinationRecognizer {
    pub fn new() -> Self {
        Self
    }

    /// Classify `positions` against the contract map.
    ///
    /// Returns `Custom` for: empty input, any position without contract data,
    /// mixed underlyings, or a structure matching none of the table rules.
    pub fn recognize(
        &self,
        positions: &[Position],
        contracts: &HashMap<String, OptionContract>,
    ) -> CombinationType {
        if positions.is_empty() {
            return CombinationType::Custom;
        }

        let mut option_contracts: Vec<&OptionContract> = Vec::with_capacity(positions.len());
        for position in positions {
            match contracts.get(&position.vt_symbol) {
                Some(contract) => option_contracts.push(contract),
                None => return CombinationType::Custom,
            }
        }

        if !same_underlying(&option_contracts) {
            return CombinationType::Custom;
        }

        let structures: Vec<LegStructure> = option_contracts
            .iter()
            .map(|c| LegStructure {
                option_type: c.option_type,
                strike_price: c.strike_price,
                expiry_date: c.expiry_date.clone(),
            })
            .collect();

        for rule in &RULES {
            if positions.len() == rule.leg_count && (rule.validator)(&structures).is_ok() {
                return rule.combination_type;
            }
        }

        CombinationType::Custom
    }
}

fn same_underlying(contracts: &[&OptionContract]) -> bool {
    match contracts.first() {
        None => true,
        Some(first) => contracts
            .iter()
            .all(|c| c.underlying_symbol == first.underlying_symbol),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, OptionType};

    fn contract(vt_symbol: &str, option_type: OptionType, strike: f64, expiry: &str) -> OptionContract {
        OptionContract {
            vt_symbol: vt_symbol.to_string(),
            underlying_symbol: "m2506".to_string(),
            option_type,
            strike_price: strike,
            expiry_date: expiry.to_string(),
            bid_price: 0.0,
            bid_volume: 0,
            ask_price: 0.0,
            ask_volume: 0,
            days_to_expiry: 30,
            diff1: 0.0,
        }
    }

    fn position(vt_symbol: &str) -> Position {
        Position {
            vt_symbol: vt_symbol.to_string(),
            direction: Direction::Short,
            volume: 1,
            open_price: 100.0,
            is_active: true,
        }
    }

    fn setup(
        specs: &[(&str, OptionType, f64, &str)],
    ) -> (Vec<Position>, HashMap<String, OptionContract>) {
        let mut contracts = HashMap::new();
        let mut positions = Vec::new();
        for (sym, option_type, strike, expiry) in specs {
            contracts.insert(sym.to_string(), contract(sym, *option_type, *strike, expiry));
            positions.push(position(sym));
        }
        (positions, contracts)
    }

    #[test]
    fn recognizes_straddle() {
        let (positions, contracts) = setup(&[
            ("c100", OptionType::Call, 100.0, "2025-06-15"),
            ("p100", OptionType::Put, 100.0, "2025-06-15"),
        ]);
        let recognizer = CombinationRecognizer::new();
        assert_eq!(
            recognizer.recognize(&positions, &contracts),
            CombinationType::Straddle
        );
    }

    #[test]
    fn recognizes_strangle_on_strike_change() {
        let (positions, contracts) = setup(&[
            ("c100", OptionType::Call, 100.0, "2025-06-15"),
            ("p110", OptionType::Put, 110.0, "2025-06-15"),
        ]);
        let recognizer = CombinationRecognizer::new();
        assert_eq!(
            recognizer.recognize(&positions, &contracts),
            CombinationType::Strangle
        );
    }

    #[test]
    fn recognizes_vertical_spread() {
        let (positions, contracts) = setup(&[
            ("c100", OptionType::Call, 100.0, "2025-06-15"),
            ("c110", OptionType::Call, 110.0, "2025-06-15"),
        ]);
        let recognizer = CombinationRecognizer::new();
        assert_eq!(
            recognizer.recognize(&positions, &contracts),
            CombinationType::VerticalSpread
        );
    }

    #[test]
    fn recognizes_calendar_spread() {
        let (positions, contracts) = setup(&[
            ("c100a", OptionType::Call, 100.0, "2025-06-15"),
            ("c100b", OptionType::Call, 100.0, "2025-09-15"),
        ]);
        let recognizer = CombinationRecognizer::new();
        assert_eq!(
            recognizer.recognize(&positions, &contracts),
            CombinationType::CalendarSpread
        );
    }

    #[test]
    fn iron_condor_wins_at_four_legs() {
        let (positions, contracts) = setup(&[
            ("p60", OptionType::Put, 60.0, "2025-06-15"),
            ("p70", OptionType::Put, 70.0, "2025-06-15"),
            ("c90", OptionType::Call, 90.0, "2025-06-15"),
            ("c95", OptionType::Call, 95.0, "2025-06-15"),
        ]);
        let recognizer = CombinationRecognizer::new();
        assert_eq!(
            recognizer.recognize(&positions, &contracts),
            CombinationType::IronCondor
        );
    }

    #[test]
    fn single_position_is_custom() {
        let (positions, contracts) = setup(&[("c100", OptionType::Call, 100.0, "2025-06-15")]);
        let recognizer = CombinationRecognizer::new();
        assert_eq!(
            recognizer.recognize(&positions, &contracts),
            CombinationType::Custom
        );
    }

    #[test]
    fn empty_input_is_custom() {
        let recognizer = CombinationRecognizer::new();
        assert_eq!(
            recognizer.recognize(&[], &HashMap::new()),
            CombinationType::Custom
        );
    }

    #[test]
    fn missing_contract_data_is_custom() {
        let (mut positions, contracts) = setup(&[
            ("c100", OptionType::Call, 100.0, "2025-06-15"),
            ("p100", OptionType::Put, 100.0, "2025-06-15"),
        ]);
        positions.push(position("unknown-symbol"));
        let recognizer = CombinationRecognizer::new();
        assert_eq!(
            recognizer.recognize(&positions, &contracts),
            CombinationType::Custom
        );
    }

    #[test]
    fn mixed_underlyings_are_custom() {
        let (positions, mut contracts) = setup(&[
            ("c100", OptionType::Call, 100.0, "2025-06-15"),
            ("p100", OptionType::Put, 100.0, "2025-06-15"),
        ]);
        contracts.get_mut("p100").unwrap().underlying_symbol = "rb2506".to_string();
        let recognizer = CombinationRecognizer::new();
        assert_eq!(
            recognizer.recognize(&positions, &contracts),
            CombinationType::Custom
        );
    }
}
