// =============================================================================
// Combination lifecycle service — open / close / adjust instruction
// generation
// =============================================================================

use std::collections::HashMap;

use thiserror::Error;

use crate::combination::entity::Combination;
use crate::types::{Offset, OrderInstruction, OrderType};

/// Why an adjust request produced no instruction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdjustError {
    #[error("leg {vt_symbol} not found in combination {combination_id}")]
    LegNotFound {
        combination_id: String,
        vt_symbol: String,
    },
    /// Requested volume equals the current volume; nothing to do.
    #[error("new volume {volume} equals current volume, no adjustment needed")]
    NoOp { volume: i64 },
}

/// Generates order instructions for combination lifecycle operations.
#[derive(Debug, Default)]
pub struct CombinationLifecycleService;

impl CombinationLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// One OPEN instruction per leg, in leg order. Direction maps straight
    /// from the leg; price comes from `price_map` or 0.0 when absent.
    pub fn generate_open_instructions(
        &self,
        combination: &Combination,
        price_map: &HashMap<String, f64>,
    ) -> Vec<OrderInstruction> {
        combination
            .legs
            .iter()
            .map(|leg| OrderInstruction {
                vt_symbol: leg.vt_symbol.clone(),
                direction: leg.direction,
                offset: Offset::Open,
                volume: leg.volume,
                price: price_map.get(&leg.vt_symbol).copied().unwrap_or(0.0),
                signal: String::new(),
                order_type: OrderType::Limit,
            })
            .collect()
    }

    /// One CLOSE instruction per active leg (volume > 0), direction reversed.
    /// Fully-closed legs are skipped.
    pub fn generate_close_instructions(
        &self,
        combination: &Combination,
        price_map: &HashMap<String, f64>,
    ) -> Vec<OrderInstruction> {
        combination
            .active_legs()
            .into_iter()
            .map(|leg| OrderInstruction {
                vt_symbol: leg.vt_symbol.clone(),
                direction: leg.direction.reversed(),
                offset: Offset::Close,
                volume: leg.volume,
                price: price_map.get(&leg.vt_symbol).copied().unwrap_or(0.0),
                signal: String::new(),
                order_type: OrderType::Limit,
            })
            .collect()
    }

    /// One instruction adjusting a single leg to `new_volume`:
    ///
    /// - larger  → OPEN for the difference, same direction
    /// - smaller → CLOSE for the difference, reversed direction
    /// - equal   → `AdjustError::NoOp`
    /// - unknown leg → `AdjustError::LegNotFound`
    pub fn generate_adjust_instruction(
        &self,
        combination: &Combination,
        leg_vt_symbol: &str,
        new_volume: i64,
        current_price: f64,
    ) -> Result<OrderInstruction, AdjustError> {
        let leg = combination
            .leg(leg_vt_symbol)
            .ok_or_else(|| AdjustError::LegNotFound {
                combination_id: combination.combination_id.clone(),
                vt_symbol: leg_vt_symbol.to_string(),
            })?;

        let diff = new_volume - leg.volume;
        if diff == 0 {
            return Err(AdjustError::NoOp { volume: new_volume });
        }

        let (direction, offset, volume) = if diff > 0 {
            (leg.direction, Offset::Open, diff)
        } else {
            (leg.direction.reversed(), Offset::Close, -diff)
        };

        Ok(OrderInstruction {
            vt_symbol: leg_vt_symbol.to_string(),
            direction,
            offset,
            volume,
            price: current_price,
            signal: String::new(),
            order_type: OrderType::Limit,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combination::entity::{CombinationStatus, CombinationType, Leg};
    use crate::types::{Direction, OptionType};
    use chrono::NaiveDate;

    fn leg(vt_symbol: &str, direction: Direction, volume: i64) -> Leg {
        Leg {
            vt_symbol: vt_symbol.to_string(),
            option_type: OptionType::Call,
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
    fn open_instructions_mirror_legs() {
        let combination = combo(vec![
            leg("call", Direction::Short, 1),
            leg("put", Direction::Short, 2),
        ]);
        let mut prices = HashMap::new();
        prices.insert("call".to_string(), 120.0);

        let service = CombinationLifecycleService::new();
        let instructions = service.generate_open_instructions(&combination, &prices);

        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].direction, Direction::Short);
        assert_eq!(instructions[0].offset, Offset::Open);
        assert_eq!(instructions[0].price, 120.0);
        // Missing price falls back to 0.0.
        assert_eq!(instructions[1].price, 0.0);
        assert_eq!(instructions[1].volume, 2);
    }

    #[test]
    fn close_reverses_direction_and_skips_closed_legs() {
        let combination = combo(vec![
            leg("call", Direction::Short, 1),
            leg("put", Direction::Short, 0), // already closed
        ]);
        let service = CombinationLifecycleService::new();
        let instructions = service.generate_close_instructions(&combination, &HashMap::new());

        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].vt_symbol, "call");
        assert_eq!(instructions[0].direction, Direction::Long);
        assert_eq!(instructions[0].offset, Offset::Close);
        assert_eq!(instructions[0].volume, 1);
    }

    #[test]
    fn open_and_close_are_symmetric() {
        let combination = combo(vec![
            leg("a", Direction::Long, 3),
            leg("b", Direction::Short, 2),
        ]);
        let service = CombinationLifecycleService::new();
        let opens = service.generate_open_instructions(&combination, &HashMap::new());
        let closes = service.generate_close_instructions(&combination, &HashMap::new());

        assert_eq!(opens.len(), closes.len());
        for (open, close) in opens.iter().zip(&closes) {
            assert_eq!(open.vt_symbol, close.vt_symbol);
            assert_eq!(open.volume, close.volume);
            assert_eq!(open.direction, close.direction.reversed());
            assert_eq!(open.offset, Offset::Open);
            assert_eq!(close.offset, Offset::Close);
        }
    }

    #[test]
    fn adjust_up_opens_the_difference() {
        let combination = combo(vec![leg("a", Direction::Short, 2)]);
        let service = CombinationLifecycleService::new();
        let instr = service
            .generate_adjust_instruction(&combination, "a", 5, 99.0)
            .unwrap();

        assert_eq!(instr.direction, Direction::Short);
        assert_eq!(instr.offset, Offset::Open);
        assert_eq!(instr.volume, 3);
        assert_eq!(instr.price, 99.0);
    }

    #[test]
    fn adjust_down_closes_the_difference_reversed() {
        let combination = combo(vec![leg("a", Direction::Short, 5)]);
        let service = CombinationLifecycleService::new();
        let instr = service
            .generate_adjust_instruction(&combination, "a", 2, 99.0)
            .unwrap();

        assert_eq!(instr.direction, Direction::Long);
        assert_eq!(instr.offset, Offset::Close);
        assert_eq!(instr.volume, 3);
    }

    #[test]
    fn adjust_equal_volume_is_noop() {
        let combination = combo(vec![leg("a", Direction::Short, 2)]);
        let service = CombinationLifecycleService::new();
        let err = service
            .generate_adjust_instruction(&combination, "a", 2, 99.0)
            .unwrap_err();
        assert_eq!(err, AdjustError::NoOp { volume: 2 });
    }

    #[test]
    fn adjust_unknown_leg_fails() {
        let combination = combo(vec![leg("a", Direction::Short, 2)]);
        let service = CombinationLifecycleService::new();
        let err = service
            .generate_adjust_instruction(&combination, "zzz", 4, 99.0)
            .unwrap_err();
        assert!(matches!(err, AdjustError::LegNotFound { .. }));
    }
}
