// =============================================================================
// Combination structural rules — the single registry consumed by both the
// recognizer and Combination::validate, so the two can never disagree
// =============================================================================

use crate::combination::entity::CombinationType;
use crate::types::OptionType;

/// Leg shape reduced to the three fields structural rules care about.
#[derive(Debug, Clone, PartialEq)]
pub struct LegStructure {
    pub option_type: OptionType,
    pub strike_price: f64,
    pub expiry_date: String,
}

/// A pure structural validator: `Ok(())` when the leg list satisfies the
/// combination type's constraints, `Err(reason)` otherwise.
pub type StructureValidator = fn(&[LegStructure]) -> Result<(), String>;

/// STRADDLE: exactly 2 legs, same expiry, same strike, one call + one put.
pub fn validate_straddle(legs: &[LegStructure]) -> Result<(), String> {
    if legs.len() != 2 {
        return Err(format!("straddle requires exactly 2 legs, got {}", legs.len()));
    }
    let (l0, l1) = (&legs[0], &legs[1]);
    if l0.expiry_date != l1.expiry_date {
        return Err("straddle requires all legs share one expiry".to_string());
    }
    if l0.strike_price != l1.strike_price {
        return Err("straddle requires all legs share one strike".to_string());
    }
    if !one_call_one_put(l0, l1) {
        return Err("straddle requires one call and one put".to_string());
    }
    Ok(())
}

/// STRANGLE: exactly 2 legs, same expiry, different strikes, one call + one put.
pub fn validate_strangle(legs: &[LegStructure]) -> Result<(), String> {
    if legs.len() != 2 {
        return Err(format!("strangle requires exactly 2 legs, got {}", legs.len()));
    }
    let (l0, l1) = (&legs[0], &legs[1]);
    if l0.expiry_date != l1.expiry_date {
        return Err("strangle requires all legs share one expiry".to_string());
    }
    if l0.strike_price == l1.strike_price {
        return Err("strangle requires the two strikes to differ".to_string());
    }
    if !one_call_one_put(l0, l1) {
        return Err("strangle requires one call and one put".to_string());
    }
    Ok(())
}

/// VERTICAL_SPREAD: exactly 2 legs, same expiry, same option type, different
/// strikes.
pub fn validate_vertical_spread(legs: &[LegStructure]) -> Result<(), String> {
    if legs.len() != 2 {
        return Err(format!(
            "vertical spread requires exactly 2 legs, got {}",
            legs.len()
        ));
    }
    let (l0, l1) = (&legs[0], &legs[1]);
    if l0.expiry_date != l1.expiry_date {
        return Err("vertical spread requires all legs share one expiry".to_string());
    }
    if l0.option_type != l1.option_type {
        return Err("vertical spread requires all legs share one option type".to_string());
    }
    if l0.strike_price == l1.strike_price {
        return Err("vertical spread requires the two strikes to differ".to_string());
    }
    Ok(())
}

/// CALENDAR_SPREAD: exactly 2 legs, different expiries, same strike, same
/// option type.
pub fn validate_calendar_spread(legs: &[LegStructure]) -> Result<(), String> {
    if legs.len() != 2 {
        return Err(format!(
            "calendar spread requires exactly 2 legs, got {}",
            legs.len()
        ));
    }
    let (l0, l1) = (&legs[0], &legs[1]);
    if l0.expiry_date == l1.expiry_date {
        return Err("calendar spread requires the two expiries to differ".to_string());
    }
    if l0.strike_price != l1.strike_price {
        return Err("calendar spread requires all legs share one strike".to_string());
    }
    if l0.option_type != l1.option_type {
        return Err("calendar spread requires all legs share one option type".to_string());
    }
    Ok(())
}

/// IRON_CONDOR: exactly 4 legs, single expiry, a put spread (2 puts, distinct
/// strikes) plus a call spread (2 calls, distinct strikes).
pub fn validate_iron_condor(legs: &[LegStructure]) -> Result<(), String> {
    if legs.len() != 4 {
        return Err(format!(
            "iron condor requires exactly 4 legs, got {}",
            legs.len()
        ));
    }

    let first_expiry = &legs[0].expiry_date;
    if legs.iter().any(|leg| &leg.expiry_date != first_expiry) {
        return Err("iron condor requires all legs share one expiry".to_string());
    }

    let puts: Vec<&LegStructure> = legs
        .iter()
        .filter(|leg| leg.option_type == OptionType::Put)
        .collect();
    let calls: Vec<&LegStructure> = legs
        .iter()
        .filter(|leg| leg.option_type == OptionType::Call)
        .collect();

    if puts.len() != 2 || calls.len() != 2 {
        return Err("iron condor requires exactly 2 puts and 2 calls".to_string());
    }
    if puts[0].strike_price == puts[1].strike_price {
        return Err("iron condor put spread requires two distinct put strikes".to_string());
    }
    if calls[0].strike_price == calls[1].strike_price {
        return Err("iron condor call spread requires two distinct call strikes".to_string());
    }
    Ok(())
}

/// CUSTOM: at least 1 leg, no further structural constraint.
pub fn validate_custom(legs: &[LegStructure]) -> Result<(), String> {
    if legs.is_empty() {
        return Err("custom combination requires at least 1 leg".to_string());
    }
    Ok(())
}

fn one_call_one_put(l0: &LegStructure, l1: &LegStructure) -> bool {
    matches!(
        (l0.option_type, l1.option_type),
        (OptionType::Call, OptionType::Put) | (OptionType::Put, OptionType::Call)
    )
}

/// Registry of validators keyed by combination type. Initialised once at
/// compile time and never mutated.
pub const VALIDATION_RULES: [(CombinationType, StructureValidator); 6] = [
    (CombinationType::Straddle, validate_straddle),
    (CombinationType::Strangle, validate_strangle),
    (CombinationType::VerticalSpread, validate_vertical_spread),
    (CombinationType::CalendarSpread, validate_calendar_spread),
    (CombinationType::IronCondor, validate_iron_condor),
    (CombinationType::Custom, validate_custom),
];

/// Look up the validator for `combination_type` in the shared registry.
pub fn validator_for(combination_type: CombinationType) -> StructureValidator {
    VALIDATION_RULES
        .iter()
        .find(|(t, _)| *t == combination_type)
        .map(|(_, v)| *v)
        .expect("every combination type has a registered validator")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(option_type: OptionType, strike: f64, expiry: &str) -> LegStructure {
        LegStructure {
            option_type,
            strike_price: strike,
            expiry_date: expiry.to_string(),
        }
    }

    #[test]
    fn straddle_accepts_same_strike_call_put() {
        let legs = vec![
            leg(OptionType::Call, 2800.0, "2025-06-15"),
            leg(OptionType::Put, 2800.0, "2025-06-15"),
        ];
        assert!(validate_straddle(&legs).is_ok());
    }

    #[test]
    fn straddle_rejects_strike_mismatch() {
        let legs = vec![
            leg(OptionType::Call, 2800.0, "2025-06-15"),
            leg(OptionType::Put, 2900.0, "2025-06-15"),
        ];
        assert!(validate_straddle(&legs).is_err());
    }

    #[test]
    fn straddle_rejects_two_calls() {
        let legs = vec![
            leg(OptionType::Call, 2800.0, "2025-06-15"),
            leg(OptionType::Call, 2800.0, "2025-06-15"),
        ];
        assert!(validate_straddle(&legs).is_err());
    }

    #[test]
    fn strangle_requires_distinct_strikes() {
        let same = vec![
            leg(OptionType::Call, 2800.0, "2025-06-15"),
            leg(OptionType::Put, 2800.0, "2025-06-15"),
        ];
        assert!(validate_strangle(&same).is_err());

        let distinct = vec![
            leg(OptionType::Call, 2900.0, "2025-06-15"),
            leg(OptionType::Put, 2700.0, "2025-06-15"),
        ];
        assert!(validate_strangle(&distinct).is_ok());
    }

    #[test]
    fn vertical_spread_requires_same_type() {
        let legs = vec![
            leg(OptionType::Call, 2800.0, "2025-06-15"),
            leg(OptionType::Call, 2900.0, "2025-06-15"),
        ];
        assert!(validate_vertical_spread(&legs).is_ok());

        let mixed = vec![
            leg(OptionType::Call, 2800.0, "2025-06-15"),
            leg(OptionType::Put, 2900.0, "2025-06-15"),
        ];
        assert!(validate_vertical_spread(&mixed).is_err());
    }

    #[test]
    fn calendar_spread_requires_distinct_expiries() {
        let legs = vec![
            leg(OptionType::Call, 2800.0, "2025-06-15"),
            leg(OptionType::Call, 2800.0, "2025-09-15"),
        ];
        assert!(validate_calendar_spread(&legs).is_ok());

        let same_expiry = vec![
            leg(OptionType::Call, 2800.0, "2025-06-15"),
            leg(OptionType::Call, 2800.0, "2025-06-15"),
        ];
        assert!(validate_calendar_spread(&same_expiry).is_err());
    }

    #[test]
    fn iron_condor_requires_two_distinct_spreads() {
        let legs = vec![
            leg(OptionType::Put, 2600.0, "2025-06-15"),
            leg(OptionType::Put, 2700.0, "2025-06-15"),
            leg(OptionType::Call, 2900.0, "2025-06-15"),
            leg(OptionType::Call, 3000.0, "2025-06-15"),
        ];
        assert!(validate_iron_condor(&legs).is_ok());

        let dup_put_strike = vec![
            leg(OptionType::Put, 2700.0, "2025-06-15"),
            leg(OptionType::Put, 2700.0, "2025-06-15"),
            leg(OptionType::Call, 2900.0, "2025-06-15"),
            leg(OptionType::Call, 3000.0, "2025-06-15"),
        ];
        assert!(validate_iron_condor(&dup_put_strike).is_err());
    }

    #[test]
    fn iron_condor_rejects_mixed_expiries() {
        let legs = vec![
            leg(OptionType::Put, 2600.0, "2025-06-15"),
            leg(OptionType::Put, 2700.0, "2025-09-15"),
            leg(OptionType::Call, 2900.0, "2025-06-15"),
            leg(OptionType::Call, 3000.0, "2025-06-15"),
        ];
        assert!(validate_iron_condor(&legs).is_err());
    }

    #[test]
    fn custom_accepts_any_nonempty_list() {
        assert!(validate_custom(&[leg(OptionType::Call, 1.0, "x")]).is_ok());
        assert!(validate_custom(&[]).is_err());
    }

    #[test]
    fn registry_covers_every_type() {
        for combination_type in [
            CombinationType::Straddle,
            CombinationType::Strangle,
            CombinationType::VerticalSpread,
            CombinationType::CalendarSpread,
            CombinationType::IronCondor,
            CombinationType::Custom,
        ] {
            // Must not panic.
            let _ = validator_for(combination_type);
        }
    }
}
