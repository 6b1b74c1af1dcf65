// =============================================================================
// Combination entity — a named multi-leg option position with structural
// invariants and a lifecycle status machine
// =============================================================================
//
// Life-cycle:
//   Pending  ->  Active  ->  PartiallyClosed  ->  Closed
//                Active  ->  Closed (all legs filled closed at once)
//
// Structure is validated against the shared rule registry at registration
// time and on demand; the registry is the same table the recognizer uses.
// =============================================================================

use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::combination::rules::{validator_for, LegStructure};
use crate::types::{Direction, OptionType};

/// The recognised multi-leg strategy shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationType {
    Straddle,
    Strangle,
    VerticalSpread,
    CalendarSpread,
    IronCondor,
    Custom,
}

impl CombinationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Straddle => "straddle",
            Self::Strangle => "strangle",
            Self::VerticalSpread => "vertical_spread",
            Self::CalendarSpread => "calendar_spread",
            Self::IronCondor => "iron_condor",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for CombinationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationStatus {
    Pending,
    Active,
    PartiallyClosed,
    Closed,
}

impl CombinationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::PartiallyClosed => "partially_closed",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for CombinationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One option position inside a combination. Immutable once built; volume
/// adjustments replace the leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub vt_symbol: String,
    pub option_type: OptionType,
    pub strike_price: f64,
    pub expiry_date: String,
    pub direction: Direction,
    pub volume: i64,
    pub open_price: f64,
}

impl Leg {
    /// +1.0 for long, -1.0 for short.
    pub fn direction_sign(&self) -> f64 {
        self.direction.sign()
    }

    /// Structural projection used by the rule registry.
    pub fn structure(&self) -> LegStructure {
        LegStructure {
            option_type: self.option_type,
            strike_price: self.strike_price,
            expiry_date: self.expiry_date.clone(),
        }
    }
}

/// Raised when a combination's legs do not satisfy its type's structural
/// constraints.
#[derive(Debug, Error)]
#[error("invalid combination: {reason}")]
pub struct InvalidCombination {
    pub reason: String,
}

/// A multi-leg strategy position, owned and mutated only by the
/// `CombinationAggregate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combination {
    pub combination_id: String,
    pub combination_type: CombinationType,
    pub underlying_vt_symbol: String,
    pub legs: Vec<Leg>,
    pub status: CombinationStatus,
    pub create_time: NaiveDateTime,
    #[serde(default)]
    pub close_time: Option<NaiveDateTime>,
}

impl Combination {
    /// Validate the leg structure against this combination's type using the
    /// shared rule registry.
    pub fn validate(&self) -> Result<(), InvalidCombination> {
        let structures: Vec<LegStructure> = self.legs.iter().map(Leg::structure).collect();
        validator_for(self.combination_type)(&structures)
            .map_err(|reason| InvalidCombination { reason })
    }

    /// Apply the closed-symbol set to this combination's status machine.
    ///
    /// - every leg closed           → `Closed` (close_time recorded)
    /// - some but not all closed    → `PartiallyClosed`
    /// - none closed                → unchanged
    ///
    /// Returns the new status only when it actually changed, so repeated
    /// calls with the same set are idempotent.
    pub fn update_status(
        &mut self,
        closed_vt_symbols: &HashSet<String>,
        now: NaiveDateTime,
    ) -> Option<CombinationStatus> {
        let leg_symbols: HashSet<&str> = self.legs.iter().map(|l| l.vt_symbol.as_str()).collect();
        let closed_in_combo: HashSet<&str> = leg_symbols
            .iter()
            .copied()
            .filter(|s| closed_vt_symbols.contains(*s))
            .collect();

        if closed_in_combo.is_empty() {
            return None;
        }

        let new_status = if closed_in_combo.len() == leg_symbols.len() {
            CombinationStatus::Closed
        } else {
            CombinationStatus::PartiallyClosed
        };

        if new_status != self.status {
            self.status = new_status;
            if new_status == CombinationStatus::Closed {
                self.close_time = Some(now);
            }
            return Some(new_status);
        }
        None
    }

    /// Legs that still carry volume.
    pub fn active_legs(&self) -> Vec<&Leg> {
        self.legs.iter().filter(|l| l.volume > 0).collect()
    }

    /// The leg holding `vt_symbol`, if any.
    pub fn leg(&self, vt_symbol: &str) -> Option<&Leg> {
        self.legs.iter().find(|l| l.vt_symbol == vt_symbol)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    fn leg(vt_symbol: &str, option_type: OptionType, strike: f64) -> Leg {
        Leg {
            vt_symbol: vt_symbol.to_string(),
            option_type,
            strike_price: strike,
            expiry_date: "2025-06-15".to_string(),
            direction: Direction::Short,
            volume: 1,
            open_price: 100.0,
        }
    }

    fn straddle() -> Combination {
        Combination {
            combination_id: "combo-1".to_string(),
            combination_type: CombinationType::Straddle,
            underlying_vt_symbol: "m2506.DCE".to_string(),
            legs: vec![
                leg("m2506-C-2800.DCE", OptionType::Call, 2800.0),
                leg("m2506-P-2800.DCE", OptionType::Put, 2800.0),
            ],
            status: CombinationStatus::Active,
            create_time: now(),
            close_time: None,
        }
    }

    #[test]
    fn validate_agrees_with_rule_registry() {
        let combo = straddle();
        assert!(combo.validate().is_ok());

        let mut broken = combo;
        broken.legs[1].strike_price = 2900.0;
        let err = broken.validate().unwrap_err();
        assert!(err.reason.contains("strike"));
    }

    #[test]
    fn status_machine_partial_then_closed() {
        let mut combo = straddle();

        let closed: HashSet<String> = ["m2506-C-2800.DCE".to_string()].into_iter().collect();
        assert_eq!(
            combo.update_status(&closed, now()),
            Some(CombinationStatus::PartiallyClosed)
        );
        assert!(combo.close_time.is_none());

        let all_closed: HashSet<String> = [
            "m2506-C-2800.DCE".to_string(),
            "m2506-P-2800.DCE".to_string(),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            combo.update_status(&all_closed, now()),
            Some(CombinationStatus::Closed)
        );
        assert_eq!(combo.close_time, Some(now()));
    }

    #[test]
    fn status_update_is_idempotent() {
        let mut combo = straddle();
        let closed: HashSet<String> = ["m2506-C-2800.DCE".to_string()].into_iter().collect();

        assert!(combo.update_status(&closed, now()).is_some());
        // Same set again: no transition, no event.
        assert!(combo.update_status(&closed, now()).is_none());
    }

    #[test]
    fn empty_closed_set_changes_nothing() {
        let mut combo = straddle();
        assert!(combo.update_status(&HashSet::new(), now()).is_none());
        assert_eq!(combo.status, CombinationStatus::Active);
    }

    #[test]
    fn active_legs_skip_zero_volume() {
        let mut combo = straddle();
        combo.legs[0].volume = 0;
        let active = combo.active_legs();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].vt_symbol, "m2506-P-2800.DCE");
    }

    #[test]
    fn serde_roundtrip_preserves_entity() {
        let combo = straddle();
        let json = serde_json::to_string(&combo).unwrap();
        let back: Combination = serde_json::from_str(&json).unwrap();
        assert_eq!(back, combo);
        // Status and type serialise as snake_case strings.
        assert!(json.contains("\"straddle\""));
        assert!(json.contains("\"active\""));
    }
}
