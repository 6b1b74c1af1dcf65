// =============================================================================
// Combination-level Greeks risk check
// =============================================================================
//
// Independent of the portfolio-level risk aggregation: a combination passes
// iff every Greek magnitude sits inside its per-type limit. Violations are
// reported in the fixed order delta, gamma, vega, theta.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::combination::greeks::CombinationGreeks;
use crate::types::RiskCheckResult;

/// Per-combination-type Greek limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombinationRiskConfig {
    #[serde(default = "default_delta_limit")]
    pub delta_limit: f64,
    #[serde(default = "default_gamma_limit")]
    pub gamma_limit: f64,
    #[serde(default = "default_vega_limit")]
    pub vega_limit: f64,
    #[serde(default = "default_theta_limit")]
    pub theta_limit: f64,
}

fn default_delta_limit() -> f64 {
    2.0
}

fn default_gamma_limit() -> f64 {
    0.5
}

fn default_vega_limit() -> f64 {
    200.0
}

fn default_theta_limit() -> f64 {
    100.0
}

impl Default for CombinationRiskConfig {
    fn default() -> Self {
        Self {
            delta_limit: default_delta_limit(),
            gamma_limit: default_gamma_limit(),
            vega_limit: default_vega_limit(),
            theta_limit: default_theta_limit(),
        }
    }
}

/// Checks combination Greeks against the configured absolute limits.
#[derive(Debug, Clone)]
pub struct CombinationRiskChecker {
    config: CombinationRiskConfig,
}

impl CombinationRiskChecker {
    pub fn new(config: CombinationRiskConfig) -> Self {
        Self { config }
    }

    /// Pass iff |Δ| ≤ delta_limit ∧ |Γ| ≤ gamma_limit ∧ |V| ≤ vega_limit ∧
    /// |Θ| ≤ theta_limit. The reject reason lists each violated Greek as
    /// `name=value(limit=limit)`, comma-joined, in that fixed order.
    pub fn check(&self, greeks: &CombinationGreeks) -> RiskCheckResult {
        let checks = [
            ("delta", greeks.delta, self.config.delta_limit),
            ("gamma", greeks.gamma, self.config.gamma_limit),
            ("vega", greeks.vega, self.config.vega_limit),
            ("theta", greeks.theta, self.config.theta_limit),
        ];

        let violations: Vec<String> = checks
            .iter()
            .filter(|(_, value, limit)| value.abs() > *limit)
            .map(|(name, value, limit)| format!("{name}={value:.4}(limit={limit})"))
            .collect();

        if violations.is_empty() {
            RiskCheckResult::pass()
        } else {
            RiskCheckResult::reject(violations.join(", "))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn greeks(delta: f64, gamma: f64, vega: f64, theta: f64) -> CombinationGreeks {
        CombinationGreeks {
            delta,
            gamma,
            theta,
            vega,
            failed_legs: Vec::new(),
        }
    }

    #[test]
    fn passes_inside_all_limits() {
        let checker = CombinationRiskChecker::new(CombinationRiskConfig::default());
        let result = checker.check(&greeks(-1.0, 0.3, -150.0, 50.0));
        assert!(result.passed);
        assert!(result.reject_reason.is_empty());
    }

    #[test]
    fn limits_are_inclusive() {
        let checker = CombinationRiskChecker::new(CombinationRiskConfig {
            delta_limit: 2.0,
            gamma_limit: 0.5,
            vega_limit: 200.0,
            theta_limit: 100.0,
        });
        // Exactly at the limit on every dimension.
        assert!(checker.check(&greeks(2.0, -0.5, 200.0, -100.0)).passed);
    }

    #[test]
    fn single_violation_names_only_that_greek() {
        let checker = CombinationRiskChecker::new(CombinationRiskConfig::default());
        let result = checker.check(&greeks(-3.5, 0.1, 10.0, 1.0));
        assert!(!result.passed);
        assert_eq!(result.reject_reason, "delta=-3.5000(limit=2)");
    }

    #[test]
    fn multiple_violations_join_in_fixed_order() {
        let checker = CombinationRiskChecker::new(CombinationRiskConfig {
            delta_limit: 1.0,
            gamma_limit: 0.1,
            vega_limit: 10.0,
            theta_limit: 5.0,
        });
        let result = checker.check(&greeks(2.0, 0.2, 20.0, 6.0));
        assert!(!result.passed);
        let reasons: Vec<&str> = result.reject_reason.split(", ").collect();
        assert_eq!(reasons.len(), 4);
        assert!(reasons[0].starts_with("delta="));
        assert!(reasons[1].starts_with("gamma="));
        assert!(reasons[2].starts_with("vega="));
        assert!(reasons[3].starts_with("theta="));
    }

    #[test]
    fn tightening_a_limit_never_unrejects() {
        let loose = CombinationRiskChecker::new(CombinationRiskConfig {
            delta_limit: 5.0,
            gamma_limit: 1.0,
            vega_limit: 300.0,
            theta_limit: 200.0,
        });
        let tight = CombinationRiskChecker::new(CombinationRiskConfig {
            delta_limit: 1.0,
            gamma_limit: 1.0,
            vega_limit: 300.0,
            theta_limit: 200.0,
        });

        let g = greeks(2.0, 0.5, 100.0, 50.0);
        assert!(loose.check(&g).passed);
        assert!(!tight.check(&g).passed);
    }
}
