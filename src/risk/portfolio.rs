// =============================================================================
// Portfolio risk aggregator — weighted Greek sums over all active positions
// and threshold checks at both the position and portfolio level
// =============================================================================
//
// Per entry: weight = volume × multiplier × direction_sign. Entries whose
// Greeks are marked unsuccessful are skipped; they contribute nothing and
// never fail the check. Runs independently of the per-combination risk
// checker.
// =============================================================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::events::{DomainEvent, GreeksRiskBreached};
use crate::types::{Direction, GreeksResult, PortfolioGreeks, RiskCheckResult, RiskThresholds};

/// One position's contribution to the portfolio Greeks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionGreeksEntry {
    pub vt_symbol: String,
    /// Per-lot Greeks of the contract.
    pub greeks: GreeksResult,
    pub volume: i64,
    pub multiplier: f64,
    pub direction: Direction,
}

impl PositionGreeksEntry {
    fn weight(&self) -> f64 {
        self.volume as f64 * self.multiplier * self.direction.sign()
    }
}

/// Aggregates per-position Greeks and enforces the `RiskThresholds`.
#[derive(Debug, Clone)]
pub struct PortfolioRiskAggregator {
    thresholds: RiskThresholds,
}

impl PortfolioRiskAggregator {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    /// Weighted Greek sums over the supplied entries. Unsuccessful entries
    /// are skipped; `position_count` counts only the entries that
    /// contributed.
    pub fn aggregate(&self, entries: &[PositionGreeksEntry], now: NaiveDateTime) -> PortfolioGreeks {
        let mut total_delta = 0.0;
        let mut total_gamma = 0.0;
        let mut total_theta = 0.0;
        let mut total_vega = 0.0;
        let mut position_count = 0;

        for entry in entries {
            if !entry.greeks.success {
                warn!(vt_symbol = %entry.vt_symbol, "greeks unavailable, excluded from portfolio");
                continue;
            }
            let weight = entry.weight();
            total_delta += entry.greeks.delta * weight;
            total_gamma += entry.greeks.gamma * weight;
            total_theta += entry.greeks.theta * weight;
            total_vega += entry.greeks.vega * weight;
            position_count += 1;
        }

        PortfolioGreeks {
            total_delta,
            total_gamma,
            total_theta,
            total_vega,
            position_count,
            timestamp: now,
        }
    }

    /// Check one position's weighted Greeks against the position-level
    /// limits.
    pub fn check_position(&self, entry: &PositionGreeksEntry) -> RiskCheckResult {
        if !entry.greeks.success {
            return RiskCheckResult::pass();
        }
        let weight = entry.weight();
        let checks = [
            ("delta", entry.greeks.delta * weight, self.thresholds.position_delta_limit),
            ("gamma", entry.greeks.gamma * weight, self.thresholds.position_gamma_limit),
            ("vega", entry.greeks.vega * weight, self.thresholds.position_vega_limit),
        ];
        Self::check(&checks)
    }

    /// Check aggregated portfolio Greeks against the portfolio-level limits.
    pub fn check_portfolio(&self, portfolio: &PortfolioGreeks) -> RiskCheckResult {
        let checks = [
            ("delta", portfolio.total_delta, self.thresholds.portfolio_delta_limit),
            ("gamma", portfolio.total_gamma, self.thresholds.portfolio_gamma_limit),
            ("vega", portfolio.total_vega, self.thresholds.portfolio_vega_limit),
        ];
        Self::check(&checks)
    }

    /// Full pass: aggregate, check every position and the portfolio, and
    /// emit one breach event per failed check.
    pub fn monitor(
        &self,
        entries: &[PositionGreeksEntry],
        now: NaiveDateTime,
    ) -> (PortfolioGreeks, Vec<DomainEvent>) {
        let mut events = Vec::new();

        for entry in entries {
            let result = self.check_position(entry);
            if !result.passed {
                warn!(vt_symbol = %entry.vt_symbol, reason = %result.reject_reason, "position greeks breach");
                events.push(DomainEvent::GreeksRiskBreached(GreeksRiskBreached {
                    scope: "position".to_string(),
                    vt_symbol: entry.vt_symbol.clone(),
                    reason: result.reject_reason,
                }));
            }
        }

        let portfolio = self.aggregate(entries, now);
        let result = self.check_portfolio(&portfolio);
        if !result.passed {
            warn!(reason = %result.reject_reason, "portfolio greeks breach");
            events.push(DomainEvent::GreeksRiskBreached(GreeksRiskBreached {
                scope: "portfolio".to_string(),
                vt_symbol: String::new(),
                reason: result.reject_reason,
            }));
        }

        (portfolio, events)
    }

    fn check(checks: &[(&str, f64, f64)]) -> RiskCheckResult {
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
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    fn entry(vt_symbol: &str, direction: Direction, volume: i64, greeks: GreeksResult) -> PositionGreeksEntry {
        PositionGreeksEntry {
            vt_symbol: vt_symbol.to_string(),
            greeks,
            volume,
            multiplier: 10.0,
            direction,
        }
    }

    fn aggregator() -> PortfolioRiskAggregator {
        PortfolioRiskAggregator::new(RiskThresholds {
            position_delta_limit: 10.0,
            position_gamma_limit: 5.0,
            position_vega_limit: 20.0,
            portfolio_delta_limit: 100.0,
            portfolio_gamma_limit: 50.0,
            portfolio_vega_limit: 200.0,
        })
    }

    #[test]
    fn aggregation_is_weighted_and_signed() {
        let entries = vec![
            entry("long", Direction::Long, 2, GreeksResult::ok(0.5, 0.02, -0.1, 8.0)),
            entry("short", Direction::Short, 1, GreeksResult::ok(0.4, 0.01, -0.05, 6.0)),
        ];
        let portfolio = aggregator().aggregate(&entries, now());

        // 0.5*20 - 0.4*10 = 6.0
        assert!((portfolio.total_delta - 6.0).abs() < 1e-9);
        // 8*20 - 6*10 = 100
        assert!((portfolio.total_vega - 100.0).abs() < 1e-9);
        assert_eq!(portfolio.position_count, 2);
        assert_eq!(portfolio.timestamp, now());
    }

    #[test]
    fn failed_greeks_are_excluded() {
        let entries = vec![
            entry("ok", Direction::Long, 1, GreeksResult::ok(0.5, 0.0, 0.0, 1.0)),
            entry("bad", Direction::Long, 100, GreeksResult::failed()),
        ];
        let portfolio = aggregator().aggregate(&entries, now());
        assert!((portfolio.total_delta - 5.0).abs() < 1e-9);
        assert_eq!(portfolio.position_count, 1);
    }

    #[test]
    fn position_check_uses_position_limits() {
        let aggregator = aggregator();
        // |0.5 * 10| = 5 <= 10 → pass.
        let small = entry("a", Direction::Long, 1, GreeksResult::ok(0.5, 0.0, 0.0, 1.0));
        assert!(aggregator.check_position(&small).passed);
        // |0.5 * 10 * 3| = 15 > 10 → fail on delta.
        let big = entry("a", Direction::Long, 3, GreeksResult::ok(0.5, 0.0, 0.0, 1.0));
        let result = aggregator.check_position(&big);
        assert!(!result.passed);
        assert!(result.reject_reason.contains("delta"));
    }

    #[test]
    fn monitor_emits_one_event_per_breach() {
        let aggregator = aggregator();
        let entries = vec![
            // Position breach: delta 15 > 10. Also pushes the portfolio over
            // nothing (portfolio delta 15 < 100).
            entry("hot", Direction::Long, 3, GreeksResult::ok(0.5, 0.0, 0.0, 1.0)),
            // Vega bomb: portfolio vega 30*10 = 300 > 200, position vega
            // 300 > 20 breaches too.
            entry("vega", Direction::Long, 1, GreeksResult::ok(0.0, 0.0, 0.0, 30.0)),
        ];
        let (portfolio, events) = aggregator.monitor(&entries, now());
        // 1.0·30 from the first entry plus 30·10 from the second.
        assert!((portfolio.total_vega - 330.0).abs() < 1e-9);

        let scopes: Vec<&str> = events
            .iter()
            .map(|e| match e {
                DomainEvent::GreeksRiskBreached(b) => b.scope.as_str(),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(scopes, vec!["position", "position", "portfolio"]);
    }

    #[test]
    fn clean_portfolio_emits_nothing() {
        let entries = vec![entry("a", Direction::Short, 1, GreeksResult::ok(0.1, 0.001, -0.01, 0.5))];
        let (_, events) = aggregator().monitor(&entries, now());
        assert!(events.is_empty());
    }
}
