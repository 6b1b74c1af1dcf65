// =============================================================================
// Liquidity risk monitor — scores held contracts on volume, spread and open
// interest, tracks the trend, and warns on deterioration
// =============================================================================
//
// Only positions already held are evaluated; pre-trade liquidity gating
// lives in the option selector. The three dimension weights must sum to 1.0
// and are validated at construction.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::events::LiquidityDeteriorated;
use crate::market::MarketStats;
use crate::types::Position;

// =============================================================================
// Configuration
// =============================================================================

fn default_volume_weight() -> f64 {
    0.4
}

fn default_spread_weight() -> f64 {
    0.3
}

fn default_open_interest_weight() -> f64 {
    0.3
}

fn default_score_threshold() -> f64 {
    0.3
}

/// Weights and threshold for the liquidity score. Weights must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LiquidityMonitorConfig {
    #[serde(default = "default_volume_weight")]
    pub volume_weight: f64,
    #[serde(default = "default_spread_weight")]
    pub spread_weight: f64,
    #[serde(default = "default_open_interest_weight")]
    pub open_interest_weight: f64,
    #[serde(default = "default_score_threshold")]
    pub liquidity_score_threshold: f64,
}

impl Default for LiquidityMonitorConfig {
    fn default() -> Self {
        Self {
            volume_weight: default_volume_weight(),
            spread_weight: default_spread_weight(),
            open_interest_weight: default_open_interest_weight(),
            liquidity_score_threshold: default_score_threshold(),
        }
    }
}

/// Raised when the three dimension weights do not sum to 1.0.
#[derive(Debug, Error)]
#[error("liquidity weights must sum to 1.0, got {total:.6}")]
pub struct InvalidWeights {
    pub total: f64,
}

// =============================================================================
// Results
// =============================================================================

/// Direction the liquidity of a contract is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityTrend {
    Improving,
    Stable,
    Deteriorating,
}

impl std::fmt::Display for LiquidityTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Improving => write!(f, "improving"),
            Self::Stable => write!(f, "stable"),
            Self::Deteriorating => write!(f, "deteriorating"),
        }
    }
}

/// Composite liquidity score with its dimension breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityScore {
    pub vt_symbol: String,
    pub overall_score: f64,
    pub volume_score: f64,
    pub spread_score: f64,
    pub open_interest_score: f64,
    pub trend: LiquidityTrend,
}

// =============================================================================
// Monitor
// =============================================================================

/// Exponential decay constant for the relative-spread score; chosen so a 1 %
/// relative spread scores about 0.9.
const SPREAD_DECAY: f64 = 10.5;

/// Fallback normalisation floors when no history exists.
const VOLUME_NORMALISER: f64 = 1_000.0;
const OI_NORMALISER: f64 = 5_000.0;

/// Relative move against the historical average that counts as a trend
/// signal.
const TREND_BAND: f64 = 0.10;

#[derive(Debug, Clone)]
pub struct LiquidityRiskMonitor {
    config: LiquidityMonitorConfig,
}

impl LiquidityRiskMonitor {
    /// Build a monitor; fails when the weights do not sum to 1.0.
    pub fn new(config: LiquidityMonitorConfig) -> Result<Self, InvalidWeights> {
        let total = config.volume_weight + config.spread_weight + config.open_interest_weight;
        if (total - 1.0).abs() > 1e-6 {
            return Err(InvalidWeights { total });
        }
        Ok(Self { config })
    }

    /// Score one contract against its history.
    pub fn calculate_liquidity_score(
        &self,
        vt_symbol: &str,
        current: &MarketStats,
        historical: &[MarketStats],
    ) -> LiquidityScore {
        let volume_score = Self::volume_score(current.volume as f64, historical);
        let spread_score = Self::spread_score(current.bid_price, current.ask_price);
        let oi_score = Self::oi_score(current.open_interest, historical);

        let overall_score = volume_score * self.config.volume_weight
            + spread_score * self.config.spread_weight
            + oi_score * self.config.open_interest_weight;

        LiquidityScore {
            vt_symbol: vt_symbol.to_string(),
            overall_score,
            volume_score,
            spread_score,
            open_interest_score: oi_score,
            trend: Self::identify_trend(current, historical),
        }
    }

    /// Score every active held position and warn on anything below the
    /// threshold. Contracts without current market data are skipped.
    pub fn monitor_positions(
        &self,
        positions: &[Position],
        market_data: &HashMap<String, MarketStats>,
        historical_data: &HashMap<String, Vec<MarketStats>>,
    ) -> Vec<LiquidityDeteriorated> {
        let mut warnings = Vec::new();

        for position in positions.iter().filter(|p| p.is_active) {
            let Some(current) = market_data.get(&position.vt_symbol) else {
                continue;
            };
            let historical = historical_data
                .get(&position.vt_symbol)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            let score = self.calculate_liquidity_score(&position.vt_symbol, current, historical);
            if score.overall_score < self.config.liquidity_score_threshold {
                let message = format!(
                    "liquidity deteriorated: {} score {:.3} below threshold {:.3}, trend {}",
                    position.vt_symbol,
                    score.overall_score,
                    self.config.liquidity_score_threshold,
                    score.trend
                );
                warn!(
                    vt_symbol = %position.vt_symbol,
                    score = format!("{:.3}", score.overall_score),
                    trend = %score.trend,
                    "liquidity warning"
                );
                warnings.push(LiquidityDeteriorated {
                    vt_symbol: position.vt_symbol.clone(),
                    current_score: score.overall_score,
                    threshold: self.config.liquidity_score_threshold,
                    trend: score.trend.to_string(),
                    message,
                });
            }
        }

        warnings
    }

    // -------------------------------------------------------------------------
    // Dimension scores
    // -------------------------------------------------------------------------

    fn volume_score(current_volume: f64, historical: &[MarketStats]) -> f64 {
        if historical.is_empty() {
            return (current_volume / VOLUME_NORMALISER).min(1.0);
        }
        let avg: f64 =
            historical.iter().map(|d| d.volume as f64).sum::<f64>() / historical.len() as f64;
        if avg <= 0.0 {
            return 0.0;
        }
        (current_volume / avg).min(1.0)
    }

    fn spread_score(bid_price: f64, ask_price: f64) -> f64 {
        if bid_price <= 0.0 || ask_price <= 0.0 || ask_price <= bid_price {
            return 0.0;
        }
        let mid = (bid_price + ask_price) / 2.0;
        let relative_spread = (ask_price - bid_price) / mid;
        (-SPREAD_DECAY * relative_spread).exp().clamp(0.0, 1.0)
    }

    fn oi_score(current_oi: f64, historical: &[MarketStats]) -> f64 {
        if historical.is_empty() {
            return (current_oi / OI_NORMALISER).min(1.0);
        }
        let avg: f64 =
            historical.iter().map(|d| d.open_interest).sum::<f64>() / historical.len() as f64;
        if avg <= 0.0 {
            return 0.0;
        }
        (current_oi / avg).min(1.0)
    }

    // -------------------------------------------------------------------------
    // Trend detection
    // -------------------------------------------------------------------------

    /// A dimension signals when it moves more than ±10 % against its
    /// historical average; two or more signals in the same direction decide
    /// the trend.
    fn identify_trend(current: &MarketStats, historical: &[MarketStats]) -> LiquidityTrend {
        if historical.len() < 2 {
            return LiquidityTrend::Stable;
        }

        let avg_volume: f64 =
            historical.iter().map(|d| d.volume as f64).sum::<f64>() / historical.len() as f64;
        let avg_oi: f64 =
            historical.iter().map(|d| d.open_interest).sum::<f64>() / historical.len() as f64;

        let rel_spread = |d: &MarketStats| -> Option<f64> {
            if d.ask_price > d.bid_price && d.bid_price > 0.0 {
                let mid = (d.bid_price + d.ask_price) / 2.0;
                (mid > 0.0).then(|| (d.ask_price - d.bid_price) / mid)
            } else {
                None
            }
        };
        let spreads: Vec<f64> = historical.iter().filter_map(rel_spread).collect();
        let avg_spread = if spreads.is_empty() {
            0.0
        } else {
            spreads.iter().sum::<f64>() / spreads.len() as f64
        };
        let current_spread = rel_spread(current).unwrap_or(0.0);

        let mut improving = 0;
        let mut deteriorating = 0;

        if avg_volume > 0.0 {
            if current.volume as f64 > avg_volume * (1.0 + TREND_BAND) {
                improving += 1;
            } else if (current.volume as f64) < avg_volume * (1.0 - TREND_BAND) {
                deteriorating += 1;
            }
        }

        // Spread narrows → improving.
        if avg_spread > 0.0 {
            if current_spread < avg_spread * (1.0 - TREND_BAND) {
                improving += 1;
            } else if current_spread > avg_spread * (1.0 + TREND_BAND) {
                deteriorating += 1;
            }
        }

        if avg_oi > 0.0 {
            if current.open_interest > avg_oi * (1.0 + TREND_BAND) {
                improving += 1;
            } else if current.open_interest < avg_oi * (1.0 - TREND_BAND) {
                deteriorating += 1;
            }
        }

        if improving >= 2 {
            LiquidityTrend::Improving
        } else if deteriorating >= 2 {
            LiquidityTrend::Deteriorating
        } else {
            LiquidityTrend::Stable
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;

    fn stats(volume: i64, oi: f64, bid: f64, ask: f64) -> MarketStats {
        MarketStats {
            vt_symbol: "x".to_string(),
            volume,
            open_interest: oi,
            bid_price: bid,
            ask_price: ask,
            ..MarketStats::default()
        }
    }

    fn monitor() -> LiquidityRiskMonitor {
        LiquidityRiskMonitor::new(LiquidityMonitorConfig::default()).unwrap()
    }

    #[test]
    fn weights_must_sum_to_one() {
        let bad = LiquidityMonitorConfig {
            volume_weight: 0.5,
            spread_weight: 0.5,
            open_interest_weight: 0.5,
            liquidity_score_threshold: 0.3,
        };
        let err = LiquidityRiskMonitor::new(bad).unwrap_err();
        assert!((err.total - 1.5).abs() < 1e-9);

        assert!(LiquidityRiskMonitor::new(LiquidityMonitorConfig::default()).is_ok());
    }

    #[test]
    fn subscores_stay_in_unit_range() {
        let m = monitor();
        let score = m.calculate_liquidity_score(
            "x",
            &stats(10_000, 100_000.0, 100.0, 100.5),
            &[stats(100, 100.0, 100.0, 101.0), stats(120, 110.0, 100.0, 101.0)],
        );
        for sub in [
            score.volume_score,
            score.spread_score,
            score.open_interest_score,
            score.overall_score,
        ] {
            assert!((0.0..=1.0).contains(&sub), "subscore {sub} out of range");
        }
    }

    #[test]
    fn tight_spread_scores_higher_than_wide() {
        let m = monitor();
        let tight = m.calculate_liquidity_score("x", &stats(100, 100.0, 100.0, 100.1), &[]);
        let wide = m.calculate_liquidity_score("x", &stats(100, 100.0, 100.0, 110.0), &[]);
        assert!(tight.spread_score > wide.spread_score);
    }

    #[test]
    fn crossed_or_empty_book_scores_zero_spread() {
        let m = monitor();
        let crossed = m.calculate_liquidity_score("x", &stats(100, 100.0, 101.0, 100.0), &[]);
        assert_eq!(crossed.spread_score, 0.0);
        let empty = m.calculate_liquidity_score("x", &stats(100, 100.0, 0.0, 0.0), &[]);
        assert_eq!(empty.spread_score, 0.0);
    }

    #[test]
    fn short_history_is_stable() {
        let m = monitor();
        let score =
            m.calculate_liquidity_score("x", &stats(100, 100.0, 100.0, 101.0), &[stats(1, 1.0, 0.0, 0.0)]);
        assert_eq!(score.trend, LiquidityTrend::Stable);
    }

    #[test]
    fn two_deteriorating_signals_flip_trend() {
        let m = monitor();
        let history = vec![
            stats(1_000, 10_000.0, 100.0, 100.5),
            stats(1_000, 10_000.0, 100.0, 100.5),
        ];
        // Volume and OI both down more than 10%, spread unchanged.
        let score = m.calculate_liquidity_score("x", &stats(500, 5_000.0, 100.0, 100.5), &history);
        assert_eq!(score.trend, LiquidityTrend::Deteriorating);
    }

    #[test]
    fn two_improving_signals_flip_trend() {
        let m = monitor();
        let history = vec![
            stats(1_000, 10_000.0, 100.0, 101.0),
            stats(1_000, 10_000.0, 100.0, 101.0),
        ];
        // Volume up, spread halved.
        let score = m.calculate_liquidity_score("x", &stats(2_000, 10_000.0, 100.0, 100.4), &history);
        assert_eq!(score.trend, LiquidityTrend::Improving);
    }

    #[test]
    fn monitor_warns_only_below_threshold() {
        let m = LiquidityRiskMonitor::new(LiquidityMonitorConfig {
            liquidity_score_threshold: 0.5,
            ..LiquidityMonitorConfig::default()
        })
        .unwrap();

        let healthy = Position {
            vt_symbol: "good".to_string(),
            direction: Direction::Short,
            volume: 1,
            open_price: 100.0,
            is_active: true,
        };
        let thin = Position {
            vt_symbol: "thin".to_string(),
            direction: Direction::Short,
            volume: 1,
            open_price: 100.0,
            is_active: true,
        };
        let inactive = Position {
            vt_symbol: "gone".to_string(),
            direction: Direction::Short,
            volume: 0,
            open_price: 100.0,
            is_active: false,
        };

        let mut market = HashMap::new();
        market.insert("good".to_string(), stats(5_000, 50_000.0, 100.0, 100.2));
        market.insert("thin".to_string(), stats(1, 1.0, 100.0, 130.0));
        market.insert("gone".to_string(), stats(1, 1.0, 100.0, 130.0));

        let warnings = m.monitor_positions(&[healthy, thin, inactive], &market, &HashMap::new());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].vt_symbol, "thin");
        assert_eq!(warnings[0].trend, "stable");
    }

    #[test]
    fn positions_without_market_data_are_skipped() {
        let m = monitor();
        let position = Position {
            vt_symbol: "nodata".to_string(),
            direction: Direction::Short,
            volume: 1,
            open_price: 100.0,
            is_active: true,
        };
        let warnings = m.monitor_positions(&[position], &HashMap::new(), &HashMap::new());
        assert!(warnings.is_empty());
    }
}
