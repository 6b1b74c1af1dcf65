// =============================================================================
// Option selector — filters an option-chain snapshot down to tradeable OTM
// candidates and picks legs by level, by Delta, or jointly per combination
// =============================================================================
//
// Pipeline order is fixed: type filter → liquidity filter → days-to-expiry
// filter → OTM ranking (diff1 > 0, ascending, closest-to-ATM first). Every
// selection entry point runs the same pipeline so results stay consistent.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::combination::entity::CombinationType;
use crate::combination::rules::{validator_for, LegStructure};
use crate::market::{MarketStats, OptionContract};
use crate::types::{GreeksResult, OptionType};

// =============================================================================
// Configuration
// =============================================================================

fn default_strike_level() -> usize {
    2
}

fn default_min_bid_price() -> f64 {
    5.0
}

fn default_min_bid_volume() -> i64 {
    5
}

fn default_min_trading_days() -> i64 {
    5
}

fn default_max_trading_days() -> i64 {
    45
}

fn default_liquidity_min_volume() -> i64 {
    100
}

fn default_liquidity_min_bid_volume() -> i64 {
    10
}

fn default_liquidity_max_spread_ticks() -> f64 {
    10.0
}

fn default_score_liquidity_weight() -> f64 {
    0.4
}

fn default_score_otm_weight() -> f64 {
    0.3
}

fn default_score_expiry_weight() -> f64 {
    0.3
}

fn default_liq_spread_weight() -> f64 {
    0.6
}

fn default_liq_volume_weight() -> f64 {
    0.4
}

fn default_delta_tolerance() -> f64 {
    0.1
}

fn default_spread_width() -> usize {
    1
}

/// Tunable parameters for option selection. Every field carries a serde
/// default so that partial config files keep working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionSelectorConfig {
    /// OTM rank picked by `select_option` (1 = closest to ATM).
    #[serde(default = "default_strike_level")]
    pub strike_level: usize,

    /// Chain-level liquidity floor: minimum best-bid price.
    #[serde(default = "default_min_bid_price")]
    pub min_bid_price: f64,

    /// Chain-level liquidity floor: minimum best-bid volume.
    #[serde(default = "default_min_bid_volume")]
    pub min_bid_volume: i64,

    /// Accepted days-to-expiry window.
    #[serde(default = "default_min_trading_days")]
    pub min_trading_days: i64,
    #[serde(default = "default_max_trading_days")]
    pub max_trading_days: i64,

    // Pre-trade tick-level liquidity gate.
    #[serde(default = "default_liquidity_min_volume")]
    pub liquidity_min_volume: i64,
    #[serde(default = "default_liquidity_min_bid_volume")]
    pub liquidity_min_bid_volume: i64,
    #[serde(default = "default_liquidity_max_spread_ticks")]
    pub liquidity_max_spread_ticks: f64,

    // Candidate scoring weights.
    #[serde(default = "default_score_liquidity_weight")]
    pub score_liquidity_weight: f64,
    #[serde(default = "default_score_otm_weight")]
    pub score_otm_weight: f64,
    #[serde(default = "default_score_expiry_weight")]
    pub score_expiry_weight: f64,
    #[serde(default = "default_liq_spread_weight")]
    pub liq_spread_weight: f64,
    #[serde(default = "default_liq_volume_weight")]
    pub liq_volume_weight: f64,

    /// Acceptance band for Delta-targeted selection.
    #[serde(default = "default_delta_tolerance")]
    pub delta_tolerance: f64,

    /// Strike-rank gap between the legs of a vertical spread.
    #[serde(default = "default_spread_width")]
    pub default_spread_width: usize,
}

impl Default for OptionSelectorConfig {
    fn default() -> Self {
        Self {
            strike_level: default_strike_level(),
            min_bid_price: default_min_bid_price(),
            min_bid_volume: default_min_bid_volume(),
            min_trading_days: default_min_trading_days(),
            max_trading_days: default_max_trading_days(),
            liquidity_min_volume: default_liquidity_min_volume(),
            liquidity_min_bid_volume: default_liquidity_min_bid_volume(),
            liquidity_max_spread_ticks: default_liquidity_max_spread_ticks(),
            score_liquidity_weight: default_score_liquidity_weight(),
            score_otm_weight: default_score_otm_weight(),
            score_expiry_weight: default_score_expiry_weight(),
            liq_spread_weight: default_liq_spread_weight(),
            liq_volume_weight: default_liq_volume_weight(),
            delta_tolerance: default_delta_tolerance(),
            default_spread_width: default_spread_width(),
        }
    }
}

// =============================================================================
// Result types
// =============================================================================

/// Multi-dimension score for one candidate contract; every subscore in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionScore {
    pub contract: OptionContract,
    pub liquidity_score: f64,
    pub otm_score: f64,
    pub expiry_score: f64,
    pub total_score: f64,
}

/// Outcome of a combination-aware joint selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinationSelectionResult {
    pub combination_type: CombinationType,
    pub legs: Vec<OptionContract>,
    pub success: bool,
    #[serde(default)]
    pub failure_reason: String,
}

impl CombinationSelectionResult {
    fn failure(combination_type: CombinationType, reason: impl Into<String>) -> Self {
        Self {
            combination_type,
            legs: Vec::new(),
            success: false,
            failure_reason: reason.into(),
        }
    }

    fn success(combination_type: CombinationType, legs: Vec<OptionContract>) -> Self {
        Self {
            combination_type,
            legs,
            success: true,
            failure_reason: String::new(),
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// Filters option chains and picks target legs.
#[derive(Debug, Clone)]
pub struct OptionSelectorService {
    pub config: OptionSelectorConfig,
}

impl OptionSelectorService {
    pub fn new(config: OptionSelectorConfig) -> Self {
        Self { config }
    }

    // -------------------------------------------------------------------------
    // Pipeline stages
    // -------------------------------------------------------------------------

    fn filter_liquidity<'a>(&self, contracts: Vec<&'a OptionContract>) -> Vec<&'a OptionContract> {
        contracts
            .into_iter()
            .filter(|c| c.bid_price >= self.config.min_bid_price)
            .filter(|c| c.bid_volume >= self.config.min_bid_volume)
            .collect()
    }

    fn filter_trading_days<'a>(&self, contracts: Vec<&'a OptionContract>) -> Vec<&'a OptionContract> {
        contracts
            .into_iter()
            .filter(|c| c.days_to_expiry >= self.config.min_trading_days)
            .filter(|c| c.days_to_expiry <= self.config.max_trading_days)
            .collect()
    }

    /// Compute `diff1` per contract, keep OTM only, sort ascending (closest
    /// to ATM first).
    fn otm_ranking(
        &self,
        contracts: Vec<&OptionContract>,
        underlying_price: f64,
    ) -> Vec<OptionContract> {
        if underlying_price <= 0.0 {
            return Vec::new();
        }
        let mut ranked: Vec<OptionContract> = contracts
            .into_iter()
            .map(|c| {
                let mut owned = c.clone();
                owned.diff1 = owned.otm_distance(underlying_price);
                owned
            })
            .filter(|c| c.diff1 > 0.0)
            .collect();
        ranked.sort_by(|a, b| a.diff1.total_cmp(&b.diff1));
        ranked
    }

    /// Run the full pipeline for one side of the chain.
    fn pipeline(
        &self,
        contracts: &[OptionContract],
        option_type: OptionType,
        underlying_price: f64,
    ) -> Vec<OptionContract> {
        let typed: Vec<&OptionContract> = contracts
            .iter()
            .filter(|c| c.option_type == option_type)
            .collect();
        let liquid = self.filter_liquidity(typed);
        let in_window = self.filter_trading_days(liquid);
        self.otm_ranking(in_window, underlying_price)
    }

    /// Rank `level` (1-based) from a ranked list; short lists fall back to
    /// the deepest OTM row, empty lists to none.
    fn select_by_level(ranked: &[OptionContract], level: usize) -> Option<OptionContract> {
        if ranked.is_empty() {
            return None;
        }
        let index = if ranked.len() < level {
            ranked.len() - 1
        } else {
            level - 1
        };
        Some(ranked[index].clone())
    }

    // -------------------------------------------------------------------------
    // Selection entry points
    // -------------------------------------------------------------------------

    /// Pick the OTM contract at `strike_level` (default from config) for the
    /// requested side. `option_type` is case-insensitive.
    pub fn select_option(
        &self,
        contracts: &[OptionContract],
        option_type: &str,
        underlying_price: f64,
        strike_level: Option<usize>,
    ) -> Option<OptionContract> {
        let side = OptionType::parse(option_type)?;
        let level = strike_level.unwrap_or(self.config.strike_level).max(1);

        let ranked = self.pipeline(contracts, side, underlying_price);
        if ranked.is_empty() {
            debug!(
                option_type = %side,
                underlying_price,
                "option selection: no OTM survivors after pipeline"
            );
            return None;
        }

        let picked = Self::select_by_level(&ranked, level);
        if let Some(contract) = &picked {
            debug!(
                vt_symbol = %contract.vt_symbol,
                diff1 = format!("{:.4}", contract.diff1),
                level,
                "option selected by OTM level"
            );
        }
        picked
    }

    /// All OTM survivors of the full pipeline, closest-to-ATM first.
    pub fn get_all_otm_options(
        &self,
        contracts: &[OptionContract],
        option_type: &str,
        underlying_price: f64,
    ) -> Vec<OptionContract> {
        match OptionType::parse(option_type) {
            Some(side) => self.pipeline(contracts, side, underlying_price),
            None => Vec::new(),
        }
    }

    /// Delta-targeted selection: among pipeline survivors with successful
    /// Greeks, keep |Δ − target| ≤ tolerance and return the closest. With no
    /// successful Greeks at all, fall back to level selection.
    pub fn select_by_delta(
        &self,
        contracts: &[OptionContract],
        option_type: &str,
        underlying_price: f64,
        target_delta: f64,
        greeks_map: &HashMap<String, GreeksResult>,
        delta_tolerance: Option<f64>,
    ) -> Option<OptionContract> {
        let side = OptionType::parse(option_type)?;
        if underlying_price <= 0.0 {
            return None;
        }
        let tolerance = delta_tolerance.unwrap_or(self.config.delta_tolerance);

        let ranked = self.pipeline(contracts, side, underlying_price);
        if ranked.is_empty() {
            return None;
        }

        let candidates: Vec<(&OptionContract, f64)> = ranked
            .iter()
            .filter_map(|c| {
                greeks_map
                    .get(&c.vt_symbol)
                    .filter(|g| g.success)
                    .map(|g| (c, g.delta))
            })
            .collect();

        if candidates.is_empty() {
            debug!(
                option_type = %side,
                "delta selection: no usable greeks, falling back to OTM level"
            );
            return self.select_option(contracts, option_type, underlying_price, None);
        }

        candidates
            .into_iter()
            .filter(|(_, delta)| (delta - target_delta).abs() <= tolerance)
            .min_by(|(_, a), (_, b)| {
                (a - target_delta).abs().total_cmp(&(b - target_delta).abs())
            })
            .map(|(contract, delta)| {
                debug!(
                    vt_symbol = %contract.vt_symbol,
                    delta = format!("{delta:.4}"),
                    target = target_delta,
                    "option selected by delta"
                );
                contract.clone()
            })
    }

    /// Jointly select the legs of a combination. Successful selections are
    /// re-validated against the structural rule of the requested type.
    pub fn select_combination(
        &self,
        contracts: &[OptionContract],
        combination_type: CombinationType,
        underlying_price: f64,
        strike_level: Option<usize>,
        spread_width: Option<usize>,
        option_type_for_spread: Option<&str>,
    ) -> Option<CombinationSelectionResult> {
        if underlying_price <= 0.0 {
            warn!(underlying_price, "combination selection: invalid underlying price");
            return None;
        }
        if contracts.is_empty() {
            return Some(CombinationSelectionResult::failure(
                combination_type,
                "empty contract list",
            ));
        }

        let result = match combination_type {
            CombinationType::Straddle => self.select_straddle(contracts, underlying_price),
            CombinationType::Strangle => {
                self.select_strangle(contracts, underlying_price, strike_level)
            }
            CombinationType::VerticalSpread => self.select_vertical_spread(
                contracts,
                underlying_price,
                spread_width,
                option_type_for_spread,
            ),
            other => CombinationSelectionResult::failure(
                other,
                format!("unsupported combination type: {other}"),
            ),
        };

        if !result.success {
            return Some(result);
        }

        // Re-validate the picked legs against the shared structural rules.
        let structures: Vec<LegStructure> = result
            .legs
            .iter()
            .map(|c| LegStructure {
                option_type: c.option_type,
                strike_price: c.strike_price,
                expiry_date: c.expiry_date.clone(),
            })
            .collect();
        if let Err(reason) = validator_for(combination_type)(&structures) {
            return Some(CombinationSelectionResult {
                combination_type,
                legs: result.legs,
                success: false,
                failure_reason: format!("structural: {reason}"),
            });
        }

        Some(result)
    }

    fn select_straddle(
        &self,
        contracts: &[OptionContract],
        underlying_price: f64,
    ) -> CombinationSelectionResult {
        let combo_type = CombinationType::Straddle;

        let filtered: Vec<&OptionContract> =
            self.filter_trading_days(self.filter_liquidity(contracts.iter().collect()));
        if filtered.is_empty() {
            return CombinationSelectionResult::failure(
                combo_type,
                "no contracts left after liquidity and expiry filters",
            );
        }

        let calls: Vec<&OptionContract> = filtered
            .iter()
            .copied()
            .filter(|c| c.option_type == OptionType::Call)
            .collect();
        let puts: Vec<&OptionContract> = filtered
            .iter()
            .copied()
            .filter(|c| c.option_type == OptionType::Put)
            .collect();
        if calls.is_empty() || puts.is_empty() {
            let missing = if calls.is_empty() { "call" } else { "put" };
            return CombinationSelectionResult::failure(
                combo_type,
                format!("no liquid {missing} contracts"),
            );
        }

        // Strikes present on both sides; pick the one nearest the spot.
        let common: Vec<f64> = calls
            .iter()
            .map(|c| c.strike_price)
            .filter(|strike| puts.iter().any(|p| p.strike_price == *strike))
            .collect();
        let Some(atm_strike) = common
            .into_iter()
            .min_by(|a, b| {
                (a - underlying_price)
                    .abs()
                    .total_cmp(&(b - underlying_price).abs())
            })
        else {
            return CombinationSelectionResult::failure(
                combo_type,
                "no strike shared by calls and puts",
            );
        };

        let call_leg = calls
            .iter()
            .find(|c| c.strike_price == atm_strike)
            .expect("strike came from calls");
        let put_leg = puts
            .iter()
            .find(|p| p.strike_price == atm_strike)
            .expect("strike came from puts");

        debug!(
            strike = atm_strike,
            call = %call_leg.vt_symbol,
            put = %put_leg.vt_symbol,
            "straddle legs selected"
        );
        CombinationSelectionResult::success(combo_type, vec![(*call_leg).clone(), (*put_leg).clone()])
    }

    fn select_strangle(
        &self,
        contracts: &[OptionContract],
        underlying_price: f64,
        strike_level: Option<usize>,
    ) -> CombinationSelectionResult {
        let combo_type = CombinationType::Strangle;
        let level = strike_level.unwrap_or(self.config.strike_level).max(1);

        let calls = self.pipeline(contracts, OptionType::Call, underlying_price);
        if calls.is_empty() {
            return CombinationSelectionResult::failure(combo_type, "no OTM call candidates");
        }
        let puts = self.pipeline(contracts, OptionType::Put, underlying_price);
        if puts.is_empty() {
            return CombinationSelectionResult::failure(combo_type, "no OTM put candidates");
        }

        let call_leg = Self::select_by_level(&calls, level);
        let put_leg = Self::select_by_level(&puts, level);
        match (call_leg, put_leg) {
            (Some(call), Some(put)) => {
                debug!(
                    level,
                    call = %call.vt_symbol,
                    put = %put.vt_symbol,
                    "strangle legs selected"
                );
                CombinationSelectionResult::success(combo_type, vec![call, put])
            }
            _ => CombinationSelectionResult::failure(
                combo_type,
                "could not reach target OTM level on both sides",
            ),
        }
    }

    fn select_vertical_spread(
        &self,
        contracts: &[OptionContract],
        underlying_price: f64,
        spread_width: Option<usize>,
        option_type_for_spread: Option<&str>,
    ) -> CombinationSelectionResult {
        let combo_type = CombinationType::VerticalSpread;
        let width = spread_width.unwrap_or(self.config.default_spread_width).max(1);
        let side_str = option_type_for_spread.unwrap_or("call");
        let Some(side) = OptionType::parse(side_str) else {
            return CombinationSelectionResult::failure(
                combo_type,
                format!("invalid option type: {side_str}"),
            );
        };

        let ranked = self.pipeline(contracts, side, underlying_price);
        if ranked.is_empty() {
            return CombinationSelectionResult::failure(
                combo_type,
                format!("no OTM {side} candidates"),
            );
        }

        let near = Self::select_by_level(&ranked, 1);
        let far = Self::select_by_level(&ranked, 1 + width);
        let (Some(near), Some(far)) = (near, far) else {
            return CombinationSelectionResult::failure(combo_type, "could not select both legs");
        };
        if near.strike_price == far.strike_price {
            return CombinationSelectionResult::failure(
                combo_type,
                "near and far legs share a strike",
            );
        }

        debug!(
            side = %side,
            near = %near.vt_symbol,
            far = %far.vt_symbol,
            width,
            "vertical spread legs selected"
        );
        CombinationSelectionResult::success(combo_type, vec![near, far])
    }

    // -------------------------------------------------------------------------
    // Pre-trade liquidity gate
    // -------------------------------------------------------------------------

    /// Tick-level liquidity gate run before opening a position: session
    /// volume, best-bid depth and spread-in-ticks must all clear their
    /// floors.
    pub fn check_liquidity(&self, stats: &MarketStats, price_tick: f64) -> bool {
        if stats.volume < self.config.liquidity_min_volume {
            debug!(
                vt_symbol = %stats.vt_symbol,
                volume = stats.volume,
                "liquidity gate: session volume below floor"
            );
            return false;
        }
        if stats.bid_volume < self.config.liquidity_min_bid_volume {
            debug!(
                vt_symbol = %stats.vt_symbol,
                bid_volume = stats.bid_volume,
                "liquidity gate: bid depth below floor"
            );
            return false;
        }
        if price_tick <= 0.0 {
            debug!(vt_symbol = %stats.vt_symbol, price_tick, "liquidity gate: invalid price tick");
            return false;
        }
        let spread_ticks = (stats.ask_price - stats.bid_price) / price_tick;
        if spread_ticks >= self.config.liquidity_max_spread_ticks {
            debug!(
                vt_symbol = %stats.vt_symbol,
                spread_ticks = format!("{spread_ticks:.1}"),
                "liquidity gate: spread too wide"
            );
            return false;
        }
        true
    }

    // -------------------------------------------------------------------------
    // Candidate scoring
    // -------------------------------------------------------------------------

    /// Score and rank OTM candidates on liquidity, OTM distance and expiry
    /// fit. Negative or all-zero weights fall back to the config defaults.
    pub fn score_candidates(
        &self,
        contracts: &[OptionContract],
        option_type: &str,
        underlying_price: f64,
        liquidity_weight: Option<f64>,
        otm_weight: Option<f64>,
        expiry_weight: Option<f64>,
    ) -> Vec<SelectionScore> {
        let Some(side) = OptionType::parse(option_type) else {
            return Vec::new();
        };
        if contracts.is_empty() || underlying_price <= 0.0 {
            return Vec::new();
        }

        let mut w_liq = liquidity_weight.unwrap_or(self.config.score_liquidity_weight);
        let mut w_otm = otm_weight.unwrap_or(self.config.score_otm_weight);
        let mut w_exp = expiry_weight.unwrap_or(self.config.score_expiry_weight);
        if w_liq < 0.0 || w_otm < 0.0 || w_exp < 0.0 || (w_liq + w_otm + w_exp) == 0.0 {
            warn!(
                w_liq, w_otm, w_exp,
                "invalid scoring weights, falling back to defaults"
            );
            w_liq = self.config.score_liquidity_weight;
            w_otm = self.config.score_otm_weight;
            w_exp = self.config.score_expiry_weight;
        }

        let typed: Vec<&OptionContract> = contracts
            .iter()
            .filter(|c| c.option_type == side)
            .collect();
        let ranked = self.otm_ranking(typed, underlying_price);

        let mut scores: Vec<SelectionScore> = ranked
            .into_iter()
            .map(|contract| {
                let liquidity_score = self.liquidity_subscore(&contract);
                let otm_score = 1.0 / (1.0 + contract.diff1.abs());
                let expiry_score = self.expiry_subscore(contract.days_to_expiry);
                let total_score =
                    liquidity_score * w_liq + otm_score * w_otm + expiry_score * w_exp;
                SelectionScore {
                    contract,
                    liquidity_score,
                    otm_score,
                    expiry_score,
                    total_score,
                }
            })
            .collect();

        scores.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
        scores
    }

    /// Liquidity subscore in [0, 1]: tight spreads and deep bids win.
    fn liquidity_subscore(&self, contract: &OptionContract) -> f64 {
        let spread = (contract.ask_price - contract.bid_price).max(0.0);
        let spread_component = 1.0 / (1.0 + spread);
        let volume_component = 1.0 - 1.0 / (1.0 + contract.bid_volume.max(0) as f64);
        self.config.liq_spread_weight * spread_component
            + self.config.liq_volume_weight * volume_component
    }

    /// Expiry subscore in [0, 1]: distance from the midpoint of the accepted
    /// trading-day window, linear falloff to the window edges.
    fn expiry_subscore(&self, days_to_expiry: i64) -> f64 {
        let midpoint = (self.config.min_trading_days + self.config.max_trading_days) as f64 / 2.0;
        let half_range = (self.config.max_trading_days - self.config.min_trading_days) as f64 / 2.0;
        if half_range <= 0.0 {
            return if days_to_expiry == self.config.min_trading_days {
                1.0
            } else {
                0.0
            };
        }
        let deviation = (days_to_expiry as f64 - midpoint).abs();
        (1.0 - deviation / half_range).max(0.0)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(
        vt_symbol: &str,
        option_type: OptionType,
        strike: f64,
        bid_price: f64,
        bid_volume: i64,
        days: i64,
    ) -> OptionContract {
        OptionContract {
            vt_symbol: vt_symbol.to_string(),
            underlying_symbol: "m2506".to_string(),
            option_type,
            strike_price: strike,
            expiry_date: "2025-06-15".to_string(),
            bid_price,
            bid_volume,
            ask_price: bid_price + 1.0,
            ask_volume: bid_volume,
            days_to_expiry: days,
            diff1: 0.0,
        }
    }

    fn config() -> OptionSelectorConfig {
        OptionSelectorConfig {
            strike_level: 1,
            min_bid_price: 5.0,
            min_bid_volume: 5,
            min_trading_days: 1,
            max_trading_days: 50,
            ..OptionSelectorConfig::default()
        }
    }

    fn chain() -> Vec<OptionContract> {
        vec![
            // OTM calls above spot 4000.
            contract("c4100", OptionType::Call, 4100.0, 20.0, 50, 30),
            contract("c4200", OptionType::Call, 4200.0, 12.0, 40, 30),
            contract("c4300", OptionType::Call, 4300.0, 8.0, 30, 30),
            // ITM call, must be filtered out by OTM ranking.
            contract("c3900", OptionType::Call, 3900.0, 50.0, 60, 30),
            // OTM puts below spot.
            contract("p3900", OptionType::Put, 3900.0, 18.0, 45, 30),
            contract("p3800", OptionType::Put, 3800.0, 11.0, 35, 30),
            // Illiquid put, dropped by the liquidity filter.
            contract("p3700", OptionType::Put, 3700.0, 1.0, 1, 30),
        ]
    }

    #[test]
    fn select_option_returns_kth_otm_rank() {
        let selector = OptionSelectorService::new(config());
        let first = selector.select_option(&chain(), "CALL", 4000.0, Some(1)).unwrap();
        assert_eq!(first.vt_symbol, "c4100");
        let second = selector.select_option(&chain(), "call", 4000.0, Some(2)).unwrap();
        assert_eq!(second.vt_symbol, "c4200");
    }

    #[test]
    fn short_ranking_falls_back_to_deepest_otm() {
        let selector = OptionSelectorService::new(config());
        let deep = selector.select_option(&chain(), "call", 4000.0, Some(10)).unwrap();
        assert_eq!(deep.vt_symbol, "c4300");
    }

    #[test]
    fn no_otm_survivors_yields_none() {
        let selector = OptionSelectorService::new(config());
        // Spot above every call strike → nothing OTM.
        assert!(selector.select_option(&chain(), "call", 9000.0, Some(1)).is_none());
    }

    #[test]
    fn pipeline_drops_illiquid_and_itm_rows() {
        let selector = OptionSelectorService::new(config());
        let otm_puts = selector.get_all_otm_options(&chain(), "put", 4000.0);
        let symbols: Vec<&str> = otm_puts.iter().map(|c| c.vt_symbol.as_str()).collect();
        // p3700 is illiquid; order is closest-to-ATM first.
        assert_eq!(symbols, vec!["p3900", "p3800"]);
        assert!(otm_puts.iter().all(|c| c.diff1 > 0.0));
    }

    #[test]
    fn select_by_delta_picks_minimum_distance_within_tolerance() {
        let selector = OptionSelectorService::new(config());
        let mut greeks = HashMap::new();
        greeks.insert("c4100".to_string(), GreeksResult::ok(0.45, 0.0, 0.0, 0.0));
        greeks.insert("c4200".to_string(), GreeksResult::ok(0.32, 0.0, 0.0, 0.0));
        greeks.insert("c4300".to_string(), GreeksResult::ok(0.20, 0.0, 0.0, 0.0));

        let picked = selector
            .select_by_delta(&chain(), "call", 4000.0, 0.30, &greeks, Some(0.10))
            .unwrap();
        assert_eq!(picked.vt_symbol, "c4200");
    }

    #[test]
    fn select_by_delta_none_when_all_outside_tolerance() {
        let selector = OptionSelectorService::new(config());
        let mut greeks = HashMap::new();
        greeks.insert("c4100".to_string(), GreeksResult::ok(0.9, 0.0, 0.0, 0.0));

        let picked = selector.select_by_delta(&chain(), "call", 4000.0, 0.3, &greeks, Some(0.05));
        assert!(picked.is_none());
    }

    #[test]
    fn select_by_delta_falls_back_without_greeks() {
        let selector = OptionSelectorService::new(config());
        // Map exists but every entry failed → fall back to level selection.
        let mut greeks = HashMap::new();
        greeks.insert("c4100".to_string(), GreeksResult::failed());

        let picked = selector
            .select_by_delta(&chain(), "call", 4000.0, 0.3, &greeks, Some(0.05))
            .unwrap();
        assert_eq!(picked.vt_symbol, "c4100");
    }

    #[test]
    fn straddle_selects_common_strike_nearest_spot() {
        let mut contracts = chain();
        contracts.push(contract("p4100", OptionType::Put, 4100.0, 15.0, 20, 30));
        let selector = OptionSelectorService::new(config());

        let result = selector
            .select_combination(&contracts, CombinationType::Straddle, 4080.0, None, None, None)
            .unwrap();
        assert!(result.success, "{}", result.failure_reason);
        let strikes: Vec<f64> = result.legs.iter().map(|l| l.strike_price).collect();
        assert_eq!(strikes, vec![4100.0, 4100.0]);
    }

    #[test]
    fn strangle_picks_requested_rank_each_side() {
        let selector = OptionSelectorService::new(config());
        let result = selector
            .select_combination(&chain(), CombinationType::Strangle, 4000.0, Some(2), None, None)
            .unwrap();
        assert!(result.success, "{}", result.failure_reason);
        let symbols: Vec<&str> = result.legs.iter().map(|l| l.vt_symbol.as_str()).collect();
        assert_eq!(symbols, vec!["c4200", "p3800"]);
    }

    #[test]
    fn vertical_spread_requires_distinct_strikes() {
        let selector = OptionSelectorService::new(config());
        let result = selector
            .select_combination(
                &chain(),
                CombinationType::VerticalSpread,
                4000.0,
                None,
                Some(1),
                Some("call"),
            )
            .unwrap();
        assert!(result.success, "{}", result.failure_reason);
        assert_eq!(result.legs[0].vt_symbol, "c4100");
        assert_eq!(result.legs[1].vt_symbol, "c4200");
    }

    #[test]
    fn unsupported_combination_type_reports_failure() {
        let selector = OptionSelectorService::new(config());
        let result = selector
            .select_combination(&chain(), CombinationType::IronCondor, 4000.0, None, None, None)
            .unwrap();
        assert!(!result.success);
        assert!(result.failure_reason.contains("unsupported"));
    }

    #[test]
    fn invalid_underlying_price_returns_none() {
        let selector = OptionSelectorService::new(config());
        assert!(selector
            .select_combination(&chain(), CombinationType::Straddle, 0.0, None, None, None)
            .is_none());
    }

    #[test]
    fn scores_sorted_descending_with_subscores_in_unit_range() {
        let selector = OptionSelectorService::new(config());
        let scores = selector.score_candidates(&chain(), "call", 4000.0, None, None, None);
        assert_eq!(scores.len(), 3);
        for window in scores.windows(2) {
            assert!(window[0].total_score >= window[1].total_score);
        }
        for s in &scores {
            for sub in [s.liquidity_score, s.otm_score, s.expiry_score] {
                assert!((0.0..=1.0).contains(&sub), "subscore {sub} out of range");
            }
        }
    }

    #[test]
    fn bad_weights_fall_back_to_defaults() {
        let selector = OptionSelectorService::new(config());
        let with_defaults = selector.score_candidates(&chain(), "call", 4000.0, None, None, None);
        let with_bad = selector.score_candidates(
            &chain(),
            "call",
            4000.0,
            Some(-1.0),
            Some(0.5),
            Some(0.5),
        );
        assert_eq!(with_defaults.len(), with_bad.len());
        for (a, b) in with_defaults.iter().zip(&with_bad) {
            assert!((a.total_score - b.total_score).abs() < 1e-12);
        }
    }

    #[test]
    fn liquidity_gate_enforces_all_three_floors() {
        let selector = OptionSelectorService::new(OptionSelectorConfig {
            liquidity_min_volume: 100,
            liquidity_min_bid_volume: 10,
            liquidity_max_spread_ticks: 10.0,
            ..config()
        });
        let stats = MarketStats {
            vt_symbol: "x".to_string(),
            volume: 500,
            open_interest: 0.0,
            bid_price: 100.0,
            ask_price: 101.0,
            bid_volume: 20,
        };

        assert!(selector.check_liquidity(&stats, 0.5));
        // Thin session volume.
        let thin = MarketStats { volume: 50, ..stats.clone() };
        assert!(!selector.check_liquidity(&thin, 0.5));
        // Shallow best bid.
        let shallow = MarketStats { bid_volume: 2, ..stats.clone() };
        assert!(!selector.check_liquidity(&shallow, 0.5));
        // Wide spread: 1.0 / 0.05 = 20 ticks.
        assert!(!selector.check_liquidity(&stats, 0.05));
        // Invalid price tick.
        assert!(!selector.check_liquidity(&stats, 0.0));
    }
}
