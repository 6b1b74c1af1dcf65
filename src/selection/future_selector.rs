// =============================================================================
// Future selector — dominant-contract scoring, maturity filtering and the
// roll-over advisor
// =============================================================================

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::market::{expiry_from_symbol, month_window, FutureContract, MarketStats};

fn default_volume_weight() -> f64 {
    0.6
}

fn default_oi_weight() -> f64 {
    0.4
}

fn default_rollover_days() -> i64 {
    5
}

/// Tunables for dominant-contract selection and roll-over checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FutureSelectorConfig {
    #[serde(default = "default_volume_weight")]
    pub volume_weight: f64,
    #[serde(default = "default_oi_weight")]
    pub oi_weight: f64,
    /// Remaining calendar days at or below which a roll-over is advised.
    #[serde(default = "default_rollover_days")]
    pub rollover_days: i64,
}

impl Default for FutureSelectorConfig {
    fn default() -> Self {
        Self {
            volume_weight: default_volume_weight(),
            oi_weight: default_oi_weight(),
            rollover_days: default_rollover_days(),
        }
    }
}

/// Which expiry window `filter_by_maturity` keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaturityMode {
    CurrentMonth,
    NextMonth,
    Custom,
}

/// Advice produced by `check_rollover`. `has_target = false` flags the case
/// where the roll is due but no next-month contract exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverRecommendation {
    pub current_contract_symbol: String,
    pub target_contract_symbol: String,
    pub remaining_days: i64,
    pub reason: String,
    pub has_target: bool,
}

/// Contract selection over a futures curve.
#[derive(Debug, Clone, Default)]
pub struct BaseFutureSelector {
    pub config: FutureSelectorConfig,
}

impl BaseFutureSelector {
    pub fn new(config: FutureSelectorConfig) -> Self {
        Self { config }
    }

    /// Expiry used for ordering; unparseable symbols sort last.
    fn expiry_or_max(contract: &FutureContract) -> NaiveDate {
        contract.expiry().unwrap_or(NaiveDate::MAX)
    }

    // -------------------------------------------------------------------------
    // Dominant contract
    // -------------------------------------------------------------------------

    /// Pick the dominant contract by `volume·v_w + open_interest·oi_w`.
    ///
    /// Falls back to earliest expiry when market data is absent or every
    /// score is zero. Ties break toward the earliest expiry.
    pub fn select_dominant_contract<'a>(
        &self,
        contracts: &'a [FutureContract],
        market_data: Option<&HashMap<String, MarketStats>>,
        volume_weight: Option<f64>,
        oi_weight: Option<f64>,
    ) -> Option<&'a FutureContract> {
        if contracts.is_empty() {
            return None;
        }

        let v_w = volume_weight.unwrap_or(self.config.volume_weight);
        let oi_w = oi_weight.unwrap_or(self.config.oi_weight);

        let Some(market_data) = market_data.filter(|m| !m.is_empty()) else {
            debug!("no market data, dominant contract falls back to earliest expiry");
            return contracts.iter().min_by_key(|c| Self::expiry_or_max(c));
        };

        let score = |contract: &FutureContract| -> f64 {
            market_data
                .get(&contract.vt_symbol)
                .map(|md| md.volume as f64 * v_w + md.open_interest * oi_w)
                .unwrap_or(0.0)
        };

        if contracts.iter().all(|c| score(c) == 0.0) {
            debug!("all dominance scores zero, falling back to earliest expiry");
            return contracts.iter().min_by_key(|c| Self::expiry_or_max(c));
        }

        let selected = contracts.iter().max_by(|a, b| {
            score(a)
                .total_cmp(&score(b))
                // max_by keeps the later of equal elements, so order the
                // tie-break so that earlier expiries compare greater.
                .then_with(|| Self::expiry_or_max(b).cmp(&Self::expiry_or_max(a)))
        });

        if let Some(contract) = selected {
            info!(
                vt_symbol = %contract.vt_symbol,
                score = format!("{:.2}", score(contract)),
                "dominant contract selected"
            );
        }
        selected
    }

    // -------------------------------------------------------------------------
    // Maturity filtering
    // -------------------------------------------------------------------------

    /// Keep contracts whose parsed expiry lies inside the requested window
    /// (inclusive). Unparseable symbols are dropped.
    pub fn filter_by_maturity<'a>(
        &self,
        contracts: &'a [FutureContract],
        current_date: NaiveDate,
        mode: MaturityMode,
        custom_range: Option<(NaiveDate, NaiveDate)>,
    ) -> Vec<&'a FutureContract> {
        if contracts.is_empty() {
            return Vec::new();
        }

        let (range_start, range_end) = match mode {
            MaturityMode::CurrentMonth => month_window(current_date, 0),
            MaturityMode::NextMonth => month_window(current_date, 1),
            MaturityMode::Custom => match custom_range {
                Some(range) => range,
                None => {
                    warn!("custom maturity filter requires an explicit date range");
                    return Vec::new();
                }
            },
        };

        contracts
            .iter()
            .filter(|contract| match contract.expiry() {
                Some(expiry) => range_start <= expiry && expiry <= range_end,
                None => {
                    debug!(symbol = %contract.symbol, "unparseable expiry, contract dropped");
                    false
                }
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Roll-over advisor
    // -------------------------------------------------------------------------

    /// Advise a roll when the current contract has `rollover_days` or fewer
    /// calendar days left. The target is the next-month contract with the
    /// highest volume (earliest expiry when market data is absent).
    pub fn check_rollover(
        &self,
        current_contract: &FutureContract,
        all_contracts: &[FutureContract],
        current_date: NaiveDate,
        rollover_days: Option<i64>,
        market_data: Option<&HashMap<String, MarketStats>>,
    ) -> Option<RolloverRecommendation> {
        let threshold = rollover_days.unwrap_or(self.config.rollover_days);
        let expiry = current_contract.expiry()?;
        let remaining_days = (expiry - current_date).num_days();

        if remaining_days > threshold {
            return None;
        }

        info!(
            symbol = %current_contract.symbol,
            remaining_days,
            threshold,
            "roll-over threshold reached"
        );

        let (next_start, next_end) = month_window(expiry, 1);
        let candidates: Vec<&FutureContract> = all_contracts
            .iter()
            .filter(|c| c.vt_symbol != current_contract.vt_symbol)
            .filter(|c| match c.expiry() {
                Some(e) => next_start <= e && e <= next_end,
                None => false,
            })
            .collect();

        if candidates.is_empty() {
            warn!(symbol = %current_contract.symbol, "no next-month roll-over target found");
            return Some(RolloverRecommendation {
                current_contract_symbol: current_contract.symbol.clone(),
                target_contract_symbol: String::new(),
                remaining_days,
                reason: format!(
                    "contract {} has {remaining_days} days left but no next-month target exists",
                    current_contract.symbol
                ),
                has_target: false,
            });
        }

        let best = match market_data.filter(|m| !m.is_empty()) {
            Some(market_data) => {
                let volume_of = |c: &FutureContract| {
                    market_data
                        .get(&c.vt_symbol)
                        .map(|md| md.volume)
                        .unwrap_or(0)
                };
                // Ties keep the first candidate in contract-list order.
                candidates
                    .iter()
                    .copied()
                    .fold(None::<&FutureContract>, |best, c| match best {
                        Some(b) if volume_of(c) > volume_of(b) => Some(c),
                        Some(b) => Some(b),
                        None => Some(c),
                    })
                    .expect("candidates not empty")
            }
            None => candidates
                .iter()
                .min_by_key(|c| Self::expiry_or_max(c))
                .copied()
                .expect("candidates not empty"),
        };

        info!(
            from = %current_contract.symbol,
            to = %best.symbol,
            "roll-over recommended"
        );
        Some(RolloverRecommendation {
            current_contract_symbol: current_contract.symbol.clone(),
            target_contract_symbol: best.symbol.clone(),
            remaining_days,
            reason: format!(
                "contract {} has {remaining_days} days left, roll to {}",
                current_contract.symbol, best.symbol
            ),
            has_target: true,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
