// =============================================================================
// Market value objects — option chain rows, futures contracts, per-contract
// market statistics, and contract-symbol expiry parsing
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::OptionType;

/// One row of an option-chain snapshot.
///
/// `diff1` is the signed relative distance to the money: positive iff the
/// contract is out-of-the-money, computed against the underlying price at
/// ranking time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionContract {
    pub vt_symbol: String,
    pub underlying_symbol: String,
    pub option_type: OptionType,
    pub strike_price: f64,
    /// Expiry date as an ISO-8601 string; legs compare these verbatim.
    pub expiry_date: String,
    #[serde(default)]
    pub bid_price: f64,
    #[serde(default)]
    pub bid_volume: i64,
    #[serde(default)]
    pub ask_price: f64,
    #[serde(default)]
    pub ask_volume: i64,
    #[serde(default)]
    pub days_to_expiry: i64,
    /// Signed relative OTM distance; filled by the selector pipeline.
    #[serde(default)]
    pub diff1: f64,
}

impl OptionContract {
    /// Relative OTM distance against `underlying_price`.
    ///
    /// Call: (strike - underlying) / underlying.
    /// Put:  (underlying - strike) / underlying.
    pub fn otm_distance(&self, underlying_price: f64) -> f64 {
        match self.option_type {
            OptionType::Call => (self.strike_price - underlying_price) / underlying_price,
            OptionType::Put => (underlying_price - self.strike_price) / underlying_price,
        }
    }
}

/// A tradeable futures contract, identified by its raw symbol (e.g. "rb2505")
/// and venue-qualified `vt_symbol` (e.g. "rb2505.SHFE").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FutureContract {
    pub symbol: String,
    pub vt_symbol: String,
}

impl FutureContract {
    pub fn new(symbol: impl Into<String>, exchange: &str) -> Self {
        let symbol = symbol.into();
        let vt_symbol = format!("{symbol}.{exchange}");
        Self { symbol, vt_symbol }
    }

    /// Expiry parsed from this contract's symbol, if the suffix is a valid
    /// YYMM.
    pub fn expiry(&self) -> Option<NaiveDate> {
        expiry_from_symbol(&self.symbol)
    }
}

/// Per-contract market statistics used by selection and liquidity scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketStats {
    pub vt_symbol: String,
    /// Cumulative session volume.
    #[serde(default)]
    pub volume: i64,
    #[serde(default)]
    pub open_interest: f64,
    #[serde(default)]
    pub bid_price: f64,
    #[serde(default)]
    pub ask_price: f64,
    /// Size resting at the best bid.
    #[serde(default)]
    pub bid_volume: i64,
}

/// Day-of-month used for parsed contract expiries. Commodity futures stop
/// trading mid-month; only rollover's remaining-days calculation observes
/// the day, month-window filters do not.
const EXPIRY_DAY: u32 = 15;

/// Parse a contract symbol's trailing YYMM digits into an expiry date.
///
/// "rb2505" → 2025-05-15. Returns `None` when the symbol does not end in
/// four digits or the digits do not form a valid month.
pub fn expiry_from_symbol(symbol: &str) -> Option<NaiveDate> {
    let digits: String = symbol
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    if digits.len() < 4 {
        return None;
    }
    let yymm = &digits[digits.len() - 4..];
    let yy: i32 = yymm[..2].parse().ok()?;
    let mm: u32 = yymm[2..].parse().ok()?;
    if !(1..=12).contains(&mm) {
        return None;
    }
    NaiveDate::from_ymd_opt(2000 + yy, mm, EXPIRY_DAY)
}

/// First and last calendar day of the month containing `anchor`, shifted by
/// `months_ahead` whole months.
pub fn month_window(anchor: NaiveDate, months_ahead: u32) -> (NaiveDate, NaiveDate) {
    use chrono::Datelike;

    let total = anchor.month0() + months_ahead;
    let year = anchor.year() + (total / 12) as i32;
    let month = total % 12 + 1;

    let start = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month start");
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("valid next month start")
        .pred_opt()
        .expect("month end exists");
    (start, end)
}

// =============================================================================
// Tests
// =============================================================================
