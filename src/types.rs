// =============================================================================
// Shared types used across the Volaris options trading engine
// =============================================================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Trade direction of an order or a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    /// The opposite direction (used when closing a leg).
    pub fn reversed(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Whether an order opens a new position or closes an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Offset {
    Open,
    Close,
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// Order pricing style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

impl Default for OrderType {
    fn default() -> Self {
        Self::Limit
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limit => write!(f, "limit"),
            Self::Market => write!(f, "market"),
        }
    }
}

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Parse a user-facing string, case-insensitive ("CALL" / "put" / ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "call" => Some(Self::Call),
            "put" => Some(Self::Put),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Put => "put",
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A trade instruction produced by the core and routed by the external
/// gateway. The core never consumes these back; fills come in as closed
/// symbol sets and realized-PnL maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInstruction {
    pub vt_symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    pub volume: i64,
    pub price: f64,
    #[serde(default)]
    pub signal: String,
    #[serde(default)]
    pub order_type: OrderType,
}

/// A single option position as reported by the external position aggregate.
///
/// Only the fields the core needs: recognition, stop-loss monitoring and
/// sizing all key off `vt_symbol`, direction and volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub vt_symbol: String,
    pub direction: Direction,
    pub volume: i64,
    pub open_price: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Per-contract Greeks as supplied by the pricing feed.
///
/// `success = false` marks a failed computation; consumers must treat the
/// numeric fields as garbage in that case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GreeksResult {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    #[serde(default = "default_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}

impl GreeksResult {
    pub fn ok(delta: f64, gamma: f64, theta: f64, vega: f64) -> Self {
        Self {
            delta,
            gamma,
            theta,
            vega,
            success: true,
        }
    }

    pub fn failed() -> Self {
        Self {
            delta: 0.0,
            gamma: 0.0,
            theta: 0.0,
            vega: 0.0,
            success: false,
        }
    }
}

/// Aggregated Greeks across every active position in the portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioGreeks {
    pub total_delta: f64,
    pub total_gamma: f64,
    pub total_theta: f64,
    pub total_vega: f64,
    pub position_count: usize,
    pub timestamp: NaiveDateTime,
}

/// Absolute-value limits on position-level and portfolio-level Greeks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub position_delta_limit: f64,
    pub position_gamma_limit: f64,
    pub position_vega_limit: f64,
    pub portfolio_delta_limit: f64,
    pub portfolio_gamma_limit: f64,
    pub portfolio_vega_limit: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            position_delta_limit: 0.8,
            position_gamma_limit: 0.1,
            position_vega_limit: 50.0,
            portfolio_delta_limit: 5.0,
            portfolio_gamma_limit: 1.0,
            portfolio_vega_limit: 500.0,
        }
    }
}

/// Outcome of a risk check. `reject_reason` is empty when `passed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCheckResult {
    pub passed: bool,
    #[serde(default)]
    pub reject_reason: String,
}

impl RiskCheckResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reject_reason: String::new(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reject_reason: reason.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
