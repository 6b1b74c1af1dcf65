// =============================================================================
// Strategy engine — owns the aggregates and domain services, wires fills,
// analytics, stops and hedging together, and speaks the snapshot envelope
// =============================================================================
//
// Envelope shape (all keys optional on load for backward compatibility):
//
//   {
//     "schema_version": 1,
//     "target_aggregate": { ... },
//     "position_aggregate": { "positions": {"__dataframe__": ...} },
//     "combination_aggregate": { "combinations": {...}, "symbol_index": {...} },
//     "current_dt": {"__datetime__": "..."}
//   }
//
// An absent combination_aggregate restores as an empty one.
// =============================================================================

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::combination::aggregate::CombinationAggregate;
use crate::combination::entity::{Combination, CombinationType, InvalidCombination};
use crate::combination::facade::{CombinationEvaluation, CombinationFacade};
use crate::combination::greeks::CombinationGreeksCalculator;
use crate::combination::lifecycle::CombinationLifecycleService;
use crate::combination::pnl::CombinationPnLCalculator;
use crate::combination::recognizer::CombinationRecognizer;
use crate::combination::risk::CombinationRiskChecker;
use crate::config::EngineConfig;
use crate::events::DomainEvent;
use crate::hedging::delta::{DeltaHedgingEngine, GammaScalper};
use crate::hedging::vega::{VegaHedgeResult, VegaHedgingEngine};
use crate::market::{MarketStats, OptionContract};
use crate::orders::AdvancedOrderScheduler;
use crate::persistence::snapshot::{SnapshotDoc, SnapshotValue};
use crate::risk::liquidity::LiquidityRiskMonitor;
use crate::risk::portfolio::{PortfolioRiskAggregator, PositionGreeksEntry};
use crate::risk::sizing::PositionSizingService;
use crate::risk::stop_loss::StopLossManager;
use crate::selection::future_selector::BaseFutureSelector;
use crate::selection::option_selector::OptionSelectorService;
use crate::types::{GreeksResult, OrderInstruction, PortfolioGreeks, Position};

/// Selection state for the traded underlying; persisted so a restart keeps
/// hedging against the same dominant contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    #[serde(default)]
    pub underlying_vt_symbol: String,
    #[serde(default)]
    pub dominant_contract: String,
}

/// The trading core: aggregates plus every domain service, single-threaded.
pub struct StrategyEngine {
    config: EngineConfig,

    combinations: CombinationAggregate,
    positions: Vec<Position>,
    target: TargetState,
    current_dt: Option<NaiveDateTime>,

    recognizer: CombinationRecognizer,
    facade: CombinationFacade,
    lifecycle: CombinationLifecycleService,
    pub option_selector: OptionSelectorService,
    pub future_selector: BaseFutureSelector,
    pub sizing: PositionSizingService,
    pub stop_loss: StopLossManager,
    pub liquidity: LiquidityRiskMonitor,
    pub portfolio_risk: PortfolioRiskAggregator,
    pub order_scheduler: AdvancedOrderScheduler,
    pub delta_hedger: DeltaHedgingEngine,
    pub gamma_scalper: GammaScalper,
    pub vega_hedger: VegaHedgingEngine,
}

impl StrategyEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let facade = CombinationFacade::new(
            CombinationGreeksCalculator::new(),
            CombinationPnLCalculator::new(),
            CombinationRiskChecker::new(config.combination_risk),
        );
        let liquidity = LiquidityRiskMonitor::new(config.liquidity)
            .context("invalid liquidity monitor configuration")?;

        Ok(Self {
            recognizer: CombinationRecognizer::new(),
            facade,
            lifecycle: CombinationLifecycleService::new(),
            option_selector: OptionSelectorService::new(config.option_selector.clone()),
            future_selector: BaseFutureSelector::new(config.future_selector),
            sizing: PositionSizingService::new(config.position_sizing),
            stop_loss: StopLossManager::new(config.stop_loss),
            liquidity,
            portfolio_risk: PortfolioRiskAggregator::new(config.risk_thresholds),
            order_scheduler: AdvancedOrderScheduler::new(config.advanced_orders),
            delta_hedger: DeltaHedgingEngine::new(config.hedging.delta_hedging.clone()),
            gamma_scalper: GammaScalper::new(config.hedging.gamma_scalping.clone()),
            vega_hedger: VegaHedgingEngine::new(config.hedging.vega_hedging.clone()),
            combinations: CombinationAggregate::new(),
            positions: Vec::new(),
            target: TargetState::default(),
            current_dt: None,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn combinations(&self) -> &CombinationAggregate {
        &self.combinations
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn target(&self) -> &TargetState {
        &self.target
    }

    pub fn set_target(&mut self, target: TargetState) {
        self.target = target;
    }

    /// Replace the external position aggregate's view of open positions.
    pub fn set_positions(&mut self, positions: Vec<Position>) {
        self.positions = positions;
    }

    /// Advance the engine clock; called once per bar.
    pub fn on_bar(&mut self, now: NaiveDateTime) {
        self.current_dt = Some(now);
    }

    pub fn current_dt(&self) -> Option<NaiveDateTime> {
        self.current_dt
    }

    fn now(&self) -> NaiveDateTime {
        self.current_dt
            .unwrap_or_else(|| chrono::Utc::now().naive_utc())
    }

    // -------------------------------------------------------------------------
    // Combinations
    // -------------------------------------------------------------------------

    /// Classify a raw position structure.
    pub fn recognize(
        &self,
        positions: &[Position],
        contracts: &HashMap<String, OptionContract>,
    ) -> CombinationType {
        self.recognizer.recognize(positions, contracts)
    }

    pub fn register_combination(
        &mut self,
        combination: Combination,
    ) -> Result<(), InvalidCombination> {
        self.combinations.register(combination)
    }

    /// Evaluate every active combination: Greeks, P&L and per-type risk.
    pub fn evaluate_combinations(
        &self,
        greeks_map: &HashMap<String, GreeksResult>,
        current_prices: &HashMap<String, f64>,
        realized_pnl_map: Option<&HashMap<String, f64>>,
    ) -> Vec<(String, CombinationEvaluation)> {
        let now = self.now();
        self.combinations
            .get_active()
            .into_iter()
            .map(|combo| {
                let evaluation = self.facade.evaluate(
                    combo,
                    greeks_map,
                    current_prices,
                    self.config.contract_multiplier,
                    realized_pnl_map,
                    now,
                );
                (combo.combination_id.clone(), evaluation)
            })
            .collect()
    }

    /// Close-out instructions for one combination's remaining legs.
    pub fn close_combination_instructions(
        &self,
        combination_id: &str,
        price_map: &HashMap<String, f64>,
    ) -> Vec<OrderInstruction> {
        match self.combinations.get_by_id(combination_id) {
            Some(combo) => self.lifecycle.generate_close_instructions(combo, price_map),
            None => {
                warn!(combination_id, "close requested for unknown combination");
                Vec::new()
            }
        }
    }

    /// Entry instructions for a freshly registered combination.
    pub fn open_combination_instructions(
        &self,
        combination_id: &str,
        price_map: &HashMap<String, f64>,
    ) -> Vec<OrderInstruction> {
        match self.combinations.get_by_id(combination_id) {
            Some(combo) => self.lifecycle.generate_open_instructions(combo, price_map),
            None => Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Fill synchronisation
    // -------------------------------------------------------------------------

    /// Propagate position closes into combination statuses and drain the
    /// resulting events, FIFO.
    pub fn on_positions_closed(&mut self, closed_vt_symbols: &HashSet<String>) -> Vec<DomainEvent> {
        let now = self.now();

        // Deterministic order regardless of set iteration.
        let mut symbols: Vec<&String> = closed_vt_symbols.iter().collect();
        symbols.sort();
        for vt_symbol in symbols {
            self.combinations.sync_status(vt_symbol, closed_vt_symbols, now);
        }
        self.combinations.pop_domain_events()
    }

    // -------------------------------------------------------------------------
    // Risk & hedging passes
    // -------------------------------------------------------------------------

    /// Position-level stops over every active position. `peak_profits` is
    /// the caller-tracked high-water PnL per symbol.
    pub fn check_stop_losses(
        &self,
        current_prices: &HashMap<String, f64>,
        peak_profits: &HashMap<String, f64>,
    ) -> Vec<DomainEvent> {
        let mut events = Vec::new();
        for position in &self.positions {
            let Some(&price) = current_prices.get(&position.vt_symbol) else {
                continue;
            };
            let peak = peak_profits
                .get(&position.vt_symbol)
                .copied()
                .unwrap_or(0.0);
            if let Some(trigger) = self.stop_loss.check_position_stop_loss(position, price, peak) {
                events.push(DomainEvent::StopLossTriggered(trigger));
            }
        }
        events
    }

    /// Portfolio-level daily stop.
    pub fn check_portfolio_stop(
        &self,
        daily_start_equity: f64,
        current_equity: f64,
    ) -> Option<DomainEvent> {
        self.stop_loss
            .check_portfolio_stop_loss(&self.positions, daily_start_equity, current_equity)
            .map(DomainEvent::PortfolioStopLossTriggered)
    }

    /// Liquidity scores over held contracts.
    pub fn monitor_liquidity(
        &self,
        market_data: &HashMap<String, MarketStats>,
        historical_data: &HashMap<String, Vec<MarketStats>>,
    ) -> Vec<DomainEvent> {
        self.liquidity
            .monitor_positions(&self.positions, market_data, historical_data)
            .into_iter()
            .map(DomainEvent::LiquidityDeteriorated)
            .collect()
    }

    /// Aggregate per-position Greeks into portfolio Greeks, emitting breach
    /// events for any threshold crossings.
    pub fn monitor_portfolio_greeks(
        &self,
        entries: &[PositionGreeksEntry],
    ) -> (PortfolioGreeks, Vec<DomainEvent>) {
        self.portfolio_risk.monitor(entries, self.now())
    }

    /// Vega hedging pass; returns the structured result plus any events.
    pub fn check_vega_hedge(
        &self,
        portfolio_greeks: &PortfolioGreeks,
        current_price: f64,
    ) -> (VegaHedgeResult, Vec<DomainEvent>) {
        self.vega_hedger.check_and_hedge(portfolio_greeks, current_price)
    }

    // -------------------------------------------------------------------------
    // Snapshot envelope
    // -------------------------------------------------------------------------

    pub fn to_snapshot(&self) -> SnapshotDoc {
        let mut doc = SnapshotDoc::new();

        doc.insert(
            "target_aggregate".to_string(),
            SnapshotValue::from_plain_json(
                &serde_json::to_value(&self.target).expect("target serialises"),
            ),
        );

        // Positions as a tabular record set.
        let rows: Vec<BTreeMap<String, SnapshotValue>> = self
            .positions
            .iter()
            .map(|p| {
                let value = serde_json::to_value(p).expect("position serialises");
                match SnapshotValue::from_plain_json(&value) {
                    SnapshotValue::Map(fields) => fields,
                    _ => BTreeMap::new(),
                }
            })
            .collect();
        doc.insert(
            "position_aggregate".to_string(),
            SnapshotValue::Map(
                [("positions".to_string(), SnapshotValue::Table(rows))]
                    .into_iter()
                    .collect(),
            ),
        );

        doc.insert(
            "combination_aggregate".to_string(),
            SnapshotValue::from_plain_json(&self.combinations.to_snapshot()),
        );

        doc.insert(
            "current_dt".to_string(),
            match self.current_dt {
                Some(dt) => SnapshotValue::DateTime(dt),
                None => SnapshotValue::Null,
            },
        );

        doc
    }

    /// Restore an engine from a snapshot document. Missing sections restore
    /// to their empty defaults (older snapshots stay loadable).
    pub fn from_snapshot(config: EngineConfig, doc: &SnapshotDoc) -> Result<Self> {
        let mut engine = Self::new(config)?;

        match doc.get("combination_aggregate") {
            Some(value) => {
                let plain = value.to_plain_json();
                engine.combinations = CombinationAggregate::from_snapshot(&plain)
                    .context("failed to restore combination aggregate")?;
            }
            None => {
                info!("snapshot has no combination aggregate, starting empty");
            }
        }

        if let Some(value) = doc.get("position_aggregate") {
            if let Value::Object(obj) = value.to_plain_json() {
                if let Some(positions) = obj.get("positions") {
                    engine.positions = serde_json::from_value(positions.clone())
                        .context("failed to restore positions")?;
                }
            }
        }

        if let Some(value) = doc.get("target_aggregate") {
            engine.target = serde_json::from_value(value.to_plain_json())
                .context("failed to restore target state")?;
        }

        if let Some(SnapshotValue::DateTime(dt)) = doc.get("current_dt") {
            engine.current_dt = Some(*dt);
        }

        info!(
            combinations = engine.combinations.len(),
            positions = engine.positions.len(),
            "engine restored from snapshot"
        );
        Ok(engine)
    }
}

impl std::fmt::Debug for StrategyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyEngine")
            .field("strategy_name", &self.config.strategy_name)
            .field("combinations", &self.combinations.len())
            .field("positions", &self.positions.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
