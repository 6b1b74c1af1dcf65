// =============================================================================
// CombinationAggregate — registry, reverse symbol index, status machine and
// domain-event queue for multi-leg combinations
// =============================================================================
//
// Independent of the position aggregate; the two stay in sync through domain
// events. All mutation happens on the main pipeline thread; events are
// buffered FIFO and drained by the application layer.
// =============================================================================

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::combination::entity::{Combination, CombinationStatus, InvalidCombination};
use crate::events::{CombinationStatusChanged, DomainEvent};

/// Raised when a persisted aggregate snapshot cannot be decoded.
#[derive(Debug, Error)]
#[error("bad combination aggregate snapshot: {reason}")]
pub struct SnapshotDecodeError {
    pub reason: String,
}

/// Aggregate root owning every tracked combination.
#[derive(Debug, Default)]
pub struct CombinationAggregate {
    /// combination_id → Combination.
    combinations: HashMap<String, Combination>,
    /// Registration order; sync_status emits events in this order.
    insertion_order: Vec<String>,
    /// Reverse index: vt_symbol → set of combination_ids referencing it.
    symbol_index: HashMap<String, HashSet<String>>,
    /// Pending domain events, drained FIFO by `pop_domain_events`.
    domain_events: Vec<DomainEvent>,
}

impl CombinationAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Registration & queries
    // -------------------------------------------------------------------------

    /// Validate and register a combination, updating the reverse index.
    pub fn register(&mut self, combination: Combination) -> Result<(), InvalidCombination> {
        combination.validate()?;

        let combination_id = combination.combination_id.clone();
        for leg in &combination.legs {
            self.symbol_index
                .entry(leg.vt_symbol.clone())
                .or_default()
                .insert(combination_id.clone());
        }

        if self
            .combinations
            .insert(combination_id.clone(), combination)
            .is_none()
        {
            self.insertion_order.push(combination_id.clone());
        }

        info!(combination_id = %combination_id, total = self.combinations.len(), "combination registered");
        Ok(())
    }

    pub fn get_by_id(&self, combination_id: &str) -> Option<&Combination> {
        self.combinations.get(combination_id)
    }

    pub fn get_by_underlying(&self, underlying: &str) -> Vec<&Combination> {
        self.in_insertion_order()
            .filter(|c| c.underlying_vt_symbol == underlying)
            .collect()
    }

    /// All combinations referencing `vt_symbol` through the reverse index.
    pub fn get_by_symbol(&self, vt_symbol: &str) -> Vec<&Combination> {
        let Some(ids) = self.symbol_index.get(vt_symbol) else {
            return Vec::new();
        };
        self.insertion_order
            .iter()
            .filter(|id| ids.contains(*id))
            .filter_map(|id| self.combinations.get(id))
            .collect()
    }

    /// All combinations that are not CLOSED.
    pub fn get_active(&self) -> Vec<&Combination> {
        self.in_insertion_order()
            .filter(|c| c.status != CombinationStatus::Closed)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.combinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }

    fn in_insertion_order(&self) -> impl Iterator<Item = &Combination> {
        self.insertion_order
            .iter()
            .filter_map(|id| self.combinations.get(id))
    }

    // -------------------------------------------------------------------------
    // Status synchronisation
    // -------------------------------------------------------------------------

    /// Propagate position closes into combination status.
    ///
    /// For every combination referencing `vt_symbol`, re-derive its status
    /// from `closed_vt_symbols`. A `CombinationStatusChanged` event is
    /// emitted iff the status actually changed, so repeated calls with the
    /// same set are idempotent.
    pub fn sync_status(
        &mut self,
        vt_symbol: &str,
        closed_vt_symbols: &HashSet<String>,
        now: NaiveDateTime,
    ) {
        let Some(ids) = self.symbol_index.get(vt_symbol) else {
            return;
        };
        let ids: Vec<String> = self
            .insertion_order
            .iter()
            .filter(|id| ids.contains(*id))
            .cloned()
            .collect();

        for combination_id in ids {
            let Some(combination) = self.combinations.get_mut(&combination_id) else {
                continue;
            };

            let old_status = combination.status;
            if let Some(new_status) = combination.update_status(closed_vt_symbols, now) {
                debug!(
                    combination_id = %combination_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    "combination status changed"
                );
                self.domain_events.push(DomainEvent::CombinationStatusChanged(
                    CombinationStatusChanged {
                        combination_id: combination_id.clone(),
                        old_status: old_status.as_str().to_string(),
                        new_status: new_status.as_str().to_string(),
                        combination_type: combination.combination_type.as_str().to_string(),
                    },
                ));
            }
        }
    }

    // -------------------------------------------------------------------------
    // Domain events
    // -------------------------------------------------------------------------

    /// Drain the pending event queue, FIFO.
    pub fn pop_domain_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.domain_events)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.domain_events.is_empty()
    }

    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    /// Structure-preserving snapshot: combinations keyed by id plus the
    /// reverse index with sorted id lists.
    pub fn to_snapshot(&self) -> Value {
        let combinations: serde_json::Map<String, Value> = self
            .combinations
            .iter()
            .map(|(id, combo)| {
                (
                    id.clone(),
                    serde_json::to_value(combo).expect("combination serialises"),
                )
            })
            .collect();

        let symbol_index: serde_json::Map<String, Value> = self
            .symbol_index
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(symbol, ids)| {
                let mut sorted: Vec<&String> = ids.iter().collect();
                sorted.sort();
                (symbol.clone(), json!(sorted))
            })
            .collect();

        json!({
            "combinations": combinations,
            "symbol_index": symbol_index,
        })
    }

    /// Rebuild an aggregate from a snapshot produced by `to_snapshot`.
    ///
    /// Insertion order is re-derived from sorted combination ids; the event
    /// queue always starts empty.
    pub fn from_snapshot(snapshot: &Value) -> Result<Self, SnapshotDecodeError> {
        let mut aggregate = Self::new();

        if let Some(combinations) = snapshot.get("combinations") {
            let map = combinations
                .as_object()
                .ok_or_else(|| SnapshotDecodeError {
                    reason: "combinations is not an object".to_string(),
                })?;
            for (id, value) in map {
                let combination: Combination =
                    serde_json::from_value(value.clone()).map_err(|e| SnapshotDecodeError {
                        reason: format!("combination {id}: {e}"),
                    })?;
                aggregate.insertion_order.push(id.clone());
                aggregate.combinations.insert(id.clone(), combination);
            }
            aggregate.insertion_order.sort();
        }

        if let Some(symbol_index) = snapshot.get("symbol_index") {
            let map = symbol_index.as_object().ok_or_else(|| SnapshotDecodeError {
                reason: "symbol_index is not an object".to_string(),
            })?;
            for (symbol, ids) in map {
                let ids = ids.as_array().ok_or_else(|| SnapshotDecodeError {
                    reason: format!("symbol_index[{symbol}] is not an array"),
                })?;
                let set: HashSet<String> = ids
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                aggregate.symbol_index.insert(symbol.clone(), set);
            }
        }

        Ok(aggregate)
    }
}

// =============================================================================
// Tests
// =============================================================================
