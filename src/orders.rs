// =============================================================================
// Advanced order scheduling — iceberg, timed split and TWAP slicing of a
// parent instruction into child orders
// =============================================================================
//
// The scheduler only slices and tracks: child orders are plain
// `OrderInstruction` volumes with optional scheduled times, and the external
// gateway remains responsible for actually routing them. Fill reports come
// back through `mark_child_filled`, which advances the parent status
// Pending → Executing → Completed.
// =============================================================================

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::OrderInstruction;

// =============================================================================
// Value objects
// =============================================================================

/// Supported slicing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvancedOrderType {
    Iceberg,
    Twap,
    /// Volume-profile weighted; the profile comes with the request.
    Vwap,
}

/// Parent-order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvancedOrderStatus {
    Pending,
    Executing,
    Completed,
    Cancelled,
}

/// One scheduled slice of the parent volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceEntry {
    pub scheduled_time: NaiveDateTime,
    pub volume: i64,
}

/// One child order carved out of the parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildOrder {
    pub child_id: String,
    pub parent_id: String,
    pub volume: i64,
    #[serde(default)]
    pub scheduled_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub is_submitted: bool,
    #[serde(default)]
    pub is_filled: bool,
}

/// A request to slice `instruction` with the given algorithm parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedOrderRequest {
    pub order_type: AdvancedOrderType,
    pub instruction: OrderInstruction,
    #[serde(default)]
    pub batch_size: i64,
    #[serde(default)]
    pub time_window_seconds: i64,
    #[serde(default)]
    pub num_slices: i64,
    #[serde(default)]
    pub volume_profile: Vec<f64>,
}

/// Parent order plus its slicing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedOrder {
    pub order_id: String,
    pub request: AdvancedOrderRequest,
    pub status: AdvancedOrderStatus,
    #[serde(default)]
    pub filled_volume: i64,
    #[serde(default)]
    pub child_orders: Vec<ChildOrder>,
    pub created_time: NaiveDateTime,
    #[serde(default)]
    pub slice_schedule: Vec<SliceEntry>,
}

impl AdvancedOrder {
    pub fn total_volume(&self) -> i64 {
        self.request.instruction.volume
    }

    /// Children due at or before `now` that have not been submitted yet.
    /// Unscheduled children (iceberg) are due as soon as every earlier child
    /// has filled.
    pub fn due_children(&self, now: NaiveDateTime) -> Vec<&ChildOrder> {
        match self.request.order_type {
            AdvancedOrderType::Iceberg => {
                // Release exactly one batch at a time.
                self.child_orders
                    .iter()
                    .find(|c| !c.is_submitted)
                    .filter(|_| self.child_orders.iter().all(|c| !c.is_submitted || c.is_filled))
                    .into_iter()
                    .collect()
            }
            _ => self
                .child_orders
                .iter()
                .filter(|c| !c.is_submitted)
                .filter(|c| c.scheduled_time.map(|t| t <= now).unwrap_or(true))
                .collect(),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

fn default_iceberg_batch_size() -> i64 {
    5
}

fn default_twap_slices() -> i64 {
    10
}

fn default_time_window_seconds() -> i64 {
    300
}

/// Defaults applied when a request leaves its algorithm parameters at zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdvancedOrdersConfig {
    #[serde(default = "default_iceberg_batch_size")]
    pub default_iceberg_batch_size: i64,
    #[serde(default = "default_twap_slices")]
    pub default_twap_slices: i64,
    #[serde(default = "default_time_window_seconds")]
    pub default_time_window_seconds: i64,
}

impl Default for AdvancedOrdersConfig {
    fn default() -> Self {
        Self {
            default_iceberg_batch_size: default_iceberg_batch_size(),
            default_twap_slices: default_twap_slices(),
            default_time_window_seconds: default_time_window_seconds(),
        }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct AdvancedOrderScheduler {
    config: AdvancedOrdersConfig,
}

impl AdvancedOrderScheduler {
    pub fn new(config: AdvancedOrdersConfig) -> Self {
        Self { config }
    }

    /// Timed split: children of at most `per_order_volume`, the i-th
    /// scheduled at `start_time + i · interval_seconds`. Child volumes sum
    /// to the parent volume.
    pub fn submit_timed_split(
        &self,
        instruction: OrderInstruction,
        interval_seconds: i64,
        per_order_volume: i64,
        start_time: NaiveDateTime,
    ) -> AdvancedOrder {
        let per_order = per_order_volume.max(1);
        let order_id = Uuid::new_v4().to_string();

        let mut child_orders = Vec::new();
        let mut remaining = instruction.volume.max(0);
        let mut index: i64 = 0;
        while remaining > 0 {
            let volume = remaining.min(per_order);
            child_orders.push(ChildOrder {
                child_id: Uuid::new_v4().to_string(),
                parent_id: order_id.clone(),
                volume,
                scheduled_time: Some(start_time + ChronoDuration::seconds(interval_seconds * index)),
                is_submitted: false,
                is_filled: false,
            });
            remaining -= volume;
            index += 1;
        }

        info!(
            order_id = %order_id,
            children = child_orders.len(),
            per_order,
            interval_seconds,
            "timed split scheduled"
        );

        AdvancedOrder {
            order_id,
            request: AdvancedOrderRequest {
                order_type: AdvancedOrderType::Twap,
                instruction,
                batch_size: 0,
                time_window_seconds: interval_seconds * child_orders.len() as i64,
                num_slices: child_orders.len() as i64,
                volume_profile: Vec::new(),
            },
            status: AdvancedOrderStatus::Pending,
            filled_volume: 0,
            child_orders,
            created_time: start_time,
            slice_schedule: Vec::new(),
        }
    }

    /// Iceberg: equal hidden batches of `batch_size` (config default when
    /// zero), released one at a time as fills come back.
    pub fn submit_iceberg(
        &self,
        instruction: OrderInstruction,
        batch_size: i64,
        now: NaiveDateTime,
    ) -> AdvancedOrder {
        let batch = if batch_size > 0 {
            batch_size
        } else {
            self.config.default_iceberg_batch_size
        };
        let order_id = Uuid::new_v4().to_string();

        let mut child_orders = Vec::new();
        let mut remaining = instruction.volume.max(0);
        while remaining > 0 {
            let volume = remaining.min(batch);
            child_orders.push(ChildOrder {
                child_id: Uuid::new_v4().to_string(),
                parent_id: order_id.clone(),
                volume,
                scheduled_time: None,
                is_submitted: false,
                is_filled: false,
            });
            remaining -= volume;
        }

        info!(order_id = %order_id, children = child_orders.len(), batch, "iceberg scheduled");

        AdvancedOrder {
            order_id,
            request: AdvancedOrderRequest {
                order_type: AdvancedOrderType::Iceberg,
                instruction,
                batch_size: batch,
                time_window_seconds: 0,
                num_slices: 0,
                volume_profile: Vec::new(),
            },
            status: AdvancedOrderStatus::Pending,
            filled_volume: 0,
            child_orders,
            created_time: now,
            slice_schedule: Vec::new(),
        }
    }

    /// TWAP: volume spread evenly over `num_slices` across the window, any
    /// remainder distributed one lot each to the earliest slices.
    pub fn submit_twap(
        &self,
        instruction: OrderInstruction,
        num_slices: i64,
        time_window_seconds: i64,
        start_time: NaiveDateTime,
    ) -> AdvancedOrder {
        let slices = if num_slices > 0 {
            num_slices
        } else {
            self.config.default_twap_slices
        };
        let window = if time_window_seconds > 0 {
            time_window_seconds
        } else {
            self.config.default_time_window_seconds
        };
        let order_id = Uuid::new_v4().to_string();

        let total = instruction.volume.max(0);
        let slices = slices.min(total.max(1));
        let base = total / slices;
        let remainder = total % slices;
        let step = window / slices;

        let mut child_orders = Vec::new();
        let mut slice_schedule = Vec::new();
        for i in 0..slices {
            let volume = base + if i < remainder { 1 } else { 0 };
            if volume == 0 {
                continue;
            }
            let scheduled_time = start_time + ChronoDuration::seconds(step * i);
            slice_schedule.push(SliceEntry {
                scheduled_time,
                volume,
            });
            child_orders.push(ChildOrder {
                child_id: Uuid::new_v4().to_string(),
                parent_id: order_id.clone(),
                volume,
                scheduled_time: Some(scheduled_time),
                is_submitted: false,
                is_filled: false,
            });
        }

        info!(
            order_id = %order_id,
            children = child_orders.len(),
            window,
            "twap scheduled"
        );

        AdvancedOrder {
            order_id,
            request: AdvancedOrderRequest {
                order_type: AdvancedOrderType::Twap,
                instruction,
                batch_size: 0,
                time_window_seconds: window,
                num_slices: slices,
                volume_profile: Vec::new(),
            },
            status: AdvancedOrderStatus::Pending,
            filled_volume: 0,
            child_orders,
            created_time: start_time,
            slice_schedule,
        }
    }

    /// Record a child fill, accumulating parent filled volume and advancing
    /// the parent status.
    pub fn mark_child_filled(&self, order: &mut AdvancedOrder, child_id: &str) {
        let Some(child) = order
            .child_orders
            .iter_mut()
            .find(|c| c.child_id == child_id)
        else {
            debug!(child_id, "fill for unknown child ignored");
            return;
        };
        if child.is_filled {
            return;
        }
        child.is_submitted = true;
        child.is_filled = true;
        order.filled_volume += child.volume;

        order.status = if order.child_orders.iter().all(|c| c.is_filled) {
            AdvancedOrderStatus::Completed
        } else {
            AdvancedOrderStatus::Executing
        };
        debug!(
            order_id = %order.order_id,
            filled = order.filled_volume,
            status = ?order.status,
            "child fill recorded"
        );
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, Offset, OrderType};
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn instruction(volume: i64) -> OrderInstruction {
        OrderInstruction {
            vt_symbol: "rb2501.SHFE".to_string(),
            direction: Direction::Long,
            offset: Offset::Open,
            volume,
            price: 4000.0,
            signal: String::new(),
            order_type: OrderType::Limit,
        }
    }

    fn scheduler() -> AdvancedOrderScheduler {
        AdvancedOrderScheduler::new(AdvancedOrdersConfig::default())
    }

    #[test]
    fn timed_split_volumes_and_schedule() {
        let order = scheduler().submit_timed_split(instruction(23), 60, 10, start());

        // ceil(23/10) children, each within the cap, summing to the parent.
        assert_eq!(order.child_orders.len(), 3);
        assert!(order.child_orders.iter().all(|c| c.volume <= 10));
        assert_eq!(order.child_orders.iter().map(|c| c.volume).sum::<i64>(), 23);

        for (i, child) in order.child_orders.iter().enumerate() {
            let expected = start() + ChronoDuration::seconds(60 * i as i64);
            assert_eq!(child.scheduled_time, Some(expected));
        }
    }

    #[test]
    fn iceberg_releases_one_batch_at_a_time() {
        let scheduler = scheduler();
        let mut order = scheduler.submit_iceberg(instruction(12), 5, start());
        assert_eq!(order.child_orders.len(), 3); // 5 + 5 + 2
        assert_eq!(order.child_orders[2].volume, 2);

        // Only the first batch is due initially.
        let due = order.due_children(start());
        assert_eq!(due.len(), 1);
        let first_id = due[0].child_id.clone();

        // After it fills, the next batch becomes due.
        scheduler.mark_child_filled(&mut order, &first_id);
        assert_eq!(order.status, AdvancedOrderStatus::Executing);
        assert_eq!(order.filled_volume, 5);
        let due = order.due_children(start());
        assert_eq!(due.len(), 1);
        assert_ne!(due[0].child_id, first_id);
    }

    #[test]
    fn iceberg_uses_config_default_batch() {
        let order = scheduler().submit_iceberg(instruction(12), 0, start());
        assert_eq!(order.request.batch_size, 5);
        assert_eq!(order.child_orders.len(), 3);
    }

    #[test]
    fn twap_spreads_evenly_with_front_loaded_remainder() {
        let order = scheduler().submit_twap(instruction(23), 5, 300, start());

        let volumes: Vec<i64> = order.child_orders.iter().map(|c| c.volume).collect();
        assert_eq!(volumes, vec![5, 5, 5, 4, 4]);
        assert_eq!(volumes.iter().sum::<i64>(), 23);
        assert_eq!(order.slice_schedule.len(), 5);

        for (i, slice) in order.slice_schedule.iter().enumerate() {
            let expected = start() + ChronoDuration::seconds(60 * i as i64);
            assert_eq!(slice.scheduled_time, expected);
        }
    }

    #[test]
    fn twap_caps_slices_at_total_volume() {
        let order = scheduler().submit_twap(instruction(3), 10, 300, start());
        assert_eq!(order.child_orders.len(), 3);
        assert!(order.child_orders.iter().all(|c| c.volume == 1));
    }

    #[test]
    fn fills_advance_status_to_completed() {
        let scheduler = scheduler();
        let mut order = scheduler.submit_timed_split(instruction(6), 60, 3, start());
        assert_eq!(order.status, AdvancedOrderStatus::Pending);

        let ids: Vec<String> = order.child_orders.iter().map(|c| c.child_id.clone()).collect();
        scheduler.mark_child_filled(&mut order, &ids[0]);
        assert_eq!(order.status, AdvancedOrderStatus::Executing);
        scheduler.mark_child_filled(&mut order, &ids[1]);
        assert_eq!(order.status, AdvancedOrderStatus::Completed);
        assert_eq!(order.filled_volume, 6);

        // Double fill is idempotent.
        scheduler.mark_child_filled(&mut order, &ids[1]);
        assert_eq!(order.filled_volume, 6);
    }

    #[test]
    fn scheduled_children_become_due_over_time() {
        let order = scheduler().submit_timed_split(instruction(6), 60, 3, start());
        assert_eq!(order.due_children(start()).len(), 1);
        assert_eq!(
            order
                .due_children(start() + ChronoDuration::seconds(61))
                .len(),
            2
        );
    }

    #[test]
    fn serde_roundtrip_preserves_order_state() {
        let order = scheduler().submit_twap(instruction(10), 2, 120, start());
        let json = serde_json::to_string(&order).unwrap();
        let back: AdvancedOrder = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
    }
}
