//! Persistence seam for finalized messages and their aggregations.
//!
//! The aggregator only writes here; checkpoint assembly and consumers read.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sffl_core::MessageBlsAggregation;
use sffl_lib::messages::{OperatorSetUpdateMessage, StateRootUpdateMessage};

mod memory;

pub use memory::InMemoryStore;

/// Longest span, in seconds, a single checkpoint may cover.
pub const MAX_CHECKPOINT_WINDOW_SECS: u64 = 7200;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Invalid checkpoint window [{from}, {to}]: {reason}")]
    InvalidRange { from: u64, to: u64, reason: String },

    /// For failures of the storage backend.
    #[error("There was an error with the store backend: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// An inclusive timestamp range, at most [`MAX_CHECKPOINT_WINDOW_SECS`] long.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CheckpointWindow {
    from: u64,
    to: u64,
}

impl CheckpointWindow {
    pub fn new(from: u64, to: u64) -> StoreResult<Self> {
        if from > to {
            return Err(StoreError::InvalidRange {
                from,
                to,
                reason: "start is after end".to_owned(),
            });
        }
        if to - from > MAX_CHECKPOINT_WINDOW_SECS {
            return Err(StoreError::InvalidRange {
                from,
                to,
                reason: format!("window exceeds {MAX_CHECKPOINT_WINDOW_SECS} seconds"),
            });
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, timestamp: u64) -> bool {
        (self.from..=self.to).contains(&timestamp)
    }
}

/// Finalized messages whose timestamp falls in a checkpoint window, ordered
/// by message key.
#[derive(PartialEq, Eq, Debug, Clone, Default, Deserialize, Serialize)]
pub struct CheckpointMessages {
    pub state_root_updates: Vec<(StateRootUpdateMessage, MessageBlsAggregation)>,
    pub operator_set_updates: Vec<(OperatorSetUpdateMessage, MessageBlsAggregation)>,
}

impl CheckpointMessages {
    pub fn is_empty(&self) -> bool {
        self.state_root_updates.is_empty() && self.operator_set_updates.is_empty()
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Records a message that was seen, finalized or not. Existing entries
    /// are left untouched.
    async fn store_state_root_update(&self, msg: &StateRootUpdateMessage) -> StoreResult<()>;

    /// Records a message together with the aggregation that finalized it.
    async fn store_state_root_update_aggregation(
        &self,
        msg: &StateRootUpdateMessage,
        aggregation: &MessageBlsAggregation,
    ) -> StoreResult<()>;

    async fn store_operator_set_update(&self, msg: &OperatorSetUpdateMessage) -> StoreResult<()>;

    async fn store_operator_set_update_aggregation(
        &self,
        msg: &OperatorSetUpdateMessage,
        aggregation: &MessageBlsAggregation,
    ) -> StoreResult<()>;

    async fn fetch_checkpoint_messages(
        &self,
        from_timestamp: u64,
        to_timestamp: u64,
    ) -> StoreResult<CheckpointMessages>;

    async fn get_state_root_update_aggregation(
        &self,
        rollup_id: u32,
        block_height: u64,
    ) -> StoreResult<Option<(StateRootUpdateMessage, MessageBlsAggregation)>>;

    async fn get_operator_set_update_aggregation(
        &self,
        id: u64,
    ) -> StoreResult<Option<(OperatorSetUpdateMessage, MessageBlsAggregation)>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, true)]
    #[case(100, 7300, true)]
    #[case(100, 7301, false)]
    #[case(10, 9, false)]
    fn test_checkpoint_window(#[case] from: u64, #[case] to: u64, #[case] valid: bool) {
        assert_eq!(CheckpointWindow::new(from, to).is_ok(), valid);
    }

    #[test]
    fn test_window_is_inclusive() {
        let window = CheckpointWindow::new(10, 20).unwrap();
        assert!(window.contains(10));
        assert!(window.contains(20));
        assert!(!window.contains(21));
        assert!(!window.contains(9));
    }
}
