use sffl_lib::SfflMessage;
use sffl_store::{Store, StoreResult};
use tracing::debug;

use crate::signed::AggregationResponse;

/// Stores the aggregate of a finished, error-free state root or operator set
/// round. Returns whether anything was written.
///
/// Checkpoint rounds are not stored: their aggregate is submitted, not queried.
pub async fn persist_response(store: &dyn Store, response: &AggregationResponse) -> StoreResult<bool> {
    if !response.is_final_aggregation() {
        return Ok(false);
    }
    let (Some(message), Some(aggregation)) = (&response.message, &response.aggregation) else {
        return Ok(false);
    };

    match message {
        SfflMessage::StateRootUpdate(msg) => {
            store
                .store_state_root_update_aggregation(msg, aggregation)
                .await?
        }
        SfflMessage::OperatorSetUpdate(msg) => {
            store
                .store_operator_set_update_aggregation(msg, aggregation)
                .await?
        }
        SfflMessage::CheckpointTaskResponse(_) => {
            debug!("persist_response: {}, checkpoint responses are not stored", response.key);
            return Ok(false);
        }
    }
    Ok(true)
}
