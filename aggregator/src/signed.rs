use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use sffl_core::{AggregationStatus, MessageBlsAggregation, OperatorId};
use sffl_lib::{impl_display_using_json_pretty, MessageKey, SfflMessage, Signature};
use tokio::sync::oneshot;

use crate::error::{AggregatorResult, ResponseError};

/// A signature on its way into a message task. The task answers on `ack` once
/// the contribution has been applied or rejected.
#[derive(Debug)]
pub struct SignedMessage {
    pub message: SfflMessage,
    pub signing_digest: B256,
    pub signature: Signature,
    pub operator_id: OperatorId,
    pub ack: oneshot::Sender<AggregatorResult<()>>,
}

/// One emission of a message task.
#[derive(PartialEq, Eq, Debug, Clone, Deserialize, Serialize)]
pub struct AggregationResponse {
    pub key: MessageKey,
    /// The message the aggregate signs, if any signature was accepted.
    pub message: Option<SfflMessage>,
    pub status: AggregationStatus,
    /// No further responses follow for this key.
    pub finished: bool,
    pub aggregation: Option<MessageBlsAggregation>,
    pub error: Option<ResponseError>,
}

impl_display_using_json_pretty!(AggregationResponse);

impl AggregationResponse {
    pub(crate) fn terminal(
        key: MessageKey,
        message: Option<SfflMessage>,
        error: ResponseError,
    ) -> Self {
        Self {
            key,
            message,
            status: AggregationStatus::ThresholdNotReached,
            finished: true,
            aggregation: None,
            error: Some(error),
        }
    }

    /// A usable aggregate: the round closed with enough stake and nothing failed.
    pub fn is_final_aggregation(&self) -> bool {
        self.finished
            && self.error.is_none()
            && self.aggregation.is_some()
            && self.status != AggregationStatus::ThresholdNotReached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_response_is_not_final_aggregation() {
        let key = MessageKey::OperatorSetUpdate { update_id: 1 };
        let response = AggregationResponse::terminal(key, None, ResponseError::MessageExpired);
        assert!(response.finished);
        assert!(!response.is_final_aggregation());

        let json = serde_json::to_string(&response).unwrap();
        let back: AggregationResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }
}
