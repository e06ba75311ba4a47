use sffl_core::{
    OperatorId, QuorumNumber, QuorumThresholdPercentage, RegistrySource, ValidationInfo,
};
use sffl_lib::{MessageHasher, MessageKey, SfflMessage, Signature};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};
use tokio::{
    select,
    sync::{mpsc, oneshot},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{AggregatorError, AggregatorResult},
    signed::{AggregationResponse, SignedMessage},
    task::MessageTask,
};

type Inboxes = Arc<RwLock<HashMap<MessageKey, mpsc::Sender<SignedMessage>>>>;

/// Removes a key from the inbox map when dropped.
///
/// Held by the message task for its whole life, and by `initialize_message`
/// until the task is spawned, so the key is unregistered on every exit path.
pub(crate) struct InboxRegistration {
    inboxes: Inboxes,
    key: MessageKey,
}

impl Drop for InboxRegistration {
    fn drop(&mut self) {
        let mut inboxes = self
            .inboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        inboxes.remove(&self.key);
        debug!("InboxRegistration.drop: {}", self.key);
    }
}

/// Routes signed messages to one aggregation task per message key.
pub struct AggregationService {
    registry: Arc<dyn RegistrySource>,
    hasher: Arc<dyn MessageHasher>,
    inboxes: Inboxes,
    responses_tx: mpsc::UnboundedSender<AggregationResponse>,
    responses_rx: Mutex<Option<mpsc::UnboundedReceiver<AggregationResponse>>>,
}

impl AggregationService {
    pub fn new(registry: Arc<dyn RegistrySource>, hasher: Arc<dyn MessageHasher>) -> Self {
        let (responses_tx, responses_rx) = mpsc::unbounded_channel();
        Self {
            registry,
            hasher,
            inboxes: Arc::new(RwLock::new(HashMap::new())),
            responses_tx,
            responses_rx: Mutex::new(Some(responses_rx)),
        }
    }

    pub fn hasher(&self) -> &Arc<dyn MessageHasher> {
        &self.hasher
    }

    pub fn registry(&self) -> &Arc<dyn RegistrySource> {
        &self.registry
    }

    /// The stream of every task's responses. There is a single consumer:
    /// only the first call gets it.
    pub fn response_stream(&self) -> Option<mpsc::UnboundedReceiver<AggregationResponse>> {
        self.responses_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Whether a round is currently running for `key`.
    pub fn is_active(&self, key: &MessageKey) -> bool {
        self.inboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Starts an aggregation round for `key`.
    ///
    /// A `reference_block` of zero means the registry's current block. The
    /// registry is read once here; the round never refreshes it.
    #[allow(clippy::too_many_arguments)]
    pub async fn initialize_message(
        &self,
        key: MessageKey,
        quorum_numbers: &[QuorumNumber],
        quorum_threshold_percentages: &[QuorumThresholdPercentage],
        time_to_expiry: Duration,
        aggregation_timeout: Duration,
        reference_block: u64,
    ) -> AggregatorResult<()> {
        let (inbox_tx, inbox_rx) = mpsc::channel(1);
        {
            let mut inboxes = self
                .inboxes
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if inboxes.contains_key(&key) {
                return Err(AggregatorError::MessageAlreadyInitialized(key));
            }
            inboxes.insert(key, inbox_tx);
        }
        let registration = InboxRegistration {
            inboxes: self.inboxes.clone(),
            key,
        };

        let reference_block = match reference_block {
            0 => self.registry.block_number().await?,
            block => block,
        };
        let reference_block = u32::try_from(reference_block)
            .map_err(|_| AggregatorError::InvalidReferenceBlock(reference_block))?;
        let info = ValidationInfo::fetch(
            self.registry.as_ref(),
            quorum_numbers,
            quorum_threshold_percentages,
            reference_block,
        )
        .await?;

        info!(
            "AggregationService.initialize_message: {key}, block {reference_block}, {} operators",
            info.operators().len()
        );
        let task = MessageTask::new(
            key,
            info,
            self.hasher.clone(),
            self.registry.clone(),
            inbox_rx,
            self.responses_tx.clone(),
            time_to_expiry,
            aggregation_timeout,
            registration,
        );
        tokio::spawn(task.run());
        Ok(())
    }

    /// Like [`Self::initialize_message`], but a running round for `key` is success.
    #[allow(clippy::too_many_arguments)]
    pub async fn initialize_message_if_not_exists(
        &self,
        key: MessageKey,
        quorum_numbers: &[QuorumNumber],
        quorum_threshold_percentages: &[QuorumThresholdPercentage],
        time_to_expiry: Duration,
        aggregation_timeout: Duration,
        reference_block: u64,
    ) -> AggregatorResult<()> {
        match self
            .initialize_message(
                key,
                quorum_numbers,
                quorum_threshold_percentages,
                time_to_expiry,
                aggregation_timeout,
                reference_block,
            )
            .await
        {
            Err(AggregatorError::MessageAlreadyInitialized(_)) => {
                debug!("AggregationService.initialize_message_if_not_exists: {key} already running");
                Ok(())
            }
            result => result,
        }
    }

    /// Hands a signature to the round of `message`'s key and waits for its verdict.
    ///
    /// Cancelling `ctx` only interrupts the hand-off; once the task accepted
    /// the signature the call waits for the answer.
    pub async fn process_new_signature(
        &self,
        ctx: &CancellationToken,
        message: SfflMessage,
        signature: Signature,
        operator_id: OperatorId,
    ) -> AggregatorResult<()> {
        let key = message.key();
        let inbox = self
            .inboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or(AggregatorError::MessageNotFound(key))?;

        let signing_digest = self
            .hasher
            .signing_digest(&message)
            .map_err(|e| AggregatorError::MessageDigestUnavailable(e.to_string()))?;

        let (ack_tx, ack_rx) = oneshot::channel();
        let signed = SignedMessage {
            message,
            signing_digest,
            signature,
            operator_id,
            ack: ack_tx,
        };

        select! {
            biased;
            _ = ctx.cancelled() => {
                warn!("AggregationService.process_new_signature: {key}, cancelled");
                return Err(AggregatorError::Cancelled);
            }
            sent = inbox.send(signed) => {
                sent.map_err(|_| AggregatorError::MessageNotFound(key))?;
            }
        }

        ack_rx
            .await
            .map_err(|_| AggregatorError::TaskUnavailable(key))?
    }
}
