use alloy_primitives::B256;
use sffl_core::{
    AggregatedOperators, AggregationStatus, CheckSignaturesIndices, MessageBlsAggregation,
    OperatorId, RegistrySource, ValidationInfo,
};
use sffl_lib::{MessageHasher, MessageKey, SfflMessage, Signature};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    select,
    sync::mpsc,
    time::{sleep_until, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
    error::{AggregatorError, AggregatorResult, ResponseError},
    service::InboxRegistration,
    signed::{AggregationResponse, SignedMessage},
};

/// Signatures gathered for one digest, plus what is needed to emit them.
#[derive(Debug)]
struct DigestAggregation {
    message: SfflMessage,
    signing_digest: B256,
    operators: AggregatedOperators,
}

#[derive(Debug, Clone, Copy)]
enum TaskState {
    Collecting,
    /// Threshold met once; waiting for full stake until `deadline`. A
    /// deadline past the clock's range never fires.
    WaitForFull { deadline: Option<Instant> },
}

enum Step {
    Continue,
    Stop,
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// The single-threaded loop owning the aggregation state of one message key.
pub(crate) struct MessageTask {
    key: MessageKey,
    info: ValidationInfo,
    hasher: Arc<dyn MessageHasher>,
    registry: Arc<dyn RegistrySource>,
    inbox: mpsc::Receiver<SignedMessage>,
    responses: mpsc::UnboundedSender<AggregationResponse>,
    time_to_expiry: Duration,
    aggregation_timeout: Duration,
    registration: Option<InboxRegistration>,

    per_digest: HashMap<B256, DigestAggregation>,
    /// Content digest each operator contributed to.
    contributions: HashMap<OperatorId, B256>,
    last_message: Option<SfflMessage>,
    last_response: Option<AggregationResponse>,
}

impl MessageTask {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        key: MessageKey,
        info: ValidationInfo,
        hasher: Arc<dyn MessageHasher>,
        registry: Arc<dyn RegistrySource>,
        inbox: mpsc::Receiver<SignedMessage>,
        responses: mpsc::UnboundedSender<AggregationResponse>,
        time_to_expiry: Duration,
        aggregation_timeout: Duration,
        registration: InboxRegistration,
    ) -> Self {
        Self {
            key,
            info,
            hasher,
            registry,
            inbox,
            responses,
            time_to_expiry,
            aggregation_timeout,
            registration: Some(registration),
            per_digest: HashMap::new(),
            contributions: HashMap::new(),
            last_message: None,
            last_response: None,
        }
    }

    pub(crate) async fn run(mut self) {
        let expires_at = Instant::now().checked_add(self.time_to_expiry);
        let mut state = TaskState::Collecting;

        loop {
            let (expiry, timeout) = match state {
                TaskState::Collecting => (expires_at, None),
                TaskState::WaitForFull { deadline } => (None, deadline),
            };

            // Deadlines win over signatures that arrive after them.
            select! {
                biased;
                _ = sleep_until_some(expiry) => {
                    info!("MessageTask.run: {}, expired", self.key);
                    let response = AggregationResponse::terminal(
                        self.key,
                        self.last_message.clone(),
                        ResponseError::MessageExpired,
                    );
                    self.finish(response);
                    return;
                }
                _ = sleep_until_some(timeout) => {
                    info!("MessageTask.run: {}, aggregation timeout", self.key);
                    let response = match self.last_response.take() {
                        Some(response) => AggregationResponse {
                            finished: true,
                            ..response
                        },
                        None => AggregationResponse::terminal(
                            self.key,
                            self.last_message.clone(),
                            ResponseError::MessageExpired,
                        ),
                    };
                    self.finish(response);
                    return;
                }
                signed = self.inbox.recv() => {
                    let Some(signed) = signed else {
                        debug!("MessageTask.run: {}, inbox closed", self.key);
                        return;
                    };
                    if let Step::Stop = self.process_signature(signed, &mut state).await {
                        return;
                    }
                }
            }
        }
    }

    async fn process_signature(&mut self, signed: SignedMessage, state: &mut TaskState) -> Step {
        let SignedMessage {
            message,
            signing_digest,
            signature,
            operator_id,
            ack,
        } = signed;
        debug!(
            "MessageTask.process_signature: {}, operator {operator_id}",
            self.key
        );

        let content_digest = match self.apply(&message, signing_digest, &signature, operator_id) {
            Ok(applied) => {
                let _ = ack.send(Ok(()));
                match applied {
                    Some(content_digest) => content_digest,
                    None => return Step::Continue,
                }
            }
            Err(AggregatorError::MissingOperatorPubkey(operator_id)) => {
                error!(
                    "MessageTask.process_signature: {}, operator {operator_id} has no G2 key",
                    self.key
                );
                let _ = ack.send(Err(AggregatorError::MissingOperatorPubkey(operator_id)));
                let response = AggregationResponse::terminal(
                    self.key,
                    self.last_message.clone(),
                    ResponseError::RegistryCorruption(format!(
                        "operator {operator_id} has no G2 public key"
                    )),
                );
                self.finish(response);
                return Step::Stop;
            }
            Err(e) => {
                warn!(
                    "MessageTask.process_signature: {}, rejected signature from {operator_id}: {e}",
                    self.key
                );
                let _ = ack.send(Err(e));
                return Step::Continue;
            }
        };

        let Some(entry) = self.per_digest.get(&content_digest) else {
            return Step::Continue;
        };
        let status = entry.operators.status(&self.info);
        match (status, *state) {
            (AggregationStatus::ThresholdNotReached, _) => Step::Continue,
            (AggregationStatus::FullStakeThresholdMet, _) => {
                info!("MessageTask.process_signature: {}, full stake signed", self.key);
                let response = self.build_response(&content_digest, status, true).await;
                self.finish(response);
                Step::Stop
            }
            (AggregationStatus::ThresholdReached, TaskState::Collecting) => {
                info!("MessageTask.process_signature: {}, threshold reached", self.key);
                let response = self.build_response(&content_digest, status, false).await;
                self.emit(response);
                *state = TaskState::WaitForFull {
                    deadline: Instant::now().checked_add(self.aggregation_timeout),
                };
                Step::Continue
            }
            (AggregationStatus::ThresholdReached, TaskState::WaitForFull { .. }) => {
                let response = self.build_response(&content_digest, status, false).await;
                self.emit(response);
                Step::Continue
            }
        }
    }

    /// Validates a signature and folds it into its digest's aggregate.
    ///
    /// Returns the content digest that changed, or `None` when the operator
    /// had already contributed to this round.
    fn apply(
        &mut self,
        message: &SfflMessage,
        signing_digest: B256,
        signature: &Signature,
        operator_id: OperatorId,
    ) -> AggregatorResult<Option<B256>> {
        let operator = self
            .info
            .operators()
            .get(&operator_id)
            .ok_or(AggregatorError::OperatorNotInQuorum(operator_id))?;
        let pubkey_g2 = operator
            .pubkey_g2
            .ok_or(AggregatorError::MissingOperatorPubkey(operator_id))?;

        let valid = signature
            .verify(&pubkey_g2, &signing_digest)
            .map_err(|e| AggregatorError::SignatureVerificationFailed(e.to_string()))?;
        if !valid {
            return Err(AggregatorError::IncorrectSignature(operator_id));
        }

        let content_digest = self
            .hasher
            .content_digest(message)
            .map_err(|e| AggregatorError::MessageDigestUnavailable(e.to_string()))?;

        if let Some(previous) = self.contributions.get(&operator_id) {
            debug!(
                "MessageTask.apply: {}, operator {operator_id} already signed {previous}",
                self.key
            );
            return Ok(None);
        }

        self.per_digest
            .entry(content_digest)
            .and_modify(|entry| entry.operators.add(operator, &pubkey_g2, signature))
            .or_insert_with(|| DigestAggregation {
                message: message.clone(),
                signing_digest,
                operators: AggregatedOperators::new(operator, pubkey_g2, *signature),
            });
        self.contributions.insert(operator_id, content_digest);
        self.last_message = Some(message.clone());
        Ok(Some(content_digest))
    }

    async fn build_response(
        &mut self,
        content_digest: &B256,
        status: AggregationStatus,
        finished: bool,
    ) -> AggregationResponse {
        // Only called with a digest `apply` just inserted.
        let entry = &self.per_digest[content_digest];
        let non_signers = entry.operators.sorted_non_signers(&self.info);
        let non_signer_ids: Vec<_> = non_signers.iter().map(|(id, _)| *id).collect();

        let (indices, error) = match self
            .registry
            .get_check_signatures_indices(
                *self.info.reference_block(),
                self.info.quorum_numbers(),
                &non_signer_ids,
            )
            .await
        {
            Ok(indices) => (indices, None),
            Err(e) => {
                warn!(
                    "MessageTask.build_response: {}, failed to fetch indices: {e}",
                    self.key
                );
                (
                    CheckSignaturesIndices::default(),
                    Some(ResponseError::RegistrySource(e.to_string())),
                )
            }
        };

        let response = AggregationResponse {
            key: self.key,
            message: Some(entry.message.clone()),
            status,
            finished,
            aggregation: Some(MessageBlsAggregation::new(
                &self.info,
                entry.signing_digest,
                &entry.operators,
                non_signers,
                indices,
            )),
            error,
        };
        self.last_response = Some(response.clone());
        response
    }

    fn emit(&self, response: AggregationResponse) {
        if self.responses.send(response).is_err() {
            warn!("MessageTask.emit: {}, response stream dropped", self.key);
        }
    }

    /// Unregisters the key before the terminal emission, so that once a
    /// consumer sees it new signatures fail with `MessageNotFound`.
    fn finish(&mut self, response: AggregationResponse) {
        drop(self.registration.take());
        self.inbox.close();
        while let Ok(pending) = self.inbox.try_recv() {
            let _ = pending
                .ack
                .send(Err(AggregatorError::MessageNotFound(self.key)));
        }
        self.emit(response);
    }
}
