use std::sync::Arc;

use sffl_aggregator::{
    persist_response, start_round, AggregationResponse, AggregationService, CheckpointAssembler,
};
use sffl_core::InMemoryRegistry;
use sffl_lib::SfflHasher;
use sffl_store::{InMemoryStore, Store, MAX_CHECKPOINT_WINDOW_SECS};
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::{HostError, HostResult},
    NodeConfig,
};

/// A checkpoint round the node is about to assemble.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct CheckpointRound {
    pub task_index: u32,
    pub from_timestamp: u64,
    pub to_timestamp: u64,
}

/// Tracks which timestamps earlier checkpoints already covered.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct CheckpointSchedule {
    next_task_index: u32,
    last_to_timestamp: Option<u64>,
}

impl CheckpointSchedule {
    /// The round ending at `now`, starting right after the last completed one.
    /// The first round covers `interval_secs`. Windows are capped at
    /// [`MAX_CHECKPOINT_WINDOW_SECS`]; `None` when `now` is already covered.
    pub fn next_round(&self, now: u64, interval_secs: u64) -> Option<CheckpointRound> {
        let from_timestamp = match self.last_to_timestamp {
            Some(last) if last >= now => return None,
            Some(last) => last + 1,
            None => now.saturating_sub(interval_secs),
        };
        let earliest = now.saturating_sub(MAX_CHECKPOINT_WINDOW_SECS);
        if from_timestamp < earliest {
            warn!(
                "CheckpointSchedule.next_round: skipping [{from_timestamp}, {}]",
                earliest - 1
            );
        }
        Some(CheckpointRound {
            task_index: self.next_task_index,
            from_timestamp: from_timestamp.max(earliest),
            to_timestamp: now,
        })
    }

    pub fn complete(&mut self, round: &CheckpointRound) {
        self.next_task_index = round.task_index + 1;
        self.last_to_timestamp = Some(round.to_timestamp);
    }
}

/// The aggregation node: one registry snapshot, one service, one store.
pub struct Node {
    config: NodeConfig,
    service: Arc<AggregationService>,
    store: Arc<InMemoryStore>,
    assembler: CheckpointAssembler,
}

impl Node {
    pub fn init(config: NodeConfig) -> HostResult<Self> {
        let registry = InMemoryRegistry::from_file(&config.registry_path)?;
        let hasher = Arc::new(SfflHasher::new(config.protocol_version));
        let service = Arc::new(AggregationService::new(Arc::new(registry), hasher.clone()));
        let store = Arc::new(InMemoryStore::new());
        let assembler = CheckpointAssembler::new(store.clone(), hasher);
        Ok(Self {
            config,
            service,
            store,
            assembler,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<AggregationService> {
        &self.service
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Persists responses and runs checkpoint rounds until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> HostResult<()> {
        let responses = self
            .service
            .response_stream()
            .ok_or_else(|| HostError::Config("response stream already taken".to_owned()))?;
        let persister = spawn_persister(self.store.clone(), responses);

        let interval_secs = self.config.checkpoint_interval.as_secs();
        let mut schedule = CheckpointSchedule::default();
        let mut interval = tokio::time::interval(self.config.checkpoint_interval);
        // The first tick completes immediately.
        interval.tick().await;

        info!(
            "Node.run: checkpoint every {interval_secs}s over quorums {:?}",
            self.config.quorum_numbers
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let Some(round) = schedule.next_round(unix_timestamp(), interval_secs) else {
                        continue;
                    };
                    match self.checkpoint(&round).await {
                        Ok(()) => schedule.complete(&round),
                        Err(e) => error!("Node.run: checkpoint {} failed: {e}", round.task_index),
                    }
                }
            }
        }

        info!("Node.run: shutting down");
        persister.abort();
        Ok(())
    }

    /// Assembles the checkpoint for `round` and opens its signing round.
    pub async fn checkpoint(&self, round: &CheckpointRound) -> HostResult<()> {
        let assembly = self
            .assembler
            .assemble(round.task_index, round.from_timestamp, round.to_timestamp)
            .await?;
        start_round(
            &self.service,
            &assembly,
            &self.config.quorum_numbers,
            &self.config.quorum_thresholds,
            self.config.time_to_expiry,
            self.config.aggregation_timeout,
        )
        .await?;
        info!(
            "Node.checkpoint: started round {} with digest {}",
            round.task_index, assembly.signing_digest
        );
        Ok(())
    }
}

/// Drains the response stream into `store` until the stream closes.
pub fn spawn_persister(
    store: Arc<dyn Store>,
    mut responses: UnboundedReceiver<AggregationResponse>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(response) = responses.recv().await {
            if let Some(e) = &response.error {
                warn!("persister: {} finished with error: {e}", response.key);
            }
            match persist_response(store.as_ref(), &response).await {
                Ok(true) => info!("persister: stored aggregation for {}", response.key),
                Ok(false) => debug!(
                    "persister: {} not stored, status {:?}, finished {}",
                    response.key, response.status, response.finished
                ),
                Err(e) => error!("persister: failed to store {}: {e}", response.key),
            }
        }
        debug!("persister: response stream closed");
    })
}

fn unix_timestamp() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
