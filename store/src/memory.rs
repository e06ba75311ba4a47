use async_trait::async_trait;
use sffl_core::MessageBlsAggregation;
use sffl_lib::messages::{OperatorSetUpdateMessage, StateRootUpdateMessage};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{CheckpointMessages, CheckpointWindow, Store, StoreResult};

#[derive(Debug, Clone)]
struct Entry<M> {
    message: M,
    aggregation: Option<MessageBlsAggregation>,
}

#[derive(Debug, Default)]
struct InMemoryStoreDb {
    state_root_updates: BTreeMap<(u32, u64), Entry<StateRootUpdateMessage>>,
    operator_set_updates: BTreeMap<u64, Entry<OperatorSetUpdateMessage>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    db: Arc<Mutex<InMemoryStoreDb>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn store_state_root_update(&self, msg: &StateRootUpdateMessage) -> StoreResult<()> {
        let mut db = self.db.lock().await;
        db.state_root_updates
            .entry((msg.rollupId, msg.blockHeight))
            .or_insert_with(|| {
                debug!(
                    "InMemoryStore.store_state_root_update: rollup {} height {}",
                    msg.rollupId, msg.blockHeight
                );
                Entry {
                    message: msg.clone(),
                    aggregation: None,
                }
            });
        Ok(())
    }

    async fn store_state_root_update_aggregation(
        &self,
        msg: &StateRootUpdateMessage,
        aggregation: &MessageBlsAggregation,
    ) -> StoreResult<()> {
        info!(
            "InMemoryStore.store_state_root_update_aggregation: rollup {} height {}",
            msg.rollupId, msg.blockHeight
        );
        let mut db = self.db.lock().await;
        db.state_root_updates.insert(
            (msg.rollupId, msg.blockHeight),
            Entry {
                message: msg.clone(),
                aggregation: Some(aggregation.clone()),
            },
        );
        Ok(())
    }

    async fn store_operator_set_update(&self, msg: &OperatorSetUpdateMessage) -> StoreResult<()> {
        let mut db = self.db.lock().await;
        db.operator_set_updates.entry(msg.id).or_insert_with(|| {
            debug!("InMemoryStore.store_operator_set_update: id {}", msg.id);
            Entry {
                message: msg.clone(),
                aggregation: None,
            }
        });
        Ok(())
    }

    async fn store_operator_set_update_aggregation(
        &self,
        msg: &OperatorSetUpdateMessage,
        aggregation: &MessageBlsAggregation,
    ) -> StoreResult<()> {
        info!(
            "InMemoryStore.store_operator_set_update_aggregation: id {}",
            msg.id
        );
        let mut db = self.db.lock().await;
        db.operator_set_updates.insert(
            msg.id,
            Entry {
                message: msg.clone(),
                aggregation: Some(aggregation.clone()),
            },
        );
        Ok(())
    }

    async fn fetch_checkpoint_messages(
        &self,
        from_timestamp: u64,
        to_timestamp: u64,
    ) -> StoreResult<CheckpointMessages> {
        let window = CheckpointWindow::new(from_timestamp, to_timestamp)?;
        let db = self.db.lock().await;

        let state_root_updates = db
            .state_root_updates
            .values()
            .filter(|entry| window.contains(entry.message.timestamp))
            .filter_map(|entry| {
                let aggregation = entry.aggregation.clone()?;
                Some((entry.message.clone(), aggregation))
            })
            .collect();
        let operator_set_updates = db
            .operator_set_updates
            .values()
            .filter(|entry| window.contains(entry.message.timestamp))
            .filter_map(|entry| {
                let aggregation = entry.aggregation.clone()?;
                Some((entry.message.clone(), aggregation))
            })
            .collect();

        Ok(CheckpointMessages {
            state_root_updates,
            operator_set_updates,
        })
    }

    async fn get_state_root_update_aggregation(
        &self,
        rollup_id: u32,
        block_height: u64,
    ) -> StoreResult<Option<(StateRootUpdateMessage, MessageBlsAggregation)>> {
        let db = self.db.lock().await;
        Ok(db
            .state_root_updates
            .get(&(rollup_id, block_height))
            .and_then(|entry| Some((entry.message.clone(), entry.aggregation.clone()?))))
    }

    async fn get_operator_set_update_aggregation(
        &self,
        id: u64,
    ) -> StoreResult<Option<(OperatorSetUpdateMessage, MessageBlsAggregation)>> {
        let db = self.db.lock().await;
        Ok(db
            .operator_set_updates
            .get(&id)
            .and_then(|entry| Some((entry.message.clone(), entry.aggregation.clone()?))))
    }
}
