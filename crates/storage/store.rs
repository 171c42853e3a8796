use std::collections::BTreeMap;
use std::sync::Arc;

use ethereum_types::H256;
use tracing::error;
use zkseq_common::batch::{Batch, ProcessingReceipt};
use zkseq_common::process::{L1Data, ProcessBatchResponse, ProcessRequest};

use crate::api::{StateTransaction, StoreEngine};
use crate::error::StoreError;
use crate::in_memory::InMemoryStore;

/// Cloneable handle over the state store engine.
#[derive(Clone, Debug)]
pub struct Store {
    engine: Arc<dyn StoreEngine>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            engine: Arc::new(InMemoryStore::new()),
        }
    }
}

impl Store {
    pub fn new(engine: Arc<dyn StoreEngine>) -> Self {
        Self { engine }
    }

    pub async fn get_last_batch_number(&self) -> Result<u64, StoreError> {
        self.engine.get_last_batch_number().await
    }

    pub async fn get_last_n_batches(&self, n: u64) -> Result<Vec<Batch>, StoreError> {
        self.engine.get_last_n_batches(n).await
    }

    pub async fn get_batch_by_number(&self, batch_number: u64) -> Result<Option<Batch>, StoreError> {
        self.engine.get_batch_by_number(batch_number).await
    }

    pub async fn begin_state_transaction(&self) -> Result<Box<dyn StateTransaction>, StoreError> {
        self.engine.begin_state_transaction().await
    }

    pub fn get_fork_id_by_batch_number(&self, batch_number: u64) -> u64 {
        self.engine.get_fork_id_by_batch_number(batch_number)
    }

    pub async fn get_l1_info_tree_data_from_batch_l2_data(
        &self,
        batch_l2_data: &[u8],
    ) -> Result<(BTreeMap<u32, L1Data>, H256), StoreError> {
        self.engine
            .get_l1_info_tree_data_from_batch_l2_data(batch_l2_data)
            .await
    }

    pub async fn process_batch_v2(
        &self,
        request: ProcessRequest,
        update_merkle_tree: bool,
    ) -> Result<ProcessBatchResponse, StoreError> {
        self.engine.process_batch_v2(request, update_merkle_tree).await
    }

    /// Opens a wip batch inside its own state transaction.
    ///
    /// Begin, open, commit; on failure the transaction is rolled back and the
    /// operation error is returned. A rollback failure is only logged, the
    /// original error still wins. Never retries.
    pub async fn open_wip_batch_in_tx(&self, batch: Batch) -> Result<(), StoreError> {
        let batch_number = batch.batch_number;
        let mut tx = self.begin_state_transaction().await?;
        match tx.open_wip_batch(batch).await {
            Ok(()) => tx.commit().await,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!("failed to rollback open of batch {batch_number}: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Closes the wip batch inside its own state transaction, with the same
    /// rollback contract as [`Store::open_wip_batch_in_tx`].
    pub async fn close_wip_batch_in_tx(&self, receipt: ProcessingReceipt) -> Result<(), StoreError> {
        let batch_number = receipt.batch_number;
        let mut tx = self.begin_state_transaction().await?;
        match tx.close_wip_batch(receipt).await {
            Ok(()) => tx.commit().await,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!("failed to rollback close of batch {batch_number}: {rollback_err}");
                }
                Err(err)
            }
        }
    }
}
