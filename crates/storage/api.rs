// Storage contract consumed by the batch finalizer and the trusted sync.

use std::collections::BTreeMap;
use std::fmt::Debug;

use ethereum_types::H256;
use zkseq_common::batch::{Batch, ProcessingReceipt};
use zkseq_common::process::{L1Data, ProcessBatchResponse, ProcessRequest};

use crate::error::StoreError;

// We need async_trait because the stabilized feature lacks support for object
// safety (i.e. dyn StoreEngine)
#[async_trait::async_trait]
pub trait StoreEngine: Debug + Send + Sync {
    /// Returns the number of the newest batch.
    async fn get_last_batch_number(&self) -> Result<u64, StoreError>;

    /// Returns the newest `n` batches, newest first.
    async fn get_last_n_batches(&self, n: u64) -> Result<Vec<Batch>, StoreError>;

    /// Returns the batch with the given number, if present.
    async fn get_batch_by_number(&self, batch_number: u64) -> Result<Option<Batch>, StoreError>;

    /// Opens a state transaction. Mutations made through it are invisible to
    /// readers until `commit`.
    async fn begin_state_transaction(&self) -> Result<Box<dyn StateTransaction>, StoreError>;

    /// Returns the fork id active at the given batch number.
    fn get_fork_id_by_batch_number(&self, batch_number: u64) -> u64;

    /// Derives the referenced L1-info-tree leaves (keyed by leaf index) from
    /// a batch L2 data blob, plus the L1 info root covering them.
    async fn get_l1_info_tree_data_from_batch_l2_data(
        &self,
        batch_l2_data: &[u8],
    ) -> Result<(BTreeMap<u32, L1Data>, H256), StoreError>;

    /// Runs a batch through the zk-executor.
    async fn process_batch_v2(
        &self,
        request: ProcessRequest,
        update_merkle_tree: bool,
    ) -> Result<ProcessBatchResponse, StoreError>;
}

/// A store transaction: buffered mutations, applied atomically on commit.
#[async_trait::async_trait]
pub trait StateTransaction: Send + Sync {
    /// Persists a new batch row with `wip = true`. Fails if a wip batch
    /// already exists.
    async fn open_wip_batch(&mut self, batch: Batch) -> Result<(), StoreError>;

    /// Records used resources and closing reason on the wip batch row and
    /// clears its `wip` flag. Fails if no wip batch exists.
    async fn close_wip_batch(&mut self, receipt: ProcessingReceipt) -> Result<(), StoreError>;

    /// Overwrites the wip batch row in place (trusted-sync incremental
    /// updates).
    async fn update_wip_batch(&mut self, batch: Batch) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
