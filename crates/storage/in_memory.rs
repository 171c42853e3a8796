use std::collections::{BTreeMap, VecDeque};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};

use ethereum_types::H256;
use keccak_hash::keccak;
use zkseq_common::batch::{Batch, ProcessingReceipt};
use zkseq_common::l2_data::decode_batch_l2_data;
use zkseq_common::process::{L1Data, ProcessBatchResponse, ProcessRequest};

use crate::api::{StateTransaction, StoreEngine};
use crate::error::StoreError;

/// In-memory state store.
///
/// Batch rows live in a map guarded by a mutex; transactions take a snapshot,
/// mutate it, and swap it back in on commit. The executor side of the store
/// is a queue of canned responses: tests push what `process_batch_v2` should
/// answer, and an empty queue echoes the request's old state root back.
#[derive(Clone, Default)]
pub struct InMemoryStore(Arc<Mutex<StoreInner>>);

#[derive(Debug, Default)]
struct StoreInner {
    batches: BTreeMap<u64, Batch>,
    fork_id: u64,
    executor_responses: VecDeque<ProcessBatchResponse>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> Result<MutexGuard<'_, StoreInner>, StoreError> {
        self.0.lock().map_err(|_| StoreError::lock_poisoned())
    }

    /// Seeds a batch row, bypassing transaction rules. Test setup only.
    pub fn seed_batch(&self, batch: Batch) -> Result<(), StoreError> {
        self.inner()?.batches.insert(batch.batch_number, batch);
        Ok(())
    }

    /// Queues the next `process_batch_v2` answer.
    pub fn push_executor_response(&self, response: ProcessBatchResponse) -> Result<(), StoreError> {
        self.inner()?.executor_responses.push_back(response);
        Ok(())
    }

    pub fn set_fork_id(&self, fork_id: u64) -> Result<(), StoreError> {
        self.inner()?.fork_id = fork_id;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StoreEngine for InMemoryStore {
    async fn get_last_batch_number(&self) -> Result<u64, StoreError> {
        self.inner()?
            .batches
            .keys()
            .next_back()
            .copied()
            .ok_or(StoreError::MissingBatch(0))
    }

    async fn get_last_n_batches(&self, n: u64) -> Result<Vec<Batch>, StoreError> {
        Ok(self
            .inner()?
            .batches
            .values()
            .rev()
            .take(n as usize)
            .cloned()
            .collect())
    }

    async fn get_batch_by_number(&self, batch_number: u64) -> Result<Option<Batch>, StoreError> {
        Ok(self.inner()?.batches.get(&batch_number).cloned())
    }

    async fn begin_state_transaction(&self) -> Result<Box<dyn StateTransaction>, StoreError> {
        let snapshot = self.inner()?.batches.clone();
        Ok(Box::new(InMemoryTransaction {
            store: self.0.clone(),
            batches: snapshot,
        }))
    }

    fn get_fork_id_by_batch_number(&self, _batch_number: u64) -> u64 {
        self.0.lock().map(|inner| inner.fork_id).unwrap_or_default()
    }

    async fn get_l1_info_tree_data_from_batch_l2_data(
        &self,
        batch_l2_data: &[u8],
    ) -> Result<(BTreeMap<u32, L1Data>, H256), StoreError> {
        let raw = decode_batch_l2_data(batch_l2_data)?;

        let mut leaves = BTreeMap::new();
        for block in &raw.blocks {
            let index = block.l1_info_tree_index;
            leaves.entry(index).or_insert_with(|| L1Data {
                global_exit_root: keccak(index.to_be_bytes()),
                block_hash_l1: keccak(keccak(index.to_be_bytes()).as_bytes()),
                min_timestamp: 0,
            });
        }

        Ok((leaves, keccak(batch_l2_data)))
    }

    async fn process_batch_v2(
        &self,
        request: ProcessRequest,
        _update_merkle_tree: bool,
    ) -> Result<ProcessBatchResponse, StoreError> {
        let canned = self.inner()?.executor_responses.pop_front();
        Ok(canned.unwrap_or(ProcessBatchResponse {
            new_state_root: request.old_state_root,
            ..Default::default()
        }))
    }
}

impl Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

struct InMemoryTransaction {
    store: Arc<Mutex<StoreInner>>,
    batches: BTreeMap<u64, Batch>,
}

impl InMemoryTransaction {
    fn wip_batch_number(&self) -> Option<u64> {
        self.batches
            .values()
            .find(|batch| batch.wip)
            .map(|batch| batch.batch_number)
    }
}

#[async_trait::async_trait]
impl StateTransaction for InMemoryTransaction {
    async fn open_wip_batch(&mut self, batch: Batch) -> Result<(), StoreError> {
        if let Some(open) = self.wip_batch_number() {
            return Err(StoreError::AlreadyOpenBatch(open));
        }
        let mut batch = batch;
        batch.wip = true;
        self.batches.insert(batch.batch_number, batch);
        Ok(())
    }

    async fn close_wip_batch(&mut self, receipt: ProcessingReceipt) -> Result<(), StoreError> {
        let batch = self
            .batches
            .get_mut(&receipt.batch_number)
            .ok_or(StoreError::MissingBatch(receipt.batch_number))?;
        if !batch.wip {
            return Err(StoreError::NoOpenBatch);
        }
        batch.wip = false;
        batch.resources = receipt.batch_resources;
        batch.closing_reason = Some(receipt.closing_reason);
        Ok(())
    }

    async fn update_wip_batch(&mut self, batch: Batch) -> Result<(), StoreError> {
        let current = self
            .batches
            .get_mut(&batch.batch_number)
            .ok_or(StoreError::MissingBatch(batch.batch_number))?;
        if !current.wip {
            return Err(StoreError::NoOpenBatch);
        }
        *current = batch;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut inner = self.store.lock().map_err(|_| StoreError::lock_poisoned())?;
        inner.batches = self.batches;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
