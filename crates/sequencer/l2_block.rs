//! The in-progress L2 block and the worker barriers.
//!
//! L2-block assembly itself belongs to the block finalizer sibling; what the
//! batch finalizer owns is the handoff: every finalized block spawns a
//! processing task and, once processed, a storage task. The batch cannot
//! close until both queues have drained, so no block of batch N can land in
//! the store after N is closed.

use std::future::Future;

use ethereum_types::H256;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::debug;
use zkseq_common::resources::{BatchResources, ZKCounters};

/// Fixed overhead every L2 block adds to its batch: the change-block header
/// bytes plus the state-tree writes of the block hash bookkeeping.
pub const L2_BLOCK_USED_RESOURCES: BatchResources = BatchResources {
    zk_counters: ZKCounters {
        gas_used: 0,
        keccak_hashes: 0,
        poseidon_hashes: 256,
        poseidon_paddings: 0,
        mem_aligns: 0,
        arithmetics: 0,
        binaries: 0,
        steps: 200,
        sha256_hashes: 0,
    },
    bytes: 9,
};

/// L1-info-tree leaf referenced by an L2 block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct L1InfoTreeLeaf {
    pub l1_info_tree_index: u32,
    pub global_exit_root: H256,
    pub min_timestamp: u64,
}

/// The L2 block currently accumulating transactions.
#[derive(Clone, Debug, Default)]
pub struct WipL2Block {
    /// Unix seconds at open.
    pub timestamp: u64,
    pub l1_info_tree_leaf: L1InfoTreeLeaf,
    pub tx_count: u64,
}

impl WipL2Block {
    pub fn is_empty(&self) -> bool {
        self.tx_count == 0
    }
}

/// The two wait groups between the finalizer and its block workers.
///
/// Block tasks are spawned onto the trackers by [`spawn_process`] and
/// [`spawn_store`]; only the finalizer waits. Draining closes the tracker,
/// awaits it and reopens it for the next batch.
///
/// [`spawn_process`]: BlockWorkers::spawn_process
/// [`spawn_store`]: BlockWorkers::spawn_store
#[derive(Clone, Debug, Default)]
pub struct BlockWorkers {
    pending_to_process: TaskTracker,
    pending_to_store: TaskTracker,
}

impl BlockWorkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an L2-block processing task.
    pub fn spawn_process<F>(&self, task: F)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.pending_to_process.spawn(task);
    }

    /// Queues an L2-block storage task.
    pub fn spawn_store<F>(&self, task: F)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.pending_to_store.spawn(task);
    }

    /// Barrier A: blocks until every queued processing task completed.
    pub async fn wait_pending_to_process(&self) {
        let start = Instant::now();
        self.pending_to_process.close();
        self.pending_to_process.wait().await;
        self.pending_to_process.reopen();
        debug!(
            "waiting for pending L2 blocks to be processed took: {:?}",
            start.elapsed()
        );
    }

    /// Barrier B: blocks until every queued storage task completed.
    pub async fn wait_pending_to_store(&self) {
        let start = Instant::now();
        self.pending_to_store.close();
        self.pending_to_store.wait().await;
        self.pending_to_store.reopen();
        debug!(
            "waiting for pending L2 blocks to be stored took: {:?}",
            start.elapsed()
        );
    }
}
