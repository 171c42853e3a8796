//! The batch finalizer: the single task that owns the wip batch.
//!
//! All lifecycle mutations (open, accumulate, close, reopen) happen on this
//! task. Subordinate work (L2-block processing, L2-block storage, the async
//! sanity reprocess) runs on separate tasks and is joined through explicit
//! barriers, never through shared mutable state.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ethereum_types::{Address, H256};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use zkseq_common::events::EventLog;
use zkseq_common::resources::ZKCounters;
use zkseq_storage::Store;

use crate::batch::WipBatch;
use crate::configs::FinalizerConfig;
use crate::errors::FinalizerError;
use crate::l2_block::{BlockWorkers, L1InfoTreeLeaf, WipL2Block};

/// Unix seconds.
pub(crate) fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// The transaction worker, as far as the finalizer is concerned: it only
/// ever hears back when a transaction's zk-counter estimate turned out too
/// low for the remaining batch budget.
pub trait Worker: Send + Sync {
    fn update_tx_zk_counters(&self, tx_hash: H256, from: Address, counters: ZKCounters);
}

/// View of the synchronizer's progress.
#[async_trait::async_trait]
pub trait SyncStatus: Send + Sync {
    async fn is_synced(&self) -> bool;
}

/// Forced-batch interleaving, delegated to the L1 escape-hatch processor.
/// Processing persists the forced batches itself and may advance the last
/// batch number by more than one; the finalizer reloads it from the store
/// afterwards.
#[async_trait::async_trait]
pub trait ForcedBatchProcessor: Send + Sync {
    async fn has_pending(&self) -> bool;
    async fn process_forced_batches(&self) -> Result<(), FinalizerError>;
}

/// The L2-block finalizer sibling: processes a finalized block, then stores
/// it. Both calls run on barrier-tracked tasks; their failures belong to the
/// sibling and are only logged here.
#[async_trait::async_trait]
pub trait L2BlockHandler: Send + Sync {
    async fn process_l2_block(&self, block: WipL2Block) -> Result<(), FinalizerError>;
    async fn store_l2_block(&self, block: WipL2Block) -> Result<(), FinalizerError>;
}

pub struct Finalizer {
    pub(crate) cfg: FinalizerConfig,
    pub(crate) sequencer_address: Address,
    pub(crate) store: Store,
    pub(crate) event_log: Arc<dyn EventLog>,
    pub(crate) worker: Arc<dyn Worker>,
    pub(crate) sync_status: Arc<dyn SyncStatus>,
    pub(crate) forced_batches: Arc<dyn ForcedBatchProcessor>,
    pub(crate) l2_block_handler: Arc<dyn L2BlockHandler>,
    /// Written by the L1-info-tree follower task; the lock is held only long
    /// enough to copy the leaf, never across an await point.
    pub(crate) last_l1_info_tree: Arc<Mutex<L1InfoTreeLeaf>>,
    pub(crate) wip_batch: Option<WipBatch>,
    pub(crate) wip_l2_block: WipL2Block,
    pub(crate) block_workers: BlockWorkers,
    halt: CancellationToken,
}

impl Finalizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: FinalizerConfig,
        sequencer_address: Address,
        store: Store,
        event_log: Arc<dyn EventLog>,
        worker: Arc<dyn Worker>,
        sync_status: Arc<dyn SyncStatus>,
        forced_batches: Arc<dyn ForcedBatchProcessor>,
        l2_block_handler: Arc<dyn L2BlockHandler>,
        last_l1_info_tree: Arc<Mutex<L1InfoTreeLeaf>>,
    ) -> Self {
        Self {
            cfg,
            sequencer_address,
            store,
            event_log,
            worker,
            sync_status,
            forced_batches,
            l2_block_handler,
            last_l1_info_tree,
            wip_batch: None,
            wip_l2_block: WipL2Block::default(),
            block_workers: BlockWorkers::new(),
            halt: CancellationToken::new(),
        }
    }

    /// The wip batch. [`Finalizer::init_wip_batch`] must have completed.
    pub fn wip_batch(&self) -> Option<&WipBatch> {
        self.wip_batch.as_ref()
    }

    /// Handle for spawning block-processing and block-storage tasks that the
    /// close barriers must wait for.
    pub fn block_workers(&self) -> &BlockWorkers {
        &self.block_workers
    }

    /// Cancelled when the finalizer hits an unrecoverable error. The node
    /// supervisor terminates the process on it; restart plus
    /// [`Finalizer::init_wip_batch`] is the recovery path.
    pub fn halt_token(&self) -> CancellationToken {
        self.halt.clone()
    }

    /// Logs the fatal error and cancels the halt token. Terminal: there is
    /// no in-place retry of a half-closed batch.
    pub(crate) async fn halt(&self, err: FinalizerError) -> FinalizerError {
        error!("halting finalizer: {err}");
        self.halt.cancel();
        err
    }

    /// Polls the synchronizer until it reports the latest batch as synced.
    pub(crate) async fn wait_synced(&self) {
        while !self.sync_status.is_synced().await {
            info!("wait for synchronizer to sync last batch");
            sleep(Duration::from_secs(1)).await;
        }
    }

    pub(crate) fn last_l1_info_tree_leaf(&self) -> Result<L1InfoTreeLeaf, FinalizerError> {
        self.last_l1_info_tree
            .lock()
            .map(|leaf| *leaf)
            .map_err(|_| FinalizerError::Custom("l1 info tree lock poisoned".to_string()))
    }

    /// Resets the wip L2 block from the latest L1-info-tree leaf.
    pub(crate) fn init_wip_l2_block(&mut self) -> Result<(), FinalizerError> {
        let leaf = self.last_l1_info_tree_leaf()?;
        self.wip_l2_block = WipL2Block {
            timestamp: now(),
            l1_info_tree_leaf: leaf,
            tx_count: 0,
        };
        Ok(())
    }

    /// Hands the current wip L2 block to the block workers (a processing
    /// task that chains a storage task) and opens a fresh one.
    pub(crate) fn finalize_wip_l2_block(&mut self) -> Result<(), FinalizerError> {
        let block = std::mem::take(&mut self.wip_l2_block);

        let handler = self.l2_block_handler.clone();
        let workers = self.block_workers.clone();
        self.block_workers.spawn_process(async move {
            if let Err(err) = handler.process_l2_block(block.clone()).await {
                error!("failed to process L2 block: {err}");
                return;
            }
            workers.spawn_store(async move {
                if let Err(err) = handler.store_l2_block(block).await {
                    error!("failed to store L2 block: {err}");
                }
            });
        });

        self.init_wip_l2_block()
    }
}
