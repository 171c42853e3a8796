//! Shared stub collaborators for finalizer tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ethereum_types::{Address, H256};
use zkseq_common::batch::Batch;
use zkseq_common::events::VecEventLog;
use zkseq_common::resources::{BatchConstraints, ZKCounters};
use zkseq_storage::{InMemoryStore, Store, StoreEngine};

use crate::configs::FinalizerConfig;
use crate::errors::FinalizerError;
use crate::finalizer::{Finalizer, ForcedBatchProcessor, L2BlockHandler, SyncStatus, Worker};
use crate::l2_block::{L1InfoTreeLeaf, WipL2Block};

pub(crate) fn test_constraints() -> BatchConstraints {
    BatchConstraints {
        max_txs_per_batch: 300,
        max_batch_bytes_size: 120_000,
        max_cumulative_gas_used: 30_000_000,
        max_keccak_hashes: 2_145,
        max_poseidon_hashes: 252_357,
        max_poseidon_paddings: 135_191,
        max_mem_aligns: 236_585,
        max_arithmetics: 236_585,
        max_binaries: 473_170,
        max_steps: 7_570_538,
        max_sha256_hashes: 1_596,
    }
}

pub(crate) fn test_config() -> FinalizerConfig {
    FinalizerConfig {
        resource_percentage_to_close_batch: 90,
        sequential_reprocess_full_batch: true,
        batch_constraints: test_constraints(),
        batch_max_open_duration_secs: 120,
    }
}

/// Worker stub recording which txs had their counter estimates corrected.
#[derive(Debug, Default)]
pub(crate) struct RecordingWorker {
    updates: Mutex<Vec<(H256, Address)>>,
}

impl RecordingWorker {
    pub(crate) fn updates(&self) -> Vec<(H256, Address)> {
        self.updates.lock().expect("worker lock poisoned").clone()
    }
}

impl Worker for RecordingWorker {
    fn update_tx_zk_counters(&self, tx_hash: H256, from: Address, _counters: ZKCounters) {
        self.updates
            .lock()
            .expect("worker lock poisoned")
            .push((tx_hash, from));
    }
}

#[derive(Debug)]
pub(crate) struct AlwaysSynced;

#[async_trait::async_trait]
impl SyncStatus for AlwaysSynced {
    async fn is_synced(&self) -> bool {
        true
    }
}

#[derive(Debug)]
pub(crate) struct NoForcedBatches;

#[async_trait::async_trait]
impl ForcedBatchProcessor for NoForcedBatches {
    async fn has_pending(&self) -> bool {
        false
    }

    async fn process_forced_batches(&self) -> Result<(), FinalizerError> {
        Ok(())
    }
}

/// Forced-batch stub that persists closed batches up to `target` so the
/// finalizer has to reload the last batch number from the store.
#[derive(Debug)]
pub(crate) struct JumpAheadForcedBatches {
    engine: Arc<InMemoryStore>,
    target: u64,
    pending: AtomicBool,
}

impl JumpAheadForcedBatches {
    pub(crate) fn new(engine: Arc<InMemoryStore>, target: u64) -> Self {
        Self {
            engine,
            target,
            pending: AtomicBool::new(true),
        }
    }
}

#[async_trait::async_trait]
impl ForcedBatchProcessor for JumpAheadForcedBatches {
    async fn has_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    async fn process_forced_batches(&self) -> Result<(), FinalizerError> {
        let last = self.engine.get_last_batch_number().await?;
        for number in (last + 1)..=self.target {
            self.engine.seed_batch(Batch {
                batch_number: number,
                state_root: H256::repeat_byte(number as u8 * 0x11),
                ..Default::default()
            })?;
        }
        self.pending.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct NoopL2BlockHandler;

#[async_trait::async_trait]
impl L2BlockHandler for NoopL2BlockHandler {
    async fn process_l2_block(&self, _block: WipL2Block) -> Result<(), FinalizerError> {
        Ok(())
    }

    async fn store_l2_block(&self, _block: WipL2Block) -> Result<(), FinalizerError> {
        Ok(())
    }
}

pub(crate) struct TestFixture {
    pub engine: Arc<InMemoryStore>,
    pub worker: Arc<RecordingWorker>,
    pub event_log: Arc<VecEventLog>,
}

impl TestFixture {
    pub(crate) fn finalizer(&self) -> Finalizer {
        Finalizer::new(
            test_config(),
            Address::repeat_byte(0x0f),
            Store::new(self.engine.clone()),
            self.event_log.clone(),
            self.worker.clone(),
            Arc::new(AlwaysSynced),
            Arc::new(NoForcedBatches),
            Arc::new(NoopL2BlockHandler),
            Arc::new(Mutex::new(L1InfoTreeLeaf::default())),
        )
    }
}

pub(crate) fn test_fixture() -> TestFixture {
    TestFixture {
        engine: Arc::new(InMemoryStore::new()),
        worker: Arc::new(RecordingWorker::default()),
        event_log: Arc::new(VecEventLog::new()),
    }
}

pub(crate) fn test_finalizer(engine: &Arc<InMemoryStore>) -> Finalizer {
    TestFixture {
        engine: engine.clone(),
        worker: Arc::new(RecordingWorker::default()),
        event_log: Arc::new(VecEventLog::new()),
    }
    .finalizer()
}
