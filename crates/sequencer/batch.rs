//! Wip-batch lifecycle: open, accumulate, close, reopen.

use std::collections::BTreeMap;

use bytes::Bytes;
use ethereum_types::{Address, H256};
use tracing::info;
use zkseq_common::batch::{Batch, ClosingReason, ProcessingReceipt};
use zkseq_common::l2_data::decode_batch_l2_data;
use zkseq_common::process::{CallerLabel, ProcessRequest};
use zkseq_common::resources::BatchResources;

use crate::errors::FinalizerError;
use crate::finalizer::{now, Finalizer};
use crate::l2_block::L2_BLOCK_USED_RESOURCES;
use crate::sanity_check::MOCK_L1_INFO_ROOT;

/// The batch currently accumulating transactions.
#[derive(Clone, Debug)]
pub struct WipBatch {
    pub batch_number: u64,
    pub coinbase: Address,
    /// Unix seconds at open.
    pub timestamp: u64,
    /// State root the batch opened on. Never changes.
    pub initial_state_root: H256,
    /// Intermediate root, advanced each time a single tx is processed.
    pub im_state_root: H256,
    /// Root after the last finalized L2 block.
    pub final_state_root: H256,
    pub local_exit_root: H256,
    pub global_exit_root: H256,
    pub count_of_txs: u64,
    pub remaining_resources: BatchResources,
    pub closing_reason: ClosingReason,
}

impl WipBatch {
    pub fn is_empty(&self) -> bool {
        self.count_of_txs == 0
    }
}

impl Finalizer {
    /// Loads or opens the wip batch at startup. This is also the recovery
    /// path after a halt: whatever state the restart finds is reconciled
    /// here.
    pub async fn init_wip_batch(&mut self) -> Result<(), FinalizerError> {
        self.wait_synced().await;

        let last_batch_number = self.store.get_last_batch_number().await?;
        let last_batch = self
            .store
            .get_batch_by_number(last_batch_number)
            .await?
            .ok_or(FinalizerError::GetBatchByNumber(last_batch_number))?;

        let is_closed = !last_batch.wip;
        info!("batch {last_batch_number} isClosed: {is_closed}");

        let wip = if is_closed {
            let last_ger = self.last_l1_info_tree_leaf()?.global_exit_root;
            self.open_new_wip_batch(
                last_batch_number + 1,
                last_ger,
                last_batch.state_root,
                last_batch.local_exit_root,
            )
            .await?
        } else {
            self.set_wip_batch(&last_batch).await?
        };

        info!(
            "initial batch: {}, initialStateRoot: {:#x}, stateRoot: {:#x}, coinbase: {:#x}, LER: {:#x}",
            wip.batch_number,
            wip.initial_state_root,
            wip.final_state_root,
            wip.coinbase,
            wip.local_exit_root
        );
        self.wip_batch = Some(wip);
        self.init_wip_l2_block()?;

        Ok(())
    }

    /// Adopts a batch that was still wip in the store: recover the tx count
    /// from its L2 data, the consumed budget from its recorded resources and
    /// the initial root from the previous batch.
    async fn set_wip_batch(&self, wip_state_batch: &Batch) -> Result<WipBatch, FinalizerError> {
        let batches = self.store.get_last_n_batches(2).await?;
        let prev_state_root = match batches.as_slice() {
            [_, prev, ..] => prev.state_root,
            [only] => only.state_root,
            [] => H256::zero(),
        };

        let raw = decode_batch_l2_data(&wip_state_batch.batch_l2_data)?;
        let count_of_txs = raw.tx_count();

        let mut remaining_resources = self.cfg.batch_constraints.max_resources();
        remaining_resources.sub(&wip_state_batch.resources)?;

        Ok(WipBatch {
            batch_number: wip_state_batch.batch_number,
            coinbase: wip_state_batch.coinbase,
            timestamp: wip_state_batch.timestamp,
            initial_state_root: prev_state_root,
            im_state_root: wip_state_batch.state_root,
            final_state_root: wip_state_batch.state_root,
            local_exit_root: wip_state_batch.local_exit_root,
            global_exit_root: wip_state_batch.global_exit_root,
            count_of_txs,
            remaining_resources,
            closing_reason: ClosingReason::Empty,
        })
    }

    /// Closes the current batch and opens the next one, halting the
    /// finalizer on any unrecoverable error.
    pub async fn finalize_batch(&mut self) -> Result<(), FinalizerError> {
        match self.close_and_open_new_wip_batch().await {
            Ok(()) => {
                if let Some(wip) = self.wip_batch.as_ref() {
                    info!("new WIP batch {}", wip.batch_number);
                }
                Ok(())
            }
            Err(err) => Err(self.halt(err).await),
        }
    }

    /// The core transition: drain the block barriers, fix up an untouched
    /// state root, sanity-reprocess, close, interleave forced batches and
    /// open the successor.
    pub async fn close_and_open_new_wip_batch(&mut self) -> Result<(), FinalizerError> {
        // Finalize the wip L2 block if it has transactions; an empty one is
        // kept open and carried into the new wip batch.
        if !self.wip_l2_block.is_empty() {
            self.finalize_wip_l2_block()?;
        }

        self.block_workers.wait_pending_to_process().await;
        self.block_workers.wait_pending_to_store().await;

        // An untouched batch still needs a well-formed terminal root before
        // it can close, so run the empty batch through the executor.
        let state_root_untouched = {
            let wip = self.wip_batch.as_ref().ok_or(FinalizerError::NoWipBatch)?;
            wip.initial_state_root == wip.final_state_root
        };
        if state_root_untouched {
            info!("reprocessing batch because the state root has not changed");
            self.process_empty_batch().await?;
        }

        let (batch_number, initial_state_root, final_state_root, local_exit_root) = {
            let wip = self.wip_batch.as_ref().ok_or(FinalizerError::NoWipBatch)?;
            (
                wip.batch_number,
                wip.initial_state_root,
                wip.final_state_root,
                wip.local_exit_root,
            )
        };

        self.reprocess_full_batch_sanity(batch_number, initial_state_root, final_state_root)
            .await?;

        self.close_wip_batch().await?;
        info!("batch {batch_number} closed");

        let mut last_batch_number = batch_number;
        let mut state_root = final_state_root;

        if self.forced_batches.has_pending().await {
            self.forced_batches.process_forced_batches().await?;
            // Forced batches may advance the number by more than one; trust
            // the store, not arithmetic.
            last_batch_number = self.store.get_last_batch_number().await?;
            state_root = self
                .store
                .get_batch_by_number(last_batch_number)
                .await?
                .ok_or(FinalizerError::GetBatchByNumber(last_batch_number))?
                .state_root;
            self.init_wip_l2_block()?;
        }

        let global_exit_root = self.wip_l2_block.l1_info_tree_leaf.global_exit_root;
        let mut batch = self
            .open_new_wip_batch(
                last_batch_number + 1,
                global_exit_root,
                state_root,
                local_exit_root,
            )
            .await?;

        // Reserve the first L2 block's fixed overhead up front.
        batch.remaining_resources.sub(&L2_BLOCK_USED_RESOURCES)?;
        self.wip_batch = Some(batch);

        Ok(())
    }

    /// Persists a new wip batch row and returns its in-memory counterpart
    /// holding the full resource budget.
    pub(crate) async fn open_new_wip_batch(
        &self,
        batch_number: u64,
        global_exit_root: H256,
        state_root: H256,
        local_exit_root: H256,
    ) -> Result<WipBatch, FinalizerError> {
        let timestamp = now();
        let row = Batch {
            batch_number,
            coinbase: self.sequencer_address,
            timestamp,
            global_exit_root,
            state_root,
            local_exit_root,
            wip: true,
            ..Default::default()
        };
        self.store.open_wip_batch_in_tx(row).await?;

        self.wait_synced().await;

        Ok(WipBatch {
            batch_number,
            coinbase: self.sequencer_address,
            timestamp,
            initial_state_root: state_root,
            im_state_root: state_root,
            final_state_root: state_root,
            local_exit_root,
            global_exit_root,
            count_of_txs: 0,
            remaining_resources: self.cfg.batch_constraints.max_resources(),
            closing_reason: ClosingReason::Empty,
        })
    }

    /// Records used resources and the closing reason on the batch row and
    /// clears its wip flag.
    pub(crate) async fn close_wip_batch(&mut self) -> Result<(), FinalizerError> {
        let wip = self.wip_batch.as_ref().ok_or(FinalizerError::NoWipBatch)?;
        let used_resources = self
            .cfg
            .batch_constraints
            .used_resources(&wip.remaining_resources);
        let receipt = ProcessingReceipt {
            batch_number: wip.batch_number,
            batch_resources: used_resources,
            closing_reason: wip.closing_reason,
        };
        self.store.close_wip_batch_in_tx(receipt).await?;
        Ok(())
    }

    /// Executes the (empty) wip batch through the executor so it terminates
    /// on a root the prover can verify, and charges the consumed counters.
    async fn process_empty_batch(&mut self) -> Result<(), FinalizerError> {
        let (batch_number, request) = {
            let wip = self.wip_batch.as_ref().ok_or(FinalizerError::NoWipBatch)?;
            let request = ProcessRequest {
                batch_number: wip.batch_number,
                l1_info_root: MOCK_L1_INFO_ROOT,
                l1_info_tree_data: BTreeMap::new(),
                old_state_root: wip.initial_state_root,
                transactions: Bytes::new(),
                coinbase: wip.coinbase,
                timestamp_limit: now(),
                fork_id: self.store.get_fork_id_by_batch_number(wip.batch_number),
                skip_verify_l1_info_root: true,
                caller: CallerLabel::Sequencer,
            };
            (wip.batch_number, request)
        };

        let response = self.store.process_batch_v2(request, true).await?;
        if let Some(executor_error) = response.executor_error {
            return Err(FinalizerError::ExecutorError(batch_number, executor_error));
        }
        if response.is_rom_ooc_error {
            return Err(FinalizerError::ProcessBatchOoc(batch_number));
        }

        let wip = self.wip_batch.as_mut().ok_or(FinalizerError::NoWipBatch)?;
        wip.im_state_root = response.new_state_root;
        wip.final_state_root = response.new_state_root;
        wip.remaining_resources.sub(&BatchResources {
            zk_counters: response.used_zk_counters,
            bytes: 0,
        })?;
        Ok(())
    }

    /// Charges a processed transaction against the remaining budget. On
    /// overflow the budget is untouched, the worker's zk-counter estimate
    /// for the tx is corrected and the overflow bubbles up so the caller
    /// closes the batch.
    pub fn check_remaining_resources(
        &mut self,
        used: BatchResources,
        tx_hash: H256,
        from: Address,
    ) -> Result<(), FinalizerError> {
        let wip = self.wip_batch.as_mut().ok_or(FinalizerError::NoWipBatch)?;
        if let Err(overflow) = wip.remaining_resources.sub(&used) {
            info!(
                "current transaction exceeds the remaining batch resources, \
                 updating metadata for tx in worker and continuing"
            );
            self.worker.update_tx_zk_counters(tx_hash, from, used.zk_counters);
            return Err(overflow.into());
        }
        Ok(())
    }

    /// Records an accepted transaction: bumps the tx counters and advances
    /// the intermediate state root.
    pub fn register_accepted_tx(&mut self, new_im_state_root: H256) -> Result<(), FinalizerError> {
        let wip = self.wip_batch.as_mut().ok_or(FinalizerError::NoWipBatch)?;
        wip.count_of_txs += 1;
        wip.im_state_root = new_im_state_root;
        self.wip_l2_block.tx_count += 1;
        Ok(())
    }

    /// Records the state root produced by the last finalized L2 block.
    pub fn register_l2_block_root(&mut self, final_state_root: H256) -> Result<(), FinalizerError> {
        let wip = self.wip_batch.as_mut().ok_or(FinalizerError::NoWipBatch)?;
        wip.final_state_root = final_state_root;
        Ok(())
    }

    /// True when the batch holds the configured maximum number of txs.
    /// Stamps the `BatchFull` closing reason.
    pub fn max_txs_per_batch_reached(&mut self) -> bool {
        let max_txs = self.cfg.batch_constraints.max_txs_per_batch;
        let Some(wip) = self.wip_batch.as_mut() else {
            return false;
        };
        if wip.count_of_txs >= max_txs {
            info!(
                "closing batch {}, because it reached the maximum number of txs",
                wip.batch_number
            );
            wip.closing_reason = ClosingReason::BatchFull;
            return true;
        }
        false
    }

    /// True when any budgeted resource dropped to its close threshold.
    /// Stamps `BatchAlmostFull` with the depleted resource's name.
    pub fn is_batch_resources_exhausted(&mut self) -> bool {
        let constraints = self.cfg.batch_constraints;
        let pct = self.cfg.resource_percentage_to_close_batch;
        let Some(wip) = self.wip_batch.as_mut() else {
            return false;
        };
        if let Some(name) = wip.remaining_resources.below_threshold(&constraints, pct) {
            info!(
                "closing batch {}, because it reached {} limit",
                wip.batch_number, name
            );
            wip.closing_reason = ClosingReason::BatchAlmostFull(name);
            return true;
        }
        false
    }

    /// True when the batch stayed open past its deadline. Stamps `Timeout`.
    pub fn is_batch_timed_out(&mut self) -> bool {
        let deadline = self.cfg.batch_max_open_duration_secs;
        let Some(wip) = self.wip_batch.as_mut() else {
            return false;
        };
        if now().saturating_sub(wip.timestamp) >= deadline {
            info!("closing batch {}, because it timed out", wip.batch_number);
            wip.closing_reason = ClosingReason::Timeout;
            return true;
        }
        false
    }

    /// True when the L1-info-tree leaf the next L2 block references carries
    /// a different global exit root than the one the batch opened with.
    /// Stamps `GlobalExitRootUpdate`.
    pub fn is_global_exit_root_updated(&mut self) -> bool {
        let pending_ger = self.wip_l2_block.l1_info_tree_leaf.global_exit_root;
        let Some(wip) = self.wip_batch.as_mut() else {
            return false;
        };
        if pending_ger != wip.global_exit_root {
            info!(
                "closing batch {}, because the global exit root changed",
                wip.batch_number
            );
            wip.closing_reason = ClosingReason::GlobalExitRootUpdate;
            return true;
        }
        false
    }

    /// True when forced batches are queued. Stamps `ForcedBatches`.
    pub async fn check_pending_forced_batches(&mut self) -> bool {
        if !self.forced_batches.has_pending().await {
            return false;
        }
        let Some(wip) = self.wip_batch.as_mut() else {
            return false;
        };
        info!(
            "closing batch {}, because forced batches are pending",
            wip.batch_number
        );
        wip.closing_reason = ClosingReason::ForcedBatches;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use zkseq_common::resources::{ResourceName, ZKCounters};

    use super::*;
    use crate::test_utils::{test_finalizer, test_fixture, TestFixture};

    fn used(steps: u64, bytes: u64) -> BatchResources {
        BatchResources {
            zk_counters: ZKCounters {
                steps,
                ..Default::default()
            },
            bytes,
        }
    }

    #[tokio::test]
    async fn init_opens_next_batch_after_closed_one() {
        let TestFixture { engine, .. } = test_fixture();
        let mut last = Batch {
            batch_number: 9,
            state_root: H256::repeat_byte(0xaa),
            local_exit_root: H256::repeat_byte(0xbb),
            ..Default::default()
        };
        last.wip = false;
        engine.seed_batch(last).unwrap();

        let mut finalizer = test_finalizer(&engine);
        finalizer.init_wip_batch().await.unwrap();

        let wip = finalizer.wip_batch().unwrap();
        assert_eq!(wip.batch_number, 10);
        assert_eq!(wip.initial_state_root, H256::repeat_byte(0xaa));
        assert_eq!(wip.final_state_root, H256::repeat_byte(0xaa));
        assert_eq!(wip.local_exit_root, H256::repeat_byte(0xbb));
        assert_eq!(wip.closing_reason, ClosingReason::Empty);
        assert_eq!(
            wip.remaining_resources,
            finalizer.cfg.batch_constraints.max_resources()
        );

        let row = engine_row(&finalizer, 10).await;
        assert!(row.wip);
    }

    #[tokio::test]
    async fn init_adopts_wip_batch_left_by_previous_run() {
        use zkseq_common::l2_data::{encode_batch_l2_data, BatchRawV2, L2BlockRaw};

        let TestFixture { engine, .. } = test_fixture();

        let mut prev = Batch {
            batch_number: 4,
            state_root: H256::repeat_byte(0x44),
            ..Default::default()
        };
        prev.wip = false;
        engine.seed_batch(prev).unwrap();

        let l2_data = encode_batch_l2_data(&BatchRawV2 {
            blocks: vec![L2BlockRaw {
                delta_timestamp: 1,
                l1_info_tree_index: 0,
                transactions: vec![
                    Bytes::from_static(b"\x01"),
                    Bytes::from_static(b"\x02"),
                    Bytes::from_static(b"\x03"),
                ],
            }],
        });
        let wip_row = Batch {
            batch_number: 5,
            state_root: H256::repeat_byte(0x55),
            batch_l2_data: l2_data,
            wip: true,
            resources: used(1_000, 100),
            ..Default::default()
        };
        engine.seed_batch(wip_row).unwrap();

        let mut finalizer = test_finalizer(&engine);
        finalizer.init_wip_batch().await.unwrap();

        let wip = finalizer.wip_batch().unwrap();
        assert_eq!(wip.batch_number, 5);
        assert_eq!(wip.count_of_txs, 3);
        assert_eq!(wip.initial_state_root, H256::repeat_byte(0x44));
        assert_eq!(wip.im_state_root, H256::repeat_byte(0x55));
        assert_eq!(wip.final_state_root, H256::repeat_byte(0x55));

        let max = finalizer.cfg.batch_constraints.max_resources();
        assert_eq!(
            wip.remaining_resources.zk_counters.steps,
            max.zk_counters.steps - 1_000
        );
        assert_eq!(wip.remaining_resources.bytes, max.bytes - 100);
    }

    // Empty batch closes cleanly: the fixup produces a terminal root, the
    // close records the per-block overhead plus the executor's charge, and
    // the successor opens on the same root.
    #[tokio::test]
    async fn empty_batch_closes_with_fixup_and_reopens_on_same_root() {
        let TestFixture { engine, .. } = test_fixture();
        let root = H256::repeat_byte(0xaa);
        let mut last = Batch {
            batch_number: 9,
            state_root: root,
            ..Default::default()
        };
        last.wip = false;
        engine.seed_batch(last).unwrap();

        let mut finalizer = test_finalizer(&engine);
        finalizer.init_wip_batch().await.unwrap();

        // First transition hands us batch 11, opened with the per-block
        // overhead already reserved (the fixup executor echo charges zero).
        finalizer.finalize_batch().await.unwrap();
        assert_eq!(finalizer.wip_batch().unwrap().batch_number, 11);

        // Batch 11 closes empty with an executor charge on the fixup.
        let executor_overhead = ZKCounters {
            steps: 42,
            poseidon_hashes: 7,
            ..Default::default()
        };
        engine
            .push_executor_response(zkseq_common::process::ProcessBatchResponse {
                new_state_root: root,
                used_zk_counters: executor_overhead,
                ..Default::default()
            })
            .unwrap();
        finalizer.finalize_batch().await.unwrap();

        let closed = engine_row(&finalizer, 11).await;
        assert!(!closed.wip);
        assert_eq!(closed.closing_reason, Some(ClosingReason::Empty));
        assert_eq!(
            closed.resources.zk_counters.steps,
            L2_BLOCK_USED_RESOURCES.zk_counters.steps + executor_overhead.steps
        );
        assert_eq!(
            closed.resources.zk_counters.poseidon_hashes,
            L2_BLOCK_USED_RESOURCES.zk_counters.poseidon_hashes + executor_overhead.poseidon_hashes
        );
        assert_eq!(closed.resources.bytes, L2_BLOCK_USED_RESOURCES.bytes);

        let wip = finalizer.wip_batch().unwrap();
        assert_eq!(wip.batch_number, 12);
        assert_eq!(wip.initial_state_root, root);
        assert!(!finalizer.halt_token().is_cancelled());
    }

    // Tx-count ceiling: with max_txs_per_batch = 3, the third accepted tx
    // flips the predicate and stamps BatchFull.
    #[tokio::test]
    async fn batch_full_after_max_txs() {
        let TestFixture { engine, .. } = test_fixture();
        let mut last = Batch {
            batch_number: 1,
            ..Default::default()
        };
        last.wip = false;
        engine.seed_batch(last).unwrap();

        let mut finalizer = test_finalizer(&engine);
        finalizer.cfg.batch_constraints.max_txs_per_batch = 3;
        finalizer.init_wip_batch().await.unwrap();

        for i in 1..=3u8 {
            let steps_left = finalizer
                .wip_batch()
                .unwrap()
                .remaining_resources
                .zk_counters
                .steps;
            finalizer
                .check_remaining_resources(
                    used(steps_left / 2, 10),
                    H256::repeat_byte(i),
                    Address::repeat_byte(i),
                )
                .unwrap();
            finalizer.register_accepted_tx(H256::repeat_byte(i)).unwrap();
            assert_eq!(finalizer.max_txs_per_batch_reached(), i == 3);
        }

        let wip = finalizer.wip_batch().unwrap();
        assert_eq!(wip.count_of_txs, 3);
        assert_eq!(wip.closing_reason, ClosingReason::BatchFull);

        finalizer.finalize_batch().await.unwrap();
        let closed = engine_row(&finalizer, 2).await;
        assert_eq!(closed.closing_reason, Some(ClosingReason::BatchFull));
    }

    // Resource threshold: one tx eating 901 of 1000 bytes crosses the 90%
    // threshold and names MaxBatchBytesSize.
    #[tokio::test]
    async fn batch_almost_full_when_bytes_cross_threshold() {
        let TestFixture { engine, .. } = test_fixture();
        let mut last = Batch {
            batch_number: 1,
            ..Default::default()
        };
        last.wip = false;
        engine.seed_batch(last).unwrap();

        let mut finalizer = test_finalizer(&engine);
        finalizer.cfg.batch_constraints.max_batch_bytes_size = 1_000;
        finalizer.cfg.resource_percentage_to_close_batch = 90;
        finalizer.init_wip_batch().await.unwrap();

        assert!(!finalizer.is_batch_resources_exhausted());

        finalizer
            .check_remaining_resources(used(0, 901), H256::repeat_byte(1), Address::repeat_byte(1))
            .unwrap();
        finalizer.register_accepted_tx(H256::repeat_byte(1)).unwrap();

        assert!(finalizer.is_batch_resources_exhausted());
        assert_eq!(
            finalizer.wip_batch().unwrap().closing_reason,
            ClosingReason::BatchAlmostFull(ResourceName::BatchBytesSize)
        );
    }

    // An overflowing tx leaves the budget untouched and feeds the worker the
    // corrected counters.
    #[tokio::test]
    async fn overflowing_tx_updates_worker_estimates() {
        let fx = test_fixture();
        let mut last = Batch {
            batch_number: 1,
            ..Default::default()
        };
        last.wip = false;
        fx.engine.seed_batch(last).unwrap();

        let mut finalizer = fx.finalizer();
        finalizer.init_wip_batch().await.unwrap();
        let before = finalizer.wip_batch().unwrap().remaining_resources;

        let oversized = used(u64::MAX, 0);
        let err = finalizer
            .check_remaining_resources(oversized, H256::repeat_byte(9), Address::repeat_byte(9))
            .unwrap_err();
        assert!(matches!(err, FinalizerError::ResourceOverflow(_)));
        assert_eq!(finalizer.wip_batch().unwrap().remaining_resources, before);
        assert_eq!(
            fx.worker.updates(),
            vec![(H256::repeat_byte(9), Address::repeat_byte(9))]
        );
    }

    // Forced batches advance the batch number by more than one; the next
    // wip batch number comes from the store, not from arithmetic.
    #[tokio::test]
    async fn forced_batches_reload_last_batch_number_from_store() {
        use crate::test_utils::JumpAheadForcedBatches;

        let TestFixture { engine, .. } = test_fixture();
        let mut last = Batch {
            batch_number: 1,
            state_root: H256::repeat_byte(0x11),
            ..Default::default()
        };
        last.wip = false;
        engine.seed_batch(last).unwrap();

        let mut finalizer = test_finalizer(&engine);
        finalizer.forced_batches = Arc::new(JumpAheadForcedBatches::new(engine.clone(), 5));
        finalizer.init_wip_batch().await.unwrap();
        assert_eq!(finalizer.wip_batch().unwrap().batch_number, 2);

        assert!(finalizer.check_pending_forced_batches().await);
        finalizer.finalize_batch().await.unwrap();

        // The hook persisted batches up to 5; the new wip batch is 6.
        let wip = finalizer.wip_batch().unwrap();
        assert_eq!(wip.batch_number, 6);
        assert_eq!(wip.initial_state_root, H256::repeat_byte(0x55));

        let closed = engine_row(&finalizer, 2).await;
        assert_eq!(closed.closing_reason, Some(ClosingReason::ForcedBatches));
    }

    // Timeout and GER-update reasons are stamped by their predicates.
    #[tokio::test]
    async fn timeout_and_ger_update_reasons() {
        let TestFixture { engine, .. } = test_fixture();
        let mut last = Batch {
            batch_number: 1,
            ..Default::default()
        };
        last.wip = false;
        engine.seed_batch(last).unwrap();

        let mut finalizer = test_finalizer(&engine);
        finalizer.cfg.batch_max_open_duration_secs = 0;
        finalizer.init_wip_batch().await.unwrap();

        assert!(finalizer.is_batch_timed_out());
        assert_eq!(
            finalizer.wip_batch().unwrap().closing_reason,
            ClosingReason::Timeout
        );

        finalizer.wip_l2_block.l1_info_tree_leaf.global_exit_root = H256::repeat_byte(0xcc);
        assert!(finalizer.is_global_exit_root_updated());
        assert_eq!(
            finalizer.wip_batch().unwrap().closing_reason,
            ClosingReason::GlobalExitRootUpdate
        );
    }

    async fn engine_row(finalizer: &Finalizer, batch_number: u64) -> Batch {
        finalizer
            .store
            .get_batch_by_number(batch_number)
            .await
            .unwrap()
            .unwrap()
    }
}
