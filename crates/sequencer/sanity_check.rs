//! Full-batch sanity reprocess.
//!
//! After a batch is assembled, its canonical L2 data is replayed through the
//! executor from the batch's initial state root. The replay must land on the
//! root the finalizer committed; anything else means the finalizer and the
//! executor disagree on the chain's state, which would corrupt the rollup.

use std::sync::Arc;

use ethereum_types::H256;
use tracing::{debug, error, info};
use zkseq_common::batch::Batch;
use zkseq_common::events::{
    Event, EventComponent, EventId, EventLevel, EventLog, EventSource,
};
use zkseq_common::l2_data::{decode_batch_l2_data, raw_tx_hash};
use zkseq_common::process::{CallerLabel, ProcessBatchResponse, ProcessRequest};
use zkseq_storage::Store;

use crate::errors::FinalizerError;
use crate::finalizer::{now, Finalizer};

/// L1 info root handed to the executor for replays; verification of it is
/// skipped, the value only has to be well-formed.
pub const MOCK_L1_INFO_ROOT: H256 = H256([
    0x27, 0xae, 0x5b, 0xa0, 0x8d, 0x72, 0x91, 0xc9, 0x6c, 0x8c, 0xbd, 0xdc, 0xc1, 0x48, 0xbf,
    0x48, 0xa6, 0xd6, 0x8c, 0x79, 0x74, 0xb9, 0x43, 0x56, 0xf5, 0x37, 0x54, 0xef, 0x61, 0x71,
    0xd7, 0x57,
]);

impl Finalizer {
    /// Runs the sanity reprocess for a batch about to close.
    ///
    /// Sequential mode verifies inline and any failure aborts the close (the
    /// caller halts). Otherwise the replay is fire-and-forget: failures are
    /// logged and the process keeps sequencing.
    pub(crate) async fn reprocess_full_batch_sanity(
        &self,
        batch_number: u64,
        initial_state_root: H256,
        expected_new_state_root: H256,
    ) -> Result<(), FinalizerError> {
        if self.cfg.sequential_reprocess_full_batch {
            reprocess_full_batch(
                self.store.clone(),
                self.event_log.clone(),
                batch_number,
                initial_state_root,
                expected_new_state_root,
                CallerLabel::Sequencer,
            )
            .await
            .map(|_| ())
        } else {
            let store = self.store.clone();
            let event_log = self.event_log.clone();
            tokio::spawn(async move {
                if let Err(err) = reprocess_full_batch(
                    store,
                    event_log,
                    batch_number,
                    initial_state_root,
                    expected_new_state_root,
                    CallerLabel::Discard,
                )
                .await
                {
                    error!("async full batch reprocess of batch {batch_number} failed: {err}");
                }
            });
            Ok(())
        }
    }
}

/// Replays a batch through the executor and checks the resulting state root.
///
/// Failure classes, each with its own error kind: the executor call itself
/// failing, an executor-reported error, an out-of-counters ROM error (which
/// additionally raises a critical event carrying the serialized request) and
/// a state-root mismatch.
pub(crate) async fn reprocess_full_batch(
    store: Store,
    event_log: Arc<dyn EventLog>,
    batch_number: u64,
    initial_state_root: H256,
    expected_new_state_root: H256,
    caller: CallerLabel,
) -> Result<ProcessBatchResponse, FinalizerError> {
    debug!(
        "reprocessing batch: {batch_number}, initialStateRoot: {initial_state_root:#x}, \
         expectedNewStateRoot: {expected_new_state_root:#x}"
    );

    let batch = match store.get_batch_by_number(batch_number).await {
        Ok(Some(batch)) => batch,
        Ok(None) => {
            error!("failed to get batch {batch_number}: not found");
            return Err(FinalizerError::GetBatchByNumber(batch_number));
        }
        Err(err) => {
            error!("failed to get batch {batch_number}: {err}");
            return Err(FinalizerError::GetBatchByNumber(batch_number));
        }
    };

    let l1_info_tree_data = match store
        .get_l1_info_tree_data_from_batch_l2_data(&batch.batch_l2_data)
        .await
    {
        Ok((data, _)) => data,
        Err(err) => {
            error!("failed to get L1InfoTreeData for batch {batch_number}: {err}");
            return Err(FinalizerError::GetBatchByNumber(batch_number));
        }
    };

    let request = ProcessRequest {
        batch_number,
        l1_info_root: MOCK_L1_INFO_ROOT,
        l1_info_tree_data,
        old_state_root: initial_state_root,
        transactions: batch.batch_l2_data.clone(),
        coinbase: batch.coinbase,
        timestamp_limit: now(),
        fork_id: store.get_fork_id_by_batch_number(batch_number),
        skip_verify_l1_info_root: true,
        caller,
    };

    let result = match store.process_batch_v2(request.clone(), false).await {
        Ok(result) => result,
        Err(err) => {
            error!("failed to process batch {batch_number}: {err}");
            log_reprocessed_batch(&batch, initial_state_root, expected_new_state_root);
            return Err(FinalizerError::ProcessBatch(batch_number));
        }
    };

    if let Some(executor_error) = result.executor_error {
        error!("executor error when reprocessing batch {batch_number}: {executor_error}");
        log_reprocessed_batch(&batch, initial_state_root, expected_new_state_root);
        return Err(FinalizerError::ExecutorError(batch_number, executor_error));
    }

    if result.is_rom_ooc_error {
        error!("failed to process batch {batch_number} because OutOfCounters");
        log_reprocessed_batch(&batch, initial_state_root, expected_new_state_root);

        match serde_json::to_value(&request) {
            Ok(payload) => {
                let event = Event {
                    received_at: now(),
                    source: EventSource::Node,
                    component: EventComponent::Sequencer,
                    level: EventLevel::Critical,
                    event_id: EventId::ReprocessFullBatchOoc,
                    description: payload.to_string(),
                    json: payload,
                };
                if let Err(err) = event_log.log_event(event).await {
                    error!("error storing payload: {err}");
                }
            }
            Err(err) => error!("error marshaling payload: {err}"),
        }

        return Err(FinalizerError::ProcessBatchOoc(batch_number));
    }

    if result.new_state_root != expected_new_state_root {
        error!(
            "new state root mismatch for batch {batch_number}, expected: \
             {expected_new_state_root:#x}, got: {:#x}",
            result.new_state_root
        );
        log_reprocessed_batch(&batch, initial_state_root, expected_new_state_root);
        return Err(FinalizerError::StateRootMismatch {
            batch_number,
            expected: expected_new_state_root,
            got: result.new_state_root,
        });
    }

    info!("reprocess successfully done for batch {batch_number}");
    Ok(result)
}

/// Dumps the failed batch's transactions so the cause can be traced from the
/// logs alone.
fn log_reprocessed_batch(batch: &Batch, initial_state_root: H256, expected_new_state_root: H256) {
    let raw_blocks = match decode_batch_l2_data(&batch.batch_l2_data) {
        Ok(raw) => raw,
        Err(err) => {
            error!(
                "error decoding BatchL2Data for batch {}: {err}",
                batch.batch_number
            );
            return;
        }
    };

    info!(
        "batchNumber: {}, initialStateRoot: {initial_state_root:#x}, \
         expectedNewStateRoot: {expected_new_state_root:#x}",
        batch.batch_number
    );
    for (block_pos, raw_block) in raw_blocks.blocks.iter().enumerate() {
        for (tx_pos, raw_tx) in raw_block.transactions.iter().enumerate() {
            info!(
                "batchNumber: {}, block position: {block_pos}, tx position: {tx_pos}, \
                 tx hash: {:#x}",
                batch.batch_number,
                raw_tx_hash(raw_tx)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use zkseq_common::batch::Batch;
    use zkseq_storage::StoreEngine;

    use super::*;
    use crate::test_utils::test_fixture;

    // Sequential sanity mismatch is fatal: the finalizer reports the
    // mismatch and cancels the halt token.
    #[tokio::test]
    async fn state_root_mismatch_halts() {
        let fx = test_fixture();
        let beef = H256::repeat_byte(0xbe);
        let dead = H256::repeat_byte(0xde);

        let mut last = Batch {
            batch_number: 9,
            state_root: beef,
            ..Default::default()
        };
        last.wip = false;
        fx.engine.seed_batch(last).unwrap();

        let mut finalizer = fx.finalizer();
        finalizer.cfg.sequential_reprocess_full_batch = true;
        finalizer.init_wip_batch().await.unwrap();

        // Fixup echoes the old root; the sanity replay then disagrees.
        fx.engine
            .push_executor_response(ProcessBatchResponse {
                new_state_root: beef,
                ..Default::default()
            })
            .unwrap();
        fx.engine
            .push_executor_response(ProcessBatchResponse {
                new_state_root: dead,
                ..Default::default()
            })
            .unwrap();

        let err = finalizer.finalize_batch().await.unwrap_err();
        assert!(matches!(
            err,
            FinalizerError::StateRootMismatch { batch_number: 10, expected, got }
                if expected == beef && got == dead
        ));
        assert!(finalizer.halt_token().is_cancelled());

        // The batch never closed; init after restart finds it wip.
        let row = fx
            .engine
            .get_batch_by_number(10)
            .await
            .unwrap()
            .unwrap();
        assert!(row.wip);
    }

    // An out-of-counters replay raises exactly one critical event whose
    // payload deserializes back into the executor request.
    #[tokio::test]
    async fn ooc_emits_critical_event_with_request_payload() {
        let fx = test_fixture();
        let mut last = Batch {
            batch_number: 9,
            state_root: H256::repeat_byte(0xaa),
            ..Default::default()
        };
        last.wip = false;
        fx.engine.seed_batch(last).unwrap();

        let mut finalizer = fx.finalizer();
        finalizer.cfg.sequential_reprocess_full_batch = true;
        finalizer.init_wip_batch().await.unwrap();

        fx.engine
            .push_executor_response(ProcessBatchResponse {
                new_state_root: H256::repeat_byte(0xaa),
                ..Default::default()
            })
            .unwrap();
        fx.engine
            .push_executor_response(ProcessBatchResponse {
                is_rom_ooc_error: true,
                ..Default::default()
            })
            .unwrap();

        let err = finalizer.finalize_batch().await.unwrap_err();
        assert!(matches!(err, FinalizerError::ProcessBatchOoc(10)));
        assert!(finalizer.halt_token().is_cancelled());

        // Exactly one event in total: the halt path itself emits nothing.
        let events = fx.event_log.events();
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.event_id, EventId::ReprocessFullBatchOoc);
        assert_eq!(event.source, EventSource::Node);
        assert_eq!(event.component, EventComponent::Sequencer);
        assert_eq!(event.level, EventLevel::Critical);

        let request: ProcessRequest = serde_json::from_value(event.json.clone()).unwrap();
        assert_eq!(request.batch_number, 10);
        assert_eq!(request.l1_info_root, MOCK_L1_INFO_ROOT);
        assert_eq!(request.old_state_root, H256::repeat_byte(0xaa));
        assert!(request.skip_verify_l1_info_root);
        assert_eq!(request.caller, CallerLabel::Sequencer);
    }

    // In async mode the same failures are logged and swallowed; the
    // finalizer keeps going and never halts.
    #[tokio::test]
    async fn async_mode_swallows_reprocess_failures() {
        let fx = test_fixture();
        let mut last = Batch {
            batch_number: 9,
            state_root: H256::repeat_byte(0xaa),
            ..Default::default()
        };
        last.wip = false;
        fx.engine.seed_batch(last).unwrap();

        let mut finalizer = fx.finalizer();
        finalizer.cfg.sequential_reprocess_full_batch = false;
        finalizer.init_wip_batch().await.unwrap();

        fx.engine
            .push_executor_response(ProcessBatchResponse {
                new_state_root: H256::repeat_byte(0xaa),
                ..Default::default()
            })
            .unwrap();
        fx.engine
            .push_executor_response(ProcessBatchResponse {
                new_state_root: H256::repeat_byte(0x66),
                ..Default::default()
            })
            .unwrap();

        finalizer.finalize_batch().await.unwrap();
        assert!(!finalizer.halt_token().is_cancelled());
        assert_eq!(finalizer.wip_batch().unwrap().batch_number, 11);
    }

    // A missing row during reprocess is its own failure class.
    #[tokio::test]
    async fn missing_batch_row_is_a_fetch_failure() {
        let fx = test_fixture();
        let err = reprocess_full_batch(
            zkseq_storage::Store::new(fx.engine.clone()),
            fx.event_log.clone(),
            77,
            H256::zero(),
            H256::zero(),
            CallerLabel::Sequencer,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FinalizerError::GetBatchByNumber(77)));
    }
}
