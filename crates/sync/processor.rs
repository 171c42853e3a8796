//! Trusted-batch catch-up classification.
//!
//! When the trusted upstream reports a batch, local state can be missing it,
//! hold a stale copy, or already match. The classifier picks one of four
//! processing modes and the template drives the executor callback, verifies
//! closed batches against the trusted roots, and maintains a two-slot cache
//! of the last trusted batches for the next round.

use std::sync::Arc;

use bytes::Bytes;
use ethereum_types::{Address, H256};
use tracing::{debug, info, warn};
use zkseq_common::batch::Batch;
use zkseq_common::process::ProcessBatchResponse;

use crate::errors::SyncError;
use crate::time::TimeProvider;

/// A batch as reported by the trusted upstream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrustedBatch {
    pub number: u64,
    pub coinbase: Address,
    pub state_root: H256,
    pub global_exit_root: H256,
    pub local_exit_root: H256,
    pub acc_input_hash: H256,
    /// Unix seconds.
    pub timestamp: u64,
    pub closed: bool,
    pub batch_l2_data: Bytes,
}

/// How the local state catches up on a trusted batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchProcessMode {
    /// The batch is not in the local store; first time we process it.
    Full,
    /// Processed before with a known intermediate state root; only the new
    /// transactions are processed.
    Incremental,
    /// Processed before but the intermediate state root is gone; everything
    /// is reprocessed.
    Reprocess,
    /// Already synchronized; nothing to do.
    Nothing,
}

impl std::fmt::Display for BatchProcessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self {
            BatchProcessMode::Full => "full",
            BatchProcessMode::Incremental => "incremental",
            BatchProcessMode::Reprocess => "reprocess",
            BatchProcessMode::Nothing => "nothing",
        };
        f.write_str(mode)
    }
}

/// Everything an executor callback needs to process one trusted batch.
#[derive(Clone, Debug)]
pub struct ProcessData {
    pub batch_number: u64,
    pub mode: BatchProcessMode,
    pub old_state_root: H256,
    pub old_acc_input_hash: H256,
    pub batch_must_be_closed: bool,
    /// The batch as the trusted node reports it.
    pub trusted_batch: TrustedBatch,
    /// The batch currently in local state, if any.
    pub state_batch: Option<Batch>,
    /// Unix seconds.
    pub now: u64,
    pub description: String,
}

/// What an executor callback produced.
#[derive(Clone, Debug, Default)]
pub struct ProcessResponse {
    pub process_batch_response: Option<ProcessBatchResponse>,
    /// Drop the whole cache for the next run.
    pub clear_cache: bool,
    /// Batch to install in the cache's first slot.
    pub update_batch: Option<Batch>,
    /// Patch the cached batch's roots from `process_batch_response`.
    pub update_batch_with_process_batch_response: bool,
}

/// The executor side of trusted-batch sync: each mode has its own entry
/// point; `Nothing` dispatches no call at all.
#[async_trait::async_trait]
pub trait SyncTrustedBatchExecutor: Send + Sync {
    async fn full_process(&self, data: &ProcessData) -> Result<ProcessResponse, SyncError>;
    async fn incremental_process(&self, data: &ProcessData) -> Result<ProcessResponse, SyncError>;
    async fn re_process(&self, data: &ProcessData) -> Result<ProcessResponse, SyncError>;
}

/// Cache of the last two trusted batches: slot 0 is the batch being worked
/// on, slot 1 its predecessor.
#[derive(Clone, Debug, Default)]
pub struct TrustedState {
    pub last_trusted_batches: [Option<Batch>; 2],
}

/// Template that classifies a trusted batch and drives the executor.
pub struct ProcessorTrustedBatchSync {
    steps: Arc<dyn SyncTrustedBatchExecutor>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ProcessorTrustedBatchSync {
    pub fn new(
        steps: Arc<dyn SyncTrustedBatchExecutor>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            steps,
            time_provider,
        }
    }

    /// Processes one trusted batch and returns the cache for the next run;
    /// `None` means the cache must be cleared.
    pub async fn process_trusted_batch(
        &self,
        trusted_batch: &TrustedBatch,
        status: &TrustedState,
    ) -> Result<Option<TrustedState>, SyncError> {
        debug!("processing trusted batch: {}", trusted_batch.number);

        // Work on copies so a failed run cannot poison the cache.
        let state_current = status.last_trusted_batches[0].clone();
        let state_previous = status.last_trusted_batches[1].clone();

        let process_mode = self.get_mode_for_process_batch(
            trusted_batch,
            state_current.as_ref(),
            state_previous.as_ref(),
        )?;
        info!(
            "processing trusted batch {}: mode={} desc={}",
            process_mode.batch_number, process_mode.mode, process_mode.description
        );

        let response = match process_mode.mode {
            BatchProcessMode::Nothing => {
                debug!("batch {} is already synchronized", trusted_batch.number);
                None
            }
            BatchProcessMode::Full => Some(self.steps.full_process(&process_mode).await?),
            BatchProcessMode::Incremental => {
                Some(self.steps.incremental_process(&process_mode).await?)
            }
            BatchProcessMode::Reprocess => Some(self.steps.re_process(&process_mode).await?),
        };

        if process_mode.batch_must_be_closed {
            check_process_batch_result_match_expected(
                &process_mode,
                response
                    .as_ref()
                    .and_then(|r| r.process_batch_response.as_ref()),
            )?;
        }

        match response {
            Some(response) if !response.clear_cache => {
                let new_status = update_cache(&response, process_mode.batch_must_be_closed);
                debug!(
                    "batch {} synchronized, updated cache for next run",
                    trusted_batch.number
                );
                Ok(Some(new_status))
            }
            _ => {
                debug!("batch {} synchronized -> clear cache", trusted_batch.number);
                Ok(None)
            }
        }
    }

    /// Classifies the trusted batch against the cached local rows.
    pub fn get_mode_for_process_batch(
        &self,
        trusted_batch: &TrustedBatch,
        state_batch: Option<&Batch>,
        state_previous_batch: Option<&Batch>,
    ) -> Result<ProcessData, SyncError> {
        let previous = state_previous_batch
            .ok_or(SyncError::MissingPreviousBatch(trusted_batch.number))?;

        let (mode, old_state_root, description) = match state_batch {
            None => (
                BatchProcessMode::Full,
                previous.state_root,
                "batch is not on database, so is the first time we process it".to_string(),
            ),
            Some(current) => {
                let (synced, mismatch) = check_if_synced(current, trusted_batch);
                if synced {
                    (
                        BatchProcessMode::Nothing,
                        H256::zero(),
                        "no new data on batch".to_string(),
                    )
                } else if current.state_root != H256::zero() {
                    (
                        BatchProcessMode::Incremental,
                        current.state_root,
                        format!("batch exists + intermediateStateRoot: {mismatch}"),
                    )
                } else {
                    (
                        BatchProcessMode::Reprocess,
                        previous.state_root,
                        format!("batch exists + stateRoot==zero: {mismatch}"),
                    )
                }
            }
        };

        Ok(ProcessData {
            batch_number: trusted_batch.number,
            mode,
            old_state_root,
            old_acc_input_hash: previous.acc_input_hash,
            batch_must_be_closed: mode != BatchProcessMode::Nothing && trusted_batch.closed,
            trusted_batch: trusted_batch.clone(),
            state_batch: state_batch.cloned(),
            now: self.time_provider.now(),
            description,
        })
    }
}

/// Row equality between the local batch and the trusted one, including the
/// wip flag mirroring the trusted `closed` bit. Returns the list of
/// mismatching fields for the logs.
pub fn check_if_synced(state_batch: &Batch, trusted_batch: &TrustedBatch) -> (bool, String) {
    let checks = [
        (
            "matchNumber",
            state_batch.batch_number == trusted_batch.number,
        ),
        (
            "matchGER",
            state_batch.global_exit_root == trusted_batch.global_exit_root,
        ),
        (
            "matchLER",
            state_batch.local_exit_root == trusted_batch.local_exit_root,
        ),
        ("matchSR", state_batch.state_root == trusted_batch.state_root),
        ("matchCoinbase", state_batch.coinbase == trusted_batch.coinbase),
        (
            "matchL2Data",
            state_batch.batch_l2_data == trusted_batch.batch_l2_data,
        ),
        ("matchWIP", state_batch.wip == !trusted_batch.closed),
    ];

    let mismatches: Vec<&str> = checks
        .iter()
        .filter(|(_, matched)| !matched)
        .map(|(name, _)| *name)
        .collect();

    if mismatches.is_empty() {
        (true, format!("equal batch: {}", state_batch.batch_number))
    } else {
        (false, mismatches.join(", "))
    }
}

/// A closed batch must land exactly on the trusted roots.
fn check_state_root_and_ler(
    batch_number: u64,
    expected_state_root: H256,
    expected_ler: H256,
    calculated_state_root: H256,
    calculated_ler: H256,
) -> Result<(), SyncError> {
    if calculated_state_root != expected_state_root {
        return Err(SyncError::StateRootMismatch {
            batch_number,
            expected: expected_state_root,
            calculated: calculated_state_root,
        });
    }
    if calculated_ler != expected_ler {
        return Err(SyncError::LocalExitRootMismatch {
            batch_number,
            expected: expected_ler,
            calculated: calculated_ler,
        });
    }
    Ok(())
}

fn check_process_batch_result_match_expected(
    data: &ProcessData,
    response: Option<&ProcessBatchResponse>,
) -> Result<(), SyncError> {
    let trusted = &data.trusted_batch;
    match response {
        Some(response) => check_state_root_and_ler(
            trusted.number,
            trusted.state_root,
            trusted.local_exit_root,
            response.new_state_root,
            response.new_local_exit_root,
        ),
        None => {
            warn!(
                "batch {}: no process batch response to check, falling back to the stored batch",
                trusted.number
            );
            let state_batch = data.state_batch.as_ref().ok_or_else(|| {
                SyncError::Custom(format!(
                    "batch {}: nothing to verify the closed batch against",
                    trusted.number
                ))
            })?;
            check_state_root_and_ler(
                trusted.number,
                trusted.state_root,
                trusted.local_exit_root,
                state_batch.state_root,
                state_batch.local_exit_root,
            )
        }
    }
}

/// Builds the next run's cache from the executor response. A closed batch
/// shifts slot 0 into slot 1 and leaves slot 0 empty.
fn update_cache(response: &ProcessResponse, closed_batch: bool) -> TrustedState {
    let mut res = TrustedState::default();
    if response.clear_cache {
        return res;
    }

    if let Some(update_batch) = &response.update_batch {
        res.last_trusted_batches[0] = Some(update_batch.clone());
    }

    if response.update_batch_with_process_batch_response {
        if let (Some(batch_response), Some(cached)) = (
            response.process_batch_response.as_ref(),
            res.last_trusted_batches[0].as_mut(),
        ) {
            cached.state_root = batch_response.new_state_root;
            cached.local_exit_root = batch_response.new_local_exit_root;
            cached.acc_input_hash = batch_response.new_acc_input_hash;
            cached.wip = !closed_batch;
        }
    }

    if closed_batch {
        res.last_trusted_batches[1] = res.last_trusted_batches[0].take();
    }

    res
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct FixedTime(u64);

    impl TimeProvider for FixedTime {
        fn now(&self) -> u64 {
            self.0
        }
    }

    /// Executor stub recording dispatched modes and answering with a canned
    /// response.
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<BatchProcessMode>>,
        response: Mutex<ProcessResponse>,
    }

    impl RecordingExecutor {
        fn with_response(response: ProcessResponse) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                response: Mutex::new(response),
            }
        }

        fn calls(&self) -> Vec<BatchProcessMode> {
            self.calls.lock().unwrap().clone()
        }

        fn respond(&self, mode: BatchProcessMode) -> Result<ProcessResponse, SyncError> {
            self.calls.lock().unwrap().push(mode);
            Ok(self.response.lock().unwrap().clone())
        }
    }

    #[async_trait::async_trait]
    impl SyncTrustedBatchExecutor for RecordingExecutor {
        async fn full_process(&self, _data: &ProcessData) -> Result<ProcessResponse, SyncError> {
            self.respond(BatchProcessMode::Full)
        }

        async fn incremental_process(
            &self,
            _data: &ProcessData,
        ) -> Result<ProcessResponse, SyncError> {
            self.respond(BatchProcessMode::Incremental)
        }

        async fn re_process(&self, _data: &ProcessData) -> Result<ProcessResponse, SyncError> {
            self.respond(BatchProcessMode::Reprocess)
        }
    }

    fn processor(executor: Arc<RecordingExecutor>) -> ProcessorTrustedBatchSync {
        ProcessorTrustedBatchSync::new(executor, Arc::new(FixedTime(1_700_000_000)))
    }

    fn trusted_batch(number: u64, state_root: H256, closed: bool) -> TrustedBatch {
        TrustedBatch {
            number,
            state_root,
            closed,
            ..Default::default()
        }
    }

    fn state_batch(number: u64, state_root: H256, wip: bool) -> Batch {
        Batch {
            batch_number: number,
            state_root,
            wip,
            ..Default::default()
        }
    }

    #[test]
    fn classifies_unknown_batch_as_full() {
        let processor = processor(Arc::new(RecordingExecutor::default()));
        let trusted = trusted_batch(7, H256::repeat_byte(0x77), true);
        let previous = state_batch(6, H256::repeat_byte(0x66), false);

        let data = processor
            .get_mode_for_process_batch(&trusted, None, Some(&previous))
            .unwrap();

        assert_eq!(data.mode, BatchProcessMode::Full);
        assert_eq!(data.old_state_root, previous.state_root);
        assert!(data.batch_must_be_closed);
        assert_eq!(data.now, 1_700_000_000);
        assert_eq!(data.old_acc_input_hash, previous.acc_input_hash);
    }

    #[test]
    fn classifies_matching_row_as_nothing() {
        let processor = processor(Arc::new(RecordingExecutor::default()));
        let trusted = trusted_batch(7, H256::repeat_byte(0x77), true);
        // wip == !closed, everything else equal.
        let current = state_batch(7, H256::repeat_byte(0x77), false);
        let previous = state_batch(6, H256::repeat_byte(0x66), false);

        let data = processor
            .get_mode_for_process_batch(&trusted, Some(&current), Some(&previous))
            .unwrap();

        assert_eq!(data.mode, BatchProcessMode::Nothing);
        assert_eq!(data.old_state_root, H256::zero());
        assert!(!data.batch_must_be_closed);
    }

    #[test]
    fn classifies_mismatch_with_known_root_as_incremental() {
        let processor = processor(Arc::new(RecordingExecutor::default()));
        let trusted = trusted_batch(7, H256::repeat_byte(0x77), false);
        let current = state_batch(7, H256::repeat_byte(0x70), true);
        let previous = state_batch(6, H256::repeat_byte(0x66), false);

        let data = processor
            .get_mode_for_process_batch(&trusted, Some(&current), Some(&previous))
            .unwrap();

        assert_eq!(data.mode, BatchProcessMode::Incremental);
        assert_eq!(data.old_state_root, current.state_root);
        assert!(!data.batch_must_be_closed);
    }

    #[test]
    fn classifies_mismatch_with_zero_root_as_reprocess() {
        let processor = processor(Arc::new(RecordingExecutor::default()));
        let trusted = trusted_batch(7, H256::repeat_byte(0x77), true);
        let current = state_batch(7, H256::zero(), true);
        let previous = state_batch(6, H256::repeat_byte(0x66), false);

        let data = processor
            .get_mode_for_process_batch(&trusted, Some(&current), Some(&previous))
            .unwrap();

        assert_eq!(data.mode, BatchProcessMode::Reprocess);
        assert_eq!(data.old_state_root, previous.state_root);
        assert!(data.batch_must_be_closed);
    }

    #[test]
    fn missing_previous_batch_is_an_error() {
        let processor = processor(Arc::new(RecordingExecutor::default()));
        let trusted = trusted_batch(7, H256::repeat_byte(0x77), true);
        let err = processor
            .get_mode_for_process_batch(&trusted, None, None)
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingPreviousBatch(7)));
    }

    #[test]
    fn wip_flag_mismatch_prevents_nothing_mode() {
        let trusted = trusted_batch(7, H256::repeat_byte(0x77), true);
        // Identical row, but still wip while the trusted batch is closed.
        let current = state_batch(7, H256::repeat_byte(0x77), true);
        let (synced, mismatch) = check_if_synced(&current, &trusted);
        assert!(!synced);
        assert_eq!(mismatch, "matchWIP");
    }

    #[tokio::test]
    async fn dispatches_full_process_and_verifies_closed_batch() {
        let trusted = trusted_batch(7, H256::repeat_byte(0x77), true);
        let executor = Arc::new(RecordingExecutor::with_response(ProcessResponse {
            process_batch_response: Some(ProcessBatchResponse {
                new_state_root: trusted.state_root,
                new_local_exit_root: trusted.local_exit_root,
                ..Default::default()
            }),
            update_batch: Some(state_batch(7, trusted.state_root, false)),
            update_batch_with_process_batch_response: true,
            ..Default::default()
        }));
        let processor = processor(executor.clone());

        let status = TrustedState {
            last_trusted_batches: [None, Some(state_batch(6, H256::repeat_byte(0x66), false))],
        };

        let new_status = processor
            .process_trusted_batch(&trusted, &status)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(executor.calls(), vec![BatchProcessMode::Full]);
        // The batch closed: slot 0 shifted into slot 1.
        assert!(new_status.last_trusted_batches[0].is_none());
        let cached = new_status.last_trusted_batches[1].as_ref().unwrap();
        assert_eq!(cached.batch_number, 7);
        assert_eq!(cached.state_root, trusted.state_root);
        assert!(!cached.wip);
    }

    #[tokio::test]
    async fn closed_batch_with_wrong_root_is_fatal() {
        let trusted = trusted_batch(7, H256::repeat_byte(0x77), true);
        let executor = Arc::new(RecordingExecutor::with_response(ProcessResponse {
            process_batch_response: Some(ProcessBatchResponse {
                new_state_root: H256::repeat_byte(0x13),
                ..Default::default()
            }),
            ..Default::default()
        }));
        let processor = processor(executor);

        let status = TrustedState {
            last_trusted_batches: [None, Some(state_batch(6, H256::repeat_byte(0x66), false))],
        };

        let err = processor
            .process_trusted_batch(&trusted, &status)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::StateRootMismatch { batch_number: 7, .. }
        ));
    }

    #[tokio::test]
    async fn nothing_mode_dispatches_no_call_and_clears_cache() {
        let trusted = trusted_batch(7, H256::repeat_byte(0x77), false);
        let executor = Arc::new(RecordingExecutor::default());
        let processor = processor(executor.clone());

        let status = TrustedState {
            last_trusted_batches: [
                Some(state_batch(7, H256::repeat_byte(0x77), true)),
                Some(state_batch(6, H256::repeat_byte(0x66), false)),
            ],
        };

        let new_status = processor
            .process_trusted_batch(&trusted, &status)
            .await
            .unwrap();

        assert!(executor.calls().is_empty());
        assert!(new_status.is_none());
    }

    #[tokio::test]
    async fn open_batch_keeps_cache_slot_zero() {
        let trusted = trusted_batch(7, H256::repeat_byte(0x70), false);
        let updated = state_batch(7, H256::repeat_byte(0x71), true);
        let executor = Arc::new(RecordingExecutor::with_response(ProcessResponse {
            update_batch: Some(updated.clone()),
            ..Default::default()
        }));
        let processor = processor(executor.clone());

        let status = TrustedState {
            last_trusted_batches: [
                Some(state_batch(7, H256::repeat_byte(0x69), true)),
                Some(state_batch(6, H256::repeat_byte(0x66), false)),
            ],
        };

        let new_status = processor
            .process_trusted_batch(&trusted, &status)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(executor.calls(), vec![BatchProcessMode::Incremental]);
        assert_eq!(new_status.last_trusted_batches[0], Some(updated));
        assert_eq!(new_status.last_trusted_batches[1], None);
    }

    #[tokio::test]
    async fn clear_cache_response_empties_both_slots() {
        let trusted = trusted_batch(7, H256::repeat_byte(0x70), false);
        let executor = Arc::new(RecordingExecutor::with_response(ProcessResponse {
            clear_cache: true,
            update_batch: Some(state_batch(7, H256::repeat_byte(0x71), true)),
            ..Default::default()
        }));
        let processor = processor(executor);

        let status = TrustedState {
            last_trusted_batches: [
                Some(state_batch(7, H256::repeat_byte(0x69), true)),
                Some(state_batch(6, H256::repeat_byte(0x66), false)),
            ],
        };

        let new_status = processor
            .process_trusted_batch(&trusted, &status)
            .await
            .unwrap();
        assert!(new_status.is_none());
    }
}
