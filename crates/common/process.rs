use std::collections::BTreeMap;

use bytes::Bytes;
use ethereum_types::{Address, H256};
use serde::{Deserialize, Serialize};

use crate::resources::ZKCounters;

/// Who is asking the executor to process a batch.
///
/// `Discard` marks fire-and-forget sanity replays whose results feed no
/// metrics or state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallerLabel {
    Sequencer,
    Discard,
}

/// L1-info-tree leaf data referenced by a batch, keyed by leaf index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct L1Data {
    pub global_exit_root: H256,
    pub block_hash_l1: H256,
    pub min_timestamp: u64,
}

/// A full-batch execution request for the zk-executor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub batch_number: u64,
    pub l1_info_root: H256,
    pub l1_info_tree_data: BTreeMap<u32, L1Data>,
    pub old_state_root: H256,
    pub transactions: Bytes,
    pub coinbase: Address,
    /// Unix seconds; the executor rejects block timestamps beyond it.
    pub timestamp_limit: u64,
    pub fork_id: u64,
    pub skip_verify_l1_info_root: bool,
    pub caller: CallerLabel,
}

/// What the executor produced for a [`ProcessRequest`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessBatchResponse {
    pub new_state_root: H256,
    pub new_local_exit_root: H256,
    pub new_acc_input_hash: H256,
    pub used_zk_counters: ZKCounters,
    /// Error reported by the executor itself (not an invocation failure).
    pub executor_error: Option<String>,
    /// The ROM ran out of a zk counter while executing the batch.
    pub is_rom_ooc_error: bool,
}
