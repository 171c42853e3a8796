use std::fmt;

use bytes::Bytes;
use ethereum_types::{Address, H256};
use serde::{Deserialize, Serialize};

use crate::resources::{BatchResources, ResourceName};

/// Why a batch was closed. Every closed batch records exactly one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosingReason {
    /// Initial value of an open batch; never recorded by a normal close.
    #[default]
    Empty,
    /// The batch reached the configured transaction-count ceiling.
    BatchFull,
    /// A budgeted resource crossed its close threshold.
    BatchAlmostFull(ResourceName),
    /// Forced batches arrived and must be interleaved.
    ForcedBatches,
    /// The batch stayed open past its deadline.
    Timeout,
    /// The global exit root changed.
    GlobalExitRootUpdate,
}

impl fmt::Display for ClosingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClosingReason::Empty => f.write_str("Empty"),
            ClosingReason::BatchFull => f.write_str("Batch is full"),
            ClosingReason::BatchAlmostFull(name) => {
                write!(f, "Batch is almost full: {name}")
            }
            ClosingReason::ForcedBatches => f.write_str("Forced batches"),
            ClosingReason::Timeout => f.write_str("Timeout"),
            ClosingReason::GlobalExitRootUpdate => f.write_str("Global exit root update"),
        }
    }
}

/// A persisted batch row.
///
/// While the batch is open `wip` is true and `resources`/`closing_reason`
/// hold their defaults; closing records the used resources and the reason
/// and clears `wip`, after which the row never changes again.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_number: u64,
    pub coinbase: Address,
    /// Unix seconds at open.
    pub timestamp: u64,
    pub global_exit_root: H256,
    pub state_root: H256,
    pub local_exit_root: H256,
    pub acc_input_hash: H256,
    pub batch_l2_data: Bytes,
    pub wip: bool,
    /// Used resources, recorded at close.
    pub resources: BatchResources,
    pub closing_reason: Option<ClosingReason>,
}

/// Close payload: what gets recorded on the batch row when it stops being
/// work-in-progress.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessingReceipt {
    pub batch_number: u64,
    pub batch_resources: BatchResources,
    pub closing_reason: ClosingReason,
}
