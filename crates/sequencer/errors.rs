use ethereum_types::H256;
use zkseq_common::l2_data::L2DataError;
use zkseq_common::resources::ResourceOverflow;
use zkseq_storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum FinalizerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The transaction does not fit the remaining batch budget. Expected and
    /// locally recovered: it makes the batch close, it never halts.
    #[error(transparent)]
    ResourceOverflow(#[from] ResourceOverflow),

    #[error("batch L2 data error: {0}")]
    L2Data(#[from] L2DataError),

    #[error("no wip batch is open")]
    NoWipBatch,

    #[error("failed to get batch {0} from state")]
    GetBatchByNumber(u64),

    #[error("failed to process batch {0}")]
    ProcessBatch(u64),

    #[error("executor error processing batch {0}: {1}")]
    ExecutorError(u64, String),

    #[error("batch {0} ran out of zk counters while reprocessing")]
    ProcessBatchOoc(u64),

    #[error("new state root mismatch for batch {batch_number}, expected: {expected:#x}, got: {got:#x}")]
    StateRootMismatch {
        batch_number: u64,
        expected: H256,
        got: H256,
    },

    #[error("{0}")]
    Custom(String),
}
