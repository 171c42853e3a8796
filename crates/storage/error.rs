use zkseq_common::l2_data::L2DataError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("batch {0} not found")]
    MissingBatch(u64),
    #[error("batch {0} is already open as wip")]
    AlreadyOpenBatch(u64),
    #[error("no wip batch to close")]
    NoOpenBatch,
    #[error("batch L2 data decode error: {0}")]
    L2Data(#[from] L2DataError),
    #[error("executor error: {0}")]
    Executor(String),
    #[error("{0}")]
    Custom(String),
}

impl StoreError {
    pub fn lock_poisoned() -> Self {
        StoreError::Custom("failed to lock the store".to_string())
    }
}
