use ethereum_types::H256;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("trusted batch and previous state batch are required to classify batch {0}")]
    MissingPreviousBatch(u64),

    #[error(
        "batch {batch_number}: state root calculated [{calculated:#x}] is different from the \
         one in the batch [{expected:#x}]"
    )]
    StateRootMismatch {
        batch_number: u64,
        expected: H256,
        calculated: H256,
    },

    #[error(
        "batch {batch_number}: local exit root calculated [{calculated:#x}] is different from \
         the one in the batch [{expected:#x}]"
    )]
    LocalExitRootMismatch {
        batch_number: u64,
        expected: H256,
        calculated: H256,
    },

    #[error("executor error processing batch {0}: {1}")]
    Executor(u64, String),

    #[error("{0}")]
    Custom(String),
}
