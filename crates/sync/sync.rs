pub mod errors;
pub mod processor;
pub mod time;

pub use errors::SyncError;
pub use processor::{
    BatchProcessMode, ProcessData, ProcessResponse, ProcessorTrustedBatchSync,
    SyncTrustedBatchExecutor, TrustedBatch, TrustedState,
};
pub use time::{SystemTimeProvider, TimeProvider};
