pub use bytes::Bytes;
pub use ethereum_types::{Address, H256, U256};

pub mod batch;
pub mod events;
pub mod l2_data;
pub mod process;
pub mod resources;
