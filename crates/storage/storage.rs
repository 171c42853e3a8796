pub mod api;
pub mod error;
pub mod in_memory;
pub mod store;

pub use api::{StateTransaction, StoreEngine};
pub use error::StoreError;
pub use in_memory::InMemoryStore;
pub use store::Store;
