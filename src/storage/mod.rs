//! Document storage for listings, embeddings, clusters, reports and the run lock

pub mod document;
pub mod lock;
pub mod store;

pub use lock::{owner_token, RunLock};
pub use store::Store;
