//! Pipeline stages and the update orchestrator

pub mod cancel;
pub mod cluster;
pub mod collect;
pub mod dedup;
pub mod expire;
pub mod orchestrator;
pub mod process;
pub mod retain;
pub mod stats;

pub use cancel::{CancelFlag, Checkpoint};
pub use orchestrator::{Orchestrator, Services, UpdateConfig, UpdateOptions};

use crate::error::{Error, Result};

/// Bounded worker pool for fan-out stages
pub fn worker_pool(workers: usize) -> Result<rayon::ThreadPool> {
	rayon::ThreadPoolBuilder::new()
		.num_threads(workers.max(1))
		.build()
		.map_err(|e| Error::Configuration(format!("cannot start worker pool: {}", e)))
}
