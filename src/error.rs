//! Library error type
//!
//! Commands wrap these in `anyhow` for context; pipeline stages match on
//! [`Error::kind`] to decide whether a failure is retried, skipped, or fatal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// Missing credential or invalid setting. Fatal before any stage runs.
	#[error("Configuration error: {0}")]
	Configuration(String),

	/// Search engine, language model or page fetch failed.
	#[error("{service} error: {message}")]
	ExternalService {
		service: &'static str,
		message: String,
		retryable: bool,
	},

	/// Document store unreachable or a write failed.
	#[error("Storage error: {0}")]
	Storage(String),

	/// A stored record violates an invariant (missing fingerprint, bad dimension).
	#[error("Data integrity error for {id}: {message}")]
	DataIntegrity { id: String, message: String },

	#[error("Clustering failed: {0}")]
	Clustering(String),

	#[error("Run lock held by {owner} (last heartbeat {heartbeat})")]
	LockHeld { owner: String, heartbeat: DateTime<Utc> },

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Cancelled")]
	Cancelled,
}

/// Error category recorded in update reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	Configuration,
	ExternalService,
	Storage,
	DataIntegrity,
	Clustering,
	LockHeld,
	NotFound,
	Cancelled,
}

impl Error {
	pub fn external(service: &'static str, message: impl Into<String>, retryable: bool) -> Self {
		Self::ExternalService {
			service,
			message: message.into(),
			retryable,
		}
	}

	pub fn storage(message: impl std::fmt::Display) -> Self {
		Self::Storage(message.to_string())
	}

	pub fn integrity(id: impl Into<String>, message: impl Into<String>) -> Self {
		Self::DataIntegrity {
			id: id.into(),
			message: message.into(),
		}
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Configuration(_) => ErrorKind::Configuration,
			Self::ExternalService { .. } => ErrorKind::ExternalService,
			Self::Storage(_) => ErrorKind::Storage,
			Self::DataIntegrity { .. } => ErrorKind::DataIntegrity,
			Self::Clustering(_) => ErrorKind::Clustering,
			Self::LockHeld { .. } => ErrorKind::LockHeld,
			Self::NotFound(_) => ErrorKind::NotFound,
			Self::Cancelled => ErrorKind::Cancelled,
		}
	}

	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::ExternalService { retryable: true, .. })
	}
}

impl std::fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			Self::Configuration => "configuration",
			Self::ExternalService => "external_service",
			Self::Storage => "storage",
			Self::DataIntegrity => "data_integrity",
			Self::Clustering => "clustering",
			Self::LockHeld => "lock_held",
			Self::NotFound => "not_found",
			Self::Cancelled => "cancelled",
		};
		f.write_str(name)
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Storage(err.to_string())
	}
}
