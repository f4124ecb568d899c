//! Run lock with heartbeat
//!
//! A single JSON record. Held locks whose heartbeat is older than the
//! staleness window may be taken over by another run.

use std::fs;
use std::io::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{document, Store};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLock {
	pub owner: String,
	pub acquired_at: DateTime<Utc>,
	pub heartbeat: DateTime<Utc>,
}

impl RunLock {
	pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
		let age = now.signed_duration_since(self.heartbeat);
		age.to_std().map(|age| age > stale_after).unwrap_or(false)
	}
}

/// Unique owner token for this process
pub fn owner_token() -> String {
	let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
	format!("{}:{}:{}", host, std::process::id(), Utc::now().timestamp_millis())
}

impl Store {
	/// Take the run lock. Fails with `LockHeld` if another owner holds a fresh lock.
	pub fn acquire_lock(&self, owner: &str, now: DateTime<Utc>, stale_after: Duration) -> Result<RunLock> {
		let lock = RunLock {
			owner: owner.to_string(),
			acquired_at: now,
			heartbeat: now,
		};
		let path = self.lock_path();
		let json = serde_json::to_vec_pretty(&lock).map_err(Error::storage)?;

		match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
			Ok(mut file) => {
				file.write_all(&json)?;
				file.sync_all()?;
				return Ok(lock);
			}
			Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
			Err(e) => return Err(Error::storage(format!("cannot create run lock: {}", e))),
		}

		match self.read_lock()? {
			Some(current) if current.owner == owner => {}
			Some(current) if !current.is_stale(now, stale_after) => {
				return Err(Error::LockHeld {
					owner: current.owner,
					heartbeat: current.heartbeat,
				});
			}
			Some(current) => {
				tracing::warn!(owner = %current.owner, heartbeat = %current.heartbeat, "reclaiming stale run lock");
			}
			None => tracing::warn!("replacing unreadable run lock"),
		}

		document::write_atomic(&path, &json)?;

		// Another process may have reclaimed concurrently; last writer wins
		match self.read_lock()? {
			Some(current) if current.owner == owner => Ok(lock),
			Some(current) => Err(Error::LockHeld {
				owner: current.owner,
				heartbeat: current.heartbeat,
			}),
			None => Err(Error::storage("run lock vanished during acquisition")),
		}
	}

	/// Refresh the heartbeat of a lock we own
	pub fn heartbeat(&self, owner: &str, now: DateTime<Utc>) -> Result<()> {
		let Some(mut lock) = self.read_lock()? else {
			return Err(Error::storage("run lock missing"));
		};
		if lock.owner != owner {
			return Err(Error::LockHeld {
				owner: lock.owner,
				heartbeat: lock.heartbeat,
			});
		}

		lock.heartbeat = now;
		let json = serde_json::to_vec_pretty(&lock).map_err(Error::storage)?;
		document::write_atomic(&self.lock_path(), &json)
	}

	/// Release the lock if we own it
	pub fn release_lock(&self, owner: &str) -> Result<()> {
		match self.read_lock()? {
			Some(lock) if lock.owner == owner => {
				document::remove(&self.lock_path())?;
				Ok(())
			}
			Some(lock) => {
				tracing::warn!(owner = %lock.owner, "run lock owned by another run, not releasing");
				Ok(())
			}
			None => Ok(()),
		}
	}

	pub fn read_lock(&self) -> Result<Option<RunLock>> {
		let bytes = match fs::read(self.lock_path()) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(Error::storage(format!("cannot read run lock: {}", e))),
		};
		Ok(serde_json::from_slice(&bytes).ok())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration as ChronoDuration;

	const STALE: Duration = Duration::from_secs(60);

	fn store() -> (tempfile::TempDir, Store) {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		(dir, store)
	}

	#[test]
	fn second_owner_refused_while_fresh() {
		let (_dir, store) = store();
		let now = Utc::now();
		store.acquire_lock("a", now, STALE).unwrap();

		match store.acquire_lock("b", now + ChronoDuration::seconds(10), STALE) {
			Err(Error::LockHeld { owner, .. }) => assert_eq!(owner, "a"),
			other => panic!("expected LockHeld, got {:?}", other),
		}
	}

	#[test]
	fn stale_lock_reclaimed() {
		let (_dir, store) = store();
		let now = Utc::now();
		store.acquire_lock("a", now, STALE).unwrap();

		let later = now + ChronoDuration::seconds(61);
		let lock = store.acquire_lock("b", later, STALE).unwrap();
		assert_eq!(lock.owner, "b");
		assert_eq!(store.read_lock().unwrap().unwrap().owner, "b");
	}

	#[test]
	fn heartbeat_keeps_lock_fresh() {
		let (_dir, store) = store();
		let now = Utc::now();
		store.acquire_lock("a", now, STALE).unwrap();
		store.heartbeat("a", now + ChronoDuration::seconds(50)).unwrap();

		assert!(store.acquire_lock("b", now + ChronoDuration::seconds(100), STALE).is_err());
		assert!(store.heartbeat("b", now).is_err());
	}

	#[test]
	fn release_allows_next_run() {
		let (_dir, store) = store();
		let now = Utc::now();
		store.acquire_lock("a", now, STALE).unwrap();
		store.release_lock("b").unwrap();
		assert!(store.read_lock().unwrap().is_some());

		store.release_lock("a").unwrap();
		assert!(store.read_lock().unwrap().is_none());
		store.acquire_lock("b", now, STALE).unwrap();
	}

	#[test]
	fn same_owner_reacquires() {
		let (_dir, store) = store();
		let now = Utc::now();
		store.acquire_lock("a", now, STALE).unwrap();
		store.acquire_lock("a", now, STALE).unwrap();
	}
}
