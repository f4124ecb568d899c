//! Store statistics for `update --stats`

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::{Status, UpdateReport};
use crate::error::Result;
use crate::storage::Store;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
	pub total: usize,
	pub active: usize,
	pub expired: usize,
	pub duplicate: usize,
	pub processed: usize,
	pub embeddings: usize,
	pub clusters: usize,
	pub summarized_clusters: usize,
	pub newest_listing: Option<DateTime<Utc>>,
	pub oldest_listing: Option<DateTime<Utc>>,
	pub last_update: Option<UpdateReport>,
	pub generated_at: DateTime<Utc>,
}

pub fn gather(store: &Store, now: DateTime<Utc>) -> Result<Stats> {
	let listings = store.list_listings(None)?;
	let clusters = store.list_clusters()?;
	let count = |status: Status| listings.iter().filter(|l| l.status == status).count();

	Ok(Stats {
		total: listings.len(),
		active: count(Status::Active),
		expired: count(Status::Expired),
		duplicate: count(Status::Duplicate),
		processed: listings.iter().filter(|l| l.is_processed()).count(),
		embeddings: store.list_embeddings()?.len(),
		clusters: clusters.len(),
		summarized_clusters: clusters.iter().filter(|c| c.summary.is_some()).count(),
		newest_listing: listings.iter().map(|l| l.first_seen).max(),
		oldest_listing: listings.iter().map(|l| l.first_seen).min(),
		last_update: store.list_reports()?.pop(),
		generated_at: now,
	})
}
