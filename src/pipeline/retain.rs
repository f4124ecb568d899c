//! Bounded-size retention: delete the oldest active listings beyond the cap

use crate::core::{Listing, Status};
use crate::error::Result;
use crate::storage::Store;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RetentionOutcome {
	pub removed: usize,
	pub active_after: usize,
}

/// Ids to delete so that at most `max_listings` remain: oldest `last_seen` first, ties by id
pub fn select_overflow(active: &[Listing], max_listings: usize) -> Vec<String> {
	if active.len() <= max_listings {
		return Vec::new();
	}

	let mut ordered: Vec<&Listing> = active.iter().collect();
	ordered.sort_by(|a, b| a.last_seen.cmp(&b.last_seen).then_with(|| a.id.cmp(&b.id)));

	ordered
		.into_iter()
		.take(active.len() - max_listings)
		.map(|l| l.id.clone())
		.collect()
}

/// Physically remove overflow listings together with their embeddings
pub fn enforce(store: &Store, max_listings: usize) -> Result<RetentionOutcome> {
	let active = store.list_listings(Some(Status::Active))?;
	let overflow = select_overflow(&active, max_listings);

	let mut removed = 0;
	for id in &overflow {
		if store.delete_listing(id)? {
			removed += 1;
		}
		store.delete_embedding(id)?;
	}

	let outcome = RetentionOutcome {
		removed,
		active_after: active.len() - removed,
	};
	tracing::info!(removed = outcome.removed, active = outcome.active_after, max_listings, "retention finished");
	Ok(outcome)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::{Embedding, EmbeddingRecord};
	use chrono::{DateTime, TimeZone, Utc};

	fn day(d: u32) -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
	}

	fn listing(url: &str, last_seen: Option<DateTime<Utc>>) -> Listing {
		let mut l = Listing::new(url, "Acme", "Engineer", url, day(1));
		l.last_seen = last_seen;
		l
	}

	#[test]
	fn removes_oldest_overflow() {
		let l1 = listing("https://a.com/1", Some(day(1)));
		let l2 = listing("https://a.com/2", Some(day(2)));
		let l3 = listing("https://a.com/3", Some(day(3)));
		assert_eq!(select_overflow(&[l3, l1.clone(), l2], 2), vec![l1.id]);
	}

	#[test]
	fn missing_last_seen_sorts_first_and_ties_by_id() {
		let never = listing("https://a.com/never", None);
		let a = listing("https://a.com/a", Some(day(5)));
		let b = listing("https://a.com/b", Some(day(5)));
		let lower = a.id.clone().min(b.id.clone());

		let removed = select_overflow(&[a, b, never.clone()], 1);
		assert_eq!(removed, vec![never.id, lower]);
	}

	#[test]
	fn under_cap_removes_nothing() {
		let l1 = listing("https://a.com/1", Some(day(1)));
		assert!(select_overflow(&[l1], 5).is_empty());
	}

	#[test]
	fn enforce_deletes_listing_and_embedding() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let old = listing("https://a.com/1", Some(day(1)));
		let mid = listing("https://a.com/2", Some(day(2)));
		let new = listing("https://a.com/3", Some(day(3)));
		for l in [&old, &mid, &new] {
			store.put_listing(l).unwrap();
			store
				.put_embedding(&EmbeddingRecord::new(&l.id, Embedding::new(vec![1.0, 0.0]), "m"))
				.unwrap();
		}

		let outcome = enforce(&store, 2).unwrap();
		assert_eq!(outcome, RetentionOutcome { removed: 1, active_after: 2 });
		assert!(store.get_listing(&old.id).unwrap().is_none());
		assert!(store.get_embedding(&old.id).unwrap().is_none());
		assert!(store.get_listing(&new.id).unwrap().is_some());

		assert_eq!(enforce(&store, 2).unwrap().removed, 0);
	}
}
