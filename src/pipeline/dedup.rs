//! Deduplication of active listings
//!
//! Listings are grouped when their fingerprints match, or when they share a
//! normalized company and title and their text similarity reaches the
//! threshold. Grouping is transitive. The earliest-seen member of each group
//! stays active (ties go to the lower id); the rest become duplicates of it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::core::fingerprint::{company_title_key, text_similarity};
use crate::core::{Listing, Status, Transition};
use crate::error::{Error, Result};
use crate::storage::Store;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DedupOutcome {
	pub marked: usize,
	/// Active listings without a fingerprint
	pub skipped: usize,
}

/// A duplicate and the canonical listing it points to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePair {
	pub duplicate: String,
	pub canonical: String,
}

pub fn deduplicate(store: &Store, threshold: f32, now: DateTime<Utc>) -> Result<DedupOutcome> {
	let active = store.list_listings(Some(Status::Active))?;

	let (usable, unusable): (Vec<Listing>, Vec<Listing>) = active.into_iter().partition(|l| l.fingerprint.is_some());
	for listing in &unusable {
		let err = Error::integrity(&listing.id, "active listing has no fingerprint");
		tracing::warn!(error = %err, "skipping listing during deduplication");
	}

	let mut outcome = DedupOutcome {
		skipped: unusable.len(),
		..Default::default()
	};

	for pair in find_duplicates(&usable, threshold) {
		let transition = Transition::MarkDuplicate {
			canonical: pair.canonical.clone(),
		};
		if store.transition(&pair.duplicate, &transition, now)? {
			tracing::debug!(duplicate = %pair.duplicate, canonical = %pair.canonical, "marked duplicate");
			outcome.marked += 1;
		}
	}

	tracing::info!(marked = outcome.marked, skipped = outcome.skipped, "deduplication finished");
	Ok(outcome)
}

/// Duplicate pairs among `listings`. Listings without a fingerprint are ignored.
pub fn find_duplicates(listings: &[Listing], threshold: f32) -> Vec<DuplicatePair> {
	let listings: Vec<&Listing> = listings.iter().filter(|l| l.fingerprint.is_some()).collect();
	let mut groups = UnionFind::new(listings.len());

	let mut by_fingerprint: HashMap<&str, usize> = HashMap::new();
	let mut by_key: HashMap<(String, String), Vec<usize>> = HashMap::new();

	for (idx, listing) in listings.iter().enumerate() {
		if let Some(fp) = listing.fingerprint.as_deref() {
			match by_fingerprint.get(fp) {
				Some(&first) => groups.union(first, idx),
				None => {
					by_fingerprint.insert(fp, idx);
				}
			}
		}

		let key = company_title_key(&listing.company, &listing.title);
		if !key.0.is_empty() && !key.1.is_empty() {
			by_key.entry(key).or_default().push(idx);
		}
	}

	for candidates in by_key.values() {
		for (i, &a) in candidates.iter().enumerate() {
			for &b in &candidates[i + 1..] {
				if groups.find(a) == groups.find(b) {
					continue;
				}
				if text_similarity(&listings[a].raw_text, &listings[b].raw_text) >= threshold {
					groups.union(a, b);
				}
			}
		}
	}

	let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
	for idx in 0..listings.len() {
		members.entry(groups.find(idx)).or_default().push(idx);
	}

	let mut pairs = Vec::new();
	for group in members.values().filter(|g| g.len() > 1) {
		let Some(&canonical) = group
			.iter()
			.min_by(|&&a, &&b| {
				listings[a]
					.first_seen
					.cmp(&listings[b].first_seen)
					.then_with(|| listings[a].id.cmp(&listings[b].id))
			})
		else {
			continue;
		};

		for &idx in group.iter().filter(|&&i| i != canonical) {
			pairs.push(DuplicatePair {
				duplicate: listings[idx].id.clone(),
				canonical: listings[canonical].id.clone(),
			});
		}
	}

	pairs.sort_by(|a, b| a.duplicate.cmp(&b.duplicate));
	pairs
}

struct UnionFind {
	parent: Vec<usize>,
}

impl UnionFind {
	fn new(n: usize) -> Self {
		Self { parent: (0..n).collect() }
	}

	fn find(&mut self, x: usize) -> usize {
		let mut root = x;
		while self.parent[root] != root {
			root = self.parent[root];
		}
		let mut cur = x;
		while self.parent[cur] != root {
			let next = self.parent[cur];
			self.parent[cur] = root;
			cur = next;
		}
		root
	}

	fn union(&mut self, a: usize, b: usize) {
		let (ra, rb) = (self.find(a), self.find(b));
		if ra != rb {
			self.parent[rb.max(ra)] = ra.min(rb);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration, TimeZone};

	fn day(d: u32) -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 1, d, 12, 0, 0).unwrap()
	}

	fn listing(url: &str, company: &str, title: &str, text: &str, seen: DateTime<Utc>) -> Listing {
		Listing::new(url, company, title, text, seen)
	}

	#[test]
	fn identical_fingerprints_keep_earliest() {
		let a = listing("https://a.com/1", "Acme", "Engineer", "x", day(1));
		let b = listing("https://b.com/1", "Other", "Analyst", "x", day(3));
		let pairs = find_duplicates(&[b.clone(), a.clone()], 0.9);
		assert_eq!(
			pairs,
			vec![DuplicatePair {
				duplicate: b.id,
				canonical: a.id
			}]
		);
	}

	#[test]
	fn wordless_pages_are_never_grouped() {
		let a = listing("https://a.com/1", "Acme", "Engineer", "***", day(1));
		let b = listing("https://b.com/1", "Other", "Analyst", "--- !!!", day(2));
		assert!(a.fingerprint.is_none() && b.fingerprint.is_none());
		assert!(find_duplicates(&[a, b], 0.9).is_empty());
	}

	#[test]
	fn tie_goes_to_lower_id() {
		let a = listing("https://a.com/1", "Acme", "Engineer", "same text", day(1));
		let b = listing("https://b.com/1", "Acme", "Engineer", "same text", day(1));
		let pairs = find_duplicates(&[a.clone(), b.clone()], 0.9);
		let canonical = a.id.clone().min(b.id.clone());
		assert_eq!(pairs.len(), 1);
		assert_eq!(pairs[0].canonical, canonical);
	}

	#[test]
	fn near_duplicates_need_same_company_and_title() {
		let text_a = "design and build embedded firmware for rockets using c and rust every day";
		let text_b = "design and build embedded firmware for rockets using c and rust every day now";
		let a = listing("https://a.com/1", "Acme", "Firmware Intern", text_a, day(1));
		let b = listing("https://a.com/2", "ACME", "firmware intern", text_b, day(2));
		let text_c = "design and build embedded firmware for rockets using c and rust every day today";
		let c = listing("https://a.com/3", "Beta", "Firmware Intern", text_c, day(3));

		let pairs = find_duplicates(&[a.clone(), b.clone(), c], 0.9);
		assert_eq!(pairs.len(), 1);
		assert_eq!(pairs[0].duplicate, b.id);
		assert_eq!(pairs[0].canonical, a.id);

		assert!(find_duplicates(&[a, b], 0.99).is_empty());
	}

	#[test]
	fn grouping_is_transitive() {
		let text_a = "write rust services for payments and ledgers all day long";
		let text_b = "write rust services for payments and ledgers all day long too";
		let a = listing("https://a.com/1", "Acme", "Engineer", text_a, day(2));
		let b = listing("https://a.com/2", "Acme", "Engineer", text_b, day(1));
		let mut c = listing("https://z.com/3", "Zed", "Analyst", "unrelated", day(3));
		c.fingerprint = b.fingerprint.clone();

		let pairs = find_duplicates(&[a.clone(), b.clone(), c.clone()], 0.9);
		assert_eq!(pairs.len(), 2);
		assert!(pairs.iter().all(|p| p.canonical == b.id));
		assert!(pairs.iter().any(|p| p.duplicate == a.id));
		assert!(pairs.iter().any(|p| p.duplicate == c.id));
	}

	#[test]
	fn deduplicate_marks_and_is_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let a = listing("https://a.com/1", "Acme", "Engineer", "x", day(1));
		let b = listing("https://b.com/1", "Acme", "Engineer", "x", day(3));
		let mut legacy = listing("https://c.com/1", "Acme", "Engineer", "x", day(2));
		legacy.fingerprint = None;
		for l in [&a, &b, &legacy] {
			store.put_listing(l).unwrap();
		}

		let now = day(4) + Duration::hours(1);
		let outcome = deduplicate(&store, 0.9, now).unwrap();
		assert_eq!(outcome, DedupOutcome { marked: 1, skipped: 1 });

		let stored_b = store.get_listing(&b.id).unwrap().unwrap();
		assert_eq!(stored_b.status, Status::Duplicate);
		assert_eq!(stored_b.duplicate_of.as_deref(), Some(a.id.as_str()));
		assert_eq!(store.get_listing(&a.id).unwrap().unwrap().status, Status::Active);
		assert_eq!(store.get_listing(&legacy.id).unwrap().unwrap().status, Status::Active);

		let again = deduplicate(&store, 0.9, now).unwrap();
		assert_eq!(again.marked, 0);
	}
}
