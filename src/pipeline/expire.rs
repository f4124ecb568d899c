//! Age-based expiration of active listings

use chrono::{DateTime, Duration, Utc};

use crate::core::{ExpiredReason, Listing, Status, Transition};
use crate::error::Result;
use crate::storage::Store;

/// Expired when never seen, or last seen more than `max_age_days` ago
pub fn is_expired(listing: &Listing, now: DateTime<Utc>, max_age_days: i64) -> bool {
	match listing.last_seen {
		Some(last_seen) => now.signed_duration_since(last_seen) > Duration::days(max_age_days),
		None => true,
	}
}

/// Mark stale active listings expired. Returns how many changed.
pub fn expire(store: &Store, max_age_days: i64, now: DateTime<Utc>) -> Result<usize> {
	let transition = Transition::Expire(ExpiredReason::Age);
	let mut expired = 0;

	for listing in store.list_listings(Some(Status::Active))? {
		if !is_expired(&listing, now, max_age_days) {
			continue;
		}
		if store.transition(&listing.id, &transition, now)? {
			tracing::debug!(id = %listing.id, last_seen = ?listing.last_seen, "expired");
			expired += 1;
		}
	}

	tracing::info!(expired, max_age_days, "expiration finished");
	Ok(expired)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn seen(days_ago: i64, now: DateTime<Utc>) -> Listing {
		Listing::new(
			format!("https://a.com/{}", days_ago),
			"Acme",
			"Engineer",
			format!("text {}", days_ago),
			now - Duration::days(days_ago),
		)
	}

	#[test]
	fn threshold_is_strict() {
		let now = Utc::now();
		assert!(!is_expired(&seen(30, now), now, 30));
		assert!(is_expired(&seen(31, now), now, 30));
		assert!(!is_expired(&seen(0, now), now, 30));
	}

	#[test]
	fn missing_last_seen_expires() {
		let now = Utc::now();
		let mut listing = seen(0, now);
		listing.last_seen = None;
		assert!(is_expired(&listing, now, 30));
	}

	#[test]
	fn expire_only_touches_stale_active_listings() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let now = Utc::now();
		let old = seen(45, now);
		let fresh = seen(2, now);
		store.put_listing(&old).unwrap();
		store.put_listing(&fresh).unwrap();

		assert_eq!(expire(&store, 30, now).unwrap(), 1);
		let stored = store.get_listing(&old.id).unwrap().unwrap();
		assert_eq!(stored.status, Status::Expired);
		assert_eq!(stored.expired_reason, Some(ExpiredReason::Age));
		assert_eq!(store.get_listing(&fresh.id).unwrap().unwrap().status, Status::Active);

		assert_eq!(expire(&store, 30, now).unwrap(), 0);
	}
}
