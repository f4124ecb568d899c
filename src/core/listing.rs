//! Job listing records and their lifecycle

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fingerprint::{listing_id, Fingerprint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
	Active,
	Expired,
	Duplicate,
}

impl std::fmt::Display for Status {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			Self::Active => "active",
			Self::Expired => "expired",
			Self::Duplicate => "duplicate",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiredReason {
	Age,
}

/// The only status changes a listing can go through. Both leave `active`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
	Expire(ExpiredReason),
	MarkDuplicate { canonical: String },
}

impl Transition {
	pub fn target(&self) -> Status {
		match self {
			Self::Expire(_) => Status::Expired,
			Self::MarkDuplicate { .. } => Status::Duplicate,
		}
	}
}

/// Metadata extracted by the language model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedFields {
	pub skills: BTreeSet<String>,
	pub field: String,
	pub seniority: Option<String>,
	pub location: Option<String>,
	pub job_type: Option<String>,
	pub remote_policy: Option<String>,
	pub salary_range: Option<String>,
	pub education: Vec<String>,
	pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
	pub id: String,
	pub url: String,
	pub company: String,
	pub title: String,
	pub raw_text: String,
	#[serde(default)]
	pub location: Option<String>,
	#[serde(default)]
	pub source: String,
	#[serde(default)]
	pub search_query: Option<String>,
	#[serde(default)]
	pub processed: Option<ProcessedFields>,
	pub status: Status,
	#[serde(default)]
	pub duplicate_of: Option<String>,
	#[serde(default)]
	pub expired_reason: Option<ExpiredReason>,
	pub first_seen: DateTime<Utc>,
	#[serde(default)]
	pub last_seen: Option<DateTime<Utc>>,
	pub updated_at: DateTime<Utc>,
	#[serde(default)]
	pub fingerprint: Option<String>,
}

impl Listing {
	/// New active listing observed at `now`
	pub fn new(
		url: impl Into<String>,
		company: impl Into<String>,
		title: impl Into<String>,
		raw_text: impl Into<String>,
		now: DateTime<Utc>,
	) -> Self {
		let url = url.into();
		let raw_text = raw_text.into();

		Self {
			id: listing_id(&url),
			fingerprint: Fingerprint::compute(&raw_text).map(Fingerprint::into_string),
			url,
			company: company.into(),
			title: title.into(),
			raw_text,
			location: None,
			source: String::new(),
			search_query: None,
			processed: None,
			status: Status::Active,
			duplicate_of: None,
			expired_reason: None,
			first_seen: now,
			last_seen: Some(now),
			updated_at: now,
		}
	}

	pub fn is_active(&self) -> bool {
		self.status == Status::Active
	}

	pub fn is_processed(&self) -> bool {
		self.processed.is_some()
	}

	/// Seen again by the collector. Never changes status.
	pub fn observe(&mut self, now: DateTime<Utc>) {
		self.last_seen = Some(now);
		self.updated_at = now;
	}

	/// Apply a status transition. Returns false (and changes nothing) unless the listing is active.
	pub fn apply(&mut self, transition: &Transition, now: DateTime<Utc>) -> bool {
		if self.status != Status::Active {
			return false;
		}

		match transition {
			Transition::Expire(reason) => {
				self.status = Status::Expired;
				self.expired_reason = Some(*reason);
			}
			Transition::MarkDuplicate { canonical } => {
				self.status = Status::Duplicate;
				self.duplicate_of = Some(canonical.clone());
			}
		}
		self.updated_at = now;
		true
	}

	/// Text sent to the embedding model
	pub fn embedding_text(&self) -> String {
		let mut text = format!("{}\n{}\n", self.title, self.company);
		if let Some(processed) = &self.processed {
			if !processed.field.is_empty() {
				text.push_str(&format!("Field: {}\n", processed.field));
			}
			if !processed.skills.is_empty() {
				let skills: Vec<&str> = processed.skills.iter().map(String::as_str).collect();
				text.push_str(&format!("Skills: {}\n", skills.join(", ")));
			}
		}
		text.push('\n');
		text.push_str(&self.raw_text);
		text
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	fn listing() -> Listing {
		Listing::new("https://example.com/jobs/1", "Acme", "Engineer", "Build rockets", Utc::now())
	}

	#[test]
	fn new_listing_is_active_and_fingerprinted() {
		let l = listing();
		assert!(l.is_active());
		assert_eq!(l.first_seen, l.last_seen.unwrap());
		let expected = Fingerprint::compute("Build rockets").unwrap();
		assert_eq!(l.fingerprint.as_deref(), Some(expected.as_str()));
		assert_eq!(l.id, listing_id("https://example.com/jobs/1"));
	}

	#[test]
	fn transitions_only_leave_active() {
		let mut l = listing();
		let now = Utc::now();
		assert!(l.apply(&Transition::Expire(ExpiredReason::Age), now));
		assert_eq!(l.status, Status::Expired);

		let dup = Transition::MarkDuplicate { canonical: "x".into() };
		assert!(!l.apply(&dup, now));
		assert_eq!(l.status, Status::Expired);
		assert!(l.duplicate_of.is_none());
	}

	#[test]
	fn observe_does_not_reactivate() {
		let mut l = listing();
		l.apply(&Transition::Expire(ExpiredReason::Age), Utc::now());
		let later = Utc::now() + Duration::days(1);
		l.observe(later);
		assert_eq!(l.status, Status::Expired);
		assert_eq!(l.last_seen, Some(later));
	}

	#[test]
	fn missing_optional_fields_deserialize() {
		let json = serde_json::json!({
			"id": "abc",
			"url": "https://example.com",
			"company": "Acme",
			"title": "Engineer",
			"raw_text": "text",
			"status": "active",
			"first_seen": "2024-01-01T00:00:00Z",
			"updated_at": "2024-01-01T00:00:00Z"
		});
		let l: Listing = serde_json::from_value(json).unwrap();
		assert!(l.last_seen.is_none());
		assert!(l.fingerprint.is_none());
	}
}
