//! Processing: language-model metadata extraction and embeddings

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Deserialize;

use super::{worker_pool, Checkpoint};
use crate::config::{ENGINEERING_FIELDS, MAX_EMBEDDING_CHARS, MAX_PROMPT_CHARS};
use crate::core::{Embedding, EmbeddingRecord, Listing, ProcessedFields, Status};
use crate::error::{Error, Result};
use crate::services::LanguageModel;
use crate::storage::Store;
use crate::ui;

const SYSTEM_PROMPT: &str = "You are a job listing analyzer. Extract structured information from job listings \
	and respond with a single JSON object only.";

#[derive(Debug, Clone)]
pub struct ProcessOptions {
	pub batch_size: usize,
	pub max_listings: Option<usize>,
	pub listing_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct ProcessOutcome {
	pub pending: usize,
	pub processed: usize,
	pub embedded: usize,
	pub failures: Vec<String>,
}

impl ProcessOutcome {
	pub fn error(&self) -> Option<Error> {
		let first = self.failures.first()?;
		Some(Error::external(
			"processor",
			format!("{} listing(s) failed; first: {}", self.failures.len(), first),
			false,
		))
	}
}

/// Work produced for one listing on a worker thread
struct Processed {
	listing: Listing,
	metadata_updated: bool,
	embedding: Option<EmbeddingRecord>,
}

/// Active listings that still need metadata or an embedding, oldest first
pub fn pending(store: &Store) -> Result<Vec<Listing>> {
	let mut pending = Vec::new();
	for listing in store.list_listings(Some(Status::Active))? {
		if !listing.is_processed() || store.get_embedding(&listing.id)?.is_none() {
			pending.push(listing);
		}
	}
	pending.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then_with(|| a.id.cmp(&b.id)));
	Ok(pending)
}

/// Process the backlog in batches on a bounded worker pool; results are written sequentially
pub fn process(
	store: &Store,
	llm: &dyn LanguageModel,
	options: &ProcessOptions,
	workers: usize,
	checkpoint: &Checkpoint,
) -> Result<ProcessOutcome> {
	let mut backlog = match &options.listing_id {
		Some(id) => {
			let listing = store
				.get_listing(id)?
				.ok_or_else(|| Error::NotFound(format!("listing {}", id)))?;
			vec![listing]
		}
		None => pending(store)?,
	};
	if let Some(max) = options.max_listings {
		backlog.truncate(max);
	}

	let mut outcome = ProcessOutcome {
		pending: backlog.len(),
		..Default::default()
	};
	if backlog.is_empty() {
		return Ok(outcome);
	}

	ui::info(&format!("Processing {} listings", backlog.len()));
	let pool = worker_pool(workers)?;
	let total_batches = backlog.len().div_ceil(options.batch_size.max(1));

	for (batch_index, batch) in backlog.chunks(options.batch_size.max(1)).enumerate() {
		if !checkpoint.proceed()? {
			break;
		}
		ui::debug(&format!("Batch {}/{}", batch_index + 1, total_batches));

		let results: Vec<(String, Result<Processed>)> = pool.install(|| {
			batch
				.par_iter()
				.map(|listing| {
					if checkpoint.is_cancelled() {
						return (listing.id.clone(), Err(Error::Cancelled));
					}
					let needs_embedding = match store.get_embedding(&listing.id) {
						Ok(existing) => existing.is_none(),
						Err(e) => return (listing.id.clone(), Err(e)),
					};
					(listing.id.clone(), process_one(llm, listing.clone(), needs_embedding, Utc::now()))
				})
				.collect()
		});

		for (id, result) in results {
			match result {
				Ok(done) => {
					if done.metadata_updated {
						store.put_listing(&done.listing)?;
						outcome.processed += 1;
					}
					if let Some(record) = done.embedding {
						match store.put_embedding(&record) {
							Ok(()) => outcome.embedded += 1,
							Err(e @ Error::DataIntegrity { .. }) => {
								tracing::warn!(error = %e, "embedding rejected");
								outcome.failures.push(e.to_string());
								continue;
							}
							Err(e) => return Err(e),
						}
					}
					ui::success(&format!("{} ({})", done.listing.title, id));
				}
				Err(Error::Cancelled) => {}
				Err(e @ Error::Storage(_)) => return Err(e),
				Err(e) => {
					tracing::warn!(id = %id, error = %e, "processing failed");
					ui::error(&format!("{}: {}", id, e));
					outcome.failures.push(format!("{}: {}", id, e));
				}
			}
		}
	}

	tracing::info!(
		processed = outcome.processed,
		embedded = outcome.embedded,
		failures = outcome.failures.len(),
		"processing finished"
	);
	Ok(outcome)
}

fn process_one(llm: &dyn LanguageModel, mut listing: Listing, needs_embedding: bool, now: DateTime<Utc>) -> Result<Processed> {
	let mut metadata_updated = false;

	if listing.processed.is_none() {
		let reply = llm.complete(SYSTEM_PROMPT, &metadata_prompt(&listing))?;
		let metadata = parse_metadata(&reply).map_err(|message| Error::external("openai", message, false))?;
		apply_metadata(&mut listing, metadata, now);
		metadata_updated = true;
	}

	let embedding = if needs_embedding {
		let text = listing.embedding_text();
		let vector = llm.embed(truncate_chars(&text, MAX_EMBEDDING_CHARS))?;
		Some(EmbeddingRecord::new(&listing.id, Embedding::new(vector), llm.embedding_model()))
	} else {
		None
	};

	Ok(Processed {
		listing,
		metadata_updated,
		embedding,
	})
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExtractedMetadata {
	pub title: Option<String>,
	pub company: Option<String>,
	pub location: Option<String>,
	pub job_type: Option<String>,
	pub experience_level: Option<String>,
	pub required_skills: Option<Vec<String>>,
	pub preferred_skills: Option<Vec<String>>,
	pub education_requirements: Option<Vec<String>>,
	pub salary_range: Option<serde_json::Value>,
	pub engineering_field: Option<String>,
	pub remote_policy: Option<String>,
}

fn metadata_prompt(listing: &Listing) -> String {
	format!(
		"Extract the following from the job listing below and return JSON with exactly these keys:\n\
		title, company, location, job_type (full-time, part-time, internship, contract), \
		experience_level (entry, mid, senior), required_skills (list), preferred_skills (list), \
		education_requirements (list), salary_range, engineering_field (one of: {}), \
		remote_policy (remote, hybrid, on-site). Use null when unknown.\n\n\
		Title: {}\nCompany: {}\nURL: {}\n\n{}",
		ENGINEERING_FIELDS.join(", "),
		listing.title,
		listing.company,
		listing.url,
		truncate_chars(&listing.raw_text, MAX_PROMPT_CHARS)
	)
}

/// Parse the model's reply. Tolerates code fences and prose around the object.
pub fn parse_metadata(reply: &str) -> std::result::Result<ExtractedMetadata, String> {
	let start = reply.find('{').ok_or("reply contains no JSON object")?;
	let end = reply.rfind('}').ok_or("reply contains no JSON object")?;
	if end < start {
		return Err("reply contains no JSON object".into());
	}
	serde_json::from_str(&reply[start..=end]).map_err(|e| format!("invalid metadata JSON: {}", e))
}

/// Map a free-form field name onto the known list, `Other` when unknown
pub fn normalize_field(field: Option<&str>) -> String {
	let Some(field) = field.map(str::trim).filter(|f| !f.is_empty()) else {
		return "Other".to_string();
	};
	ENGINEERING_FIELDS
		.iter()
		.find(|known| known.eq_ignore_ascii_case(field))
		.map(|known| known.to_string())
		.unwrap_or_else(|| "Other".to_string())
}

fn apply_metadata(listing: &mut Listing, metadata: ExtractedMetadata, now: DateTime<Utc>) {
	let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

	if listing.title.trim().is_empty() {
		if let Some(title) = clean(metadata.title) {
			listing.title = title;
		}
	}
	if listing.company.trim().is_empty() {
		if let Some(company) = clean(metadata.company) {
			listing.company = company;
		}
	}

	let skills: BTreeSet<String> = metadata
		.required_skills
		.into_iter()
		.chain(metadata.preferred_skills)
		.flatten()
		.map(|s| s.trim().to_string())
		.filter(|s| !s.is_empty())
		.collect();

	let location = clean(metadata.location);
	if listing.location.is_none() {
		listing.location = location.clone();
	}

	let salary_range = match metadata.salary_range {
		Some(serde_json::Value::String(s)) => clean(Some(s)),
		Some(serde_json::Value::Null) | None => None,
		Some(other) => Some(other.to_string()),
	};

	listing.processed = Some(ProcessedFields {
		skills,
		field: normalize_field(metadata.engineering_field.as_deref()),
		seniority: clean(metadata.experience_level),
		location,
		job_type: clean(metadata.job_type),
		remote_policy: clean(metadata.remote_policy),
		salary_range,
		education: metadata
			.education_requirements
			.unwrap_or_default()
			.into_iter()
			.filter(|s| !s.trim().is_empty())
			.collect(),
		processed_at: Some(now),
	});
	listing.updated_at = now;
}

/// Truncate to at most `max` characters on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> &str {
	match text.char_indices().nth(max) {
		Some((idx, _)) => &text[..idx],
		None => text,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct FakeModel {
		reply: String,
		completions: AtomicUsize,
	}

	impl FakeModel {
		fn new(reply: &str) -> Self {
			Self {
				reply: reply.to_string(),
				completions: AtomicUsize::new(0),
			}
		}
	}

	impl LanguageModel for FakeModel {
		fn complete(&self, _system: &str, user: &str) -> Result<String> {
			self.completions.fetch_add(1, Ordering::SeqCst);
			if user.contains("FAIL") {
				return Err(Error::external("openai", "500", true));
			}
			Ok(self.reply.clone())
		}

		fn embed(&self, text: &str) -> Result<Vec<f32>> {
			Ok(vec![text.len() as f32, 1.0, 0.5])
		}

		fn embedding_model(&self) -> &str {
			"fake-embed"
		}
	}

	const REPLY: &str = "```json\n{\"title\": \"Intern\", \"company\": \"Acme\", \"required_skills\": [\"Rust\", \" SQL \"], \
		\"preferred_skills\": null, \"engineering_field\": \"software engineering\", \"experience_level\": \"entry\", \
		\"salary_range\": {\"min\": 20}}\n```";

	fn options() -> ProcessOptions {
		ProcessOptions {
			batch_size: 2,
			max_listings: None,
			listing_id: None,
		}
	}

	#[test]
	fn parses_fenced_metadata() {
		let meta = parse_metadata(REPLY).unwrap();
		assert_eq!(meta.title.as_deref(), Some("Intern"));
		assert_eq!(meta.required_skills.unwrap().len(), 2);
		assert!(parse_metadata("no json here").is_err());
	}

	#[test]
	fn unknown_field_maps_to_other() {
		assert_eq!(normalize_field(Some("software engineering")), "Software Engineering");
		assert_eq!(normalize_field(Some("Underwater Basket Weaving")), "Other");
		assert_eq!(normalize_field(None), "Other");
	}

	#[test]
	fn truncation_respects_char_boundaries() {
		assert_eq!(truncate_chars("héllo", 2), "hé");
		assert_eq!(truncate_chars("abc", 10), "abc");
	}

	#[test]
	fn processes_backlog_and_skips_done_listings() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let now = Utc::now();
		for i in 0..3 {
			store
				.put_listing(&Listing::new(format!("https://a.com/{}", i), "", "", format!("body {}", i), now))
				.unwrap();
		}
		let model = FakeModel::new(REPLY);

		let outcome = process(&store, &model, &options(), 2, &Checkpoint::default()).unwrap();
		assert_eq!(outcome.processed, 3);
		assert_eq!(outcome.embedded, 3);
		assert!(outcome.failures.is_empty());

		let listings = store.list_listings(None).unwrap();
		let listing = &listings[0];
		let fields = listing.processed.as_ref().unwrap();
		assert_eq!(listing.company, "Acme");
		assert_eq!(fields.field, "Software Engineering");
		assert!(fields.skills.contains("SQL"));
		assert_eq!(fields.seniority.as_deref(), Some("entry"));
		assert_eq!(fields.salary_range.as_deref(), Some("{\"min\":20}"));

		let again = process(&store, &model, &options(), 2, &Checkpoint::default()).unwrap();
		assert_eq!(again.pending, 0);
		assert_eq!(model.completions.load(Ordering::SeqCst), 3);
	}

	#[test]
	fn failures_are_counted_per_listing() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let now = Utc::now();
		store.put_listing(&Listing::new("https://a.com/ok", "Acme", "Ok", "fine", now)).unwrap();
		store.put_listing(&Listing::new("https://a.com/bad", "Acme", "Bad", "FAIL", now)).unwrap();

		let outcome = process(&store, &FakeModel::new(REPLY), &options(), 1, &Checkpoint::default()).unwrap();
		assert_eq!(outcome.processed, 1);
		assert_eq!(outcome.failures.len(), 1);
		assert!(outcome.error().is_some());
	}

	#[test]
	fn missing_listing_id_is_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let opts = ProcessOptions {
			listing_id: Some("deadbeef".into()),
			..options()
		};
		let err = process(&store, &FakeModel::new(REPLY), &opts, 1, &Checkpoint::default()).unwrap_err();
		assert!(matches!(err, Error::NotFound(_)));
	}
}
