//! Collection: search queries, page scraping, raw listing ingestion

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use super::{worker_pool, Checkpoint};
use crate::config::Targets;
use crate::core::fingerprint::listing_id;
use crate::core::Listing;
use crate::error::{Error, Result};
use crate::services::fetcher::identify_source;
use crate::services::{Page, PageFetcher, SearchHit, SearchProvider};
use crate::storage::Store;
use crate::ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
	Companies,
	Fields,
}

#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
	pub kind: Option<TargetKind>,
	/// Only the company or field with this name
	pub specific: Option<String>,
	pub max_results: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
	pub text: String,
	pub company: Option<String>,
}

#[derive(Debug, Default)]
pub struct CollectOutcome {
	pub queries: usize,
	pub collected: usize,
	pub reobserved: usize,
	pub failures: Vec<String>,
}

impl CollectOutcome {
	/// Single error summarizing failed searches and fetches, if any
	pub fn error(&self) -> Option<Error> {
		let first = self.failures.first()?;
		Some(Error::external(
			"collector",
			format!("{} request(s) failed; first: {}", self.failures.len(), first),
			false,
		))
	}
}

/// Build the search queries for the configured targets
pub fn build_queries(targets: &Targets, options: &CollectOptions) -> Vec<SearchQuery> {
	let keywords = targets
		.keywords
		.iter()
		.map(|k| format!("\"{}\"", k))
		.collect::<Vec<_>>()
		.join(" OR ");
	let suffix = if keywords.is_empty() {
		String::new()
	} else {
		format!(" ({})", keywords)
	};

	let wanted = |name: &str| {
		options
			.specific
			.as_deref()
			.map_or(true, |s| s.eq_ignore_ascii_case(name))
	};

	let mut queries = Vec::new();

	if options.kind != Some(TargetKind::Fields) {
		for company in targets.companies.iter().filter(|c| wanted(c)) {
			queries.push(SearchQuery {
				text: format!("\"{}\" careers{}", company, suffix),
				company: Some(company.clone()),
			});
		}
	}

	if options.kind != Some(TargetKind::Companies) {
		for field in targets.fields.iter().filter(|f| wanted(f)) {
			queries.push(SearchQuery {
				text: format!("\"{}\" jobs{}", field, suffix),
				company: None,
			});
		}
	}

	queries
}

/// Run all queries, scrape new result pages, and store them as active listings.
///
/// Known URLs only get `last_seen` refreshed. Individual search or fetch
/// failures are collected in the outcome; store failures and a failed
/// checkpoint abort.
#[allow(clippy::too_many_arguments)]
pub fn collect(
	store: &Store,
	search: &dyn SearchProvider,
	fetcher: &dyn PageFetcher,
	targets: &Targets,
	options: &CollectOptions,
	workers: usize,
	checkpoint: &Checkpoint,
	now: DateTime<Utc>,
) -> Result<CollectOutcome> {
	let queries = build_queries(targets, options);
	let max_results = options.max_results.unwrap_or(targets.max_results_per_query);
	let mut outcome = CollectOutcome {
		queries: queries.len(),
		..Default::default()
	};

	if queries.is_empty() {
		ui::warn("No collection targets match");
		return Ok(outcome);
	}

	let pool = worker_pool(workers)?;
	let mut seen: HashSet<String> = HashSet::new();

	for (index, query) in queries.iter().enumerate() {
		if !checkpoint.proceed()? {
			break;
		}

		ui::info(&format!("[{}/{}] Searching: {}", index + 1, queries.len(), query.text));

		let hits = match search.search(&query.text, max_results) {
			Ok(hits) => hits,
			Err(e) => {
				tracing::warn!(query = %query.text, error = %e, "search failed");
				ui::error(&format!("Search failed: {}", e));
				outcome.failures.push(e.to_string());
				continue;
			}
		};

		let mut fresh: Vec<SearchHit> = Vec::new();
		for hit in hits {
			let id = listing_id(&hit.url);
			if !seen.insert(id.clone()) {
				continue;
			}

			match store.get_listing(&id)? {
				Some(mut existing) => {
					existing.observe(now);
					store.put_listing(&existing)?;
					outcome.reobserved += 1;
				}
				None => fresh.push(hit),
			}
		}

		if fresh.is_empty() {
			continue;
		}

		let pages: Vec<(SearchHit, Result<Page>)> = pool.install(|| {
			fresh
				.into_par_iter()
				.map(|hit| {
					if checkpoint.is_cancelled() {
						return (hit, Err(Error::Cancelled));
					}
					let page = fetcher.fetch(&hit.url);
					(hit, page)
				})
				.collect()
		});

		for (hit, page) in pages {
			match page {
				Ok(page) => {
					let listing = listing_from_page(&hit, page, query, now);
					store.put_listing(&listing)?;
					ui::debug(&format!("Stored {} ({})", listing.title, listing.id));
					outcome.collected += 1;
				}
				Err(Error::Cancelled) => {}
				Err(e) => {
					tracing::warn!(url = %hit.url, error = %e, "fetch failed");
					outcome.failures.push(format!("{}: {}", hit.url, e));
				}
			}
		}
	}

	tracing::info!(
		collected = outcome.collected,
		reobserved = outcome.reobserved,
		failures = outcome.failures.len(),
		"collection finished"
	);
	Ok(outcome)
}

fn listing_from_page(hit: &SearchHit, page: Page, query: &SearchQuery, now: DateTime<Utc>) -> Listing {
	let title = page.title.unwrap_or_else(|| hit.title.clone());
	let company = page.company.or_else(|| query.company.clone()).unwrap_or_default();

	let mut listing = Listing::new(&hit.url, company, title, page.text, now);
	listing.location = page.location;
	listing.source = identify_source(&hit.url);
	listing.search_query = Some(query.text.clone());
	listing
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::pipeline::CancelFlag;
	use std::collections::HashMap;
	use std::sync::Mutex;

	struct FakeSearch(HashMap<String, Vec<SearchHit>>);

	impl SearchProvider for FakeSearch {
		fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
			let mut hits = self.0.get(query).cloned().unwrap_or_default();
			hits.truncate(max_results);
			Ok(hits)
		}
	}

	struct FailingSearch;

	impl SearchProvider for FailingSearch {
		fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchHit>> {
			Err(Error::external("google", "503", true))
		}
	}

	#[derive(Default)]
	struct FakeFetcher {
		calls: Mutex<Vec<String>>,
	}

	impl PageFetcher for FakeFetcher {
		fn fetch(&self, url: &str) -> Result<Page> {
			self.calls.lock().unwrap().push(url.to_string());
			if url.contains("broken") {
				return Err(Error::external("fetch", "404", false));
			}
			Ok(Page {
				title: Some(format!("Title for {}", url)),
				company: None,
				location: Some("Remote".into()),
				text: format!("Description of {}", url),
			})
		}
	}

	fn targets() -> Targets {
		Targets {
			companies: vec!["Acme".into()],
			fields: vec!["Data Science".into()],
			keywords: vec!["intern".into(), "new grad".into()],
			max_results_per_query: 10,
		}
	}

	fn hit(url: &str) -> SearchHit {
		SearchHit {
			title: "hit".into(),
			url: url.into(),
			snippet: String::new(),
		}
	}

	#[test]
	fn query_formats() {
		let queries = build_queries(&targets(), &CollectOptions::default());
		assert_eq!(queries.len(), 2);
		assert_eq!(queries[0].text, "\"Acme\" careers (\"intern\" OR \"new grad\")");
		assert_eq!(queries[0].company.as_deref(), Some("Acme"));
		assert_eq!(queries[1].text, "\"Data Science\" jobs (\"intern\" OR \"new grad\")");

		let only_fields = CollectOptions {
			kind: Some(TargetKind::Fields),
			..Default::default()
		};
		assert_eq!(build_queries(&targets(), &only_fields).len(), 1);

		let specific = CollectOptions {
			specific: Some("acme".into()),
			..Default::default()
		};
		let queries = build_queries(&targets(), &specific);
		assert_eq!(queries.len(), 1);
		assert!(queries[0].text.starts_with("\"Acme\""));
	}

	#[test]
	fn new_pages_stored_and_known_pages_reobserved() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let queries = build_queries(&targets(), &CollectOptions::default());

		let mut results = HashMap::new();
		results.insert(queries[0].text.clone(), vec![hit("https://acme.com/jobs/1"), hit("https://acme.com/broken")]);
		results.insert(queries[1].text.clone(), vec![hit("https://acme.com/jobs/1/"), hit("https://other.com/jobs/2")]);
		let search = FakeSearch(results);
		let fetcher = FakeFetcher::default();

		let earlier = Utc::now() - chrono::Duration::days(3);
		let outcome = collect(&store, &search, &fetcher, &targets(), &CollectOptions::default(), 2, &Checkpoint::default(), earlier).unwrap();
		assert_eq!(outcome.collected, 2);
		assert_eq!(outcome.failures.len(), 1);
		assert!(outcome.error().is_some());

		let stored = store.get_listing(&listing_id("https://acme.com/jobs/1")).unwrap().unwrap();
		assert_eq!(stored.company, "Acme");
		assert_eq!(stored.source, "Acme");
		assert_eq!(stored.location.as_deref(), Some("Remote"));
		assert!(stored.fingerprint.is_some());

		let now = Utc::now();
		let again = collect(&store, &search, &fetcher, &targets(), &CollectOptions::default(), 2, &Checkpoint::default(), now).unwrap();
		assert_eq!(again.collected, 0);
		assert_eq!(again.reobserved, 2);

		let stored = store.get_listing(&listing_id("https://acme.com/jobs/1")).unwrap().unwrap();
		assert_eq!(stored.first_seen, earlier);
		assert_eq!(stored.last_seen, Some(now));
	}

	#[test]
	fn search_failures_recorded_not_raised() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let fetcher = FakeFetcher::default();

		let outcome = collect(&store, &FailingSearch, &fetcher, &targets(), &CollectOptions::default(), 1, &Checkpoint::default(), Utc::now()).unwrap();
		assert_eq!(outcome.collected, 0);
		assert_eq!(outcome.failures.len(), 2);
		assert!(fetcher.calls.lock().unwrap().is_empty());
	}

	#[test]
	fn cancelled_before_start_does_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let cancel = CancelFlag::new();
		cancel.cancel();

		let outcome = collect(&store, &FailingSearch, &FakeFetcher::default(), &targets(), &CollectOptions::default(), 1, &Checkpoint::new(cancel), Utc::now()).unwrap();
		assert!(outcome.failures.is_empty());
	}
}
