//! Google Programmable Search client

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use serde::Deserialize;

use super::http::{build_client, check_status, transport_error};
use super::retry::{RateLimiter, RetryPolicy};
use super::{SearchHit, SearchProvider};
use crate::config::{GoogleSettings, GOOGLE_SEARCH_URL};
use crate::error::{Error, Result};

const SERVICE: &str = "google";
const PAGE_SIZE: usize = 10;
/// The API serves at most 100 results per query
const MAX_RESULTS: usize = 100;

pub struct GoogleSearch {
	client: Client,
	api_key: String,
	cse_id: String,
	retry: RetryPolicy,
	limiter: RateLimiter,
}

impl GoogleSearch {
	pub fn new(settings: &GoogleSettings, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
		Ok(Self {
			client: build_client(SERVICE, timeout, HeaderMap::new())?,
			api_key: settings.api_key.clone(),
			cse_id: settings.cse_id.clone(),
			retry,
			limiter: RateLimiter::per_minute(settings.rpm),
		})
	}

	fn page(&self, query: &str, start: usize, num: usize) -> Result<Vec<SearchHit>> {
		let start = start.to_string();
		let num = num.to_string();

		self.retry.run("google search", || {
			self.limiter.wait();
			let resp = self
				.client
				.get(GOOGLE_SEARCH_URL)
				.query(&[
					("key", self.api_key.as_str()),
					("cx", self.cse_id.as_str()),
					("q", query),
					("start", start.as_str()),
					("num", num.as_str()),
				])
				.send()
				.map_err(|e| transport_error(SERVICE, e))?;

			let body: SearchResponse = check_status(SERVICE, resp)?
				.json()
				.map_err(|e| Error::external(SERVICE, format!("unexpected search response: {}", e), false))?;

			Ok(body
				.items
				.into_iter()
				.map(|item| SearchHit {
					title: item.title,
					url: item.link,
					snippet: item.snippet.unwrap_or_default(),
				})
				.collect())
		})
	}
}

impl SearchProvider for GoogleSearch {
	fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
		let max_results = max_results.min(MAX_RESULTS);
		let mut hits: Vec<SearchHit> = Vec::new();

		while hits.len() < max_results {
			let want = PAGE_SIZE.min(max_results - hits.len());
			let page = self.page(query, hits.len() + 1, want)?;
			let got = page.len();
			tracing::debug!(query, got, total = hits.len() + got, "search page");
			hits.extend(page);

			if got < want {
				break;
			}
		}

		hits.truncate(max_results);
		Ok(hits)
	}
}

#[derive(Deserialize)]
struct SearchResponse {
	#[serde(default)]
	items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
	title: String,
	link: String,
	#[serde(default)]
	snippet: Option<String>,
}
