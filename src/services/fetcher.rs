//! Job page fetching and text extraction

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use scraper::{ElementRef, Html, Selector};

use super::http::{build_client, check_status, transport_error};
use super::retry::RetryPolicy;
use super::{Page, PageFetcher};
use crate::core::fingerprint::normalize_text;
use crate::error::{Error, Result};

const SERVICE: &str = "fetch";

const TITLE_SELECTORS: &[&str] = &[".job-title", ".posting-title", ".career-title", "h1.title", "h1"];
const COMPANY_SELECTORS: &[&str] = &[".company-name", ".employer", "[itemprop='hiringOrganization']"];
const LOCATION_SELECTORS: &[&str] = &[".location", "[itemprop='jobLocation']", ".job-location"];
const CONTENT_SELECTORS: &[&str] = &[
	"#job-description",
	".job-description",
	".description",
	"#job-details",
	".job-details",
	".jobDesc",
	"[itemprop='description']",
	".career-details",
	".posting-body",
];
const SKIPPED_TAGS: &[&str] = &["header", "nav", "footer", "script", "style", "noscript", "template", "svg"];
const SKIPPED_CLASSES: &[&str] = &["header", "footer", "navigation"];

const JOB_SITES: &[(&str, &str)] = &[
	("linkedin.com", "LinkedIn"),
	("indeed.com", "Indeed"),
	("glassdoor.com", "Glassdoor"),
	("monster.com", "Monster"),
	("careerbuilder.com", "CareerBuilder"),
	("dice.com", "Dice"),
	("ziprecruiter.com", "ZipRecruiter"),
	("simplyhired.com", "SimplyHired"),
	("lever.co", "Lever"),
	("greenhouse.io", "Greenhouse"),
	("workday.com", "Workday"),
];

pub struct HttpFetcher {
	client: Client,
	retry: RetryPolicy,
	extractor: Extractor,
}

impl HttpFetcher {
	pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self> {
		let mut headers = HeaderMap::new();
		headers.insert(
			ACCEPT,
			HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
		);

		Ok(Self {
			client: build_client(SERVICE, timeout, headers)?,
			retry,
			extractor: Extractor::new(),
		})
	}
}

impl PageFetcher for HttpFetcher {
	fn fetch(&self, url: &str) -> Result<Page> {
		let html = self.retry.run(url, || {
			let resp = self.client.get(url).send().map_err(|e| transport_error(SERVICE, e))?;
			check_status(SERVICE, resp)?
				.text()
				.map_err(|e| Error::external(SERVICE, format!("unreadable body from {}: {}", url, e), true))
		})?;

		require_text(url, self.extractor.extract(&html))
	}
}

/// Pages whose text has no words cannot be fingerprinted and are rejected
fn require_text(url: &str, page: Page) -> Result<Page> {
	if normalize_text(&page.text).is_empty() {
		return Err(Error::external(SERVICE, format!("no text content at {}", url), false));
	}
	Ok(page)
}

/// Pre-parsed selectors for job pages
pub struct Extractor {
	title: Vec<Selector>,
	company: Vec<Selector>,
	location: Vec<Selector>,
	content: Vec<Selector>,
	body: Vec<Selector>,
}

impl Default for Extractor {
	fn default() -> Self {
		Self::new()
	}
}

impl Extractor {
	pub fn new() -> Self {
		Self {
			title: parse_all(TITLE_SELECTORS),
			company: parse_all(COMPANY_SELECTORS),
			location: parse_all(LOCATION_SELECTORS),
			content: parse_all(CONTENT_SELECTORS),
			body: parse_all(&["body"]),
		}
	}

	pub fn extract(&self, html: &str) -> Page {
		let document = Html::parse_document(html);

		let root = first_match(&document, &self.content)
			.or_else(|| first_match(&document, &self.body))
			.unwrap_or_else(|| document.root_element());

		let mut pieces = Vec::new();
		collect_text(root, &mut pieces);

		Page {
			title: first_text(&document, &self.title),
			company: first_text(&document, &self.company),
			location: first_text(&document, &self.location),
			text: pieces.join("\n"),
		}
	}
}

/// Site name for a listing URL: a known job board, else the capitalized domain name
pub fn identify_source(url: &str) -> String {
	let host = host_of(url);

	for (domain, name) in JOB_SITES {
		if host.contains(domain) {
			return name.to_string();
		}
	}

	let parts: Vec<&str> = host.split('.').collect();
	if parts.len() > 1 {
		capitalize(parts[parts.len() - 2])
	} else {
		host
	}
}

fn host_of(url: &str) -> String {
	let rest = url.split("://").nth(1).unwrap_or(url);
	let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
	let host = host.rsplit('@').next().unwrap_or(host);
	host.split(':').next().unwrap_or(host).to_lowercase()
}

fn capitalize(word: &str) -> String {
	let mut chars = word.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars).collect(),
		None => String::new(),
	}
}

fn parse_all(selectors: &[&str]) -> Vec<Selector> {
	selectors.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

fn first_match<'a>(document: &'a Html, selectors: &[Selector]) -> Option<ElementRef<'a>> {
	selectors.iter().find_map(|s| document.select(s).next())
}

fn first_text(document: &Html, selectors: &[Selector]) -> Option<String> {
	selectors.iter().find_map(|s| {
		document
			.select(s)
			.map(|el| collapse_whitespace(&el.text().collect::<String>()))
			.find(|t| !t.is_empty())
	})
}

fn is_skipped(element: &ElementRef<'_>) -> bool {
	let value = element.value();
	SKIPPED_TAGS.contains(&value.name()) || value.classes().any(|c| SKIPPED_CLASSES.contains(&c))
}

fn collect_text(element: ElementRef<'_>, out: &mut Vec<String>) {
	for child in element.children() {
		if let Some(child_el) = ElementRef::wrap(child) {
			if !is_skipped(&child_el) {
				collect_text(child_el, out);
			}
		} else if let Some(text) = child.value().as_text() {
			let text = collapse_whitespace(text);
			if !text.is_empty() {
				out.push(text);
			}
		}
	}
}

fn collapse_whitespace(input: &str) -> String {
	input.split_whitespace().collect::<Vec<_>>().join(" ")
}
