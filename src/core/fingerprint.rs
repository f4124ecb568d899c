//! Content fingerprints and URL-derived listing identifiers

use std::collections::HashSet;

use xxhash_rust::xxh3::xxh3_64;

/// 16 hex digit xxh3 digest of normalized text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
	/// Fingerprint of a listing's raw text. Whitespace, case and punctuation do not matter.
	///
	/// `None` when the text has no words, since every such page would share one digest.
	pub fn compute(raw_text: &str) -> Option<Self> {
		let normalized = normalize_text(raw_text);
		if normalized.is_empty() {
			return None;
		}
		Some(Self(hex(&normalized)))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl std::fmt::Display for Fingerprint {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Stable listing id: hash of the normalized URL, so re-collecting a page yields the same id
pub fn listing_id(url: &str) -> String {
	hex(&normalize_url(url))
}

/// Lowercase, drop the fragment, trailing slash and `www.`
pub fn normalize_url(url: &str) -> String {
	let url = url.trim();
	let url = url.split('#').next().unwrap_or(url);
	let lowered = url.to_lowercase();
	let without_scheme = lowered
		.strip_prefix("https://")
		.or_else(|| lowered.strip_prefix("http://"))
		.unwrap_or(&lowered);
	let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
	without_www.trim_end_matches('/').to_string()
}

/// Lowercase alphanumeric words separated by single spaces
pub fn normalize_text(text: &str) -> String {
	text.split(|c: char| !c.is_alphanumeric())
		.filter(|w| !w.is_empty())
		.map(|w| w.to_lowercase())
		.collect::<Vec<_>>()
		.join(" ")
}

/// Key used to pair near-duplicate candidates: normalized company and title
pub fn company_title_key(company: &str, title: &str) -> (String, String) {
	(normalize_text(company), normalize_text(title))
}

/// Jaccard similarity of the normalized word sets, in [0.0, 1.0]
pub fn text_similarity(a: &str, b: &str) -> f32 {
	let a_norm = normalize_text(a);
	let b_norm = normalize_text(b);
	let words_a: HashSet<&str> = a_norm.split(' ').filter(|w| !w.is_empty()).collect();
	let words_b: HashSet<&str> = b_norm.split(' ').filter(|w| !w.is_empty()).collect();

	if words_a.is_empty() && words_b.is_empty() {
		return 1.0;
	}

	let intersection = words_a.intersection(&words_b).count();
	let union = words_a.union(&words_b).count();
	intersection as f32 / union as f32
}

fn hex(text: &str) -> String {
	format!("{:016x}", xxh3_64(text.as_bytes()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fingerprint_ignores_formatting() {
		let a = Fingerprint::compute("Software Engineer\n\nBuild  things!").unwrap();
		let b = Fingerprint::compute("software engineer build things").unwrap();
		assert_eq!(a, b);
		assert_eq!(a.as_str().len(), 16);
	}

	#[test]
	fn wordless_text_has_no_fingerprint() {
		assert!(Fingerprint::compute("").is_none());
		assert!(Fingerprint::compute("  --- *** !!! \n ...").is_none());
		assert!(Fingerprint::compute("-- a --").is_some());
	}

	#[test]
	fn listing_id_stable_across_url_variants() {
		assert_eq!(
			listing_id("https://www.Example.com/jobs/123/"),
			listing_id("http://example.com/jobs/123#apply")
		);
		assert_ne!(listing_id("https://example.com/jobs/1"), listing_id("https://example.com/jobs/2"));
	}

	#[test]
	fn similarity_bounds() {
		assert_eq!(text_similarity("a b c", "a b c"), 1.0);
		assert_eq!(text_similarity("a b", "c d"), 0.0);
		let half = text_similarity("a b c", "a b d");
		assert!((half - 0.5).abs() < 1e-6);
	}

	#[test]
	fn company_title_key_normalizes() {
		assert_eq!(
			company_title_key("ACME, Inc.", "Software Engineer - Intern"),
			company_title_key("acme inc", "software engineer intern")
		);
	}
}
