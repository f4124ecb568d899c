//! Application configuration and constants
//!
//! Settings come from the process environment (after loading `.env`), with
//! every tunable falling back to the constants below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// === Store Layout ===
pub const DEFAULT_DATABASE_URL: &str = "file://.jobscout";
pub const LISTINGS_DIR: &str = "listings";
pub const EMBEDDINGS_DIR: &str = "embeddings";
pub const CLUSTERS_DIR: &str = "clusters";
pub const REPORTS_DIR: &str = "reports";
pub const META_FILE: &str = "meta.json";
pub const LOCK_FILE: &str = "run.lock";
pub const DOCUMENT_EXT: &str = "msgpack";
pub const SCHEMA_VERSION: u32 = 1;

// === External Services ===
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const GOOGLE_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";
pub const DEFAULT_OPENAI_RPM: u32 = 100;
pub const DEFAULT_GOOGLE_RPM: u32 = 60;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const USER_AGENT: &str = concat!("jobscout/", env!("CARGO_PKG_VERSION"));

// === Retry ===
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_MS: u64 = 1000;
pub const DEFAULT_RETRY_JITTER_MS: u64 = 250;

// === Processing ===
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const MAX_EMBEDDING_CHARS: usize = 8000;
pub const MAX_PROMPT_CHARS: usize = 12000;

// === Maintenance ===
pub const DEFAULT_MAX_AGE_DAYS: i64 = 30;
pub const DEFAULT_MAX_LISTINGS: usize = 1000;
pub const DEFAULT_DUPLICATE_THRESHOLD: f32 = 0.9;
pub const DEFAULT_LOCK_STALE_SECS: u64 = 6 * 60 * 60;

// === Clustering ===
pub const DEFAULT_MIN_CLUSTER_SIZE: usize = 2;
pub const SUMMARY_SAMPLE_SIZE: usize = 5;
pub const COMMON_SKILLS_LIMIT: usize = 10;

// === Search Defaults ===
pub const DEFAULT_LIMIT: usize = 10;
pub const DEFAULT_SEARCH_THRESHOLD: f32 = 0.7;
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Engineering fields the metadata extractor may assign. Anything else maps to `Other`.
pub const ENGINEERING_FIELDS: &[&str] = &[
	"Software Engineering",
	"Electrical Engineering",
	"Mechanical Engineering",
	"Civil Engineering",
	"Chemical Engineering",
	"Aerospace Engineering",
	"Biomedical Engineering",
	"Computer Engineering",
	"Industrial Engineering",
	"Data Science",
	"Other",
];

pub const DEFAULT_COMPANIES: &[&str] = &[
	"Google", "Microsoft", "Apple", "Amazon", "Meta", "NVIDIA", "Intel", "Tesla", "Boeing", "SpaceX",
];

pub const DEFAULT_KEYWORDS: &[&str] = &["internship", "new grad", "entry level", "co-op"];

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
	pub api_key: String,
	pub base_url: String,
	pub chat_model: String,
	pub embedding_model: String,
	pub rpm: u32,
}

#[derive(Debug, Clone)]
pub struct GoogleSettings {
	pub api_key: String,
	pub cse_id: String,
	pub rpm: u32,
}

#[derive(Debug, Clone)]
pub struct Settings {
	pub store_path: PathBuf,
	pub openai_api_key: Option<String>,
	pub openai_base_url: String,
	pub chat_model: String,
	pub embedding_model: String,
	pub openai_rpm: u32,
	pub google_api_key: Option<String>,
	pub google_cse_id: Option<String>,
	pub google_rpm: u32,
	pub http_timeout: Duration,
	pub workers: usize,
	pub batch_size: usize,
	pub retry_attempts: u32,
	pub retry_base: Duration,
	pub retry_jitter: Duration,
	pub max_age_days: i64,
	pub max_listings: usize,
	pub duplicate_threshold: f32,
	pub lock_stale_after: Duration,
	pub min_cluster_size: usize,
	pub search_threshold: f32,
	pub targets_path: Option<PathBuf>,
}

impl Settings {
	/// Load `.env` (if present) and read settings from the environment
	pub fn from_env() -> Result<Self> {
		if let Ok(path) = dotenvy::dotenv() {
			tracing::debug!(path = %path.display(), "loaded .env");
		}
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
		let get = |key: &str| lookup(key).map(|v| strip_comment(&v)).filter(|v| !v.is_empty());

		let database_url = get("JOBSCOUT_DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

		let settings = Self {
			store_path: parse_database_url(&database_url)?,
			openai_api_key: get("OPENAI_API_KEY"),
			openai_base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
			chat_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
			embedding_model: get("OPENAI_EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
			openai_rpm: parse_or("OPENAI_RPM", get("OPENAI_RPM"), DEFAULT_OPENAI_RPM)?,
			google_api_key: get("GOOGLE_API_KEY"),
			google_cse_id: get("GOOGLE_CSE_ID"),
			google_rpm: parse_or("GOOGLE_RPM", get("GOOGLE_RPM"), DEFAULT_GOOGLE_RPM)?,
			http_timeout: Duration::from_secs(parse_or(
				"JOBSCOUT_HTTP_TIMEOUT_SECS",
				get("JOBSCOUT_HTTP_TIMEOUT_SECS"),
				DEFAULT_HTTP_TIMEOUT_SECS,
			)?),
			workers: parse_or("JOBSCOUT_WORKERS", get("JOBSCOUT_WORKERS"), DEFAULT_WORKERS)?,
			batch_size: parse_or("JOBSCOUT_BATCH_SIZE", get("JOBSCOUT_BATCH_SIZE"), DEFAULT_BATCH_SIZE)?,
			retry_attempts: parse_or("JOBSCOUT_RETRY_ATTEMPTS", get("JOBSCOUT_RETRY_ATTEMPTS"), DEFAULT_RETRY_ATTEMPTS)?,
			retry_base: Duration::from_millis(parse_or(
				"JOBSCOUT_RETRY_BASE_MS",
				get("JOBSCOUT_RETRY_BASE_MS"),
				DEFAULT_RETRY_BASE_MS,
			)?),
			retry_jitter: Duration::from_millis(parse_or(
				"JOBSCOUT_RETRY_JITTER_MS",
				get("JOBSCOUT_RETRY_JITTER_MS"),
				DEFAULT_RETRY_JITTER_MS,
			)?),
			max_age_days: parse_or("JOBSCOUT_MAX_AGE_DAYS", get("JOBSCOUT_MAX_AGE_DAYS"), DEFAULT_MAX_AGE_DAYS)?,
			max_listings: parse_or("JOBSCOUT_MAX_LISTINGS", get("JOBSCOUT_MAX_LISTINGS"), DEFAULT_MAX_LISTINGS)?,
			duplicate_threshold: parse_or(
				"JOBSCOUT_DUPLICATE_THRESHOLD",
				get("JOBSCOUT_DUPLICATE_THRESHOLD"),
				DEFAULT_DUPLICATE_THRESHOLD,
			)?,
			lock_stale_after: Duration::from_secs(parse_or(
				"JOBSCOUT_LOCK_STALE_SECS",
				get("JOBSCOUT_LOCK_STALE_SECS"),
				DEFAULT_LOCK_STALE_SECS,
			)?),
			min_cluster_size: parse_or(
				"JOBSCOUT_MIN_CLUSTER_SIZE",
				get("JOBSCOUT_MIN_CLUSTER_SIZE"),
				DEFAULT_MIN_CLUSTER_SIZE,
			)?,
			search_threshold: parse_or(
				"JOBSCOUT_SEARCH_THRESHOLD",
				get("JOBSCOUT_SEARCH_THRESHOLD"),
				DEFAULT_SEARCH_THRESHOLD,
			)?,
			targets_path: get("JOBSCOUT_TARGETS").map(PathBuf::from),
		};

		settings.validate()?;
		Ok(settings)
	}

	fn validate(&self) -> Result<()> {
		if self.workers == 0 {
			return Err(Error::Configuration("JOBSCOUT_WORKERS must be at least 1".into()));
		}
		if self.retry_attempts == 0 {
			return Err(Error::Configuration("JOBSCOUT_RETRY_ATTEMPTS must be at least 1".into()));
		}
		if self.max_age_days < 0 {
			return Err(Error::Configuration("JOBSCOUT_MAX_AGE_DAYS must not be negative".into()));
		}
		if !(0.0..=1.0).contains(&self.duplicate_threshold) {
			return Err(Error::Configuration(format!(
				"JOBSCOUT_DUPLICATE_THRESHOLD must be between 0.0 and 1.0, got {}",
				self.duplicate_threshold
			)));
		}
		if !(0.0..=1.0).contains(&self.search_threshold) {
			return Err(Error::Configuration(format!(
				"JOBSCOUT_SEARCH_THRESHOLD must be between 0.0 and 1.0, got {}",
				self.search_threshold
			)));
		}
		if self.min_cluster_size < 2 {
			return Err(Error::Configuration("JOBSCOUT_MIN_CLUSTER_SIZE must be at least 2".into()));
		}
		if self.openai_rpm == 0 || self.google_rpm == 0 {
			return Err(Error::Configuration("rate limits must be at least 1 request per minute".into()));
		}
		Ok(())
	}

	/// Language model credentials; required by `process`, `cluster` summaries, `search` and `update`
	pub fn require_openai(&self) -> Result<OpenAiSettings> {
		let api_key = self
			.openai_api_key
			.clone()
			.ok_or_else(|| Error::Configuration("OPENAI_API_KEY must be set".into()))?;

		Ok(OpenAiSettings {
			api_key,
			base_url: self.openai_base_url.clone(),
			chat_model: self.chat_model.clone(),
			embedding_model: self.embedding_model.clone(),
			rpm: self.openai_rpm,
		})
	}

	/// Search engine credentials; required by `collect` and `update`
	pub fn require_google(&self) -> Result<GoogleSettings> {
		let api_key = self
			.google_api_key
			.clone()
			.ok_or_else(|| Error::Configuration("GOOGLE_API_KEY must be set".into()))?;
		let cse_id = self
			.google_cse_id
			.clone()
			.ok_or_else(|| Error::Configuration("GOOGLE_CSE_ID must be set".into()))?;

		Ok(GoogleSettings {
			api_key,
			cse_id,
			rpm: self.google_rpm,
		})
	}

	pub fn targets(&self) -> Result<Targets> {
		match &self.targets_path {
			Some(path) => Targets::load(path),
			None => Ok(Targets::default()),
		}
	}
}

/// Companies, fields and keywords the collector searches for
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Targets {
	pub companies: Vec<String>,
	pub fields: Vec<String>,
	pub keywords: Vec<String>,
	pub max_results_per_query: usize,
}

impl Default for Targets {
	fn default() -> Self {
		Self {
			companies: DEFAULT_COMPANIES.iter().map(|s| s.to_string()).collect(),
			fields: ENGINEERING_FIELDS
				.iter()
				.filter(|f| **f != "Other")
				.map(|s| s.to_string())
				.collect(),
			keywords: DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
			max_results_per_query: DEFAULT_MAX_RESULTS,
		}
	}
}

impl Targets {
	pub fn load(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path)
			.map_err(|e| Error::Configuration(format!("cannot read targets file {}: {}", path.display(), e)))?;
		serde_json::from_str(&text)
			.map_err(|e| Error::Configuration(format!("invalid targets file {}: {}", path.display(), e)))
	}
}

/// Drop a trailing `# comment` from an environment value
fn strip_comment(value: &str) -> String {
	value.split('#').next().unwrap_or_default().trim().to_string()
}

fn parse_or<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
	match value {
		Some(raw) => raw
			.parse()
			.map_err(|_| Error::Configuration(format!("{} has invalid value '{}'", key, raw))),
		None => Ok(default),
	}
}

/// Accepts `file://path` or a bare path
fn parse_database_url(url: &str) -> Result<PathBuf> {
	if let Some(path) = url.strip_prefix("file://") {
		if path.is_empty() {
			return Err(Error::Configuration("JOBSCOUT_DATABASE_URL has an empty path".into()));
		}
		return Ok(PathBuf::from(path));
	}
	if url.contains("://") {
		return Err(Error::Configuration(format!(
			"JOBSCOUT_DATABASE_URL scheme not supported: {}",
			url
		)));
	}
	Ok(PathBuf::from(url))
}
