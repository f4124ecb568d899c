//! External collaborators: web search, page fetching and the language model
//!
//! Each is a trait so pipeline stages can run against fakes. The concrete
//! clients share one [`RetryPolicy`].

pub mod fetcher;
pub mod google;
pub mod http;
pub mod openai;
pub mod retry;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use fetcher::HttpFetcher;
pub use google::GoogleSearch;
pub use openai::OpenAiClient;
pub use retry::{RateLimiter, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
	pub title: String,
	pub url: String,
	pub snippet: String,
}

/// Text and metadata pulled from a job page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
	pub title: Option<String>,
	pub company: Option<String>,
	pub location: Option<String>,
	pub text: String,
}

pub trait SearchProvider: Send + Sync {
	fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

pub trait PageFetcher: Send + Sync {
	fn fetch(&self, url: &str) -> Result<Page>;
}

pub trait LanguageModel: Send + Sync {
	/// Chat completion with a system and a user message
	fn complete(&self, system: &str, user: &str) -> Result<String>;

	fn embed(&self, text: &str) -> Result<Vec<f32>>;

	fn embedding_model(&self) -> &str;
}
