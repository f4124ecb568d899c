//! OpenAI-compatible chat completion and embedding client

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::http::{build_client, check_status, transport_error};
use super::retry::{RateLimiter, RetryPolicy};
use super::LanguageModel;
use crate::config::OpenAiSettings;
use crate::error::{Error, Result};

const SERVICE: &str = "openai";

pub struct OpenAiClient {
	client: Client,
	base_url: String,
	chat_model: String,
	embedding_model: String,
	retry: RetryPolicy,
	limiter: RateLimiter,
}

impl OpenAiClient {
	pub fn new(settings: &OpenAiSettings, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
		let mut headers = HeaderMap::new();
		let auth = format!("Bearer {}", settings.api_key.trim());
		headers.insert(
			AUTHORIZATION,
			HeaderValue::from_str(&auth).map_err(|_| Error::Configuration("invalid OpenAI API key".into()))?,
		);
		headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Ok(Self {
			client: build_client(SERVICE, timeout, headers)?,
			base_url: settings.base_url.trim_end_matches('/').to_string(),
			chat_model: settings.chat_model.clone(),
			embedding_model: settings.embedding_model.clone(),
			retry,
			limiter: RateLimiter::per_minute(settings.rpm),
		})
	}

	fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(&self, path: &str, body: &Req) -> Result<Resp> {
		let endpoint = format!("{}/{}", self.base_url, path);
		self.retry.run(path, || {
			self.limiter.wait();
			let resp = self
				.client
				.post(&endpoint)
				.json(body)
				.send()
				.map_err(|e| transport_error(SERVICE, e))?;
			check_status(SERVICE, resp)?
				.json::<Resp>()
				.map_err(|e| Error::external(SERVICE, format!("unexpected response from {}: {}", path, e), false))
		})
	}
}

impl LanguageModel for OpenAiClient {
	fn complete(&self, system: &str, user: &str) -> Result<String> {
		let request = ChatRequest {
			model: &self.chat_model,
			messages: vec![
				ChatMessage { role: "system", content: system },
				ChatMessage { role: "user", content: user },
			],
			temperature: 0.2,
		};

		let response: ChatResponse = self.post("chat/completions", &request)?;
		response
			.choices
			.into_iter()
			.next()
			.and_then(|c| c.message.content)
			.ok_or_else(|| Error::external(SERVICE, "completion returned no content", false))
	}

	fn embed(&self, text: &str) -> Result<Vec<f32>> {
		let request = EmbeddingRequest {
			model: &self.embedding_model,
			input: text,
		};

		let response: EmbeddingResponse = self.post("embeddings", &request)?;
		response
			.data
			.into_iter()
			.next()
			.map(|d| d.embedding)
			.filter(|v| !v.is_empty())
			.ok_or_else(|| Error::external(SERVICE, "embedding response was empty", false))
	}

	fn embedding_model(&self) -> &str {
		&self.embedding_model
	}
}

#[derive(Serialize)]
struct ChatRequest<'a> {
	model: &'a str,
	messages: Vec<ChatMessage<'a>>,
	temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
	role: &'a str,
	content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
	choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
	message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
	content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
	model: &'a str,
	input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
	data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
	embedding: Vec<f32>,
}
