//! Shared HTTP plumbing for the external clients

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use crate::config::USER_AGENT;
use crate::error::{Error, Result};

pub fn build_client(service: &'static str, timeout: Duration, headers: HeaderMap) -> Result<Client> {
	Client::builder()
		.timeout(timeout)
		.user_agent(USER_AGENT)
		.default_headers(headers)
		.redirect(reqwest::redirect::Policy::limited(5))
		.build()
		.map_err(|e| Error::Configuration(format!("failed to build {} HTTP client: {}", service, e)))
}

/// 429 and 5xx are worth retrying; other failures are not
pub fn should_retry(status: StatusCode) -> bool {
	status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub fn transport_error(service: &'static str, err: reqwest::Error) -> Error {
	let retryable = err.is_timeout() || err.is_connect() || err.is_body() || err.is_request();
	Error::external(service, err.to_string(), retryable)
}

/// Pass successful responses through, turn the rest into `ExternalService` errors
pub fn check_status(service: &'static str, resp: Response) -> Result<Response> {
	let status = resp.status();
	if status.is_success() {
		return Ok(resp);
	}

	let body = resp.text().unwrap_or_else(|_| "<body unavailable>".to_string());
	let body: String = body.chars().take(300).collect();
	Err(Error::external(
		service,
		format!("request failed ({}): {}", status, body),
		should_retry(status),
	))
}
