//! # Command Implementations
//!
//! Each submodule handles one CLI command. [`Context`] carries what every
//! command needs: settings, the opened store and the interrupt flag.

pub mod cluster;
pub mod collect;
pub mod process;
pub mod search;
pub mod setup;
pub mod update;

use anyhow::{Context as _, Result};

use crate::config::Settings;
use crate::pipeline::{CancelFlag, Checkpoint};
use crate::services::{GoogleSearch, HttpFetcher, OpenAiClient, RetryPolicy};
use crate::storage::Store;

pub struct Context {
	pub settings: Settings,
	pub store: Store,
	pub cancel: CancelFlag,
}

impl Context {
	/// Load settings and open (creating if needed) the store
	pub fn open(settings: Settings) -> Result<Self> {
		let store = Store::open(&settings.store_path)
			.with_context(|| format!("cannot open store at {}", settings.store_path.display()))?;
		crate::ui::debug(&format!("Store: {}", store.root().display()));

		Ok(Self {
			settings,
			store,
			cancel: CancelFlag::on_interrupt(),
		})
	}

	/// Checkpoint for standalone stages, which run without the update lock
	pub fn checkpoint(&self) -> Checkpoint<'static> {
		Checkpoint::new(self.cancel.clone())
	}

	pub fn retry(&self) -> RetryPolicy {
		RetryPolicy::from_settings(&self.settings)
	}

	pub fn language_model(&self) -> Result<OpenAiClient> {
		let openai = self.settings.require_openai()?;
		Ok(OpenAiClient::new(&openai, self.settings.http_timeout, self.retry())?)
	}

	pub fn search_provider(&self) -> Result<GoogleSearch> {
		let google = self.settings.require_google()?;
		Ok(GoogleSearch::new(&google, self.settings.http_timeout, self.retry())?)
	}

	pub fn fetcher(&self) -> Result<HttpFetcher> {
		Ok(HttpFetcher::new(self.settings.http_timeout, self.retry())?)
	}
}
