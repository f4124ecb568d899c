//! Setup command - create the store layout

use anyhow::Result;

use crate::storage::Store;
use crate::ui;

use super::Context;

pub fn run(ctx: &Context) -> Result<()> {
	ctx.store.ping()?;
	ui::success(&format!("Store ready at {}", ctx.store.root().display()));

	let listings = ctx.store.list_listings(None)?.len();
	ui::field("Listings", listings);
	ui::field("Clusters", ctx.store.list_clusters()?.len());
	if let Some(dim) = ctx.store.embedding_dim() {
		ui::field("Embedding dimension", dim);
	}
	report_lock(&ctx.store)?;

	if ctx.settings.require_openai().is_err() {
		ui::warn("OPENAI_API_KEY is not set; process, cluster summaries and text search are unavailable");
	}
	if let Err(e) = ctx.settings.require_google() {
		ui::warn(&format!("{}; collect is unavailable", e));
	}
	Ok(())
}

fn report_lock(store: &Store) -> Result<()> {
	if let Some(lock) = store.read_lock()? {
		ui::warn(&format!(
			"Run lock held by {} (last heartbeat {})",
			lock.owner,
			lock.heartbeat.format("%Y-%m-%d %H:%M:%S")
		));
	}
	Ok(())
}
