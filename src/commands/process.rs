//! Process command - metadata extraction and embeddings

use std::time::Instant;

use anyhow::{bail, Result};

use crate::pipeline::process::{process, ProcessOptions};
use crate::ui;

use super::Context;

pub fn run(ctx: &Context, batch_size: Option<usize>, max_listings: Option<usize>, listing_id: Option<String>) -> Result<()> {
	let llm = ctx.language_model()?;
	let options = ProcessOptions {
		batch_size: batch_size.unwrap_or(ctx.settings.batch_size).max(1),
		max_listings,
		listing_id,
	};

	let start = Instant::now();
	let outcome = process(&ctx.store, &llm, &options, ctx.settings.workers, &ctx.checkpoint())?;

	if outcome.pending == 0 {
		ui::info("No listings need processing");
		return Ok(());
	}

	ui::success(&format!(
		"Processed {} of {} listings ({} embeddings) in {:.1}s",
		outcome.processed,
		outcome.pending,
		outcome.embedded,
		start.elapsed().as_secs_f32()
	));

	if let Some(err) = outcome.error() {
		for failure in &outcome.failures {
			ui::debug(failure);
		}
		bail!(err);
	}
	Ok(())
}
