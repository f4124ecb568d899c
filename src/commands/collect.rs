//! Collect command - search the web and store new listings

use std::time::Instant;

use anyhow::{bail, Result};
use chrono::Utc;

use crate::cli::CollectType;
use crate::pipeline::collect::{collect, CollectOptions};
use crate::ui;

use super::Context;

pub fn run(ctx: &Context, kind: Option<CollectType>, specific: Option<String>, max_results: Option<usize>) -> Result<()> {
	let search = ctx.search_provider()?;
	let fetcher = ctx.fetcher()?;
	let targets = ctx.settings.targets()?;

	let options = CollectOptions {
		kind: kind.map(Into::into),
		specific,
		max_results,
	};

	let start = Instant::now();
	let outcome = collect(
		&ctx.store,
		&search,
		&fetcher,
		&targets,
		&options,
		ctx.settings.workers,
		&ctx.checkpoint(),
		Utc::now(),
	)?;

	ui::success(&format!(
		"Collected {} new listings from {} queries in {:.1}s",
		outcome.collected,
		outcome.queries,
		start.elapsed().as_secs_f32()
	));
	if outcome.reobserved > 0 {
		ui::info(&format!("{} known listings seen again", outcome.reobserved));
	}

	if let Some(err) = outcome.error() {
		for failure in &outcome.failures {
			ui::debug(failure);
		}
		bail!(err);
	}
	Ok(())
}
