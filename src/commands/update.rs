//! Update command - orchestrated maintenance runs and statistics

use anyhow::{bail, Result};
use chrono::Utc;
use colored::*;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::core::UpdateReport;
use crate::pipeline::stats::{gather, Stats};
use crate::pipeline::{Orchestrator, Services, UpdateConfig, UpdateOptions};
use crate::services::{GoogleSearch, HttpFetcher, LanguageModel, OpenAiClient, PageFetcher, SearchProvider};
use crate::ui;

use super::Context;

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateFlags {
	pub daily: bool,
	pub mark_expired: bool,
	pub remove_duplicates: bool,
	pub maintain_count: bool,
	pub stats: bool,
}

impl UpdateFlags {
	pub fn options(&self) -> UpdateOptions {
		if self.daily {
			return UpdateOptions::daily();
		}
		UpdateOptions {
			deduplicate: self.remove_duplicates,
			expire: self.mark_expired,
			retain: self.maintain_count,
			..Default::default()
		}
	}
}

pub fn run(ctx: &Context, flags: UpdateFlags, output: OutputFormat) -> Result<()> {
	let options = flags.options();

	if options.is_empty() {
		if !flags.stats {
			ui::info("Nothing selected; showing statistics (see 'jobscout update --help')");
		}
		return print_stats(&gather(&ctx.store, Utc::now())?, output);
	}

	let report = run_update(ctx, &options)?;
	let stats = if flags.stats {
		Some(gather(&ctx.store, Utc::now())?)
	} else {
		None
	};

	match output {
		OutputFormat::Json => {
			let combined = UpdateOutput {
				report: &report,
				stats: stats.as_ref(),
			};
			println!("{}", serde_json::to_string_pretty(&combined)?);
		}
		OutputFormat::Text => {
			print_report(&report);
			if let Some(stats) = &stats {
				print_stats(stats, output)?;
			}
		}
	}

	if report.has_errors() {
		bail!("update {} finished with {} error(s)", report.id, report.errors.len());
	}
	Ok(())
}

fn run_update(ctx: &Context, options: &UpdateOptions) -> Result<UpdateReport> {
	// Clients are built only for the stages that need them
	let search: Option<GoogleSearch> = options.collect.then(|| ctx.search_provider()).transpose()?;
	let fetcher: Option<HttpFetcher> = options.collect.then(|| ctx.fetcher()).transpose()?;
	let llm: Option<OpenAiClient> = (options.process || options.cluster)
		.then(|| ctx.language_model())
		.transpose()?;

	let services = Services {
		search: search.as_ref().map(|s| s as &dyn SearchProvider),
		fetcher: fetcher.as_ref().map(|f| f as &dyn PageFetcher),
		llm: llm.as_ref().map(|l| l as &dyn LanguageModel),
	};

	let config = UpdateConfig::from_settings(&ctx.settings, ctx.settings.targets()?);
	let orchestrator = Orchestrator::new(&ctx.store, services, config, ctx.cancel.clone());
	ui::debug(&format!("Run owner: {}", orchestrator.owner()));

	Ok(orchestrator.run(options)?)
}

/// JSON document printed after a run, one per invocation
#[derive(Serialize)]
struct UpdateOutput<'a> {
	report: &'a UpdateReport,
	#[serde(skip_serializing_if = "Option::is_none")]
	stats: Option<&'a Stats>,
}

fn print_report(report: &UpdateReport) {
	ui::header("─── Update Report ───");
	ui::field("Run", &report.id);
	ui::field("Started", report.started_at.format("%Y-%m-%d %H:%M:%S"));
	if let Some(finished) = report.finished_at {
		let secs = (finished - report.started_at).num_milliseconds() as f64 / 1000.0;
		ui::field("Duration", format!("{:.1}s", secs));
	}
	ui::field("Collected listings", report.collected);
	ui::field("Seen again", report.reobserved);
	ui::field("Processed listings", report.processed);
	ui::field("Clusters", report.clusters);
	ui::field("Summaries", report.summaries);
	ui::field("Duplicates marked", report.duplicates_marked);
	ui::field("Expired listings", report.expired);
	ui::field("Removed for capacity", report.removed_for_capacity);
	ui::field("Active listings", report.active_after);

	if report.has_errors() {
		println!();
		for err in &report.errors {
			ui::error(&format!("{} [{}] {}", err.stage.to_string().yellow(), err.kind, err.message));
		}
	} else {
		ui::success("Completed without errors");
	}
}

fn print_stats(stats: &Stats, output: OutputFormat) -> Result<()> {
	if output == OutputFormat::Json {
		println!("{}", serde_json::to_string_pretty(stats)?);
		return Ok(());
	}

	let date = |d: Option<chrono::DateTime<Utc>>| {
		d.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
			.unwrap_or_else(|| "n/a".to_string())
	};

	ui::header("─── Job Database Statistics ───");
	ui::field("Total listings", stats.total);
	ui::field("Active", stats.active);
	ui::field("Expired", stats.expired);
	ui::field("Duplicate", stats.duplicate);
	ui::field("Processed", stats.processed);
	ui::field("Embeddings", stats.embeddings);
	ui::field("Clusters", format!("{} ({} summarized)", stats.clusters, stats.summarized_clusters));
	ui::field("Newest listing", date(stats.newest_listing));
	ui::field("Oldest listing", date(stats.oldest_listing));
	ui::field("Last update", date(stats.last_update.as_ref().and_then(|r| r.finished_at)));
	ui::field("Generated", stats.generated_at.format("%Y-%m-%d %H:%M:%S"));
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn daily_overrides_individual_flags() {
		let flags = UpdateFlags {
			daily: true,
			mark_expired: true,
			..Default::default()
		};
		assert_eq!(flags.options(), UpdateOptions::daily());
	}

	#[test]
	fn maintenance_flags_map_to_stages() {
		let flags = UpdateFlags {
			mark_expired: true,
			maintain_count: true,
			..Default::default()
		};
		let options = flags.options();
		assert!(options.expire && options.retain);
		assert!(!options.collect && !options.deduplicate);
		assert!(UpdateFlags::default().options().is_empty());
	}
}
