//! Search command - semantic search over active listings

use anyhow::{anyhow, Result};
use colored::*;

use crate::cli::{OutputFormat, SearchTarget};
use crate::search::{search, Match, SearchMode, SearchParams};
use crate::services::LanguageModel;
use crate::ui;

use super::Context;

pub fn run(ctx: &Context, target: SearchTarget, limit: usize, threshold: Option<f32>, output: OutputFormat) -> Result<()> {
	let mode = target
		.into_mode()
		.ok_or_else(|| anyhow!("Provide one of --query, --skills, --field, --company-role, --cluster or --similar-to"))?;

	let client = if mode.needs_language_model() {
		Some(ctx.language_model()?)
	} else {
		None
	};
	let llm = client.as_ref().map(|c| c as &dyn LanguageModel);

	let params = SearchParams {
		limit,
		threshold: threshold.unwrap_or(ctx.settings.search_threshold),
	};

	if output == OutputFormat::Text {
		ui::info(&format!("Searching: {}", describe(&mode).bright_blue()));
	}
	let matches = search(&ctx.store, llm, &mode, params)?;

	match output {
		OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&matches)?),
		OutputFormat::Text => print_matches(&matches),
	}
	Ok(())
}

fn describe(mode: &SearchMode) -> String {
	match mode {
		SearchMode::Cluster(id) => format!("members of cluster {}", id),
		SearchMode::SimilarTo(id) => format!("similar to listing {}", id),
		other => other.query_text().unwrap_or_default(),
	}
}

fn print_matches(matches: &[Match]) {
	if matches.is_empty() {
		ui::warn("No matches found");
		return;
	}

	ui::success(&format!("Found {} matches", matches.len()));
	println!();

	for (i, m) in matches.iter().enumerate() {
		let rank = format!("#{}", i + 1).bright_blue().bold();
		let score = m
			.score
			.map(|s| format!("{:.0}%", s * 100.0))
			.unwrap_or_default()
			.dimmed();
		let company = format!("@ {}", m.company).yellow();
		println!("  {} {} {} {}", rank, m.title.bright_white(), company, score);

		let mut details = Vec::new();
		if let Some(field) = &m.field {
			details.push(field.as_str());
		}
		if let Some(location) = &m.location {
			details.push(location.as_str());
		}
		if !details.is_empty() {
			println!("     {}", details.join(" · ").dimmed());
		}
		println!("     {}", ui::link(&m.url, 70));
	}
	println!();
}
