//! Cluster command - create clusters, list them, manage summaries

use std::time::Instant;

use anyhow::{bail, Result};
use chrono::Utc;
use colored::*;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::core::{Cluster, ClusterParams};
use crate::error::Error;
use crate::pipeline::cluster::{recluster, update_summaries};
use crate::ui;

use super::Context;

/// Cluster without its centroid, for display
#[derive(Debug, Serialize)]
struct ClusterView<'a> {
	id: &'a str,
	name: &'a str,
	size: usize,
	cohesion: f32,
	representative: &'a str,
	common_field: Option<&'a str>,
	common_skills: &'a [String],
	summary: Option<&'a str>,
}

impl<'a> From<&'a Cluster> for ClusterView<'a> {
	fn from(c: &'a Cluster) -> Self {
		Self {
			id: &c.id,
			name: &c.name,
			size: c.size(),
			cohesion: c.cohesion,
			representative: &c.representative,
			common_field: c.common_field.as_deref(),
			common_skills: &c.common_skills,
			summary: c.summary.as_deref(),
		}
	}
}

pub fn run(
	ctx: &Context,
	create: bool,
	list: bool,
	regenerate_summaries: bool,
	get_summary: Option<&str>,
	output: OutputFormat,
) -> Result<()> {
	if create {
		create_clusters(ctx)?;
	}
	if regenerate_summaries {
		summarize(ctx)?;
	}

	if let Some(id) = get_summary {
		let Some(cluster) = ctx.store.get_cluster(id)? else {
			bail!(Error::NotFound(format!("cluster {}", id)));
		};
		print_summary(&cluster, output)?;
	}

	let nothing_else = !create && !regenerate_summaries && get_summary.is_none();
	if list || nothing_else {
		print_clusters(&ctx.store.list_clusters()?, output)?;
	}
	Ok(())
}

fn create_clusters(ctx: &Context) -> Result<()> {
	let params = ClusterParams {
		min_cluster_size: ctx.settings.min_cluster_size,
		min_samples: None,
	};

	let start = Instant::now();
	let outcome = recluster(&ctx.store, &params, Utc::now())?;

	ui::success(&format!(
		"Created {} clusters from {} listings in {:.1}s",
		outcome.clusters,
		outcome.clustered + outcome.noise,
		start.elapsed().as_secs_f32()
	));
	if outcome.noise > 0 {
		ui::info(&format!("{} listings did not fit any cluster", outcome.noise));
	}
	Ok(())
}

fn summarize(ctx: &Context) -> Result<()> {
	let llm = ctx.language_model()?;
	let outcome = update_summaries(&ctx.store, &llm, true, &ctx.checkpoint())?;
	ui::success(&format!("Generated {} cluster summaries", outcome.generated));

	if let Some(err) = outcome.error() {
		bail!(err);
	}
	Ok(())
}

fn print_clusters(clusters: &[Cluster], output: OutputFormat) -> Result<()> {
	if output == OutputFormat::Json {
		let views: Vec<ClusterView> = clusters.iter().map(ClusterView::from).collect();
		println!("{}", serde_json::to_string_pretty(&views)?);
		return Ok(());
	}

	if clusters.is_empty() {
		ui::warn("No clusters found. Run 'jobscout cluster --create' first");
		return Ok(());
	}

	ui::header(&format!("─── {} clusters ───", clusters.len()));
	for (i, cluster) in clusters.iter().enumerate() {
		let rank = format!("#{}", i + 1).bright_blue().bold();
		let size = format!("{} listings", cluster.size()).dimmed();
		let cohesion = format!("{:.0}% cohesion", cluster.cohesion * 100.0).dimmed();
		println!("  {} {} {} {}", rank, cluster.name.bright_white(), size, cohesion);
		println!("     {}", cluster.id.dimmed());
		if !cluster.common_skills.is_empty() {
			println!("     {}", cluster.common_skills.join(", ").yellow());
		}
	}
	println!();
	Ok(())
}

fn print_summary(cluster: &Cluster, output: OutputFormat) -> Result<()> {
	if output == OutputFormat::Json {
		println!("{}", serde_json::to_string_pretty(&ClusterView::from(cluster))?);
		return Ok(());
	}

	ui::header(&cluster.name);
	ui::field("Id", &cluster.id);
	ui::field("Listings", cluster.size());
	if let Some(field) = &cluster.common_field {
		ui::field("Field", field);
	}
	if !cluster.common_skills.is_empty() {
		ui::field("Skills", cluster.common_skills.join(", "));
	}
	match &cluster.summary {
		Some(summary) => println!("\n{}\n", summary),
		None => ui::warn("No summary yet. Run 'jobscout cluster --update-summaries'"),
	}
	Ok(())
}
