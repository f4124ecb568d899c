//! HDBSCAN clustering of active listing embeddings, naming and summaries

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hdbscan::{Hdbscan, HdbscanHyperParams};
use rayon::prelude::*;

use super::Checkpoint;
use crate::config::{COMMON_SKILLS_LIMIT, SUMMARY_SAMPLE_SIZE};
use crate::core::{Cluster, ClusterParams, Embedding, Listing, Status};
use crate::error::{Error, Result};
use crate::services::LanguageModel;
use crate::storage::Store;
use crate::ui;

const SUMMARY_SYSTEM_PROMPT: &str = "You are a career advisor summarizing job clusters for students.";

#[derive(Debug, Default)]
pub struct ClusterOutcome {
	pub clusters: usize,
	pub clustered: usize,
	pub noise: usize,
}

#[derive(Debug, Default)]
pub struct SummaryOutcome {
	pub generated: usize,
	pub failures: Vec<String>,
}

impl SummaryOutcome {
	pub fn error(&self) -> Option<Error> {
		let first = self.failures.first()?;
		Some(Error::external(
			"summarizer",
			format!("{} summary request(s) failed; first: {}", self.failures.len(), first),
			false,
		))
	}
}

/// Re-cluster all active listings with embeddings and replace the cluster collection
pub fn recluster(store: &Store, params: &ClusterParams, now: DateTime<Utc>) -> Result<ClusterOutcome> {
	let listings: HashMap<String, Listing> = store
		.list_listings(Some(Status::Active))?
		.into_iter()
		.map(|l| (l.id.clone(), l))
		.collect();

	let mut items: Vec<(Listing, Embedding)> = store
		.list_embeddings()?
		.into_iter()
		.filter_map(|record| {
			let listing = listings.get(&record.listing_id)?.clone();
			Some((listing, record.embedding()))
		})
		.collect();
	items.sort_by(|a, b| a.0.id.cmp(&b.0.id));

	let previous = store.list_clusters()?;
	let (clusters, noise) = cluster_listings(&items, params, &previous, now)?;

	store.replace_clusters(&clusters)?;

	let outcome = ClusterOutcome {
		clusters: clusters.len(),
		clustered: clusters.iter().map(Cluster::size).sum(),
		noise,
	};
	tracing::info!(clusters = outcome.clusters, noise = outcome.noise, "clustering finished");
	Ok(outcome)
}

/// Cluster listings by embedding. Returns the clusters (largest first) and the noise count.
pub fn cluster_listings(
	items: &[(Listing, Embedding)],
	params: &ClusterParams,
	previous: &[Cluster],
	now: DateTime<Utc>,
) -> Result<(Vec<Cluster>, usize)> {
	if items.len() < params.min_cluster_size.max(2) {
		ui::debug(&format!("Only {} embeddings, skipping clustering", items.len()));
		return Ok((Vec::new(), items.len()));
	}

	ui::info(&format!("Clustering {} listings", items.len()));

	let data: Vec<Vec<f32>> = items.iter().map(|(_, e)| e.0.clone()).collect();

	let hyper_params = match params.min_samples {
		Some(min_samples) => HdbscanHyperParams::builder()
			.min_cluster_size(params.min_cluster_size)
			.min_samples(min_samples)
			.build(),
		None => HdbscanHyperParams::builder()
			.min_cluster_size(params.min_cluster_size)
			.build(),
	};

	let clusterer = Hdbscan::new(&data, hyper_params);
	let labels = clusterer
		.cluster()
		.map_err(|e| Error::Clustering(format!("{:?}", e)))?;

	let mut groups: HashMap<i32, Vec<usize>> = HashMap::new();
	let mut noise = 0;
	for (idx, &label) in labels.iter().enumerate() {
		if label < 0 {
			noise += 1;
		} else {
			groups.entry(label).or_default().push(idx);
		}
	}

	let clusters = assemble(groups.into_values().collect(), items, previous, now);
	Ok((clusters, noise))
}

/// Build cluster records from groups of item indices
pub fn assemble(
	groups: Vec<Vec<usize>>,
	items: &[(Listing, Embedding)],
	previous: &[Cluster],
	now: DateTime<Utc>,
) -> Vec<Cluster> {
	let previous: HashMap<&str, &Cluster> = previous.iter().map(|c| (c.id.as_str(), c)).collect();

	let mut clusters: Vec<Cluster> = groups
		.into_par_iter()
		.filter(|g| !g.is_empty())
		.map(|indices| {
			let members: Vec<&(Listing, Embedding)> = indices.iter().map(|&i| &items[i]).collect();
			let embeddings: Vec<&Embedding> = members.iter().map(|(_, e)| e).collect();
			let listings: Vec<&Listing> = members.iter().map(|(l, _)| l).collect();

			let centroid = Embedding::centroid(&embeddings).unwrap_or_else(|| Embedding::raw(Vec::new()));
			let representative = find_representative(&members, &centroid);
			let cohesion = compute_cohesion(&embeddings);

			let mut ids: Vec<String> = listings.iter().map(|l| l.id.clone()).collect();
			ids.sort();
			let id = Cluster::id_for(&ids);

			let common_field = common_field(&listings);
			let common_skills = common_skills(&listings);
			let name = cluster_name(common_field.as_deref(), &listings, &common_skills, &id);

			let (summary, created_at) = match previous.get(id.as_str()) {
				Some(prev) => (prev.summary.clone(), prev.created_at),
				None => (None, now),
			};

			Cluster {
				id,
				name,
				members: ids,
				representative,
				cohesion,
				common_field,
				common_skills,
				centroid: centroid.0,
				summary,
				created_at,
				updated_at: now,
			}
		})
		.collect();

	// Largest first
	clusters.sort_by(|a, b| b.size().cmp(&a.size()).then_with(|| a.id.cmp(&b.id)));
	clusters
}

/// Member closest to the centroid
fn find_representative(members: &[&(Listing, Embedding)], centroid: &Embedding) -> String {
	members
		.iter()
		.max_by(|a, b| {
			let sim_a = centroid.similarity(&a.1);
			let sim_b = centroid.similarity(&b.1);
			sim_a
				.partial_cmp(&sim_b)
				.unwrap_or(std::cmp::Ordering::Equal)
				.then_with(|| b.0.id.cmp(&a.0.id))
		})
		.map(|(l, _)| l.id.clone())
		.unwrap_or_default()
}

/// Average pairwise similarity within cluster
fn compute_cohesion(embeddings: &[&Embedding]) -> f32 {
	if embeddings.len() < 2 {
		return 1.0;
	}

	let mut total_similarity = 0.0;
	let mut count = 0;

	for i in 0..embeddings.len() {
		for j in (i + 1)..embeddings.len() {
			total_similarity += embeddings[i].similarity(embeddings[j]);
			count += 1;
		}
	}

	total_similarity / count as f32
}

/// Most frequent processed field, ties broken alphabetically
fn common_field(listings: &[&Listing]) -> Option<String> {
	let mut counts: HashMap<&str, usize> = HashMap::new();
	for listing in listings {
		if let Some(field) = listing.processed.as_ref().map(|p| p.field.as_str()).filter(|f| !f.is_empty()) {
			*counts.entry(field).or_default() += 1;
		}
	}

	counts
		.into_iter()
		.max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
		.map(|(field, _)| field.to_string())
}

/// Most frequent skills across members
fn common_skills(listings: &[&Listing]) -> Vec<String> {
	let mut counts: HashMap<&str, usize> = HashMap::new();
	for listing in listings {
		if let Some(processed) = &listing.processed {
			for skill in &processed.skills {
				*counts.entry(skill.as_str()).or_default() += 1;
			}
		}
	}

	let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
	ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
	ranked
		.into_iter()
		.take(COMMON_SKILLS_LIMIT)
		.map(|(s, _)| s.to_string())
		.collect()
}

/// Field name, then up to three companies, then top skills, then the id
pub fn cluster_name(field: Option<&str>, listings: &[&Listing], skills: &[String], id: &str) -> String {
	if let Some(field) = field {
		return format!("{} Jobs", field);
	}

	let mut companies: Vec<&str> = listings
		.iter()
		.map(|l| l.company.trim())
		.filter(|c| !c.is_empty())
		.collect();
	companies.sort_unstable();
	companies.dedup();
	if !companies.is_empty() && companies.len() <= 3 {
		return format!("{} Jobs", companies.join(", "));
	}

	if !skills.is_empty() {
		let top: Vec<&str> = skills.iter().take(3).map(String::as_str).collect();
		return format!("Jobs requiring {}", top.join(", "));
	}

	format!("Job Cluster {}", &id[..id.len().min(6)])
}

/// Generate summaries for clusters without one (or all, when `regenerate` is set)
pub fn update_summaries(
	store: &Store,
	llm: &dyn LanguageModel,
	regenerate: bool,
	checkpoint: &Checkpoint,
) -> Result<SummaryOutcome> {
	let mut outcome = SummaryOutcome::default();

	for mut cluster in store.list_clusters()? {
		if cluster.summary.is_some() && !regenerate {
			continue;
		}
		if !checkpoint.proceed()? {
			break;
		}

		let mut samples = Vec::new();
		for id in cluster.members.iter().take(SUMMARY_SAMPLE_SIZE) {
			if let Some(listing) = store.get_listing(id)? {
				samples.push(listing);
			}
		}

		match llm.complete(SUMMARY_SYSTEM_PROMPT, &summary_prompt(&samples, cluster.size())) {
			Ok(summary) => {
				cluster.summary = Some(summary.trim().to_string());
				cluster.updated_at = Utc::now();
				store.put_cluster(&cluster)?;
				ui::success(&format!("Summarized {}", cluster.name));
				outcome.generated += 1;
			}
			Err(e) => {
				tracing::warn!(cluster = %cluster.id, error = %e, "summary failed");
				outcome.failures.push(format!("{}: {}", cluster.id, e));
			}
		}
	}

	Ok(outcome)
}

fn summary_prompt(samples: &[Listing], total: usize) -> String {
	let mut text = format!(
		"The following are {} sample job listings from a cluster of {} total listings. \
		Generate a concise summary (3-4 paragraphs) that describes the common themes, skills, \
		requirements, and opportunities in this job cluster. Focus on what makes these jobs similar \
		and what key skills would help someone succeed in these roles.\n",
		samples.len(),
		total
	);

	for (i, listing) in samples.iter().enumerate() {
		text.push_str(&format!("\nListing {}:\nTitle: {}\nCompany: {}\n", i + 1, listing.title, listing.company));
		if let Some(processed) = &listing.processed {
			if !processed.skills.is_empty() {
				let skills: Vec<&str> = processed.skills.iter().map(String::as_str).collect();
				text.push_str(&format!("Skills: {}\n", skills.join(", ")));
			}
			if !processed.field.is_empty() {
				text.push_str(&format!("Field: {}\n", processed.field));
			}
		}
	}

	text
}
