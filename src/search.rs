//! Semantic search over active listings
//!
//! Text-based modes embed a query sentence with the language model and rank
//! listing embeddings by cosine similarity. `Cluster` lists members without
//! scoring and `SimilarTo` reuses a stored embedding.

use std::collections::HashMap;

use serde::Serialize;

use crate::core::{Embedding, Listing, Status};
use crate::error::{Error, Result};
use crate::services::LanguageModel;
use crate::storage::Store;

#[derive(Debug, Clone, PartialEq)]
pub enum SearchMode {
	Text(String),
	Skills(Vec<String>),
	Field(String),
	CompanyRole { company: String, role: String },
	Cluster(String),
	SimilarTo(String),
}

impl SearchMode {
	/// Sentence embedded for text-based modes
	pub fn query_text(&self) -> Option<String> {
		match self {
			Self::Text(text) => Some(text.clone()),
			Self::Skills(skills) => Some(format!("Job requiring skills in: {}", skills.join(", "))),
			Self::Field(field) => Some(format!("Job in {} field", field)),
			Self::CompanyRole { company, role } => Some(format!("{} position at {}", role, company)),
			Self::Cluster(_) | Self::SimilarTo(_) => None,
		}
	}

	pub fn needs_language_model(&self) -> bool {
		self.query_text().is_some()
	}
}

#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
	pub limit: usize,
	pub threshold: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Match {
	pub id: String,
	pub title: String,
	pub company: String,
	pub url: String,
	pub field: Option<String>,
	pub location: Option<String>,
	/// Absent for cluster membership listings
	pub score: Option<f32>,
}

impl Match {
	fn from_listing(listing: &Listing, score: Option<f32>) -> Self {
		let processed = listing.processed.as_ref();
		Self {
			id: listing.id.clone(),
			title: listing.title.clone(),
			company: listing.company.clone(),
			url: listing.url.clone(),
			field: processed.map(|p| p.field.clone()).filter(|f| !f.is_empty()),
			location: processed
				.and_then(|p| p.location.clone())
				.or_else(|| listing.location.clone()),
			score,
		}
	}
}

pub fn search(
	store: &Store,
	llm: Option<&dyn LanguageModel>,
	mode: &SearchMode,
	params: SearchParams,
) -> Result<Vec<Match>> {
	if let SearchMode::Cluster(id) = mode {
		return cluster_members(store, id, params.limit);
	}

	let (query, exclude) = match mode {
		SearchMode::SimilarTo(id) => {
			let record = store
				.get_embedding(id)?
				.ok_or_else(|| Error::NotFound(format!("embedding for listing {}", id)))?;
			(record.embedding(), Some(id.as_str()))
		}
		_ => {
			let text = mode.query_text().unwrap_or_default();
			let llm = llm.ok_or_else(|| Error::Configuration("text search needs a language model".into()))?;
			tracing::debug!(query = %text, "embedding search query");
			(Embedding::new(llm.embed(&text)?), None)
		}
	};

	let active: HashMap<String, Listing> = store
		.list_listings(Some(Status::Active))?
		.into_iter()
		.map(|l| (l.id.clone(), l))
		.collect();

	let candidates: Vec<(&Listing, Embedding)> = store
		.list_embeddings()?
		.into_iter()
		.filter_map(|record| Some((active.get(&record.listing_id)?, record.embedding())))
		.collect();

	Ok(rank(&query, &candidates, exclude, params))
}

/// Score candidates against `query`, keep those at or above the threshold, best first
pub fn rank(
	query: &Embedding,
	candidates: &[(&Listing, Embedding)],
	exclude: Option<&str>,
	params: SearchParams,
) -> Vec<Match> {
	let mut scored: Vec<(&Listing, f32)> = candidates
		.iter()
		.filter(|(listing, _)| Some(listing.id.as_str()) != exclude)
		.filter(|(listing, emb)| {
			if emb.dim() != query.dim() {
				tracing::debug!(id = %listing.id, "skipping embedding with mismatched dimension");
				return false;
			}
			true
		})
		.map(|(listing, emb)| (*listing, query.similarity(emb)))
		.filter(|(_, score)| *score >= params.threshold)
		.collect();

	scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
	scored.truncate(params.limit);

	scored
		.into_iter()
		.map(|(listing, score)| Match::from_listing(listing, Some(score)))
		.collect()
}

fn cluster_members(store: &Store, id: &str, limit: usize) -> Result<Vec<Match>> {
	let cluster = store
		.get_cluster(id)?
		.ok_or_else(|| Error::NotFound(format!("cluster {}", id)))?;

	let mut matches = Vec::new();
	for member in &cluster.members {
		if matches.len() >= limit {
			break;
		}
		match store.get_listing(member)? {
			Some(listing) if listing.is_active() => matches.push(Match::from_listing(&listing, None)),
			_ => {}
		}
	}
	Ok(matches)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::{EmbeddingRecord, Transition};
	use chrono::Utc;

	fn params(limit: usize, threshold: f32) -> SearchParams {
		SearchParams { limit, threshold }
	}

	fn listing(n: u32) -> Listing {
		Listing::new(format!("https://jobs.test/{}", n), "Acme", format!("Role {}", n), format!("text {}", n), Utc::now())
	}

	#[test]
	fn query_templates() {
		let skills = SearchMode::Skills(vec!["rust".into(), "sql".into()]);
		assert_eq!(skills.query_text().unwrap(), "Job requiring skills in: rust, sql");
		assert_eq!(
			SearchMode::Field("Aerospace".into()).query_text().unwrap(),
			"Job in Aerospace field"
		);
		let role = SearchMode::CompanyRole {
			company: "SpaceX".into(),
			role: "Intern".into(),
		};
		assert_eq!(role.query_text().unwrap(), "Intern position at SpaceX");
		assert!(!SearchMode::Cluster("c".into()).needs_language_model());
	}

	#[test]
	fn rank_filters_sorts_and_limits() {
		let (a, b, c) = (listing(1), listing(2), listing(3));
		let query = Embedding::new(vec![1.0, 0.0]);
		let candidates = vec![
			(&a, Embedding::new(vec![0.8, 0.6])),
			(&b, Embedding::new(vec![1.0, 0.1])),
			(&c, Embedding::new(vec![0.0, 1.0])),
		];

		let hits = rank(&query, &candidates, None, params(10, 0.7));
		let ids: Vec<&str> = hits.iter().map(|m| m.id.as_str()).collect();
		assert_eq!(ids, vec![b.id.as_str(), a.id.as_str()]);

		assert_eq!(rank(&query, &candidates, None, params(1, 0.7)).len(), 1);
		assert!(rank(&query, &candidates, Some(b.id.as_str()), params(10, 0.9)).is_empty());
	}

	#[test]
	fn similar_to_serves_only_active_and_excludes_reference() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let (reference, twin, expired) = (listing(1), listing(2), listing(3));
		for l in [&reference, &twin, &expired] {
			store.put_listing(l).unwrap();
			store
				.put_embedding(&EmbeddingRecord::new(&l.id, Embedding::new(vec![1.0, 0.0]), "m"))
				.unwrap();
		}
		store
			.transition(
				&expired.id,
				&Transition::Expire(crate::core::ExpiredReason::Age),
				Utc::now(),
			)
			.unwrap();

		let hits = search(&store, None, &SearchMode::SimilarTo(reference.id.clone()), params(10, 0.5)).unwrap();
		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].id, twin.id);
	}

	#[test]
	fn text_search_without_model_is_a_configuration_error() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let err = search(&store, None, &SearchMode::Text("rust".into()), params(5, 0.5)).unwrap_err();
		assert!(matches!(err, Error::Configuration(_)));
	}

	#[test]
	fn unknown_cluster_is_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let err = search(&store, None, &SearchMode::Cluster("nope".into()), params(5, 0.5)).unwrap_err();
		assert!(matches!(err, Error::NotFound(_)));
	}
}
