//! Update run reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Collecting,
	Processing,
	Clustering,
	Deduplicating,
	Expiring,
	Retaining,
	Reporting,
}

impl std::fmt::Display for Stage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			Self::Collecting => "collecting",
			Self::Processing => "processing",
			Self::Clustering => "clustering",
			Self::Deduplicating => "deduplicating",
			Self::Expiring => "expiring",
			Self::Retaining => "retaining",
			Self::Reporting => "reporting",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportError {
	pub stage: Stage,
	pub kind: ErrorKind,
	pub message: String,
}

/// One orchestrator run. Written once, never modified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReport {
	pub id: String,
	pub started_at: DateTime<Utc>,
	pub finished_at: Option<DateTime<Utc>>,
	pub collected: usize,
	pub reobserved: usize,
	pub processed: usize,
	pub clusters: usize,
	pub summaries: usize,
	pub duplicates_marked: usize,
	pub expired: usize,
	pub removed_for_capacity: usize,
	pub active_after: usize,
	pub errors: Vec<ReportError>,
}

impl UpdateReport {
	/// Report ids sort by start time; the suffix keeps runs in the same millisecond apart
	pub fn start(now: DateTime<Utc>) -> Self {
		Self {
			id: format!("{}-{:04x}", now.format("%Y%m%dT%H%M%S%.3fZ"), rand::random_range(0..=u16::MAX)),
			started_at: now,
			finished_at: None,
			collected: 0,
			reobserved: 0,
			processed: 0,
			clusters: 0,
			summaries: 0,
			duplicates_marked: 0,
			expired: 0,
			removed_for_capacity: 0,
			active_after: 0,
			errors: Vec::new(),
		}
	}

	pub fn record(&mut self, stage: Stage, err: &Error) {
		self.errors.push(ReportError {
			stage,
			kind: err.kind(),
			message: err.to_string(),
		});
	}

	pub fn has_errors(&self) -> bool {
		!self.errors.is_empty()
	}

	pub fn errors_for(&self, stage: Stage) -> impl Iterator<Item = &ReportError> {
		self.errors.iter().filter(move |e| e.stage == stage)
	}
}
