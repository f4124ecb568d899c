//! Clusters of similar listings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
	/// Derived from the sorted member ids, so unchanged membership keeps its id
	pub id: String,
	pub name: String,
	/// Listing ids, sorted ascending
	pub members: Vec<String>,
	/// Listing closest to the centroid
	pub representative: String,
	/// Average pairwise similarity within the cluster (0.0-1.0)
	pub cohesion: f32,
	pub common_field: Option<String>,
	pub common_skills: Vec<String>,
	pub centroid: Vec<f32>,
	pub summary: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Cluster {
	pub fn id_for(members: &[String]) -> String {
		let mut sorted: Vec<&str> = members.iter().map(String::as_str).collect();
		sorted.sort_unstable();
		format!("{:016x}", xxh3_64(sorted.join("\n").as_bytes()))
	}

	pub fn size(&self) -> usize {
		self.members.len()
	}

	pub fn contains(&self, listing_id: &str) -> bool {
		self.members.binary_search_by(|m| m.as_str().cmp(listing_id)).is_ok()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterParams {
	pub min_cluster_size: usize,
	pub min_samples: Option<usize>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn id_ignores_member_order() {
		let a = Cluster::id_for(&["b".to_string(), "a".to_string()]);
		let b = Cluster::id_for(&["a".to_string(), "b".to_string()]);
		assert_eq!(a, b);
		assert_ne!(a, Cluster::id_for(&["a".to_string()]));
	}
}
