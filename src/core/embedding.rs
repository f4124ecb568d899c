//! Normalized embedding vectors for semantic similarity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
	/// Create normalized embedding from raw data
	pub fn new(data: Vec<f32>) -> Self {
		Self(normalize(&data))
	}

	/// Create from pre-normalized data (deserialization)
	pub fn raw(data: Vec<f32>) -> Self {
		Self(data)
	}

	pub fn dim(&self) -> usize {
		self.0.len()
	}

	pub fn normalize(self) -> Self {
		Self::new(self.0)
	}

	/// Cosine similarity; both sides are expected to be normalized
	pub fn similarity(&self, other: &Self) -> f32 {
		self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
	}

	/// Normalized mean of the given embeddings
	pub fn centroid(embeddings: &[&Embedding]) -> Option<Self> {
		let first = embeddings.first()?;
		let mut sum = vec![0.0; first.dim()];

		for emb in embeddings {
			for (acc, &val) in sum.iter_mut().zip(emb.0.iter()) {
				*acc += val;
			}
		}

		let n = embeddings.len() as f32;
		for val in &mut sum {
			*val /= n;
		}

		Some(Self::new(sum))
	}
}

/// Stored embedding for one listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
	pub listing_id: String,
	pub vector: Vec<f32>,
	pub model: String,
	pub generated_at: DateTime<Utc>,
}

impl EmbeddingRecord {
	pub fn new(listing_id: impl Into<String>, embedding: Embedding, model: impl Into<String>) -> Self {
		Self {
			listing_id: listing_id.into(),
			vector: embedding.0,
			model: model.into(),
			generated_at: Utc::now(),
		}
	}

	pub fn embedding(&self) -> Embedding {
		Embedding::raw(self.vector.clone())
	}
}

fn normalize(v: &[f32]) -> Vec<f32> {
	let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
	if norm > 0.0 {
		v.iter().map(|x| x / norm).collect()
	} else {
		v.to_vec()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn new_normalizes_to_unit_length() {
		let e = Embedding::new(vec![3.0, 4.0]);
		assert!((e.similarity(&e) - 1.0).abs() < 1e-6);
		assert!((e.0[0] - 0.6).abs() < 1e-6);
	}

	#[test]
	fn centroid_of_orthogonal_vectors() {
		let a = Embedding::new(vec![1.0, 0.0]);
		let b = Embedding::new(vec![0.0, 1.0]);
		let c = Embedding::centroid(&[&a, &b]).unwrap();
		let expected = std::f32::consts::FRAC_1_SQRT_2;
		assert!((c.0[0] - expected).abs() < 1e-6);
		assert!((c.0[1] - expected).abs() < 1e-6);
		assert!(Embedding::centroid(&[]).is_none());
	}

	#[test]
	fn zero_vector_stays_zero() {
		let e = Embedding::new(vec![0.0, 0.0]);
		assert_eq!(e.0, vec![0.0, 0.0]);
	}
}
