//! File-backed document store
//!
//! Layout under the store root:
//!
//! ```text
//! meta.json            schema version and embedding dimension
//! listings/<id>.msgpack
//! embeddings/<id>.msgpack
//! clusters/<id>.msgpack
//! reports/<id>.json    append-only
//! run.lock
//! ```

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document;
use crate::config::{
	CLUSTERS_DIR, DOCUMENT_EXT, EMBEDDINGS_DIR, LISTINGS_DIR, META_FILE, REPORTS_DIR, SCHEMA_VERSION,
};
use crate::core::{Cluster, EmbeddingRecord, Listing, Status, Transition, UpdateReport};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Meta {
	schema_version: u32,
	created_at: DateTime<Utc>,
	#[serde(default)]
	embedding_dim: Option<usize>,
}

/// Handle to the document store. Opened once per command and passed to every component.
#[derive(Debug)]
pub struct Store {
	root: PathBuf,
	meta: Mutex<Meta>,
}

impl Store {
	/// Open the store at `root`, creating the layout if needed
	pub fn open(root: &Path) -> Result<Self> {
		let meta = ensure_schema(root)?;
		tracing::debug!(root = %root.display(), dim = ?meta.embedding_dim, "store opened");

		Ok(Self {
			root: root.to_path_buf(),
			meta: Mutex::new(meta),
		})
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Cheap reachability check used at stage boundaries
	pub fn ping(&self) -> Result<()> {
		let meta_path = self.root.join(META_FILE);
		if !meta_path.is_file() {
			return Err(Error::storage(format!("store unreachable at {}", self.root.display())));
		}
		for dir in [LISTINGS_DIR, EMBEDDINGS_DIR, CLUSTERS_DIR, REPORTS_DIR] {
			if !self.root.join(dir).is_dir() {
				return Err(Error::storage(format!("store collection missing: {}", dir)));
			}
		}
		Ok(())
	}

	pub fn embedding_dim(&self) -> Option<usize> {
		self.meta.lock().ok().and_then(|m| m.embedding_dim)
	}

	// === Listings ===

	pub fn get_listing(&self, id: &str) -> Result<Option<Listing>> {
		document::load(&document::path_for(&self.listings_dir(), id)?)
	}

	pub fn put_listing(&self, listing: &Listing) -> Result<()> {
		document::save(&document::path_for(&self.listings_dir(), &listing.id)?, listing)
	}

	/// All readable listings, optionally filtered by status. Malformed documents are logged and skipped.
	pub fn list_listings(&self, status: Option<Status>) -> Result<Vec<Listing>> {
		let mut listings: Vec<Listing> = self.load_collection(&self.listings_dir())?;
		if let Some(status) = status {
			listings.retain(|l| l.status == status);
		}
		Ok(listings)
	}

	pub fn count_listings(&self, status: Status) -> Result<usize> {
		Ok(self.list_listings(Some(status))?.len())
	}

	pub fn delete_listing(&self, id: &str) -> Result<bool> {
		document::remove(&document::path_for(&self.listings_dir(), id)?)
	}

	/// Compare-and-set status change. Returns false when the listing is gone or no longer active.
	pub fn transition(&self, id: &str, transition: &Transition, now: DateTime<Utc>) -> Result<bool> {
		let Some(mut listing) = self.get_listing(id)? else {
			return Ok(false);
		};

		if !listing.apply(transition, now) {
			tracing::debug!(id, status = %listing.status, target = %transition.target(), "transition skipped, listing not active");
			return Ok(false);
		}

		self.put_listing(&listing)?;
		Ok(true)
	}

	// === Embeddings ===

	pub fn get_embedding(&self, listing_id: &str) -> Result<Option<EmbeddingRecord>> {
		document::load(&document::path_for(&self.embeddings_dir(), listing_id)?)
	}

	/// Store an embedding. The first write fixes the store's dimensionality.
	pub fn put_embedding(&self, record: &EmbeddingRecord) -> Result<()> {
		let dim = record.vector.len();
		if dim == 0 {
			return Err(Error::integrity(&record.listing_id, "empty embedding vector"));
		}

		{
			let mut meta = self.meta.lock().map_err(|_| Error::storage("store metadata lock poisoned"))?;
			match meta.embedding_dim {
				Some(expected) if expected != dim => {
					return Err(Error::integrity(
						&record.listing_id,
						format!("embedding dimension {} does not match store dimension {}", dim, expected),
					));
				}
				Some(_) => {}
				None => {
					meta.embedding_dim = Some(dim);
					write_meta(&self.root, &meta)?;
				}
			}
		}

		document::save(&document::path_for(&self.embeddings_dir(), &record.listing_id)?, record)
	}

	pub fn list_embeddings(&self) -> Result<Vec<EmbeddingRecord>> {
		self.load_collection(&self.embeddings_dir())
	}

	pub fn delete_embedding(&self, listing_id: &str) -> Result<bool> {
		document::remove(&document::path_for(&self.embeddings_dir(), listing_id)?)
	}

	// === Clusters ===

	pub fn list_clusters(&self) -> Result<Vec<Cluster>> {
		let mut clusters: Vec<Cluster> = self.load_collection(&self.clusters_dir())?;
		clusters.sort_by(|a, b| b.size().cmp(&a.size()).then_with(|| a.id.cmp(&b.id)));
		Ok(clusters)
	}

	pub fn get_cluster(&self, id: &str) -> Result<Option<Cluster>> {
		document::load(&document::path_for(&self.clusters_dir(), id)?)
	}

	pub fn put_cluster(&self, cluster: &Cluster) -> Result<()> {
		document::save(&document::path_for(&self.clusters_dir(), &cluster.id)?, cluster)
	}

	/// Replace the whole cluster collection
	pub fn replace_clusters(&self, clusters: &[Cluster]) -> Result<()> {
		let keep: HashSet<&str> = clusters.iter().map(|c| c.id.as_str()).collect();

		for cluster in clusters {
			self.put_cluster(cluster)?;
		}

		for path in document::scan(&self.clusters_dir(), DOCUMENT_EXT)? {
			let id = document::file_id(&path);
			if !keep.contains(id.as_str()) {
				document::remove(&path)?;
			}
		}
		Ok(())
	}

	// === Reports ===

	/// Append a report. Existing reports are never overwritten.
	pub fn append_report(&self, report: &UpdateReport) -> Result<()> {
		let path = self.reports_dir().join(format!("{}.json", report.id));
		let json = serde_json::to_vec_pretty(report).map_err(Error::storage)?;

		let mut file = fs::OpenOptions::new()
			.write(true)
			.create_new(true)
			.open(&path)
			.map_err(|e| Error::storage(format!("cannot create report {}: {}", path.display(), e)))?;
		file.write_all(&json)?;
		file.sync_all()?;
		Ok(())
	}

	/// All reports, oldest first
	pub fn list_reports(&self) -> Result<Vec<UpdateReport>> {
		let mut reports = Vec::new();
		for path in document::scan(&self.reports_dir(), "json")? {
			let bytes = fs::read(&path)?;
			match serde_json::from_slice::<UpdateReport>(&bytes) {
				Ok(report) => reports.push(report),
				Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping malformed report"),
			}
		}
		reports.sort_by_key(|r| r.started_at);
		Ok(reports)
	}

	pub(super) fn lock_path(&self) -> PathBuf {
		self.root.join(crate::config::LOCK_FILE)
	}

	fn listings_dir(&self) -> PathBuf {
		self.root.join(LISTINGS_DIR)
	}

	fn embeddings_dir(&self) -> PathBuf {
		self.root.join(EMBEDDINGS_DIR)
	}

	fn clusters_dir(&self) -> PathBuf {
		self.root.join(CLUSTERS_DIR)
	}

	fn reports_dir(&self) -> PathBuf {
		self.root.join(REPORTS_DIR)
	}

	fn load_collection<T: serde::de::DeserializeOwned>(&self, dir: &Path) -> Result<Vec<T>> {
		let mut docs = Vec::new();
		for path in document::scan(dir, DOCUMENT_EXT)? {
			match document::load(&path) {
				Ok(Some(doc)) => docs.push(doc),
				Ok(None) => {}
				Err(e @ Error::DataIntegrity { .. }) => tracing::warn!(error = %e, "skipping document"),
				Err(e) => return Err(e),
			}
		}
		Ok(docs)
	}
}

/// Create the store layout if missing. Idempotent.
fn ensure_schema(root: &Path) -> Result<Meta> {
	for dir in [LISTINGS_DIR, EMBEDDINGS_DIR, CLUSTERS_DIR, REPORTS_DIR] {
		fs::create_dir_all(root.join(dir))
			.map_err(|e| Error::storage(format!("cannot create {}: {}", root.join(dir).display(), e)))?;
	}

	let meta_path = root.join(META_FILE);
	if meta_path.exists() {
		let bytes = fs::read(&meta_path)?;
		let meta: Meta = serde_json::from_slice(&bytes)
			.map_err(|e| Error::storage(format!("corrupt {}: {}", meta_path.display(), e)))?;
		if meta.schema_version != SCHEMA_VERSION {
			return Err(Error::storage(format!(
				"store schema v{} is not supported (expected v{})",
				meta.schema_version, SCHEMA_VERSION
			)));
		}
		return Ok(meta);
	}

	let meta = Meta {
		schema_version: SCHEMA_VERSION,
		created_at: Utc::now(),
		embedding_dim: None,
	};
	write_meta(root, &meta)?;
	Ok(meta)
}

fn write_meta(root: &Path, meta: &Meta) -> Result<()> {
	let json = serde_json::to_vec_pretty(meta).map_err(Error::storage)?;
	document::write_atomic(&root.join(META_FILE), &json)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::{Embedding, ExpiredReason};

	fn store() -> (tempfile::TempDir, Store) {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		(dir, store)
	}

	fn listing(url: &str) -> Listing {
		Listing::new(url, "Acme", "Engineer", format!("text for {}", url), Utc::now())
	}

	#[test]
	fn open_is_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		Store::open(dir.path()).unwrap();
		let store = Store::open(dir.path()).unwrap();
		store.ping().unwrap();
	}

	#[test]
	fn ping_fails_when_root_removed() {
		let (dir, store) = store();
		fs::remove_dir_all(dir.path()).unwrap();
		assert!(matches!(store.ping(), Err(Error::Storage(_))));
	}

	#[test]
	fn listing_crud_and_status_filter() {
		let (_dir, store) = store();
		let a = listing("https://a.com/1");
		let b = listing("https://b.com/1");
		store.put_listing(&a).unwrap();
		store.put_listing(&b).unwrap();

		assert_eq!(store.get_listing(&a.id).unwrap(), Some(a.clone()));
		store.transition(&b.id, &Transition::Expire(ExpiredReason::Age), Utc::now()).unwrap();

		let active = store.list_listings(Some(Status::Active)).unwrap();
		assert_eq!(active.len(), 1);
		assert_eq!(active[0].id, a.id);
		assert_eq!(store.list_listings(None).unwrap().len(), 2);

		assert!(store.delete_listing(&a.id).unwrap());
		assert!(store.get_listing(&a.id).unwrap().is_none());
	}

	#[test]
	fn transition_is_compare_and_set() {
		let (_dir, store) = store();
		let a = listing("https://a.com/1");
		store.put_listing(&a).unwrap();

		let dup = Transition::MarkDuplicate { canonical: "other".into() };
		assert!(store.transition(&a.id, &dup, Utc::now()).unwrap());
		assert!(!store.transition(&a.id, &Transition::Expire(ExpiredReason::Age), Utc::now()).unwrap());
		assert!(!store.transition("missing", &dup, Utc::now()).unwrap());

		let stored = store.get_listing(&a.id).unwrap().unwrap();
		assert_eq!(stored.status, Status::Duplicate);
		assert_eq!(stored.duplicate_of.as_deref(), Some("other"));
	}

	#[test]
	fn malformed_listing_skipped() {
		let (dir, store) = store();
		store.put_listing(&listing("https://a.com/1")).unwrap();
		fs::write(dir.path().join(LISTINGS_DIR).join("broken.msgpack"), b"\xc1").unwrap();

		assert_eq!(store.list_listings(None).unwrap().len(), 1);
	}

	#[test]
	fn embedding_dimension_enforced_and_persisted() {
		let (dir, store) = store();
		let first = EmbeddingRecord::new("a", Embedding::new(vec![1.0, 0.0, 0.0]), "m");
		let wrong = EmbeddingRecord::new("b", Embedding::new(vec![1.0, 0.0]), "m");

		store.put_embedding(&first).unwrap();
		assert!(matches!(store.put_embedding(&wrong), Err(Error::DataIntegrity { .. })));
		assert_eq!(store.embedding_dim(), Some(3));

		let reopened = Store::open(dir.path()).unwrap();
		assert_eq!(reopened.embedding_dim(), Some(3));
		assert_eq!(reopened.list_embeddings().unwrap().len(), 1);
	}

	#[test]
	fn replace_clusters_drops_stale_documents() {
		let (_dir, store) = store();
		let make = |members: &[&str]| {
			let members: Vec<String> = members.iter().map(|s| s.to_string()).collect();
			Cluster {
				id: Cluster::id_for(&members),
				name: "c".into(),
				representative: members[0].clone(),
				members,
				cohesion: 1.0,
				common_field: None,
				common_skills: vec![],
				centroid: vec![],
				summary: None,
				created_at: Utc::now(),
				updated_at: Utc::now(),
			}
		};

		store.replace_clusters(&[make(&["a", "b"]), make(&["c", "d", "e"])]).unwrap();
		assert_eq!(store.list_clusters().unwrap().len(), 2);

		store.replace_clusters(&[make(&["a", "b"])]).unwrap();
		let clusters = store.list_clusters().unwrap();
		assert_eq!(clusters.len(), 1);
		assert_eq!(clusters[0].members, vec!["a", "b"]);
	}

	#[test]
	fn reports_are_append_only() {
		let (_dir, store) = store();
		let report = UpdateReport::start(Utc::now());

		store.append_report(&report).unwrap();
		assert!(store.append_report(&report).is_err());
		assert_eq!(store.list_reports().unwrap().len(), 1);
	}
}
