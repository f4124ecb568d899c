//! Document file format and I/O
//!
//! Records are MessagePack files named `<id>.msgpack`. Writes go to a
//! temporary sibling first and are renamed into place.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::DOCUMENT_EXT;
use crate::error::{Error, Result};

/// Save a document atomically
pub fn save<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
	let bytes = rmp_serde::to_vec_named(doc)
		.map_err(|e| Error::storage(format!("failed to serialize {}: {}", path.display(), e)))?;
	write_atomic(path, &bytes)
}

/// Load a document. `Ok(None)` when the file does not exist.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
	let bytes = match fs::read(path) {
		Ok(bytes) => bytes,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
		Err(e) => return Err(Error::storage(format!("failed to read {}: {}", path.display(), e))),
	};

	rmp_serde::from_slice(&bytes)
		.map(Some)
		.map_err(|e| Error::integrity(file_id(path), format!("malformed document: {}", e)))
}

/// Remove a document. Returns false if it did not exist.
pub fn remove(path: &Path) -> Result<bool> {
	match fs::remove_file(path) {
		Ok(()) => Ok(true),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
		Err(e) => Err(Error::storage(format!("failed to delete {}: {}", path.display(), e))),
	}
}

/// All document paths in a collection directory, sorted by file name
pub fn scan(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
	let entries = fs::read_dir(dir).map_err(|e| Error::storage(format!("cannot read {}: {}", dir.display(), e)))?;

	let mut paths: Vec<PathBuf> = entries
		.filter_map(|e| e.ok())
		.map(|e| e.path())
		.filter(|p| p.extension().and_then(|s| s.to_str()) == Some(ext))
		.collect();
	paths.sort();
	Ok(paths)
}

/// Path of a document, rejecting ids that could escape the collection directory
pub fn path_for(dir: &Path, id: &str) -> Result<PathBuf> {
	if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.') || id.starts_with('.') {
		return Err(Error::NotFound(id.to_string()));
	}
	Ok(dir.join(format!("{}.{}", id, DOCUMENT_EXT)))
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
	let suffix: u32 = rand::random_range(0..u32::MAX);
	let tmp = path.with_extension(format!("tmp{:08x}", suffix));

	fs::write(&tmp, bytes).map_err(|e| Error::storage(format!("failed to write {}: {}", tmp.display(), e)))?;
	fs::rename(&tmp, path).map_err(|e| {
		let _ = fs::remove_file(&tmp);
		Error::storage(format!("failed to replace {}: {}", path.display(), e))
	})
}

pub fn file_id(path: &Path) -> String {
	path.file_stem()
		.and_then(|s| s.to_str())
		.unwrap_or("unknown")
		.to_string()
}
