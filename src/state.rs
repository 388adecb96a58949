//! Persisted local index of materialized files
//!
//! The store is the single owner of on-disk run state: one JSON document
//! under the destination directory, replaced wholesale after each live run.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tokio::fs as afs;

use crate::error::StateError;
use crate::logging::*;
use crate::types::{Layout, SyncRecord};

/// Mirror path to record
pub type LocalIndex = BTreeMap<PathBuf, SyncRecord>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedIndex {
	mirror_root: PathBuf,
	#[serde(default)]
	unpack_root: Option<PathBuf>,
	#[serde(default)]
	last_run: Option<i64>,
	records: BTreeMap<PathBuf, SyncRecord>,
}

/// Index as loaded at the start of a run
#[derive(Debug, Default)]
pub struct LoadedIndex {
	pub records: LocalIndex,
	/// Start of the last successful live run, Unix seconds
	pub last_run: Option<i64>,
}

pub struct LocalIndexStore {
	path: PathBuf,
	layout: Layout,
	dry_run: bool,
}

/// Current time as Unix seconds
pub fn unix_now() -> i64 {
	Utc::now().timestamp()
}

impl LocalIndexStore {
	pub fn new(path: PathBuf, layout: Layout, dry_run: bool) -> Self {
		LocalIndexStore { path, layout, dry_run }
	}

	/// Fixed dotfile location under the destination directory
	pub fn default_path(dest_dir: &Path) -> PathBuf {
		dest_dir.join(format!(".{}.json", env!("CARGO_PKG_NAME")))
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn read(&self) -> Result<Option<PersistedIndex>, StateError> {
		let contents = match afs::read_to_string(&self.path).await {
			Ok(c) => c,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(StateError::LoadFailed { source: Box::new(e) }),
		};
		serde_json::from_str(&contents).map(Some).map_err(|e| StateError::Corrupted {
			message: format!("Failed to parse index JSON: {}", e),
		})
	}

	/// Load, relocate and validate the index
	///
	/// A missing or unreadable index loads as empty, forcing a full fetch.
	pub async fn load(&self) -> LoadedIndex {
		debug!("reading local index: {}", self.path.display());
		let persisted = match self.read().await {
			Ok(Some(p)) => p,
			Ok(None) => {
				info!("no local index at {}, starting empty", self.path.display());
				return LoadedIndex::default();
			}
			Err(e) => {
				warn!("{}; starting with an empty index", e);
				return LoadedIndex::default();
			}
		};

		let last_run = persisted.last_run;
		let mut records = self.relocate(persisted);
		self.validate(&mut records).await;

		info!("loaded local index containing {} items", records.len());
		LoadedIndex { records, last_run }
	}

	/// Rewrite records written under other roots to the current layout
	fn relocate(&self, persisted: PersistedIndex) -> LocalIndex {
		let old_mirror = persisted.mirror_root;
		let mirror_moved = old_mirror != self.layout.mirror_root;
		if mirror_moved {
			info!(
				"mirror root moved from {} to {}",
				old_mirror.display(),
				self.layout.mirror_root.display()
			);
		}
		if persisted.unpack_root != self.layout.unpack_root {
			info!("unpack root changed from {:?} to {:?}", persisted.unpack_root, self.layout.unpack_root);
		}

		let mut records = LocalIndex::new();
		for (_, mut record) in persisted.records {
			if mirror_moved {
				match record.mirror_path.strip_prefix(&old_mirror) {
					Ok(rel) => record.mirror_path = self.layout.mirror_root.join(rel),
					Err(_) => {
						warn!("dropping record outside old mirror root: {}", record.mirror_path.display());
						continue;
					}
				}
			}
			record.unpack_path = record
				.remote
				.relative_to(&record.source_root)
				.and_then(|rel| self.layout.unpack_path(rel));
			records.insert(record.mirror_path.clone(), record);
		}
		records
	}

	/// Drop records whose local materialization is gone or was touched
	async fn validate(&self, records: &mut LocalIndex) {
		let mut stale = Vec::new();
		for (path, record) in records.iter() {
			if !still_materialized(path, record).await {
				stale.push(path.clone());
			}
		}
		for path in stale {
			records.remove(&path);
		}
	}

	/// Persist the merged index; skipped entirely during dry runs
	pub async fn save(&self, records: &LocalIndex, run_started: i64) -> Result<(), StateError> {
		if self.dry_run {
			debug!("dry run: not writing index {}", self.path.display());
			return Ok(());
		}

		let persisted = PersistedIndex {
			mirror_root: self.layout.mirror_root.clone(),
			unpack_root: self.layout.unpack_root.clone(),
			last_run: Some(run_started),
			records: records.clone(),
		};
		let json = serde_json::to_string_pretty(&persisted)
			.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;

		let tmp = self.path.with_extension("json.tmp");
		afs::write(&tmp, json).await.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		afs::rename(&tmp, &self.path)
			.await
			.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;

		info!("saved local index containing {} items", records.len());
		Ok(())
	}
}

async fn still_materialized(path: &Path, record: &SyncRecord) -> bool {
	let live = match afs::metadata(path).await {
		Ok(m) if m.is_file() => m,
		_ => {
			info!("file disappeared: {}", path.display());
			return false;
		}
	};
	if live.mtime() > record.locally_observed_mod_time {
		info!("file changed outside dfsync: {}", path.display());
		return false;
	}
	if let Some(ref unpack) = record.unpack_path {
		if !afs::metadata(unpack).await.map(|m| m.is_dir()).unwrap_or(false) {
			info!("extraction missing: {}", unpack.display());
			return false;
		}
	}
	true
}


// vim: ts=4
