//! Removal of local content the remote side no longer has
//!
//! Both sweeps are bounded to their configured root: nothing outside the
//! root (or the root itself) is ever removed.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::logging::*;
use crate::state::LocalIndex;
use crate::validation::{common_prefix_len, is_path_within_root};

#[derive(Debug, Clone, Default)]
pub struct OrphanCollector {
	dry_run: bool,
	/// Paths never removed or descended into (index file, spool directory)
	protected: Vec<PathBuf>,
}

impl OrphanCollector {
	pub fn new(dry_run: bool, protected: Vec<PathBuf>) -> Self {
		OrphanCollector { dry_run, protected }
	}

	fn is_protected(&self, path: &Path) -> bool {
		self.protected.iter().any(|p| p == path)
	}

	/// Refuse to touch anything the root boundary does not cover
	fn guard(&self, path: &Path, root: &Path) -> bool {
		if common_prefix_len(path, root) == 0 {
			warn!("no common prefix between {} and {}, refusing to remove", path.display(), root.display());
			return false;
		}
		if !is_path_within_root(path, root) {
			warn!("{} is outside {}, refusing to remove", path.display(), root.display());
			return false;
		}
		true
	}

	fn remove_file(&self, path: &Path, root: &Path, removed: &mut Vec<PathBuf>) -> bool {
		if !self.guard(path, root) {
			return false;
		}
		if self.dry_run {
			info!("would remove file {}", path.display());
		} else if let Err(e) = fs::remove_file(path) {
			warn!("cannot remove {}: {}", path.display(), e);
			return false;
		} else {
			info!("removed file {}", path.display());
		}
		removed.push(path.to_path_buf());
		true
	}

	fn remove_tree(&self, path: &Path, root: &Path, removed: &mut Vec<PathBuf>) -> bool {
		if !self.guard(path, root) {
			return false;
		}
		if self.dry_run {
			info!("would remove directory {}", path.display());
		} else if let Err(e) = fs::remove_dir_all(path) {
			warn!("cannot remove {}: {}", path.display(), e);
			return false;
		} else {
			info!("removed directory {}", path.display());
		}
		removed.push(path.to_path_buf());
		true
	}

	/// Delete mirror files not in `index`, then directories left empty
	pub fn sweep_mirror(&self, mirror_root: &Path, index: &LocalIndex) -> Vec<PathBuf> {
		let mut removed = Vec::new();
		if !mirror_root.is_dir() {
			return removed;
		}
		if let Err(e) = self.sweep_mirror_dir(mirror_root, mirror_root, index, &mut removed) {
			warn!("mirror sweep of {} incomplete: {}", mirror_root.display(), e);
		}
		removed
	}

	/// Post-order walk; returns true when `dir` ended up empty
	fn sweep_mirror_dir(
		&self,
		dir: &Path,
		root: &Path,
		index: &LocalIndex,
		removed: &mut Vec<PathBuf>,
	) -> io::Result<bool> {
		let mut remaining = 0usize;
		for entry in fs::read_dir(dir)? {
			let entry = entry?;
			let path = entry.path();
			if self.is_protected(&path) {
				remaining += 1;
				continue;
			}
			let file_type = entry.file_type()?;
			if file_type.is_dir() {
				let empty = match self.sweep_mirror_dir(&path, root, index, removed) {
					Ok(empty) => empty,
					Err(e) => {
						warn!("cannot sweep {}: {}", path.display(), e);
						false
					}
				};
				if !(empty && self.remove_empty_dir(&path, root, removed)) {
					remaining += 1;
				}
			} else if index.contains_key(&path) || !self.remove_file(&path, root, removed) {
				remaining += 1;
			}
		}
		Ok(remaining == 0)
	}

	fn remove_empty_dir(&self, path: &Path, root: &Path, removed: &mut Vec<PathBuf>) -> bool {
		if !self.guard(path, root) {
			return false;
		}
		if self.dry_run {
			info!("would remove empty directory {}", path.display());
		} else if let Err(e) = fs::remove_dir(path) {
			warn!("cannot remove {}: {}", path.display(), e);
			return false;
		} else {
			debug!("removed empty directory {}", path.display());
		}
		removed.push(path.to_path_buf());
		true
	}

	/// Remove everything under `unpack_root` that is neither a tracked
	/// extraction nor an ancestor of one
	pub fn sweep_unpack(&self, unpack_root: &Path, index: &LocalIndex) -> Vec<PathBuf> {
		let mut removed = Vec::new();
		if !unpack_root.is_dir() {
			return removed;
		}
		let tracked: BTreeSet<&Path> = index.values().filter_map(|r| r.unpack_path.as_deref()).collect();
		if let Err(e) = self.sweep_unpack_dir(unpack_root, unpack_root, &tracked, &mut removed) {
			warn!("unpack sweep of {} incomplete: {}", unpack_root.display(), e);
		}
		removed
	}

	fn sweep_unpack_dir(
		&self,
		dir: &Path,
		root: &Path,
		tracked: &BTreeSet<&Path>,
		removed: &mut Vec<PathBuf>,
	) -> io::Result<()> {
		for entry in fs::read_dir(dir)? {
			let entry = entry?;
			let path = entry.path();
			if self.is_protected(&path) {
				continue;
			}
			let is_dir = entry.file_type()?.is_dir();
			if is_dir && tracked.contains(path.as_path()) {
				continue;
			}
			if is_dir && tracked.iter().any(|t| t.starts_with(&path)) {
				if let Err(e) = self.sweep_unpack_dir(&path, root, tracked, removed) {
					warn!("cannot sweep {}: {}", path.display(), e);
				}
				continue;
			}
			if is_dir {
				self.remove_tree(&path, root, removed);
			} else {
				self.remove_file(&path, root, removed);
			}
		}
		Ok(())
	}

	/// Run the mirror sweep, then the unpack sweep, on the blocking pool
	pub async fn sweep(self, mirror_root: PathBuf, unpack_root: Option<PathBuf>, index: LocalIndex) -> Vec<PathBuf> {
		let task = tokio::task::spawn_blocking(move || {
			let mut removed = self.sweep_mirror(&mirror_root, &index);
			if let Some(ref root) = unpack_root {
				removed.extend(self.sweep_unpack(root, &index));
			}
			removed
		});
		match task.await {
			Ok(removed) => removed,
			Err(e) => {
				error!("orphan sweep aborted: {}", e);
				Vec::new()
			}
		}
	}
}


// vim: ts=4
