//! Diff of the remote listing against the local index

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::error::SyncError;
use crate::logging::*;
use crate::state::LocalIndex;
use crate::types::{Layout, RemoteEntry, SyncRecord};

/// Remote naming convention for objects still being written
pub const DEFAULT_IN_PROGRESS_SUFFIX: &str = "._COPYING_";

/// Fetch and purge sets for one run
#[derive(Debug, Default)]
pub struct SyncPlan {
	/// Prospective records to download, keyed by mirror path
	pub to_fetch: Vec<SyncRecord>,
	/// Index keys whose remote entry is gone or filtered out
	pub to_purge: Vec<PathBuf>,
	/// Mirror paths of every entry that survived filtering
	pub wanted: BTreeSet<PathBuf>,
}

pub struct SyncPlanner {
	layout: Layout,
	includes: Option<GlobSet>,
	in_progress_suffix: String,
}

impl SyncPlanner {
	/// Empty `include_globs` matches everything
	pub fn new(layout: Layout, include_globs: &[String], in_progress_suffix: &str) -> Result<Self, SyncError> {
		Ok(SyncPlanner {
			layout,
			includes: build_glob_set(include_globs)?,
			in_progress_suffix: in_progress_suffix.to_string(),
		})
	}

	fn is_included(&self, rel: &str) -> bool {
		match self.includes {
			Some(ref set) => set.is_match(rel),
			None => true,
		}
	}

	/// Filter `entries` and compare them with `index`
	pub fn diff(&self, entries: &[RemoteEntry], index: &LocalIndex) -> SyncPlan {
		let mut plan = SyncPlan::default();
		let mut candidates: BTreeMap<PathBuf, SyncRecord> = BTreeMap::new();

		for entry in entries {
			if entry.is_directory {
				debug!("skipping directory: {}", entry.full_path);
				continue;
			}
			if !self.in_progress_suffix.is_empty() && entry.name.ends_with(&self.in_progress_suffix) {
				debug!("skipping in-progress upload: {}", entry.full_path);
				continue;
			}
			let rel = match self.layout.relative_path(entry) {
				Ok(rel) => rel,
				Err(e) => {
					warn!("skipping remote entry {}: {}", entry.full_path, e);
					continue;
				}
			};
			if !self.is_included(rel) {
				debug!("not included: {}", rel);
				continue;
			}
			if let Some(record) = self.layout.record_for(entry) {
				candidates.insert(record.mirror_path.clone(), record);
			}
		}

		for (mirror_path, record) in candidates {
			let changed = match index.get(&mirror_path) {
				Some(existing) => !existing.remote.same_version(&record.remote),
				None => true,
			};
			if changed {
				info!("planned fetch: {}", record.remote.full_path);
				plan.to_fetch.push(record);
			}
			plan.wanted.insert(mirror_path);
		}

		for key in index.keys() {
			if !plan.wanted.contains(key) {
				info!("planned purge: {}", key.display());
				plan.to_purge.push(key.clone());
			}
		}

		plan
	}
}

fn build_glob_set(patterns: &[String]) -> Result<Option<GlobSet>, SyncError> {
	if patterns.is_empty() {
		return Ok(None);
	}
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		let glob = Glob::new(pattern)
			.map_err(|e| SyncError::Pattern { pattern: pattern.clone(), message: e.to_string() })?;
		builder.add(glob);
	}
	let set = builder
		.build()
		.map_err(|e| SyncError::Pattern { pattern: patterns.join(","), message: e.to_string() })?;
	Ok(Some(set))
}


// vim: ts=4
