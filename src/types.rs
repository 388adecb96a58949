//! Core data model: remote entries, sync records and the path layout

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::archive::ArchiveSpec;
use crate::validation::{validate_relative_safe, ValidationError};

/// One object as reported by the remote store
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
	/// Absolute path on the remote side, without scheme or authority
	pub full_path: String,
	/// Last path component
	pub name: String,
	pub size: u64,
	/// Unix seconds
	pub modification_time: i64,
	pub is_directory: bool,
}

impl RemoteEntry {
	pub fn file(full_path: impl Into<String>, size: u64, modification_time: i64) -> Self {
		let full_path = full_path.into();
		let name = base_name(&full_path).to_string();
		RemoteEntry { full_path, name, size, modification_time, is_directory: false }
	}

	pub fn dir(full_path: impl Into<String>, modification_time: i64) -> Self {
		let full_path = full_path.into();
		let name = base_name(&full_path).to_string();
		RemoteEntry { full_path, name, size: 0, modification_time, is_directory: true }
	}

	/// Path relative to `source_root`, or None if the entry lies outside it
	pub fn relative_to<'a>(&'a self, source_root: &str) -> Option<&'a str> {
		let root = source_root.trim_end_matches('/');
		let rest = self.full_path.strip_prefix(root)?;
		if root.is_empty() {
			return Some(rest.trim_start_matches('/')).filter(|r| !r.is_empty());
		}
		let rel = rest.strip_prefix('/')?;
		if rel.is_empty() {
			None
		} else {
			Some(rel)
		}
	}

	/// Remote metadata equality, the sole change-detection signal
	pub fn same_version(&self, other: &RemoteEntry) -> bool {
		self.size == other.size && self.modification_time == other.modification_time
	}
}

/// Last component of a slash-separated remote path
pub fn base_name(path: &str) -> &str {
	path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

/// A remote entry bound to its local materialization
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
	pub remote: RemoteEntry,
	pub source_root: String,
	pub mirror_path: PathBuf,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unpack_path: Option<PathBuf>,
	/// Unix seconds observed on the mirror file right after placement
	#[serde(default)]
	pub locally_observed_mod_time: i64,
}

impl SyncRecord {
	/// Archive spec for this record, if its unpack path is set
	pub fn archive(&self) -> Option<&'static ArchiveSpec> {
		self.unpack_path.as_ref().and_then(|_| ArchiveSpec::for_name(&self.remote.name))
	}
}

/// Where records land locally, and which optional capabilities are on
///
/// Every `SyncRecord` is built here so mirror and unpack paths are always
/// derived the same way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
	pub source_root: String,
	pub mirror_root: PathBuf,
	pub unpack_root: Option<PathBuf>,
	pub manifest_name: Option<String>,
}

impl Layout {
	pub fn supports_archive_expansion(&self) -> bool {
		self.unpack_root.is_some()
	}

	pub fn supports_manifest(&self) -> bool {
		self.manifest_name.is_some()
	}

	pub fn is_manifest(&self, name: &str) -> bool {
		self.manifest_name.as_deref() == Some(name)
	}

	/// Local mirror path for a relative remote path
	pub fn mirror_path(&self, rel: &str) -> PathBuf {
		join_relative(&self.mirror_root, rel)
	}

	/// Unpack directory for a relative remote path, if it names an archive
	pub fn unpack_path(&self, rel: &str) -> Option<PathBuf> {
		let root = self.unpack_root.as_ref()?;
		let spec = ArchiveSpec::for_name(base_name(rel))?;
		let stem = &rel[..rel.len() - spec.suffix.len()];
		if stem.is_empty() || stem.ends_with('/') {
			return None;
		}
		Some(join_relative(root, stem))
	}

	/// Source-relative path of `entry`
	///
	/// Refused when the entry lies outside the source root or its path could
	/// climb out of the local roots once joined.
	pub fn relative_path<'a>(&self, entry: &'a RemoteEntry) -> Result<&'a str, ValidationError> {
		let rel = entry.relative_to(&self.source_root).ok_or_else(|| {
			ValidationError::PathError(format!("{} lies outside {}", entry.full_path, self.source_root))
		})?;
		validate_relative_safe(Path::new(rel))?;
		Ok(rel)
	}

	/// Build a record for `entry`, or None if it has no safe relative path
	pub fn record_for(&self, entry: &RemoteEntry) -> Option<SyncRecord> {
		let rel = self.relative_path(entry).ok()?;
		Some(SyncRecord {
			remote: entry.clone(),
			source_root: self.source_root.clone(),
			mirror_path: self.mirror_path(rel),
			unpack_path: self.unpack_path(rel),
			locally_observed_mod_time: 0,
		})
	}
}

fn join_relative(root: &Path, rel: &str) -> PathBuf {
	let mut path = root.to_path_buf();
	for part in rel.split('/').filter(|p| !p.is_empty() && *p != ".") {
		path.push(part);
	}
	path
}

#[cfg(test)]
mod tests {
	use super::*;

	fn layout() -> Layout {
		Layout {
			source_root: "/data/src".to_string(),
			mirror_root: PathBuf::from("/dst/mirror"),
			unpack_root: Some(PathBuf::from("/dst/unpack")),
			manifest_name: None,
		}
	}

	#[test]
	fn test_relative_to() {
		let e = RemoteEntry::file("/data/src/dir/b.zip", 100, 0);
		assert_eq!(e.relative_to("/data/src"), Some("dir/b.zip"));
		assert_eq!(e.relative_to("/data/src/"), Some("dir/b.zip"));
		assert_eq!(e.relative_to("/data/sr"), None);
		assert_eq!(e.relative_to("/other"), None);
		assert_eq!(RemoteEntry::dir("/data/src", 0).relative_to("/data/src"), None);
	}

	#[test]
	fn test_record_paths() {
		let rec = layout().record_for(&RemoteEntry::file("/data/src/dir/b.zip", 100, 5)).unwrap();
		assert_eq!(rec.mirror_path, PathBuf::from("/dst/mirror/dir/b.zip"));
		assert_eq!(rec.unpack_path, Some(PathBuf::from("/dst/unpack/dir/b")));
		assert!(rec.mirror_path.starts_with("/dst/mirror"));

		let rec = layout().record_for(&RemoteEntry::file("/data/src/a.txt", 10, 5)).unwrap();
		assert_eq!(rec.unpack_path, None);
		assert!(rec.archive().is_none());
	}

	#[test]
	fn test_parent_components_never_escape() {
		let l = layout();
		let escaping = RemoteEntry::file("/data/src/../../payload", 4, 5);
		assert!(l.relative_path(&escaping).is_err());
		assert!(l.record_for(&escaping).is_none());
		assert!(l.record_for(&RemoteEntry::file("/data/src/dir/../b.zip", 4, 5)).is_none());
		assert!(l.record_for(&RemoteEntry::file("/elsewhere/a.txt", 4, 5)).is_none());
		assert_eq!(l.relative_path(&RemoteEntry::file("/data/src/dir/..b", 4, 5)).unwrap(), "dir/..b");
	}

	#[test]
	fn test_longest_suffix_strips_fully() {
		let l = layout();
		assert_eq!(l.unpack_path("x/data.tar.gz"), Some(PathBuf::from("/dst/unpack/x/data")));
		assert_eq!(l.unpack_path("data.tgz"), Some(PathBuf::from("/dst/unpack/data")));
		assert_eq!(l.unpack_path(".zip"), None);
	}

	#[test]
	fn test_no_unpack_without_capability() {
		let mut l = layout();
		l.unpack_root = None;
		assert!(!l.supports_archive_expansion());
		assert_eq!(l.unpack_path("b.zip"), None);
	}

	#[test]
	fn test_same_version() {
		let a = RemoteEntry::file("/a", 10, 100);
		assert!(a.same_version(&RemoteEntry::file("/a", 10, 100)));
		assert!(!a.same_version(&RemoteEntry::file("/a", 11, 100)));
		assert!(!a.same_version(&RemoteEntry::file("/a", 10, 101)));
	}
}

// vim: ts=4
