//! Run configuration for dfsync
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Optional TOML file given with `--config`
//! 3. CLI flags (highest priority)
//!
//! One `Config` value is built per process and handed to the components;
//! nothing reads configuration from ambient state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SyncError;
use crate::fetch::default_workers;
use crate::planner::DEFAULT_IN_PROGRESS_SUFFIX;
use crate::remote::{HdfsFlavor, SourceUrl};
use crate::types::Layout;
use crate::validation;

/// Default exclusivity port
pub const DEFAULT_PORT: u16 = 2311;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// REMOTE SOURCE
	// ========================================================================
	/// Source URL (`hdfs://nn:8020/path`, `file:///path` or a plain path)
	pub source: String,

	/// Listing cache object name; relative names sit next to the source root
	pub cache_object: Option<String>,

	/// Which HDFS client binary to drive
	pub hdfs_cmd: HdfsFlavor,

	/// Per-call request timeout in seconds
	pub timeout_secs: u64,

	/// Ignore the listing cache and list the remote tree
	pub fresh_listing: bool,

	// ========================================================================
	// LOCAL LAYOUT
	// ========================================================================
	/// Destination directory holding the trees and the index
	pub dest_dir: PathBuf,

	/// Fetch temp directory; defaults to the destination directory
	pub temp_dir: Option<PathBuf>,

	/// Mirror tree, relative to the destination
	pub sync_subdir: String,

	/// Unpack tree, relative to the destination; expansion is off when unset
	pub archive_subdir: Option<String>,

	/// Base name of dataset manifests; manifest handling is off when unset
	pub manifest_name: Option<String>,

	// ========================================================================
	// SELECTION
	// ========================================================================
	/// Globs over the source-relative path; empty matches everything
	pub include: Vec<String>,

	/// Remote names ending in this are still being written
	pub in_progress_suffix: String,

	// ========================================================================
	// EXECUTION
	// ========================================================================
	/// Concurrent fetch workers; defaults to available parallelism
	pub workers: Option<usize>,

	/// Plan and log only
	pub dry_run: bool,

	/// Loopback port held for the whole run
	pub port: u16,

	// ========================================================================
	// LOGGING
	// ========================================================================
	/// `console`, `none` or a file path
	pub log_dest: String,

	/// `-v` count
	pub verbosity: u8,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			source: String::new(),
			cache_object: None,
			hdfs_cmd: HdfsFlavor::New,
			timeout_secs: 300,
			fresh_listing: false,

			dest_dir: PathBuf::new(),
			temp_dir: None,
			sync_subdir: "mirror".to_string(),
			archive_subdir: None,
			manifest_name: None,

			include: vec![],
			in_progress_suffix: DEFAULT_IN_PROGRESS_SUFFIX.to_string(),

			workers: None,
			dry_run: false,
			port: DEFAULT_PORT,

			log_dest: "console".to_string(),
			verbosity: 0,
		}
	}
}

fn invalid(message: impl Into<String>) -> SyncError {
	SyncError::InvalidConfig { message: message.into() }
}

impl Config {
	/// Load settings from a TOML file, defaults filling the gaps
	pub fn from_toml_file(path: &Path) -> Result<Self, SyncError> {
		let text = std::fs::read_to_string(path)
			.map_err(|e| invalid(format!("cannot read config {}: {}", path.display(), e)))?;
		Self::from_toml_str(&text).map_err(|e| invalid(format!("{}: {}", path.display(), e)))
	}

	pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(text)
	}

	pub fn source_url(&self) -> Result<SourceUrl, SyncError> {
		if self.source.is_empty() {
			return Err(invalid("no source URL given"));
		}
		SourceUrl::parse(&self.source).map_err(invalid)
	}

	pub fn mirror_root(&self) -> PathBuf {
		if self.sync_subdir.is_empty() {
			self.dest_dir.clone()
		} else {
			self.dest_dir.join(&self.sync_subdir)
		}
	}

	pub fn unpack_root(&self) -> Option<PathBuf> {
		self.archive_subdir.as_ref().map(|sub| self.dest_dir.join(sub))
	}

	pub fn temp_dir(&self) -> &Path {
		self.temp_dir.as_deref().unwrap_or(&self.dest_dir)
	}

	pub fn workers(&self) -> usize {
		self.workers.unwrap_or_else(default_workers).max(1)
	}

	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}

	/// Startup checks; every failure is fatal before any remote contact
	pub fn validate(&self) -> Result<(), SyncError> {
		self.source_url()?;
		if self.dest_dir.as_os_str().is_empty() {
			return Err(invalid("no destination directory given"));
		}
		validation::validate_existing_dir("destination directory", &self.dest_dir)?;
		validation::validate_existing_dir("temp directory", self.temp_dir())?;
		validation::validate_same_device(self.temp_dir(), &self.dest_dir)?;
		validation::validate_timeout_secs(self.timeout_secs)?;
		if let Some(workers) = self.workers {
			validation::validate_workers(workers)?;
		}

		validation::validate_subdir("sync subdir", &self.sync_subdir)?;
		if let Some(ref sub) = self.archive_subdir {
			validation::validate_subdir("archive subdir", sub)?;
			if sub.is_empty() {
				return Err(invalid("archive subdir must not be empty"));
			}
		}
		if let Some(unpack) = self.unpack_root() {
			validation::validate_roots_disjoint(&self.mirror_root(), &unpack)?;
		}

		if let Some(ref name) = self.manifest_name {
			if name.is_empty() || name.contains('/') {
				return Err(invalid(format!("manifest name must be a plain file name: '{}'", name)));
			}
		}

		for pattern in &self.include {
			globset::Glob::new(pattern).map_err(|e| SyncError::Pattern {
				pattern: pattern.clone(),
				message: e.to_string(),
			})?;
		}
		Ok(())
	}

	/// Path layout for this run
	pub fn layout(&self) -> Result<Layout, SyncError> {
		Ok(Layout {
			source_root: self.source_url()?.path,
			mirror_root: self.mirror_root(),
			unpack_root: self.unpack_root(),
			manifest_name: self.manifest_name.clone(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn config(dest: &Path) -> Config {
		Config { source: "hdfs://nn:8020/data/src".to_string(), dest_dir: dest.to_path_buf(), ..Config::default() }
	}

	#[test]
	fn test_defaults() {
		let c = Config::default();
		assert_eq!(c.port, 2311);
		assert_eq!(c.timeout_secs, 300);
		assert_eq!(c.sync_subdir, "mirror");
		assert_eq!(c.in_progress_suffix, "._COPYING_");
		assert!(c.workers() >= 1);
	}

	#[test]
	fn test_toml_overrides_defaults() {
		let c = Config::from_toml_str(
			r#"
			source = "hdfs://nn/data"
			archiveSubdir = "unpack"
			include = ["*.csv"]
			workers = 3
			hdfsCmd = "old"
			"#,
		)
		.unwrap();
		assert_eq!(c.source, "hdfs://nn/data");
		assert_eq!(c.archive_subdir.as_deref(), Some("unpack"));
		assert_eq!(c.include, vec!["*.csv".to_string()]);
		assert_eq!(c.workers(), 3);
		assert_eq!(c.hdfs_cmd, HdfsFlavor::Old);
		assert_eq!(c.sync_subdir, "mirror");
	}

	#[test]
	fn test_valid_config_and_layout() {
		let tmp = TempDir::new().unwrap();
		let mut c = config(tmp.path());
		c.archive_subdir = Some("unpack".to_string());
		c.validate().unwrap();

		let layout = c.layout().unwrap();
		assert_eq!(layout.source_root, "/data/src");
		assert_eq!(layout.mirror_root, tmp.path().join("mirror"));
		assert_eq!(layout.unpack_root, Some(tmp.path().join("unpack")));
		assert!(layout.supports_archive_expansion());
		assert!(!layout.supports_manifest());
	}

	#[test]
	fn test_missing_dest_is_fatal() {
		let tmp = TempDir::new().unwrap();
		let c = config(&tmp.path().join("missing"));
		let err = c.validate().unwrap_err();
		assert!(err.is_startup_fatal());
	}

	#[test]
	fn test_nested_roots_rejected() {
		let tmp = TempDir::new().unwrap();
		let mut c = config(tmp.path());
		c.sync_subdir = String::new();
		c.archive_subdir = Some("unpack".to_string());
		assert!(c.validate().unwrap_err().is_startup_fatal());
	}

	#[test]
	fn test_bad_source_and_glob_rejected() {
		let tmp = TempDir::new().unwrap();
		let mut c = config(tmp.path());
		c.source = "s3://bucket/x".to_string();
		assert!(c.validate().is_err());

		let mut c = config(tmp.path());
		c.include = vec!["a[".to_string()];
		assert!(matches!(c.validate(), Err(SyncError::Pattern { .. })));
	}

	#[test]
	fn test_temp_dir_defaults_to_dest() {
		let tmp = TempDir::new().unwrap();
		let c = config(tmp.path());
		assert_eq!(c.temp_dir(), tmp.path());
	}
}

// vim: ts=4
