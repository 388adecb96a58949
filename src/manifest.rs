//! Dataset manifests: run a declared command once its files are present
//!
//! A manifest is a JSON5 document next to the files it describes:
//!
//! ```text
//! {
//!   command: ["load-dataset", "--strict"],
//!   files: [ { path: "part-0001.csv", size: 1024 } ],
//! }
//! ```
//!
//! The command is invoked with the manifest path appended as its last
//! argument, from the manifest's own directory.

use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs as afs;
use tokio::process::Command;

use crate::error::ManifestError;
use crate::logging::*;
use crate::state::LocalIndex;
use crate::validation::validate_relative_safe;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestFile {
	pub path: String,
	pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
	pub command: Vec<String>,
	#[serde(default)]
	pub files: Vec<ManifestFile>,
}

impl Manifest {
	/// Parse and validate manifest text; `origin` is used in errors only
	pub fn parse(text: &str, origin: &Path) -> Result<Self, ManifestError> {
		let manifest: Manifest = json5::from_str(text).map_err(|e| ManifestError::Parse {
			path: origin.display().to_string(),
			message: e.to_string(),
		})?;
		if manifest.command.is_empty() || manifest.command[0].is_empty() {
			return Err(ManifestError::Parse {
				path: origin.display().to_string(),
				message: "command must not be empty".to_string(),
			});
		}
		for file in &manifest.files {
			validate_relative_safe(Path::new(&file.path))
				.map_err(|_| ManifestError::InvalidPath { path: file.path.clone() })?;
		}
		Ok(manifest)
	}
}

/// What happened to one manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestOutcome {
	/// Nothing changed since the last run
	Skipped,
	/// Command ran (or would have, in a dry run)
	Invoked,
}

#[derive(Debug, Clone)]
pub struct ManifestHook {
	manifest_name: String,
	dry_run: bool,
}

impl ManifestHook {
	pub fn new(manifest_name: impl Into<String>, dry_run: bool) -> Self {
		ManifestHook { manifest_name: manifest_name.into(), dry_run }
	}

	/// Process every tracked manifest; returns how many commands were invoked
	///
	/// `fresh` holds the mirror paths fetched during this run. Failures are
	/// logged and abort only the affected manifest.
	pub async fn check(&self, index: &LocalIndex, fresh: &BTreeSet<PathBuf>, last_run: Option<i64>) -> usize {
		let mut invoked = 0;
		for (path, record) in index {
			if record.remote.name != self.manifest_name {
				continue;
			}
			match self.process(path, fresh, last_run).await {
				Ok(ManifestOutcome::Invoked) => invoked += 1,
				Ok(ManifestOutcome::Skipped) => debug!("{}: unchanged, skipping", path.display()),
				Err(e) => error!("{}: {}", path.display(), e),
			}
		}
		invoked
	}

	/// Verify one manifest's files and run its command when anything changed
	pub async fn process(
		&self,
		manifest_path: &Path,
		fresh: &BTreeSet<PathBuf>,
		last_run: Option<i64>,
	) -> Result<ManifestOutcome, ManifestError> {
		let origin = manifest_path.display().to_string();
		let text = afs::read_to_string(manifest_path)
			.await
			.map_err(|e| ManifestError::Parse { path: origin.clone(), message: e.to_string() })?;
		let manifest = Manifest::parse(&text, manifest_path)?;
		let dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));

		self.report_untracked(dir, manifest_path, &manifest).await;

		let mut changed = last_run.is_none() || fresh.contains(manifest_path);
		for file in &manifest.files {
			let path = dir.join(&file.path);
			let meta = match afs::metadata(&path).await {
				Ok(m) if m.is_file() => m,
				_ => return Err(ManifestError::Missing { path: path.display().to_string() }),
			};
			if meta.len() != file.size {
				return Err(ManifestError::SizeMismatch {
					path: path.display().to_string(),
					expected: file.size,
					actual: meta.len(),
				});
			}
			if fresh.contains(&path) || last_run.map_or(true, |t| meta.mtime() > t) {
				changed = true;
			}
		}

		if !changed {
			return Ok(ManifestOutcome::Skipped);
		}
		self.invoke(&manifest, manifest_path, dir).await?;
		Ok(ManifestOutcome::Invoked)
	}

	async fn report_untracked(&self, dir: &Path, manifest_path: &Path, manifest: &Manifest) {
		let listed: HashSet<PathBuf> = manifest.files.iter().map(|f| dir.join(&f.path)).collect();
		let mut pending = vec![dir.to_path_buf()];
		while let Some(current) = pending.pop() {
			let mut entries = match afs::read_dir(&current).await {
				Ok(e) => e,
				Err(e) => {
					warn!("cannot read {}: {}", current.display(), e);
					continue;
				}
			};
			while let Ok(Some(entry)) = entries.next_entry().await {
				let path = entry.path();
				match entry.file_type().await {
					Ok(t) if t.is_dir() => pending.push(path),
					Ok(_) if path == manifest_path || listed.contains(&path) => {}
					Ok(_) => warn!("{}: not listed in {}", path.display(), manifest_path.display()),
					Err(e) => warn!("cannot stat {}: {}", path.display(), e),
				}
			}
		}
	}

	async fn invoke(&self, manifest: &Manifest, manifest_path: &Path, dir: &Path) -> Result<(), ManifestError> {
		let shown = manifest.command.join(" ");
		if self.dry_run {
			info!("would run '{} {}' in {}", shown, manifest_path.display(), dir.display());
			return Ok(());
		}

		info!("running '{} {}' in {}", shown, manifest_path.display(), dir.display());
		let output = Command::new(&manifest.command[0])
			.args(&manifest.command[1..])
			.arg(manifest_path)
			.current_dir(dir)
			.stdin(Stdio::null())
			.output()
			.await
			.map_err(|e| ManifestError::CommandFailed { command: shown.clone(), message: e.to_string() })?;

		if !output.status.success() {
			return Err(ManifestError::CommandFailed {
				command: shown,
				message: format!(
					"exited with {}: {}",
					output.status,
					String::from_utf8_lossy(&output.stderr).trim()
				),
			});
		}
		Ok(())
	}
}


// vim: ts=4
