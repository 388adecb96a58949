//! Archive expansion into the unpack tree
//!
//! Extraction always happens in a private staging directory next to the
//! target, which is then swapped in with two renames. At every instant the
//! unpack path is absent, the previous extraction, or the complete new one.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs as afs;
use tokio::process::Command;
use uuid::Uuid;

use crate::error::SyncError;
use crate::logging::*;

/// Suffix to extraction command mapping
#[derive(Debug, PartialEq, Eq)]
pub struct ArchiveSpec {
	pub suffix: &'static str,
	program: &'static str,
	/// `{archive}` and `{dest}` are substituted
	args: &'static [&'static str],
}

const TAR_XZ: &[&str] = &["-xJf", "{archive}", "-C", "{dest}"];
const TAR_GZ: &[&str] = &["-xzf", "{archive}", "-C", "{dest}"];
const TAR_BZ2: &[&str] = &["-xjf", "{archive}", "-C", "{dest}"];

static SPECS: &[ArchiveSpec] = &[
	ArchiveSpec { suffix: ".zip", program: "unzip", args: &["-q", "-o", "{archive}", "-d", "{dest}"] },
	ArchiveSpec { suffix: ".tar.xz", program: "tar", args: TAR_XZ },
	ArchiveSpec { suffix: ".txz", program: "tar", args: TAR_XZ },
	ArchiveSpec { suffix: ".tar.gz", program: "tar", args: TAR_GZ },
	ArchiveSpec { suffix: ".tgz", program: "tar", args: TAR_GZ },
	ArchiveSpec { suffix: ".tar.bz2", program: "tar", args: TAR_BZ2 },
	ArchiveSpec { suffix: ".tbz2", program: "tar", args: TAR_BZ2 },
	ArchiveSpec { suffix: ".tar", program: "tar", args: &["-xf", "{archive}", "-C", "{dest}"] },
];

impl ArchiveSpec {
	/// Longest matching suffix for a file name; the name must have a stem
	pub fn for_name(name: &str) -> Option<&'static ArchiveSpec> {
		SPECS
			.iter()
			.filter(|s| name.len() > s.suffix.len() && name.ends_with(s.suffix))
			.max_by_key(|s| s.suffix.len())
	}

	pub fn command(&self, archive: &Path, dest: &Path) -> Command {
		let mut cmd = Command::new(self.program);
		for arg in self.args {
			match *arg {
				"{archive}" => cmd.arg(archive),
				"{dest}" => cmd.arg(dest),
				other => cmd.arg(other),
			};
		}
		cmd
	}
}

fn hidden_sibling(target: &Path, tag: &str) -> io::Result<PathBuf> {
	let parent = target
		.parent()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "unpack path has no parent"))?;
	let name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
	Ok(parent.join(format!(".{}.{}-{}", name, tag, Uuid::new_v4().simple())))
}

/// First half of the swap: move an existing target aside
pub async fn move_aside(target: &Path) -> io::Result<Option<PathBuf>> {
	match afs::symlink_metadata(target).await {
		Ok(_) => {
			let discard = hidden_sibling(target, "discard")?;
			afs::rename(target, &discard).await?;
			Ok(Some(discard))
		}
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e),
	}
}

/// Second half of the swap: staging into place, then drop the discard
pub async fn finish_swap(staging: &Path, target: &Path, discard: Option<PathBuf>) -> io::Result<()> {
	if let Err(e) = afs::rename(staging, target).await {
		if let Some(ref old) = discard {
			let _ = afs::rename(old, target).await;
		}
		return Err(e);
	}
	afs::set_permissions(target, std::fs::Permissions::from_mode(0o755)).await?;
	if let Some(old) = discard {
		if let Err(e) = afs::remove_dir_all(&old).await {
			warn!("cannot remove discarded extraction {}: {}", old.display(), e);
		}
	}
	Ok(())
}

/// Atomic replace of `target` by `staging`
pub async fn swap_into_place(staging: &Path, target: &Path) -> io::Result<()> {
	let discard = move_aside(target).await?;
	finish_swap(staging, target, discard).await
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExpander {
	pub dry_run: bool,
}

impl ArchiveExpander {
	pub fn new(dry_run: bool) -> Self {
		ArchiveExpander { dry_run }
	}

	/// Extract `archive` into `unpack_path`, replacing any previous extraction
	pub async fn expand(&self, archive: &Path, spec: &ArchiveSpec, unpack_path: &Path) -> Result<(), SyncError> {
		let fail = |message: String| SyncError::Archive { path: archive.display().to_string(), message };

		if self.dry_run {
			info!("would expand {} into {}", archive.display(), unpack_path.display());
			return Ok(());
		}

		if let Some(parent) = unpack_path.parent() {
			afs::create_dir_all(parent).await?;
		}
		let staging = hidden_sibling(unpack_path, "staging")?;
		afs::create_dir(&staging).await?;

		let output = spec
			.command(archive, &staging)
			.stdin(Stdio::null())
			.output()
			.await
			.map_err(|e| fail(format!("cannot run {}: {}", spec.program, e)));
		let output = match output {
			Ok(o) => o,
			Err(e) => {
				let _ = afs::remove_dir_all(&staging).await;
				return Err(e);
			}
		};
		if !output.status.success() {
			let _ = afs::remove_dir_all(&staging).await;
			return Err(fail(format!(
				"{} exited with {}: {}",
				spec.program,
				output.status,
				String::from_utf8_lossy(&output.stderr).trim()
			)));
		}

		if let Err(e) = swap_into_place(&staging, unpack_path).await {
			let _ = afs::remove_dir_all(&staging).await;
			return Err(fail(format!("cannot move extraction into place: {}", e)));
		}

		info!("expanded {} into {}", archive.display(), unpack_path.display());
		Ok(())
	}
}


// vim: ts=4
