//! Configuration validation functions

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use super::path::paths_disjoint;
use super::ValidationError;

/// Validate worker count
pub fn validate_workers(workers: usize) -> Result<(), ValidationError> {
	if workers == 0 {
		return Err(ValidationError::ConfigError("Worker count must be greater than 0".to_string()));
	}
	if workers > 256 {
		return Err(ValidationError::ConfigError(format!("Worker count too high: {}", workers)));
	}
	Ok(())
}

/// Validate timeout in seconds
pub fn validate_timeout_secs(timeout_secs: u64) -> Result<(), ValidationError> {
	if timeout_secs == 0 {
		return Err(ValidationError::ConfigError("Timeout must be greater than 0".to_string()));
	}
	if timeout_secs > 86400 {
		return Err(ValidationError::ConfigError(format!(
			"Timeout too large: {} seconds (max 86400)",
			timeout_secs
		)));
	}
	Ok(())
}

/// Validate that `dir` exists and is a directory
pub fn validate_existing_dir(what: &str, dir: &Path) -> Result<(), ValidationError> {
	match std::fs::metadata(dir) {
		Ok(m) if m.is_dir() => Ok(()),
		Ok(_) => Err(ValidationError::ConfigError(format!("{} is not a directory: {}", what, dir.display()))),
		Err(e) => Err(ValidationError::ConfigError(format!("{} {}: {}", what, dir.display(), e))),
	}
}

/// Validate that two directories live on the same filesystem
///
/// Renames from the spool into the mirror are only atomic within one device.
pub fn validate_same_device(a: &Path, b: &Path) -> Result<(), ValidationError> {
	let dev = |p: &Path| {
		std::fs::metadata(p)
			.map(|m| m.dev())
			.map_err(|e| ValidationError::ConfigError(format!("cannot stat {}: {}", p.display(), e)))
	};
	if dev(a)? != dev(b)? {
		return Err(ValidationError::ConfigError(format!(
			"{} and {} are on different filesystems",
			a.display(),
			b.display()
		)));
	}
	Ok(())
}

/// Validate that mirror and unpack roots do not nest
pub fn validate_roots_disjoint(mirror: &Path, unpack: &Path) -> Result<(), ValidationError> {
	if !paths_disjoint(mirror, unpack) {
		return Err(ValidationError::ConfigError(format!(
			"mirror root {} and unpack root {} must not contain each other",
			mirror.display(),
			unpack.display()
		)));
	}
	Ok(())
}

/// Validate a subdirectory name given relative to the destination
pub fn validate_subdir(what: &str, name: &str) -> Result<(), ValidationError> {
	let path = Path::new(name);
	if path.is_absolute() || !super::path::is_path_safe(path) {
		return Err(ValidationError::ConfigError(format!("{} must be a plain relative path: {}", what, name)));
	}
	Ok(())
}


// vim: ts=4
