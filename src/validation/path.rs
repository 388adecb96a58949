//! Path validation functions

use std::path::{Component, Path};

use super::ValidationError;

/// Check if a path is safe (no parent directory references)
pub fn is_path_safe(path: &Path) -> bool {
	!path.components().any(|c| matches!(c, Component::ParentDir))
}

/// Validate a relative path taken from remote-authored input
///
/// Rejects absolute paths and `..` components so the result can be joined
/// onto a local directory without escaping it.
pub fn validate_relative_safe(path: &Path) -> Result<(), ValidationError> {
	if path.is_absolute() {
		return Err(ValidationError::PathError(format!(
			"Path must be relative, got absolute path: {:?}",
			path
		)));
	}
	if !is_path_safe(path) {
		return Err(ValidationError::PathError(
			"Path contains parent directory reference (..)".to_string(),
		));
	}
	if path.as_os_str().is_empty() {
		return Err(ValidationError::PathError("Path is empty".to_string()));
	}
	Ok(())
}

/// Number of leading components shared by two paths
pub fn common_prefix_len(a: &Path, b: &Path) -> usize {
	a.components().zip(b.components()).take_while(|(x, y)| x == y).count()
}

/// Check if path lies strictly below root
///
/// A root with no components never contains anything.
pub fn is_path_within_root(path: &Path, root: &Path) -> bool {
	let root_len = root.components().count();
	root_len > 0 && path != root && common_prefix_len(path, root) == root_len
}

/// Check that neither path contains the other
pub fn paths_disjoint(a: &Path, b: &Path) -> bool {
	!a.starts_with(b) && !b.starts_with(a)
}


// vim: ts=4
