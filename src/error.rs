//! Error types for dfsync operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::remote::RemoteError;

/// Main error type for sync operations
#[derive(Debug)]
pub enum SyncError {
	/// I/O error
	Io(io::Error),

	/// Invalid configuration (fatal at startup)
	InvalidConfig { message: String },

	/// Another instance holds the exclusivity port
	LockHeld { port: u16 },

	/// Remote store operation failed
	Remote(RemoteError),

	/// Local index error (nested)
	State(StateError),

	/// Archive extraction failed
	Archive { path: String, message: String },

	/// Manifest error (nested)
	Manifest(ManifestError),

	/// Include glob failed to compile
	Pattern { pattern: String, message: String },

	/// Generic error message
	Other { message: String },
}

impl SyncError {
	/// True for conditions that must abort before any remote contact
	pub fn is_startup_fatal(&self) -> bool {
		matches!(self, SyncError::InvalidConfig { .. } | SyncError::LockHeld { .. })
	}
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::LockHeld { port } => {
				write!(f, "Another instance is already running (port {} in use)", port)
			}
			SyncError::Remote(e) => write!(f, "Remote error: {}", e),
			SyncError::State(e) => write!(f, "Index error: {}", e),
			SyncError::Archive { path, message } => {
				write!(f, "Archive extraction failed for {}: {}", path, message)
			}
			SyncError::Manifest(e) => write!(f, "Manifest error: {}", e),
			SyncError::Pattern { pattern, message } => {
				write!(f, "Invalid include pattern '{}': {}", pattern, message)
			}
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SyncError::Io(e) => Some(e),
			SyncError::Remote(e) => Some(e),
			SyncError::State(e) => Some(e),
			SyncError::Manifest(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<String> for SyncError {
	fn from(e: String) -> Self {
		SyncError::Other { message: e }
	}
}

impl From<RemoteError> for SyncError {
	fn from(e: RemoteError) -> Self {
		SyncError::Remote(e)
	}
}

impl From<StateError> for SyncError {
	fn from(e: StateError) -> Self {
		SyncError::State(e)
	}
}

impl From<ManifestError> for SyncError {
	fn from(e: ManifestError) -> Self {
		SyncError::Manifest(e)
	}
}

/// Local index persistence errors
#[derive(Debug)]
pub enum StateError {
	/// Failed to load index
	LoadFailed { source: Box<dyn Error + Send + Sync> },

	/// Failed to save index
	SaveFailed { source: Box<dyn Error + Send + Sync> },

	/// Index file is corrupted
	Corrupted { message: String },
}

impl fmt::Display for StateError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StateError::LoadFailed { source } => write!(f, "Failed to load index: {}", source),
			StateError::SaveFailed { source } => write!(f, "Failed to save index: {}", source),
			StateError::Corrupted { message } => write!(f, "Index corrupted: {}", message),
		}
	}
}

impl Error for StateError {}

/// Manifest processing errors
///
/// These never fail a run; they abort the affected manifest only.
#[derive(Debug)]
pub enum ManifestError {
	/// Manifest could not be read or parsed
	Parse { path: String, message: String },

	/// Listed path is absolute or escapes the manifest directory
	InvalidPath { path: String },

	/// Listed file is not on disk
	Missing { path: String },

	/// Listed file has the wrong size
	SizeMismatch { path: String, expected: u64, actual: u64 },

	/// Declared command could not be run or exited non-zero
	CommandFailed { command: String, message: String },
}

impl fmt::Display for ManifestError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ManifestError::Parse { path, message } => {
				write!(f, "Cannot parse manifest {}: {}", path, message)
			}
			ManifestError::InvalidPath { path } => {
				write!(f, "Manifest entry has an invalid path: {}", path)
			}
			ManifestError::Missing { path } => write!(f, "Manifest entry missing: {}", path),
			ManifestError::SizeMismatch { path, expected, actual } => {
				write!(f, "Manifest entry {} has size {}, expected {}", path, actual, expected)
			}
			ManifestError::CommandFailed { command, message } => {
				write!(f, "Manifest command '{}' failed: {}", command, message)
			}
		}
	}
}

impl Error for ManifestError {}


// vim: ts=4
