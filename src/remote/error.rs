//! Remote client error types

use std::fmt;
use std::io;

/// Remote client error type
#[derive(Debug)]
pub enum RemoteError {
	/// I/O error talking to the store or writing the sink
	Io(io::Error),
	/// Object does not exist
	NotFound(String),
	/// Call exceeded the configured request timeout
	Timeout { operation: String, secs: u64 },
	/// External client command exited non-zero
	CommandFailed { command: String, output: String },
	/// Listing output could not be parsed
	Parse(String),
	/// Generic error message
	Other(String),
}

impl RemoteError {
	pub fn is_not_found(&self) -> bool {
		match self {
			RemoteError::NotFound(_) => true,
			RemoteError::Io(e) => e.kind() == io::ErrorKind::NotFound,
			_ => false,
		}
	}
}

impl fmt::Display for RemoteError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RemoteError::Io(e) => write!(f, "I/O error: {}", e),
			RemoteError::NotFound(path) => write!(f, "No such remote object: {}", path),
			RemoteError::Timeout { operation, secs } => {
				write!(f, "{} timed out after {}s", operation, secs)
			}
			RemoteError::CommandFailed { command, output } => {
				write!(f, "'{}' failed: {}", command, output.trim())
			}
			RemoteError::Parse(msg) => write!(f, "Listing parse error: {}", msg),
			RemoteError::Other(msg) => write!(f, "{}", msg),
		}
	}
}

impl std::error::Error for RemoteError {}

impl From<io::Error> for RemoteError {
	fn from(e: io::Error) -> Self {
		RemoteError::Io(e)
	}
}

impl From<String> for RemoteError {
	fn from(e: String) -> Self {
		RemoteError::Other(e)
	}
}

impl From<&str> for RemoteError {
	fn from(e: &str) -> Self {
		RemoteError::Other(e.to_string())
	}
}

// vim: ts=4
