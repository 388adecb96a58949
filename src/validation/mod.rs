//! Centralized validation helpers
//!
//! - Configuration validation (devices, root layout, limits)
//! - Path validation (safety, root containment)

use std::error::Error;
use std::fmt;

pub mod config;
pub mod path;

pub use config::*;
pub use path::*;

/// Generic validation error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
	/// Invalid configuration
	ConfigError(String),
	/// Invalid path
	PathError(String),
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ValidationError::ConfigError(msg) => write!(f, "Config validation error: {}", msg),
			ValidationError::PathError(msg) => write!(f, "Path validation error: {}", msg),
		}
	}
}

impl Error for ValidationError {}

impl From<ValidationError> for crate::error::SyncError {
	fn from(e: ValidationError) -> Self {
		crate::error::SyncError::InvalidConfig { message: e.to_string() }
	}
}


// vim: ts=4
