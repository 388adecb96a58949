//! Logging prelude module for convenient access to tracing macros.
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("fetched {}", path.display());
//! ```

pub use tracing::{debug, error, info, trace, warn};

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Where log output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDest {
	/// stderr
	Console,
	/// Logging disabled
	Off,
	/// Append to a file
	File(std::path::PathBuf),
}

impl LogDest {
	pub fn parse(s: &str) -> Self {
		match s {
			"console" | "" => LogDest::Console,
			"none" | "off" => LogDest::Off,
			path => LogDest::File(path.into()),
		}
	}
}

/// Default filter directive for a `-v` count
fn level_for(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "info",
		1 => "debug",
		_ => "trace",
	}
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` overrides the verbosity-derived level:
///
/// ```bash
/// RUST_LOG=dfsync::fetch=debug dfsync fetch ...
/// ```
pub fn init_tracing(dest: &LogDest, verbosity: u8) -> io::Result<()> {
	let filter = || {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for(verbosity)))
	};

	match dest {
		LogDest::Off => {}
		LogDest::Console => {
			tracing_subscriber::fmt().with_env_filter(filter()).with_writer(io::stderr).init();
		}
		LogDest::File(path) => {
			let file = OpenOptions::new().create(true).append(true).open(path)?;
			tracing_subscriber::fmt()
				.with_env_filter(filter())
				.with_ansi(false)
				.with_writer(Mutex::new(file))
				.init();
		}
	}

	debug!("logging started");
	Ok(())
}


// vim: ts=4
