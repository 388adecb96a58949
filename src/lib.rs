//! # dfsync - Incremental Remote Filesystem Mirror
//!
//! dfsync mirrors a subtree of a remote store (HDFS, or a local path)
//! onto local disk. Each run downloads only new or changed objects,
//! optionally expands archives into a separate unpack tree, runs dataset
//! manifest hooks, and removes local content the remote side no longer has.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dfsync::{config::Config, sync::SyncEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         source: "hdfs://namenode:8020/data/exports".to_string(),
//!         dest_dir: "/srv/exports".into(),
//!         archive_subdir: Some("unpack".to_string()),
//!         ..Config::default()
//!     };
//!     config.validate()?;
//!     let report = SyncEngine::connect(Arc::new(config))?.fetch().await?;
//!     println!("fetched {} files", report.fetched);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod fetch;
pub mod listing;
pub mod logging;
pub mod manifest;
pub mod orphan;
pub mod planner;
pub mod remote;
pub mod state;
pub mod sync;
pub mod types;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use error::{ManifestError, StateError, SyncError};
pub use sync::{SyncEngine, SyncReport};
pub use types::{Layout, RemoteEntry, SyncRecord};

// vim: ts=4
