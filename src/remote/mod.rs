//! Remote store clients
//!
//! `RemoteClient` is the only surface the engine uses; `connect` picks an
//! implementation from the source URL scheme.

pub mod error;
pub mod hdfs;
pub mod local;
pub mod traits;

pub use error::RemoteError;
pub use hdfs::{HdfsCliRemote, HdfsFlavor};
pub use local::LocalRemote;
pub use traits::{CallCounter, RemoteClient, RemoteResult, Sink};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Bound a remote call by the request timeout
pub(crate) async fn with_timeout<T, F>(operation: &str, timeout: Duration, fut: F) -> RemoteResult<T>
where
	F: Future<Output = RemoteResult<T>>,
{
	match tokio::time::timeout(timeout, fut).await {
		Ok(result) => result,
		Err(_) => {
			Err(RemoteError::Timeout { operation: operation.to_string(), secs: timeout.as_secs() })
		}
	}
}

/// Drop a leading `scheme://authority`, leaving the absolute path
pub fn strip_authority(url: &str) -> &str {
	match url.find("://") {
		Some(i) => {
			let rest = &url[i + 3..];
			match rest.find('/') {
				Some(j) => &rest[j..],
				None => "/",
			}
		}
		None => url,
	}
}

/// Parsed source URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl {
	pub scheme: String,
	/// `scheme://authority`, empty for plain paths
	pub base: String,
	/// Absolute path of the source root, no trailing slash
	pub path: String,
}

impl SourceUrl {
	pub fn parse(url: &str) -> Result<Self, String> {
		let (scheme, base) = match url.find("://") {
			Some(i) => {
				let after = &url[i + 3..];
				let authority_len = after.find('/').unwrap_or(after.len());
				(url[..i].to_string(), url[..i + 3 + authority_len].to_string())
			}
			None => ("file".to_string(), String::new()),
		};
		let path = strip_authority(url);
		if !path.starts_with('/') {
			return Err(format!("source '{}' must name an absolute path", url));
		}
		let trimmed = path.trim_end_matches('/');
		let path = if trimmed.is_empty() { "/" } else { trimmed };
		match scheme.as_str() {
			"file" | "hdfs" | "webhdfs" | "viewfs" => {}
			other => return Err(format!("unsupported source scheme '{}'", other)),
		}
		Ok(SourceUrl { scheme, base, path: path.to_string() })
	}

	pub fn is_local(&self) -> bool {
		self.scheme == "file"
	}
}

/// Build the client for a source URL
pub fn connect(source: &SourceUrl, flavor: HdfsFlavor, timeout: Duration) -> Arc<dyn RemoteClient> {
	if source.is_local() {
		Arc::new(LocalRemote::new(timeout))
	} else {
		Arc::new(HdfsCliRemote::new(source.base.clone(), flavor, timeout))
	}
}


// vim: ts=4
