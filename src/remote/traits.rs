//! Narrow client interface onto the authoritative remote store
//!
//! The sync engine depends only on this trait, never on a concrete store.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWrite;

use super::error::RemoteError;
use crate::types::RemoteEntry;

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Writable byte sink for `get`
pub type Sink<'a> = &'a mut (dyn AsyncWrite + Unpin + Send);

#[async_trait]
pub trait RemoteClient: Send + Sync {
	/// List `path`; with `recurse`, every descendant, directories included
	async fn list(&self, path: &str, recurse: bool) -> RemoteResult<Vec<RemoteEntry>>;

	/// Stream an object into `sink`, returning the byte count
	async fn get(&self, path: &str, sink: Sink<'_>) -> RemoteResult<u64>;

	/// Write an object wholesale, replacing any existing one
	async fn put(&self, path: &str, bytes: &[u8]) -> RemoteResult<()>;

	/// Atomic rename within the store
	async fn rename(&self, src: &str, dst: &str) -> RemoteResult<()>;

	async fn remove(&self, path: &str) -> RemoteResult<()>;

	/// Monotonic count of calls issued, for diagnostics
	fn call_count(&self) -> u64;
}

/// Shared call counter for client implementations
#[derive(Debug, Default)]
pub struct CallCounter(AtomicU64);

impl CallCounter {
	pub fn tick(&self) {
		self.0.fetch_add(1, Ordering::Relaxed);
	}

	pub fn get(&self) -> u64 {
		self.0.load(Ordering::Relaxed)
	}
}


// vim: ts=4
