//! Filesystem-backed remote store (`file://` sources)
//!
//! Remote paths are absolute paths on the local filesystem. Mostly useful
//! for mirroring network mounts and for exercising the engine in tests.

use async_trait::async_trait;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs as afs;

use super::error::RemoteError;
use super::traits::{CallCounter, RemoteClient, RemoteResult, Sink};
use super::with_timeout;
use crate::types::RemoteEntry;

pub struct LocalRemote {
	timeout: Duration,
	calls: CallCounter,
}

impl LocalRemote {
	pub fn new(timeout: Duration) -> Self {
		LocalRemote { timeout, calls: CallCounter::default() }
	}

	fn not_found(path: &str, e: io::Error) -> RemoteError {
		if e.kind() == io::ErrorKind::NotFound {
			RemoteError::NotFound(path.to_string())
		} else {
			RemoteError::Io(e)
		}
	}
}

impl Default for LocalRemote {
	fn default() -> Self {
		LocalRemote::new(Duration::from_secs(300))
	}
}

fn entry_for(path: &Path, meta: &std::fs::Metadata) -> RemoteEntry {
	let full = path.to_string_lossy().into_owned();
	if meta.is_dir() {
		RemoteEntry::dir(full, meta.mtime())
	} else {
		RemoteEntry::file(full, meta.len(), meta.mtime())
	}
}

async fn list_impl(root: &Path, recurse: bool) -> io::Result<Vec<RemoteEntry>> {
	let meta = afs::metadata(root).await?;
	if !meta.is_dir() {
		return Ok(vec![entry_for(root, &meta)]);
	}

	let mut entries = Vec::new();
	let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
	while let Some(dir) = pending.pop() {
		let mut rd = afs::read_dir(&dir).await?;
		while let Some(child) = rd.next_entry().await? {
			let path = child.path();
			let meta = match afs::symlink_metadata(&path).await {
				Ok(m) => m,
				Err(_) => continue,
			};
			if meta.file_type().is_symlink() {
				continue;
			}
			if meta.is_dir() && recurse {
				pending.push(path.clone());
			}
			entries.push(entry_for(&path, &meta));
		}
	}
	entries.sort_by(|a, b| a.full_path.cmp(&b.full_path));
	Ok(entries)
}

#[async_trait]
impl RemoteClient for LocalRemote {
	async fn list(&self, path: &str, recurse: bool) -> RemoteResult<Vec<RemoteEntry>> {
		self.calls.tick();
		with_timeout("list", self.timeout, async {
			list_impl(Path::new(path), recurse).await.map_err(|e| Self::not_found(path, e))
		})
		.await
	}

	async fn get(&self, path: &str, sink: Sink<'_>) -> RemoteResult<u64> {
		self.calls.tick();
		with_timeout("get", self.timeout, async {
			let mut file = afs::File::open(path).await.map_err(|e| Self::not_found(path, e))?;
			let n = tokio::io::copy(&mut file, sink).await?;
			Ok(n)
		})
		.await
	}

	async fn put(&self, path: &str, bytes: &[u8]) -> RemoteResult<()> {
		self.calls.tick();
		with_timeout("put", self.timeout, async {
			if let Some(parent) = Path::new(path).parent() {
				afs::create_dir_all(parent).await?;
			}
			afs::write(path, bytes).await?;
			Ok(())
		})
		.await
	}

	async fn rename(&self, src: &str, dst: &str) -> RemoteResult<()> {
		self.calls.tick();
		with_timeout("rename", self.timeout, async {
			afs::rename(src, dst).await.map_err(|e| Self::not_found(src, e))
		})
		.await
	}

	async fn remove(&self, path: &str) -> RemoteResult<()> {
		self.calls.tick();
		with_timeout("remove", self.timeout, async {
			let meta = afs::symlink_metadata(path).await.map_err(|e| Self::not_found(path, e))?;
			if meta.is_dir() {
				afs::remove_dir_all(path).await?;
			} else {
				afs::remove_file(path).await?;
			}
			Ok(())
		})
		.await
	}

	fn call_count(&self) -> u64 {
		self.calls.get()
	}
}


// vim: ts=4
