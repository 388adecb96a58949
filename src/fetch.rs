//! Bounded worker pool that downloads and places planned entries
//!
//! Each task streams into a private temp file in the spool directory and
//! renames it into the mirror, so a failed fetch never leaves a partial
//! file at the mirror path. Workers never touch the index: they hand back
//! one `FetchOutcome` per entry and the caller merges them.

use futures::future::join_all;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs as afs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::archive::ArchiveExpander;
use crate::error::SyncError;
use crate::logging::*;
use crate::remote::RemoteClient;
use crate::types::SyncRecord;

/// Result of one fetch task
#[derive(Debug)]
pub struct FetchOutcome {
	pub mirror_path: PathBuf,
	pub result: Result<FetchedFile, SyncError>,
}

/// A successfully placed entry
#[derive(Debug, Clone)]
pub struct FetchedFile {
	/// Record with its locally observed modification time filled in
	pub record: SyncRecord,
	pub expanded: bool,
}

#[derive(Clone)]
struct TaskContext {
	client: Arc<dyn RemoteClient>,
	spool: PathBuf,
	expander: ArchiveExpander,
	dry_run: bool,
}

pub struct FetchWorkerPool {
	ctx: TaskContext,
	workers: usize,
}

/// Worker count when none is configured
pub fn default_workers() -> usize {
	std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

impl FetchWorkerPool {
	/// `spool` must be on the same device as the mirror root
	pub fn new(client: Arc<dyn RemoteClient>, spool: PathBuf, workers: usize, dry_run: bool) -> Self {
		FetchWorkerPool {
			ctx: TaskContext { client, spool, expander: ArchiveExpander::new(dry_run), dry_run },
			workers: workers.max(1),
		}
	}

	/// Fetch every record; returns only after all tasks finished
	pub async fn run(&self, to_fetch: Vec<SyncRecord>) -> Vec<FetchOutcome> {
		if to_fetch.is_empty() {
			return Vec::new();
		}
		debug!("fetching {} entries with {} workers", to_fetch.len(), self.workers);

		let permits = Arc::new(Semaphore::new(self.workers));
		let mut keys = Vec::with_capacity(to_fetch.len());
		let mut handles = Vec::with_capacity(to_fetch.len());

		// scatter: every task is submitted before any is awaited
		for record in to_fetch {
			let ctx = self.ctx.clone();
			let permits = permits.clone();
			keys.push(record.mirror_path.clone());
			handles.push(tokio::spawn(async move {
				let _permit = permits.acquire_owned().await;
				fetch_one(&ctx, record).await
			}));
		}

		// gather
		join_all(handles)
			.await
			.into_iter()
			.zip(keys)
			.map(|(joined, mirror_path)| {
				let result = match joined {
					Ok(result) => result,
					Err(e) => Err(SyncError::Other { message: format!("fetch task aborted: {}", e) }),
				};
				if let Err(ref e) = result {
					error!("{}: fetch failed: {}", mirror_path.display(), e);
				}
				FetchOutcome { mirror_path, result }
			})
			.collect()
	}
}

async fn fetch_one(ctx: &TaskContext, mut record: SyncRecord) -> Result<FetchedFile, SyncError> {
	let expands = record.archive().is_some();

	if ctx.dry_run {
		info!("would fetch {} to {}", record.remote.full_path, record.mirror_path.display());
		if let (Some(spec), Some(unpack)) = (record.archive(), record.unpack_path.clone()) {
			ctx.expander.expand(&record.mirror_path, spec, &unpack).await?;
		}
		return Ok(FetchedFile { record, expanded: expands });
	}

	let tmp = ctx.spool.join(Uuid::new_v4().to_string());
	if let Err(e) = place(ctx, &mut record, &tmp).await {
		if afs::symlink_metadata(&tmp).await.is_ok() {
			let _ = afs::remove_file(&tmp).await;
		}
		return Err(e);
	}
	info!("{}: fetched from {}", record.mirror_path.display(), record.remote.full_path);

	if let (Some(spec), Some(unpack)) = (record.archive(), record.unpack_path.clone()) {
		ctx.expander.expand(&record.mirror_path, spec, &unpack).await?;
	}
	Ok(FetchedFile { record, expanded: expands })
}

/// Download into `tmp`, then move into the mirror path
async fn place(ctx: &TaskContext, record: &mut SyncRecord, tmp: &Path) -> Result<(), SyncError> {
	let mut file = afs::File::create(tmp).await?;
	let written = ctx.client.get(&record.remote.full_path, &mut file).await?;
	file.flush().await?;
	file.sync_all().await?;
	drop(file);

	if written != record.remote.size {
		return Err(SyncError::Other {
			message: format!(
				"short transfer of {}: got {} bytes, listing said {}",
				record.remote.full_path, written, record.remote.size
			),
		});
	}

	if let Some(parent) = record.mirror_path.parent() {
		afs::create_dir_all(parent).await?;
	}

	let mut perms = afs::metadata(tmp).await?.permissions();
	perms.set_mode(perms.mode() | 0o044);
	afs::set_permissions(tmp, perms).await?;

	filetime::set_file_mtime(tmp, filetime::FileTime::from_unix_time(record.remote.modification_time, 0))?;

	afs::rename(tmp, &record.mirror_path).await?;
	record.locally_observed_mod_time = afs::metadata(&record.mirror_path).await?.mtime();
	Ok(())
}


// vim: ts=4
