//! Run orchestration: list, plan, fetch, sweep, post-process, persist
//!
//! The engine owns the in-memory index for the whole run. Workers hand
//! back outcomes and only this control flow merges them, after the fetch
//! barrier and before the sweep.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::SyncError;
use crate::fetch::FetchWorkerPool;
use crate::listing::RemoteIndexProvider;
use crate::logging::*;
use crate::manifest::ManifestHook;
use crate::orphan::OrphanCollector;
use crate::planner::SyncPlanner;
use crate::remote::{self, RemoteClient};
use crate::state::{unix_now, LocalIndexStore};

/// Outcome of one `fetch` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
	/// Remote entries seen, directories included
	pub listed: usize,
	/// Entries planned for download
	pub planned: usize,
	pub fetched: usize,
	pub failed: usize,
	/// Index records dropped because their remote entry went away
	pub purged: usize,
	pub expanded: usize,
	/// Local paths removed (or that would be, in a dry run)
	pub removed: Vec<PathBuf>,
	pub manifests_run: usize,
	/// Remote calls issued during the run
	pub remote_calls: u64,
}

impl fmt::Display for SyncReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"listed {}, planned {}, fetched {}, failed {}, purged {}, expanded {}, removed {}, manifests {}, remote calls {}",
			self.listed,
			self.planned,
			self.fetched,
			self.failed,
			self.purged,
			self.expanded,
			self.removed.len(),
			self.manifests_run,
			self.remote_calls
		)
	}
}

pub struct SyncEngine {
	config: Arc<Config>,
	client: Arc<dyn RemoteClient>,
}

impl SyncEngine {
	pub fn new(config: Arc<Config>, client: Arc<dyn RemoteClient>) -> Self {
		SyncEngine { config, client }
	}

	/// Engine with the client the source URL scheme calls for
	pub fn connect(config: Arc<Config>) -> Result<Self, SyncError> {
		let source = config.source_url()?;
		let client = remote::connect(&source, config.hdfs_cmd, config.timeout());
		Ok(SyncEngine::new(config, client))
	}

	pub fn client(&self) -> &Arc<dyn RemoteClient> {
		&self.client
	}

	fn provider(&self) -> Result<RemoteIndexProvider, SyncError> {
		let source = self.config.source_url()?;
		Ok(RemoteIndexProvider::new(
			self.client.clone(),
			&source.path,
			self.config.cache_object.as_deref(),
			self.config.dry_run,
		))
	}

	/// Rebuild the remote listing cache object only
	pub async fn refresh_cache(&self) -> Result<usize, SyncError> {
		let provider = self.provider()?;
		if provider.cache_paths().is_none() {
			return Err(SyncError::InvalidConfig { message: "cache requires --cache-object".to_string() });
		}
		Ok(provider.refresh_cache().await?)
	}

	/// One incremental mirror run
	pub async fn fetch(&self) -> Result<SyncReport, SyncError> {
		let config = &self.config;
		let run_started = unix_now();
		let calls_before = self.client.call_count();
		let layout = config.layout()?;
		let mut report = SyncReport::default();

		info!("Loading local index...");
		let store =
			LocalIndexStore::new(LocalIndexStore::default_path(&config.dest_dir), layout.clone(), config.dry_run);
		let loaded = store.load().await;

		info!("Collecting remote listing...");
		let entries = self.provider()?.list_or_cached(config.fresh_listing).await?;
		report.listed = entries.len();

		info!("Planning...");
		let planner = SyncPlanner::new(layout.clone(), &config.include, &config.in_progress_suffix)?;
		let plan = planner.diff(&entries, &loaded.records);
		report.planned = plan.to_fetch.len();
		report.purged = plan.to_purge.len();

		let mut index = loaded.records;
		for key in &plan.to_purge {
			index.remove(key);
		}

		// the spool is removed when it drops, on every exit path
		let spool = if config.dry_run {
			None
		} else {
			Some(tempfile::Builder::new().prefix(".dfsync-spool-").tempdir_in(config.temp_dir())?)
		};
		let spool_path = match spool {
			Some(ref s) => s.path().to_path_buf(),
			None => config.temp_dir().to_path_buf(),
		};

		info!("Fetching {} entries...", plan.to_fetch.len());
		let pool = FetchWorkerPool::new(self.client.clone(), spool_path.clone(), config.workers(), config.dry_run);
		let outcomes = pool.run(plan.to_fetch).await;

		let mut fresh = BTreeSet::new();
		for outcome in outcomes {
			match outcome.result {
				Ok(fetched) => {
					report.fetched += 1;
					if fetched.expanded {
						report.expanded += 1;
					}
					fresh.insert(outcome.mirror_path.clone());
					index.insert(outcome.mirror_path, fetched.record);
				}
				Err(_) => report.failed += 1,
			}
		}

		info!("Removing orphans...");
		let protected = vec![store.path().to_path_buf(), store.path().with_extension("json.tmp"), spool_path];
		let collector = OrphanCollector::new(config.dry_run, protected);
		report.removed = collector.sweep(layout.mirror_root.clone(), layout.unpack_root.clone(), index.clone()).await;

		if let Some(ref name) = layout.manifest_name {
			info!("Checking manifests...");
			let hook = ManifestHook::new(name.clone(), config.dry_run);
			report.manifests_run = hook.check(&index, &fresh, loaded.last_run).await;
		}

		store.save(&index, run_started).await?;
		drop(spool);

		report.remote_calls = self.client.call_count() - calls_before;
		info!("Sync complete: {}", report);
		Ok(report)
	}
}


// vim: ts=4
