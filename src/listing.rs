//! Remote listing, optionally served from a cached listing object
//!
//! A full recursive listing of a large remote tree is expensive, so the
//! `cache` command stores one as a JSON object on the remote store itself.
//! `fetch` then reads that object instead of walking the tree.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::logging::*;
use crate::remote::{RemoteClient, RemoteError, RemoteResult};
use crate::state::unix_now;
use crate::types::RemoteEntry;
use crate::validation::is_path_safe;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedListing {
	source: String,
	generated_at: i64,
	entries: Vec<RemoteEntry>,
}

/// Remote paths of the cache object and its two transient siblings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
	pub canonical: String,
	pub tmp: String,
	pub aside: String,
}

impl CachePaths {
	/// A relative `name` lives next to the source root, not inside it
	pub fn resolve(source_root: &str, name: &str) -> Self {
		let canonical = if name.starts_with('/') {
			name.to_string()
		} else {
			let root = source_root.trim_end_matches('/');
			let parent = match root.rfind('/') {
				Some(0) | None => "",
				Some(i) => &root[..i],
			};
			format!("{}/{}", parent, name)
		};
		CachePaths { tmp: format!("{}.tmp", canonical), aside: format!("{}.old", canonical), canonical }
	}

	pub fn contains(&self, path: &str) -> bool {
		path == self.canonical || path == self.tmp || path == self.aside
	}
}

pub struct RemoteIndexProvider {
	client: Arc<dyn RemoteClient>,
	source_root: String,
	cache: Option<CachePaths>,
	dry_run: bool,
}

impl RemoteIndexProvider {
	pub fn new(client: Arc<dyn RemoteClient>, source_root: &str, cache_object: Option<&str>, dry_run: bool) -> Self {
		RemoteIndexProvider {
			client,
			source_root: source_root.to_string(),
			cache: cache_object.map(|name| CachePaths::resolve(source_root, name)),
			dry_run,
		}
	}

	pub fn cache_paths(&self) -> Option<&CachePaths> {
		self.cache.as_ref()
	}

	/// Full recursive listing of the source root
	pub async fn list_fresh(&self) -> RemoteResult<Vec<RemoteEntry>> {
		info!("listing {}", self.source_root);
		let mut entries = self.client.list(&self.source_root, true).await?;
		if let Some(ref cache) = self.cache {
			entries.retain(|e| !cache.contains(&e.full_path));
		}
		info!("found {} remote entries", entries.len());
		Ok(entries)
	}

	/// Cached listing when available and sound, else a full listing
	pub async fn list_or_cached(&self, force_fresh: bool) -> RemoteResult<Vec<RemoteEntry>> {
		if let (Some(cache), false) = (&self.cache, force_fresh) {
			match self.read_cache(cache).await {
				Ok(mut entries) => {
					entries.retain(|e| !cache.contains(&e.full_path));
					info!("using cached listing {} ({} entries)", cache.canonical, entries.len());
					return Ok(entries);
				}
				Err(RemoteError::NotFound(_)) => info!("no cached listing at {}", cache.canonical),
				Err(e) => warn!("cached listing {} unusable: {}", cache.canonical, e),
			}
		}
		self.list_fresh().await
	}

	async fn read_cache(&self, cache: &CachePaths) -> RemoteResult<Vec<RemoteEntry>> {
		let mut buf: Vec<u8> = Vec::new();
		self.client.get(&cache.canonical, &mut buf).await?;
		let cached: CachedListing =
			serde_json::from_slice(&buf).map_err(|e| RemoteError::Parse(format!("corrupt cache: {}", e)))?;
		if cached.source != self.source_root {
			return Err(RemoteError::Parse(format!(
				"cache was built for {}, not {}",
				cached.source, self.source_root
			)));
		}
		if let Some(bad) = cached.entries.iter().find(|e| !is_path_safe(Path::new(&e.full_path))) {
			return Err(RemoteError::Parse(format!("corrupt cache: unsafe entry {}", bad.full_path)));
		}
		Ok(cached.entries)
	}

	/// Rebuild the cache object from a full listing; returns the entry count
	///
	/// The canonical name always holds either the previous listing or the
	/// new one while this runs.
	pub async fn refresh_cache(&self) -> RemoteResult<usize> {
		let cache = self
			.cache
			.as_ref()
			.ok_or_else(|| RemoteError::Other("no cache object configured".to_string()))?;
		let entries = self.list_fresh().await?;
		let count = entries.len();
		let listing = CachedListing { source: self.source_root.clone(), generated_at: unix_now(), entries };
		let bytes = serde_json::to_vec(&listing).map_err(|e| RemoteError::Other(e.to_string()))?;

		if self.dry_run {
			info!("would write {} entries to {}", count, cache.canonical);
			return Ok(count);
		}

		self.client.put(&cache.tmp, &bytes).await?;

		let had_old = match self.client.rename(&cache.canonical, &cache.aside).await {
			Ok(()) => true,
			Err(e) if e.is_not_found() => false,
			Err(e) => {
				let _ = self.client.remove(&cache.tmp).await;
				return Err(e);
			}
		};

		if let Err(e) = self.client.rename(&cache.tmp, &cache.canonical).await {
			if had_old {
				if let Err(restore) = self.client.rename(&cache.aside, &cache.canonical).await {
					error!("cannot restore {} from {}: {}", cache.canonical, cache.aside, restore);
				}
			}
			let _ = self.client.remove(&cache.tmp).await;
			return Err(e);
		}

		if had_old {
			if let Err(e) = self.client.remove(&cache.aside).await {
				warn!("cannot remove old cache {}: {}", cache.aside, e);
			}
		}
		info!("wrote {} entries to {}", count, cache.canonical);
		Ok(count)
	}
}


// vim: ts=4
