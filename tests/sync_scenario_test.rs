//! End-to-end runs of the sync engine against a filesystem-backed remote
//!
//! This test suite covers:
//! - The three-run mirror scenario (fetch, idle, remote removal)
//! - Idempotence and convergence of the index
//! - Purge boundary, path containment and dry-run behavior
//! - Local tampering, failed fetch retry and manifest gating

use async_trait::async_trait;
use filetime::{set_file_mtime, FileTime};
use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use dfsync::config::Config;
use dfsync::remote::{LocalRemote, RemoteClient, RemoteError, RemoteResult, Sink};
use dfsync::sync::SyncEngine;
use dfsync::types::RemoteEntry;

// ============================================================================
// Helper Functions for Test Setup
// ============================================================================

struct Fixture {
	tmp: TempDir,
}

impl Fixture {
	fn new() -> Self {
		let tmp = TempDir::new().unwrap();
		fs::create_dir_all(tmp.path().join("src")).unwrap();
		fs::create_dir_all(tmp.path().join("dest")).unwrap();
		Fixture { tmp }
	}

	fn src(&self) -> PathBuf {
		self.tmp.path().join("src")
	}

	fn dest(&self) -> PathBuf {
		self.tmp.path().join("dest")
	}

	fn mirror(&self) -> PathBuf {
		self.dest().join("mirror")
	}

	fn unpack(&self) -> PathBuf {
		self.dest().join("unpack")
	}

	/// Write a remote file with a fixed modification time
	fn remote_file(&self, rel: &str, content: &[u8], mtime: i64) -> PathBuf {
		let path = self.src().join(rel);
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(&path, content).unwrap();
		set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
		path
	}

	fn config(&self) -> Config {
		Config {
			source: self.src().to_string_lossy().into_owned(),
			dest_dir: self.dest(),
			archive_subdir: Some("unpack".to_string()),
			workers: Some(2),
			..Config::default()
		}
	}

	fn engine(&self, config: Config) -> SyncEngine {
		config.validate().unwrap();
		SyncEngine::new(Arc::new(config), Arc::new(LocalRemote::default()))
	}

	/// Mirror paths recorded in the persisted index
	fn index_keys(&self) -> Vec<PathBuf> {
		let text = fs::read_to_string(self.dest().join(".dfsync.json")).unwrap();
		let value: serde_json::Value = serde_json::from_str(&text).unwrap();
		let mut keys: Vec<PathBuf> = value["records"].as_object().unwrap().keys().map(PathBuf::from).collect();
		keys.sort();
		keys
	}
}

fn tool_available(name: &str) -> bool {
	Command::new(name).arg("--version").stdout(Stdio::null()).stderr(Stdio::null()).status().is_ok()
}

/// Pack `files` into a tar archive at `archive`
fn make_tar(archive: &Path, files: &[(&str, &str)]) {
	let staging = TempDir::new().unwrap();
	for (name, content) in files {
		fs::write(staging.path().join(name), content).unwrap();
	}
	let mut cmd = Command::new("tar");
	cmd.arg("-cf").arg(archive).arg("-C").arg(staging.path());
	for (name, _) in files {
		cmd.arg(name);
	}
	assert!(cmd.status().unwrap().success());
}

// ============================================================================
// Scenario
// ============================================================================

#[tokio::test]
async fn test_three_run_scenario() {
	if !tool_available("tar") {
		eprintln!("tar not available, skipping");
		return;
	}
	let f = Fixture::new();
	f.remote_file("a.txt", b"0123456789", 1_600_000_000);
	fs::create_dir_all(f.src().join("dir")).unwrap();
	let archive = f.src().join("dir/b.tar");
	make_tar(&archive, &[("inner.txt", "hello"), ("other.txt", "world")]);
	set_file_mtime(&archive, FileTime::from_unix_time(1_600_000_100, 0)).unwrap();

	let engine = f.engine(f.config());

	// run 1: everything is fetched, the archive expanded
	let report = engine.fetch().await.unwrap();
	assert_eq!(report.fetched, 2);
	assert_eq!(report.expanded, 1);
	assert_eq!(report.failed, 0);
	assert_eq!(fs::read_to_string(f.mirror().join("a.txt")).unwrap(), "0123456789");
	assert_eq!(fs::read_to_string(f.unpack().join("dir/b/inner.txt")).unwrap(), "hello");
	assert_eq!(f.index_keys(), vec![f.mirror().join("a.txt"), f.mirror().join("dir/b.tar")]);
	let unpack_ino = fs::metadata(f.unpack().join("dir/b")).unwrap().ino();

	// run 2: nothing changed, only the listing call is made
	let report = engine.fetch().await.unwrap();
	assert_eq!(report.planned, 0);
	assert_eq!(report.fetched, 0);
	assert_eq!(report.remote_calls, 1);
	assert!(report.removed.is_empty());

	// run 3: the remote drops a.txt
	fs::remove_file(f.src().join("a.txt")).unwrap();
	let report = engine.fetch().await.unwrap();
	assert_eq!(report.purged, 1);
	assert!(!f.mirror().join("a.txt").exists());
	assert_eq!(f.index_keys(), vec![f.mirror().join("dir/b.tar")]);
	assert_eq!(fs::metadata(f.unpack().join("dir/b")).unwrap().ino(), unpack_ino);
	assert!(f.unpack().join("dir/b/other.txt").exists());
}

#[tokio::test]
async fn test_zip_archive_expands_when_tools_exist() {
	if !tool_available("zip") || !tool_available("unzip") {
		eprintln!("zip/unzip not available, skipping");
		return;
	}
	let f = Fixture::new();
	let content = TempDir::new().unwrap();
	fs::write(content.path().join("data.csv"), "1,2,3").unwrap();
	fs::create_dir_all(f.src().join("dir")).unwrap();
	let status = Command::new("zip")
		.arg("-q")
		.arg(f.src().join("dir/b.zip"))
		.arg("data.csv")
		.current_dir(content.path())
		.status()
		.unwrap();
	assert!(status.success());

	let report = f.engine(f.config()).fetch().await.unwrap();
	assert_eq!(report.expanded, 1);
	assert_eq!(fs::read_to_string(f.unpack().join("dir/b/data.csv")).unwrap(), "1,2,3");
}

// ============================================================================
// Idempotence and convergence
// ============================================================================

#[tokio::test]
async fn test_second_run_is_idle() {
	let f = Fixture::new();
	for i in 0..20 {
		f.remote_file(&format!("d{}/f{}.dat", i % 3, i), format!("content {}", i).as_bytes(), 1_500_000_000 + i);
	}
	let engine = f.engine(f.config());

	let first = engine.fetch().await.unwrap();
	assert_eq!(first.fetched, 20);

	let second = engine.fetch().await.unwrap();
	assert_eq!(second.planned, 0);
	assert_eq!(second.purged, 0);
	assert!(second.removed.is_empty());
	assert_eq!(second.remote_calls, 1);
}

#[tokio::test]
async fn test_index_converges_to_filtered_listing() {
	let f = Fixture::new();
	f.remote_file("x.csv", b"x", 100);
	f.remote_file("sub/w.csv", b"w", 100);
	f.remote_file("y.txt", b"y", 100);
	f.remote_file("z.csv._COPYING_", b"z", 100);
	fs::create_dir_all(f.src().join("empty")).unwrap();

	let mut config = f.config();
	config.include = vec!["*.csv".to_string()];
	f.engine(config).fetch().await.unwrap();

	assert_eq!(f.index_keys(), vec![f.mirror().join("sub/w.csv"), f.mirror().join("x.csv")]);
	assert!(!f.mirror().join("y.txt").exists());
	assert!(!f.mirror().join("z.csv._COPYING_").exists());
	assert!(!f.mirror().join("empty").exists());
}

#[tokio::test]
async fn test_changed_remote_metadata_refetches() {
	let f = Fixture::new();
	f.remote_file("a.txt", b"old", 100);
	let engine = f.engine(f.config());
	engine.fetch().await.unwrap();

	f.remote_file("a.txt", b"new", 200);
	let report = engine.fetch().await.unwrap();
	assert_eq!(report.fetched, 1);
	assert_eq!(fs::read_to_string(f.mirror().join("a.txt")).unwrap(), "new");
	assert_eq!(fs::metadata(f.mirror().join("a.txt")).unwrap().mtime(), 200);
}

#[tokio::test]
async fn test_local_tampering_forces_refetch() {
	let f = Fixture::new();
	f.remote_file("a.txt", b"pristine", 100);
	let engine = f.engine(f.config());
	engine.fetch().await.unwrap();

	let local = f.mirror().join("a.txt");
	fs::write(&local, b"tampered").unwrap();
	set_file_mtime(&local, FileTime::from_unix_time(5_000, 0)).unwrap();

	let report = engine.fetch().await.unwrap();
	assert_eq!(report.fetched, 1);
	assert_eq!(fs::read_to_string(&local).unwrap(), "pristine");
}

// ============================================================================
// Purge boundary and dry run
// ============================================================================

#[tokio::test]
async fn test_sweep_stays_inside_roots() {
	let f = Fixture::new();
	f.remote_file("keep.txt", b"k", 100);
	f.remote_file("drop/me.txt", b"d", 100);
	let engine = f.engine(f.config());
	engine.fetch().await.unwrap();

	// content outside the roots must survive any sweep
	fs::write(f.dest().join("notes.txt"), "mine").unwrap();
	fs::create_dir_all(f.dest().join("other")).unwrap();
	fs::write(f.dest().join("other/file"), "mine").unwrap();
	fs::write(f.tmp.path().join("sibling.txt"), "mine").unwrap();
	fs::create_dir_all(f.unpack().join("stale")).unwrap();
	fs::write(f.mirror().join("stray.txt"), "s").unwrap();

	fs::remove_dir_all(f.src().join("drop")).unwrap();
	let report = engine.fetch().await.unwrap();

	assert!(!report.removed.is_empty());
	for path in &report.removed {
		assert!(path.starts_with(f.mirror()) || path.starts_with(f.unpack()), "{:?}", path);
	}
	assert!(!f.mirror().join("drop").exists());
	assert!(!f.mirror().join("stray.txt").exists());
	assert!(!f.unpack().join("stale").exists());
	assert!(f.mirror().join("keep.txt").exists());
	assert!(f.mirror().is_dir());
	assert!(f.unpack().is_dir());
	assert!(f.dest().join("notes.txt").exists());
	assert!(f.dest().join("other/file").exists());
	assert!(f.tmp.path().join("sibling.txt").exists());
	assert!(f.dest().join(".dfsync.json").exists());
}

#[tokio::test]
async fn test_escaping_cached_entry_never_lands_outside_mirror() {
	let f = Fixture::new();
	f.remote_file("a.txt", b"a", 100);
	fs::write(f.tmp.path().join("payload"), "evil").unwrap();
	let src = f.src().to_string_lossy().into_owned();
	let planted = serde_json::json!({
		"source": src,
		"generatedAt": 0,
		"entries": [{
			"fullPath": format!("{}/../payload", src),
			"name": "payload",
			"size": 4,
			"modificationTime": 1,
			"isDirectory": false,
		}],
	});
	fs::write(f.tmp.path().join("listing.json"), serde_json::to_vec(&planted).unwrap()).unwrap();

	let mut config = f.config();
	config.cache_object = Some("listing.json".to_string());
	let report = f.engine(config).fetch().await.unwrap();

	assert_eq!(report.fetched, 1);
	assert!(f.mirror().join("a.txt").exists());
	assert!(!f.dest().join("payload").exists());
	assert_eq!(f.index_keys(), vec![f.mirror().join("a.txt")]);
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
	let f = Fixture::new();
	f.remote_file("a.txt", b"a", 100);
	f.remote_file("b.txt", b"b", 100);
	fs::create_dir_all(f.mirror()).unwrap();
	fs::write(f.mirror().join("stray.txt"), "s").unwrap();

	let mut config = f.config();
	config.dry_run = true;
	let report = f.engine(config).fetch().await.unwrap();

	assert_eq!(report.planned, 2);
	assert_eq!(report.fetched, 2);
	assert_eq!(report.remote_calls, 1);
	assert_eq!(report.removed, vec![f.mirror().join("stray.txt")]);
	assert!(f.mirror().join("stray.txt").exists());
	assert!(!f.mirror().join("a.txt").exists());
	assert!(!f.dest().join(".dfsync.json").exists());
	assert_eq!(fs::read_dir(f.dest()).unwrap().count(), 1);
}

// ============================================================================
// Failure handling
// ============================================================================

/// Local remote whose `get` fails for selected paths
struct FlakyRemote {
	inner: LocalRemote,
	failing: Mutex<HashSet<String>>,
}

#[async_trait]
impl RemoteClient for FlakyRemote {
	async fn list(&self, path: &str, recurse: bool) -> RemoteResult<Vec<RemoteEntry>> {
		self.inner.list(path, recurse).await
	}

	async fn get(&self, path: &str, sink: Sink<'_>) -> RemoteResult<u64> {
		if self.failing.lock().unwrap().contains(path) {
			return Err(RemoteError::Other(format!("injected failure for {}", path)));
		}
		self.inner.get(path, sink).await
	}

	async fn put(&self, path: &str, bytes: &[u8]) -> RemoteResult<()> {
		self.inner.put(path, bytes).await
	}

	async fn rename(&self, src: &str, dst: &str) -> RemoteResult<()> {
		self.inner.rename(src, dst).await
	}

	async fn remove(&self, path: &str) -> RemoteResult<()> {
		self.inner.remove(path).await
	}

	fn call_count(&self) -> u64 {
		self.inner.call_count()
	}
}

#[tokio::test]
async fn test_failed_fetch_is_retried_next_run() {
	let f = Fixture::new();
	f.remote_file("good.txt", b"g", 100);
	let bad = f.remote_file("bad.txt", b"b", 100);

	let remote = Arc::new(FlakyRemote {
		inner: LocalRemote::default(),
		failing: Mutex::new([bad.to_string_lossy().into_owned()].into_iter().collect()),
	});
	let engine = SyncEngine::new(Arc::new(f.config()), remote.clone());

	let report = engine.fetch().await.unwrap();
	assert_eq!(report.fetched, 1);
	assert_eq!(report.failed, 1);
	assert!(!f.mirror().join("bad.txt").exists());
	assert_eq!(f.index_keys(), vec![f.mirror().join("good.txt")]);
	// no half-written temp files left anywhere under the destination
	let leftovers: Vec<_> = fs::read_dir(f.dest())
		.unwrap()
		.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
		.filter(|n| n.starts_with(".dfsync-spool-"))
		.collect();
	assert!(leftovers.is_empty());

	remote.failing.lock().unwrap().clear();
	let report = engine.fetch().await.unwrap();
	assert_eq!(report.planned, 1);
	assert_eq!(report.fetched, 1);
	assert_eq!(fs::read_to_string(f.mirror().join("bad.txt")).unwrap(), "b");
}

#[tokio::test]
async fn test_corrupt_index_triggers_full_fetch() {
	let f = Fixture::new();
	f.remote_file("a.txt", b"a", 100);
	let engine = f.engine(f.config());
	engine.fetch().await.unwrap();

	fs::write(f.dest().join(".dfsync.json"), "garbage").unwrap();
	let report = engine.fetch().await.unwrap();
	assert_eq!(report.fetched, 1);
	assert_eq!(f.index_keys(), vec![f.mirror().join("a.txt")]);
}

// ============================================================================
// Manifest gating
// ============================================================================

#[tokio::test]
async fn test_manifest_runs_only_when_something_changed() {
	let f = Fixture::new();
	let hook_log = f.tmp.path().join("hook.log");
	let manifest = format!(
		"{{ command: ['sh', '-c', 'echo \"$1\" >> {}', 'hook'], files: [{{ path: 'part.csv', size: 3 }}] }}",
		hook_log.display()
	);
	f.remote_file("ds/MANIFEST", manifest.as_bytes(), 100);
	f.remote_file("ds/part.csv", b"abc", 100);

	let mut config = f.config();
	config.manifest_name = Some("MANIFEST".to_string());
	let engine = f.engine(config);
	let runs = || fs::read_to_string(&hook_log).map(|s| s.lines().count()).unwrap_or(0);

	let report = engine.fetch().await.unwrap();
	assert_eq!(report.manifests_run, 1);
	assert_eq!(runs(), 1);
	let logged = fs::read_to_string(&hook_log).unwrap();
	assert_eq!(logged.trim(), f.mirror().join("ds/MANIFEST").to_string_lossy());

	let report = engine.fetch().await.unwrap();
	assert_eq!(report.manifests_run, 0);
	assert_eq!(runs(), 1);

	f.remote_file("ds/part.csv", b"xyz", 2_000_000_000);
	let report = engine.fetch().await.unwrap();
	assert_eq!(report.fetched, 1);
	assert_eq!(report.manifests_run, 1);
	assert_eq!(runs(), 2);
}

#[tokio::test]
async fn test_manifest_violation_does_not_fail_run() {
	let f = Fixture::new();
	f.remote_file("ds/MANIFEST", b"{ command: ['true'], files: [{ path: 'missing.csv', size: 1 }] }", 100);
	f.remote_file("ds/other.csv", b"o", 100);

	let mut config = f.config();
	config.manifest_name = Some("MANIFEST".to_string());
	let report = f.engine(config).fetch().await.unwrap();
	assert_eq!(report.fetched, 2);
	assert_eq!(report.manifests_run, 0);
	assert!(f.dest().join(".dfsync.json").exists());
}

// vim: ts=4
