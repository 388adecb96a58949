//! HDFS remote store driven through the `hdfs dfs` / `hadoop fs` client
//!
//! Every call spawns one client process and is bounded by the request
//! timeout. Listing output is parsed into typed entries at this boundary.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::error::RemoteError;
use super::traits::{CallCounter, RemoteClient, RemoteResult, Sink};
use super::{strip_authority, with_timeout};
use crate::logging::*;
use crate::types::RemoteEntry;

/// Which client binary to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HdfsFlavor {
	/// `hdfs dfs`
	#[default]
	New,
	/// `hadoop fs`
	Old,
}

impl HdfsFlavor {
	fn argv(&self) -> [&'static str; 2] {
		match self {
			HdfsFlavor::New => ["hdfs", "dfs"],
			HdfsFlavor::Old => ["hadoop", "fs"],
		}
	}

	fn recursive_ls(&self) -> &'static [&'static str] {
		match self {
			HdfsFlavor::New => &["-ls", "-R"],
			HdfsFlavor::Old => &["-lsr"],
		}
	}
}

impl FromStr for HdfsFlavor {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"new" => Ok(HdfsFlavor::New),
			"old" => Ok(HdfsFlavor::Old),
			other => Err(format!("unknown hdfs command flavor '{}'", other)),
		}
	}
}

/// One parsed line of `ls` output:
/// `mode repl owner group bytes date time path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLine {
	pub mode: String,
	pub replication: Option<u32>,
	pub owner: String,
	pub group: String,
	pub size: u64,
	/// Unix seconds, UTC
	pub modified: i64,
	pub path: String,
}

impl ListingLine {
	pub fn is_directory(&self) -> bool {
		self.mode.starts_with('d')
	}

	pub fn into_entry(self) -> RemoteEntry {
		if self.is_directory() {
			RemoteEntry::dir(self.path, self.modified)
		} else {
			RemoteEntry::file(self.path, self.size, self.modified)
		}
	}
}

fn next_field(s: &str) -> Option<(&str, &str)> {
	let s = s.trim_start();
	if s.is_empty() {
		return None;
	}
	let end = s.find(char::is_whitespace).unwrap_or(s.len());
	Some((&s[..end], &s[end..]))
}

impl FromStr for ListingLine {
	type Err = RemoteError;

	fn from_str(line: &str) -> Result<Self, Self::Err> {
		let bad = |what: &str| RemoteError::Parse(format!("{} in line '{}'", what, line.trim()));

		let (mode, rest) = next_field(line).ok_or_else(|| bad("empty line"))?;
		if mode.len() < 10 || !matches!(mode.as_bytes()[0], b'-' | b'd' | b'l') {
			return Err(bad("bad mode"));
		}
		let (repl, rest) = next_field(rest).ok_or_else(|| bad("missing replication"))?;
		let replication = match repl {
			"-" => None,
			n => Some(n.parse::<u32>().map_err(|_| bad("bad replication"))?),
		};
		let (owner, rest) = next_field(rest).ok_or_else(|| bad("missing owner"))?;
		let (group, rest) = next_field(rest).ok_or_else(|| bad("missing group"))?;
		let (size, rest) = next_field(rest).ok_or_else(|| bad("missing size"))?;
		let size = size.parse::<u64>().map_err(|_| bad("bad size"))?;
		let (date, rest) = next_field(rest).ok_or_else(|| bad("missing date"))?;
		let (time, rest) = next_field(rest).ok_or_else(|| bad("missing time"))?;
		let modified = parse_timestamp(date, time).ok_or_else(|| bad("bad timestamp"))?;
		let path = rest.trim();
		if path.is_empty() {
			return Err(bad("missing path"));
		}

		Ok(ListingLine {
			mode: mode.to_string(),
			replication,
			owner: owner.to_string(),
			group: group.to_string(),
			size,
			modified,
			path: strip_authority(path).to_string(),
		})
	}
}

/// `YYYY-MM-DD` + `HH:MM` (UTC) to Unix seconds
fn parse_timestamp(date: &str, time: &str) -> Option<i64> {
	let stamp = format!("{} {}", date, time);
	NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M")
		.or_else(|_| NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M:%S"))
		.ok()
		.map(|t| t.and_utc().timestamp())
}

/// Parse full `ls` output, skipping headers and malformed lines
pub fn parse_listing(output: &str) -> Vec<RemoteEntry> {
	let mut entries = Vec::new();
	for line in output.lines() {
		let line = line.trim();
		if line.is_empty() || line.starts_with("Found ") {
			continue;
		}
		match line.parse::<ListingLine>() {
			Ok(parsed) => entries.push(parsed.into_entry()),
			Err(e) => warn!("skipping listing line: {}", e),
		}
	}
	entries
}

pub struct HdfsCliRemote {
	/// `scheme://authority`, prefixed to every path handed to the client
	base: String,
	flavor: HdfsFlavor,
	/// Client program and its leading arguments
	client: Vec<String>,
	timeout: Duration,
	calls: CallCounter,
}

impl HdfsCliRemote {
	pub fn new(base: impl Into<String>, flavor: HdfsFlavor, timeout: Duration) -> Self {
		let client = flavor.argv().iter().map(|s| s.to_string()).collect();
		HdfsCliRemote { base: base.into(), flavor, client, timeout, calls: CallCounter::default() }
	}

	/// Drive a different client command line, e.g. a wrapper script
	pub fn with_client(mut self, argv: Vec<String>) -> Self {
		if !argv.is_empty() {
			self.client = argv;
		}
		self
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base, path)
	}

	fn command(&self, args: &[&str]) -> (Command, String) {
		let mut cmd = Command::new(&self.client[0]);
		cmd.args(&self.client[1..]).args(args).kill_on_drop(true);
		let shown = format!("{} {}", self.client.join(" "), args.join(" "));
		debug!("running: {}", shown);
		(cmd, shown)
	}

	async fn run(&self, operation: &str, args: &[&str]) -> RemoteResult<String> {
		let (mut cmd, shown) = self.command(args);
		with_timeout(operation, self.timeout, async move {
			let out = cmd.stdin(Stdio::null()).output().await?;
			if out.status.success() {
				Ok(String::from_utf8_lossy(&out.stdout).into_owned())
			} else {
				Err(command_error(shown, &out.stderr))
			}
		})
		.await
	}
}

fn command_error(command: String, stderr: &[u8]) -> RemoteError {
	let output = String::from_utf8_lossy(stderr).into_owned();
	if output.contains("No such file or directory") {
		RemoteError::NotFound(command)
	} else {
		RemoteError::CommandFailed { command, output }
	}
}

#[async_trait]
impl RemoteClient for HdfsCliRemote {
	async fn list(&self, path: &str, recurse: bool) -> RemoteResult<Vec<RemoteEntry>> {
		self.calls.tick();
		let url = self.url(path);
		let mut args: Vec<&str> = if recurse { self.flavor.recursive_ls().to_vec() } else { vec!["-ls"] };
		args.push(&url);
		let output = self.run("list", &args).await?;
		Ok(parse_listing(&output))
	}

	async fn get(&self, path: &str, sink: Sink<'_>) -> RemoteResult<u64> {
		self.calls.tick();
		let url = self.url(path);
		let (mut cmd, shown) = self.command(&["-cat", &url]);
		with_timeout("get", self.timeout, async move {
			let mut child = cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).spawn()?;
			let mut stdout = child.stdout.take().ok_or("client stdout unavailable")?;
			let mut stderr = child.stderr.take().ok_or("client stderr unavailable")?;
			let mut errors = Vec::new();
			// drain both pipes together so a chatty client cannot stall on stderr
			let (copied, drained) =
				tokio::join!(tokio::io::copy(&mut stdout, sink), stderr.read_to_end(&mut errors));
			let n = copied?;
			drained?;
			let status = child.wait().await?;
			if status.success() {
				Ok(n)
			} else {
				Err(command_error(shown, &errors))
			}
		})
		.await
	}

	async fn put(&self, path: &str, bytes: &[u8]) -> RemoteResult<()> {
		self.calls.tick();
		let url = self.url(path);
		let (mut cmd, shown) = self.command(&["-put", "-f", "-", &url]);
		with_timeout("put", self.timeout, async move {
			let mut child = cmd.stdin(Stdio::piped()).stdout(Stdio::null()).stderr(Stdio::piped()).spawn()?;
			let mut stdin = child.stdin.take().ok_or("client stdin unavailable")?;
			stdin.write_all(bytes).await?;
			drop(stdin);
			let out = child.wait_with_output().await?;
			if out.status.success() {
				Ok(())
			} else {
				Err(command_error(shown, &out.stderr))
			}
		})
		.await
	}

	async fn rename(&self, src: &str, dst: &str) -> RemoteResult<()> {
		self.calls.tick();
		let (src, dst) = (self.url(src), self.url(dst));
		self.run("rename", &["-mv", &src, &dst]).await.map(|_| ())
	}

	async fn remove(&self, path: &str) -> RemoteResult<()> {
		self.calls.tick();
		let url = self.url(path);
		self.run("remove", &["-rm", "-r", &url]).await.map(|_| ())
	}

	fn call_count(&self) -> u64 {
		self.calls.get()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_file_line() {
		let line = "-rw-r--r--   3 hdfs supergroup       1234 2015-06-01 12:30 hdfs://nn:8020/data/src/a.txt";
		let parsed: ListingLine = line.parse().unwrap();
		assert_eq!(parsed.replication, Some(3));
		assert_eq!(parsed.owner, "hdfs");
		assert_eq!(parsed.size, 1234);
		assert_eq!(parsed.path, "/data/src/a.txt");
		assert_eq!(parsed.modified, 1433161800);
		assert!(!parsed.is_directory());
	}

	#[test]
	fn test_parse_dir_line() {
		let line = "drwxr-xr-x   - hdfs supergroup          0 2015-06-01 12:30 /data/src/dir";
		let entry = line.parse::<ListingLine>().unwrap().into_entry();
		assert!(entry.is_directory);
		assert_eq!(entry.name, "dir");
	}

	#[test]
	fn test_parse_path_with_spaces() {
		let line = "-rw-r--r--   1 u g 5 2020-01-01 00:00 /data/my file.txt";
		let parsed: ListingLine = line.parse().unwrap();
		assert_eq!(parsed.path, "/data/my file.txt");
		assert_eq!(parsed.modified, 1577836800);
	}

	#[test]
	fn test_reject_malformed() {
		assert!("".parse::<ListingLine>().is_err());
		assert!("Found 3 items".parse::<ListingLine>().is_err());
		assert!("-rw-r--r-- 3 u g notanumber 2020-01-01 00:00 /p".parse::<ListingLine>().is_err());
		assert!("-rw-r--r-- 3 u g 5 2020-13-01 00:00 /p".parse::<ListingLine>().is_err());
		assert!("-rw-r--r-- 3 u g 5 2020-01-01 00:00".parse::<ListingLine>().is_err());
	}

	#[test]
	fn test_parse_listing_skips_noise() {
		let out = "Found 2 items\n\
			drwxr-xr-x   - hdfs hdfs 0 2015-06-01 12:30 /d\n\
			garbage\n\
			-rw-r--r--   3 hdfs hdfs 7 2015-06-01 12:31 /d/f\n";
		let entries = parse_listing(out);
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[1].size, 7);
	}

	#[test]
	fn test_timestamp_with_seconds() {
		assert_eq!(parse_timestamp("1970-01-01", "00:00"), Some(0));
		assert_eq!(parse_timestamp("2000-03-01", "00:00:30"), Some(951868830));
		assert_eq!(parse_timestamp("2021-02-30", "00:00"), None);
		assert_eq!(parse_timestamp("2021-01-01", "24:00"), None);
	}

	#[tokio::test]
	async fn test_get_drains_large_stderr() {
		// 256 KiB of stderr before any stdout overflows the pipe buffer
		let script = "head -c 262144 /dev/zero >&2; printf payload".to_string();
		let remote = HdfsCliRemote::new("", HdfsFlavor::New, Duration::from_secs(20))
			.with_client(vec!["sh".to_string(), "-c".to_string(), script, "hdfs".to_string()]);
		let mut buf: Vec<u8> = Vec::new();
		let n = remote.get("/data/a.txt", &mut buf).await.unwrap();
		assert_eq!(n, 7);
		assert_eq!(buf, b"payload");
		assert_eq!(remote.call_count(), 1);
	}

	#[tokio::test]
	async fn test_get_failure_reports_stderr() {
		let script = "echo 'cat: No such file or directory' >&2; exit 1".to_string();
		let remote = HdfsCliRemote::new("", HdfsFlavor::New, Duration::from_secs(20))
			.with_client(vec!["sh".to_string(), "-c".to_string(), script, "hdfs".to_string()]);
		let mut buf: Vec<u8> = Vec::new();
		let err = remote.get("/data/missing", &mut buf).await.unwrap_err();
		assert!(err.is_not_found());
	}

	#[test]
	fn test_flavor_from_str() {
		assert_eq!("new".parse::<HdfsFlavor>().unwrap(), HdfsFlavor::New);
		assert_eq!("old".parse::<HdfsFlavor>().unwrap(), HdfsFlavor::Old);
		assert!("x".parse::<HdfsFlavor>().is_err());
	}
}

// vim: ts=4
