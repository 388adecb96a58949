use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use dfsync::config::{Config, DEFAULT_PORT};
use dfsync::error::SyncError;
use dfsync::logging::{self, *};
use dfsync::remote::HdfsFlavor;
use dfsync::sync::SyncEngine;
use dfsync::utils::{shutdown_signal, ExclusivityGuard};

const EXIT_RUN_FAILED: u8 = 1;
const EXIT_STARTUP: u8 = 2;

/// Flags every subcommand accepts
fn shared_args(cmd: Command) -> Command {
	cmd.arg(
		Arg::new("source")
			.short('u')
			.long("source")
			.value_name("URL")
			.help("Remote source (hdfs://nn:port/path, file:///path or /path)"),
	)
	.arg(Arg::new("dest-dir").short('d').long("dest-dir").value_name("DIR").help("Destination directory"))
	.arg(
		Arg::new("cache-object")
			.long("cache-object")
			.value_name("NAME")
			.help("Remote listing cache object; relative names sit next to the source"),
	)
	.arg(
		Arg::new("port")
			.short('p')
			.long("port")
			.value_name("PORT")
			.value_parser(value_parser!(u16))
			.help(format!("Loopback port held as the single-instance lock [default: {}]", DEFAULT_PORT)),
	)
	.arg(
		Arg::new("log-dest")
			.short('l')
			.long("log-dest")
			.value_name("DEST")
			.help("console, none or a log file path [default: console]"),
	)
	.arg(
		Arg::new("verbose")
			.short('v')
			.long("verbose")
			.action(ArgAction::Count)
			.help("More output (-v debug, -vv trace)"),
	)
	.arg(
		Arg::new("timeout")
			.long("timeout")
			.value_name("SECS")
			.value_parser(value_parser!(u64))
			.help("Remote request timeout in seconds [default: 300]"),
	)
	.arg(Arg::new("config").long("config").value_name("FILE").help("TOML configuration file"))
	.arg(
		Arg::new("hdfs-cmd")
			.long("hdfs-cmd")
			.value_parser(["new", "old"])
			.help("Client to drive: new = hdfs dfs, old = hadoop fs [default: new]"),
	)
	.arg(
		Arg::new("dry-run")
			.short('n')
			.long("dry-run")
			.action(ArgAction::SetTrue)
			.help("Plan and log only, change nothing"),
	)
}

fn cli() -> Command {
	Command::new("dfsync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Incremental one-way mirror of a remote filesystem subtree")
		.subcommand_required(true)
		.subcommand(shared_args(
			Command::new("fetch")
				.about("Mirror new and changed remote files, remove local orphans")
				.arg(Arg::new("temp-dir").long("temp-dir").value_name("DIR").help("Temp directory on the destination device"))
				.arg(
					Arg::new("sync-subdir")
						.long("sync-subdir")
						.value_name("DIR")
						.help("Mirror tree under the destination [default: mirror]"),
				)
				.arg(
					Arg::new("archive-subdir")
						.long("archive-subdir")
						.value_name("DIR")
						.help("Unpack tree under the destination; enables archive expansion"),
				)
				.arg(
					Arg::new("manifest-name")
						.long("manifest-name")
						.value_name("NAME")
						.help("File name of dataset manifests"),
				)
				.arg(
					Arg::new("workers")
						.short('j')
						.long("workers")
						.value_name("N")
						.value_parser(value_parser!(usize))
						.help("Concurrent downloads [default: available parallelism]"),
				)
				.arg(
					Arg::new("include")
						.long("include")
						.value_name("GLOB")
						.action(ArgAction::Append)
						.help("Only sync source-relative paths matching this glob (repeatable)"),
				)
				.arg(
					Arg::new("fresh-listing")
						.long("fresh-listing")
						.action(ArgAction::SetTrue)
						.help("Ignore the listing cache"),
				)
				.arg(
					Arg::new("in-progress-suffix")
						.long("in-progress-suffix")
						.value_name("SUFFIX")
						.help("Skip remote names ending in this [default: ._COPYING_]"),
				),
		))
		.subcommand(shared_args(Command::new("cache").about("Refresh the remote listing cache object only")))
}

/// Value of an argument the subcommand may not define
fn opt<'a, T: Clone + Send + Sync + 'static>(m: &'a ArgMatches, id: &str) -> Option<&'a T> {
	m.try_get_one::<T>(id).ok().flatten()
}

/// Defaults, then the config file, then flags
fn build_config(m: &ArgMatches) -> Result<Config, SyncError> {
	let mut config = match opt::<String>(m, "config") {
		Some(path) => Config::from_toml_file(Path::new(path))?,
		None => Config::default(),
	};

	if let Some(v) = opt::<String>(m, "source") {
		config.source = v.clone();
	}
	if let Some(v) = opt::<String>(m, "dest-dir") {
		config.dest_dir = PathBuf::from(v);
	}
	if let Some(v) = opt::<String>(m, "cache-object") {
		config.cache_object = Some(v.clone());
	}
	if let Some(v) = opt::<u16>(m, "port") {
		config.port = *v;
	}
	if let Some(v) = opt::<String>(m, "log-dest") {
		config.log_dest = v.clone();
	}
	let verbosity = m.get_count("verbose");
	if verbosity > 0 {
		config.verbosity = verbosity;
	}
	if let Some(v) = opt::<u64>(m, "timeout") {
		config.timeout_secs = *v;
	}
	if let Some(v) = opt::<String>(m, "hdfs-cmd") {
		config.hdfs_cmd = v.parse::<HdfsFlavor>().map_err(|message| SyncError::InvalidConfig { message })?;
	}
	if m.get_flag("dry-run") {
		config.dry_run = true;
	}

	if let Some(v) = opt::<String>(m, "temp-dir") {
		config.temp_dir = Some(PathBuf::from(v));
	}
	if let Some(v) = opt::<String>(m, "sync-subdir") {
		config.sync_subdir = v.clone();
	}
	if let Some(v) = opt::<String>(m, "archive-subdir") {
		config.archive_subdir = Some(v.clone());
	}
	if let Some(v) = opt::<String>(m, "manifest-name") {
		config.manifest_name = Some(v.clone());
	}
	if let Some(v) = opt::<usize>(m, "workers") {
		config.workers = Some(*v);
	}
	if let Ok(Some(globs)) = m.try_get_many::<String>("include") {
		config.include = globs.cloned().collect();
	}
	if opt::<bool>(m, "fresh-listing").copied().unwrap_or(false) {
		config.fresh_listing = true;
	}
	if let Some(v) = opt::<String>(m, "in-progress-suffix") {
		config.in_progress_suffix = v.clone();
	}

	Ok(config)
}

fn log_error_chain(e: &SyncError) {
	error!("{}", e);
	let mut source = e.source();
	while let Some(cause) = source {
		error!("  caused by: {}", cause);
		source = cause.source();
	}
}

async fn run(engine: &SyncEngine, subcommand: &str) -> Result<(), SyncError> {
	match subcommand {
		"fetch" => {
			let report = engine.fetch().await?;
			if report.failed > 0 {
				warn!("{} entries failed and will be retried on the next run", report.failed);
			}
		}
		"cache" => {
			let count = engine.refresh_cache().await?;
			info!("listing cache holds {} entries", count);
		}
		other => return Err(SyncError::Other { message: format!("unknown subcommand {}", other) }),
	}
	Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
	let matches = cli().get_matches();
	let (subcommand, sub) = match matches.subcommand() {
		Some(pair) => pair,
		None => return ExitCode::from(EXIT_STARTUP),
	};

	let config = match build_config(sub) {
		Ok(c) => c,
		Err(e) => {
			eprintln!("dfsync: {}", e);
			return ExitCode::from(EXIT_STARTUP);
		}
	};

	// a losing instance must not even create its log file
	let guard = ExclusivityGuard::acquire(config.port);
	let log_dest = match (&guard, logging::LogDest::parse(&config.log_dest)) {
		(Err(_), logging::LogDest::File(_)) => logging::LogDest::Console,
		(_, dest) => dest,
	};
	if let Err(e) = logging::init_tracing(&log_dest, config.verbosity) {
		eprintln!("dfsync: cannot open log destination {}: {}", config.log_dest, e);
		return ExitCode::from(EXIT_STARTUP);
	}

	let _guard = match guard {
		Ok(guard) => guard,
		Err(e) => {
			log_error_chain(&e);
			return ExitCode::from(EXIT_STARTUP);
		}
	};

	if let Err(e) = config.validate() {
		log_error_chain(&e);
		return ExitCode::from(EXIT_STARTUP);
	}

	let engine = match SyncEngine::connect(Arc::new(config)) {
		Ok(engine) => engine,
		Err(e) => {
			log_error_chain(&e);
			return ExitCode::from(EXIT_STARTUP);
		}
	};

	// a signal drops the run future, which removes the spool directory
	let result = tokio::select! {
		result = run(&engine, subcommand) => result,
		code = shutdown_signal() => return ExitCode::from(code),
	};

	match result {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			log_error_chain(&e);
			if e.is_startup_fatal() {
				ExitCode::from(EXIT_STARTUP)
			} else {
				ExitCode::from(EXIT_RUN_FAILED)
			}
		}
	}
}

// vim: ts=4
