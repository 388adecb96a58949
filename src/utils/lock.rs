//! Single-instance lock and termination signals

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use crate::error::SyncError;
use crate::logging::*;

/// Holds a loopback port for the lifetime of the process
///
/// A second instance configured with the same port fails to bind and
/// must exit before touching anything. There is no release step: the
/// socket closes when the guard is dropped or the process exits.
#[derive(Debug)]
pub struct ExclusivityGuard {
	_listener: TcpListener,
	port: u16,
}

impl ExclusivityGuard {
	pub fn acquire(port: u16) -> Result<Self, SyncError> {
		match TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)) {
			Ok(listener) => {
				debug!("holding exclusivity port {}", port);
				Ok(ExclusivityGuard { _listener: listener, port })
			}
			Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
				error!("port {} is in use, another instance is running", port);
				Err(SyncError::LockHeld { port })
			}
			Err(e) => {
				error!("unexpected failure binding exclusivity port {}: {}", port, e);
				Err(SyncError::InvalidConfig { message: format!("cannot bind port {}: {}", port, e) })
			}
		}
	}

	pub fn port(&self) -> u16 {
		self.port
	}
}

/// Wait for SIGTERM or SIGINT; returns the conventional exit status
///
/// Pending forever when the handlers cannot be installed.
pub async fn shutdown_signal() -> u8 {
	use tokio::signal::unix::{signal, SignalKind};

	let mut sigterm = match signal(SignalKind::terminate()) {
		Ok(stream) => stream,
		Err(e) => {
			warn!("Failed to setup SIGTERM handler: {}. Process will not handle SIGTERM gracefully.", e);
			return std::future::pending().await;
		}
	};
	let mut sigint = match signal(SignalKind::interrupt()) {
		Ok(stream) => stream,
		Err(e) => {
			warn!("Failed to setup SIGINT handler: {}. Process will not handle SIGINT gracefully.", e);
			return std::future::pending().await;
		}
	};

	tokio::select! {
		_ = sigterm.recv() => {
			warn!("Received SIGTERM, stopping...");
			143 // 128 + SIGTERM(15)
		}
		_ = sigint.recv() => {
			warn!("Received SIGINT, stopping...");
			130 // 128 + SIGINT(2)
		}
	}
}


// vim: ts=4
