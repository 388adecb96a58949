//! Utility modules for process-level concerns

pub mod lock;

pub use lock::{shutdown_signal, ExclusivityGuard};

// vim: ts=4
