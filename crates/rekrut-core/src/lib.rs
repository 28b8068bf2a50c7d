//! Rekrut Core Library
//!
//! Shared configuration, error taxonomy, and domain types for the rekrut
//! authentication backend.

pub mod config;
pub mod error;
pub mod types;

pub use config::RekrutConfig;
pub use error::{Error, Result};

/// Rekrut version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Session lifetime applied uniformly to every issued token (8 hours)
pub const SESSION_TTL_SECS: u64 = 8 * 60 * 60;

/// Minimum accepted local password length
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

/// Timeout for the directory reachability probe
pub const DIRECTORY_PROBE_TIMEOUT_SECS: u64 = 3;
