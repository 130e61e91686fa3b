//! Shared data model for verscan.
//!
//! This crate defines the types common to the inference engine, the index
//! store, and the CLI: software packages and versions, static files, the
//! 128-bit checksum newtype, and the engine's `Config`. It intentionally
//! carries no HTTP, SQL, or normalization logic -- those live in
//! `verscan-core`, which depends on this crate rather than the other way
//! around.

/// 128-bit content checksum over a normalized static file.
pub mod checksum;
/// Engine configuration, validated at construction time.
pub mod config;
/// Core domain types: packages, versions, static files, scan result rows.
pub mod types;

pub use checksum::{Checksum, ChecksumParseError};
pub use config::{Config, ConfigError};
pub use types::{PackageName, ScanResultRow, SoftwarePackage, SoftwareVersion, StaticFile, Vendor};
