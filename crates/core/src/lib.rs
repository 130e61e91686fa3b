//! Core library for verscan.
//!
//! This crate provides the foundational logic for fingerprinting the
//! software version running a website: static-file normalization and
//! checksumming, the index store, asset fetching, and the inference engine.
//! It is designed to be consumed by the `verscan-cli` frontend without
//! coupling to any particular UI.

/// On-disk cache of fetched resources.
pub mod cache;
/// Static-file checksum computation.
pub mod checksum;
/// The inference engine.
pub mod engine;
/// Asset fetching over HTTP.
pub mod fetch;
/// Running guesses about which version is live.
pub mod guess;
/// Initial hints extracted from the landing page response.
pub mod hints;
/// Referenced-asset extraction from a landing page.
pub mod html;
/// File-kind dispatch and canonicalization.
pub mod normalize;
/// A fetched (or not-yet-fetched) URL and its outcome.
pub mod resource;
/// The persisted package/version/static-file catalog.
pub mod store;

pub use cache::{Cache, CacheEntry};
pub use checksum::compute_checksum;
pub use engine::{AnalysisResult, Engine, EngineError, IterationDebug, Statistics};
pub use fetch::{FetchError, Fetcher};
pub use guess::{Guess, Match};
pub use hints::{InitialHints, LandingPage, Rule, RuleBasedHints};
pub use resource::{Fetched, Resource};
pub use store::{IndexedVersion, PathEntropy, SqliteStore, Store, StoreError};

/// User agent string sent on every outbound HTTP request.
pub const USER_AGENT: &str = concat!("verscan/", env!("CARGO_PKG_VERSION"));
