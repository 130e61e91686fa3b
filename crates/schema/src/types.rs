use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;

/// A normalized package name (lowercased), used for equality and lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageName(String);

impl PackageName {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

/// A software vendor/publisher name, part of a `SoftwarePackage`'s identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vendor(String);

impl Vendor {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Vendor {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A web-application software package, identified by `(name, vendor)`.
///
/// Immutable after ingestion: the crawler-indexer (out of scope here) is the
/// only writer, and the engine only ever reads packages back out of the
/// index store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwarePackage {
    pub name: PackageName,
    pub vendor: Vendor,
    /// Alternative display names used for matching external labels (e.g.
    /// generator-meta text, signature-rule labels).
    pub alternative_names: Vec<String>,
}

impl SoftwarePackage {
    #[must_use]
    pub fn new(name: impl Into<PackageName>, vendor: impl Into<Vendor>) -> Self {
        Self {
            name: name.into(),
            vendor: vendor.into(),
            alternative_names: Vec::new(),
        }
    }

    /// Whether `label` matches this package's name or any alternative name,
    /// case-insensitively.
    #[must_use]
    pub fn matches_label(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.name.as_str() == label
            || self
                .alternative_names
                .iter()
                .any(|alt| alt.to_lowercase() == label)
    }
}

/// A specific released version of a `SoftwarePackage`.
///
/// Identity is `(package, internal_identifier)`; `display_name` is the
/// human-facing version string, which may differ from `internal_identifier`
/// (e.g. a distro revision suffix the upstream display name omits).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareVersion {
    #[serde(rename = "software_package")]
    pub package: SoftwarePackage,
    pub internal_identifier: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub release_date: DateTime<Utc>,
    /// Whether the crawler-indexer completed ingestion for this version.
    /// Internal bookkeeping, not part of the result JSON shape (§6).
    #[serde(skip)]
    pub indexed: bool,
}

impl SoftwareVersion {
    #[must_use]
    pub fn identity(&self) -> (&PackageName, &str) {
        (&self.package.name, &self.internal_identifier)
    }
}

/// One concrete file shipped by one or more versions at a given webroot
/// path. A single `webroot_path` may be served by many distinct checksums
/// across versions -- that's what makes a path discriminating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticFile {
    /// Path of the file within the package's source repository / layout.
    pub source_path: String,
    /// Path the file is served at, relative to the site root.
    pub webroot_path: String,
    pub checksum: Checksum,
}

/// One row of the external multi-site scan-result store: `(scan_identifier,
/// url)` with a JSON blob result. Modeled here for interop; the scan driver
/// itself is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResultRow {
    pub scan_identifier: String,
    pub url: String,
    /// `None` when the scan produced no confident guess.
    pub result: Option<serde_json::Value>,
    pub more_recent: Option<SoftwareVersion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_name_is_case_insensitive() {
        assert_eq!(PackageName::new("WordPress"), PackageName::new("wordpress"));
    }

    #[test]
    fn matches_label_checks_alternatives() {
        let mut pkg = SoftwarePackage::new("wordpress", "automattic");
        pkg.alternative_names.push("WP".to_string());
        assert!(pkg.matches_label("wp"));
        assert!(pkg.matches_label("WordPress"));
        assert!(!pkg.matches_label("drupal"));
    }
}
