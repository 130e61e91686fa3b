//! File-kind dispatch and normalization (§4.1).
//!
//! Normalization turns the raw bytes served at a webroot path into a
//! canonical byte form so that two versions shipping byte-identical content
//! (module key order in JSON, cosmetic whitespace) checksum identically.

mod canon;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("content is not valid UTF-8")]
    InvalidUtf8,
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// The fixed set of recognized static-file kinds, in dispatch order.
///
/// `pick_kind` walks this list and returns the first kind whose `matches`
/// predicate accepts the filename -- it is a linear scan in a fixed
/// registered order, not a most-specific-match search (§9 "Polymorphic file
/// kinds").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    JavaScript,
    Json,
    Yaml,
    Css,
    Html,
    Image,
    Dotfile,
    Extensionless,
}

impl FileKind {
    /// All kinds, in the fixed order dispatch tries them.
    pub const ALL: [FileKind; 8] = [
        FileKind::JavaScript,
        FileKind::Json,
        FileKind::Yaml,
        FileKind::Css,
        FileKind::Html,
        FileKind::Image,
        FileKind::Dotfile,
        FileKind::Extensionless,
    ];

    /// Whether this kind's content is used for the engine's analysis probes
    /// (all kinds are, in this version -- the flag exists for future
    /// restriction without touching dispatch).
    #[must_use]
    pub fn use_for_analysis(self) -> bool {
        true
    }

    /// Whether the crawler-indexer should ingest this kind (out of scope
    /// here; mirrored for symmetry with `use_for_analysis`).
    #[must_use]
    pub fn use_for_index(self) -> bool {
        true
    }

    /// Whether `filename` (the basename of a webroot path) is of this kind.
    #[must_use]
    pub fn matches(self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        match self {
            FileKind::JavaScript => lower.ends_with(".js"),
            FileKind::Json => lower.ends_with(".json"),
            FileKind::Yaml => lower.ends_with(".yaml") || lower.ends_with(".yml"),
            FileKind::Css => lower.ends_with(".css"),
            FileKind::Html => lower.ends_with(".html") || lower.ends_with(".htm"),
            FileKind::Image => IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)),
            FileKind::Dotfile => {
                filename.starts_with('.') && !filename[1..].contains('.')
            }
            FileKind::Extensionless => true, // catch-all, must stay last
        }
    }

    /// Produce the canonical byte form of `content` for this kind.
    ///
    /// # Errors
    ///
    /// Returns a `NormalizeError` if `content` does not parse as this
    /// kind's expected structure (only possible for `Json`/`Yaml`). A file
    /// whose name matched this kind but which fails to normalize is
    /// rejected outright, not retried against another kind.
    pub fn normalize(self, content: &[u8]) -> Result<Vec<u8>, NormalizeError> {
        match self {
            FileKind::Json => {
                let value: serde_json::Value = serde_json::from_slice(content)?;
                Ok(canon::encode(&value))
            }
            FileKind::Yaml => {
                let value: serde_yaml::Value = serde_yaml::from_slice(content)?;
                let json_value = serde_json::to_value(value)
                    .map_err(NormalizeError::Json)?;
                Ok(canon::encode(&json_value))
            }
            FileKind::JavaScript => {
                // No JavaScript AST parser available; decode as text and
                // trim rather than parse-then-canonicalize.
                let text = String::from_utf8_lossy(content);
                Ok(text.trim().as_bytes().to_vec())
            }
            FileKind::Css | FileKind::Html | FileKind::Image | FileKind::Dotfile
            | FileKind::Extensionless => Ok(content.to_vec()),
        }
    }
}

const IMAGE_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".webp", ".bmp", ".avif",
];

/// Pick the file kind for `filename` by the fixed dispatch order. Always
/// returns a kind because `Extensionless` is an unconditional catch-all.
#[must_use]
pub fn pick_kind(filename: &str) -> FileKind {
    FileKind::ALL
        .into_iter()
        .find(|kind| kind.matches(filename))
        .unwrap_or(FileKind::Extensionless)
}

/// Like [`pick_kind`], but when the filename gives no extension to go on,
/// fall back to the declared response `content_type` (§3 "Resource",
/// mirroring `files/extensionless_file.py` accepting a kind by MIME type
/// after extension dispatch fails).
#[must_use]
pub fn pick_kind_with_content_type(filename: &str, content_type: Option<&str>) -> FileKind {
    let by_name = pick_kind(filename);
    if by_name != FileKind::Extensionless {
        return by_name;
    }
    let Some(content_type) = content_type else {
        return FileKind::Extensionless;
    };
    let mime = content_type.split(';').next().unwrap_or(content_type).trim();
    match mime {
        "application/javascript" | "text/javascript" | "application/x-javascript" => {
            FileKind::JavaScript
        }
        "application/json" => FileKind::Json,
        "application/yaml" | "application/x-yaml" | "text/yaml" => FileKind::Yaml,
        "text/css" => FileKind::Css,
        "text/html" | "application/xhtml+xml" => FileKind::Html,
        mime if mime.starts_with("image/") => FileKind::Image,
        _ => FileKind::Extensionless,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_wins_over_dotfile_when_both_could_match() {
        assert_eq!(pick_kind(".eslintrc.js"), FileKind::JavaScript);
    }

    #[test]
    fn plain_dotfile_is_dotfile() {
        assert_eq!(pick_kind(".htaccess"), FileKind::Dotfile);
    }

    #[test]
    fn no_extension_is_extensionless() {
        assert_eq!(pick_kind("LICENSE"), FileKind::Extensionless);
    }

    #[test]
    fn json_normalizes_key_order_independently() {
        let a = FileKind::Json.normalize(br#"{"b":1,"a":2}"#).unwrap();
        let b = FileKind::Json.normalize(br#"{"a":2,"b":1}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_json_is_rejected_not_retried() {
        assert!(FileKind::Json.normalize(b"not json").is_err());
    }

    #[test]
    fn yaml_and_json_agree_on_equivalent_structure() {
        let yaml = FileKind::Yaml.normalize(b"a: 1\nb: 2\n").unwrap();
        let json = FileKind::Json.normalize(br#"{"a":1,"b":2}"#).unwrap();
        assert_eq!(yaml, json);
    }

    #[test]
    fn javascript_falls_back_to_trimmed_text() {
        let out = FileKind::JavaScript.normalize(b"  var x = 1;  ").unwrap();
        assert_eq!(out, b"var x = 1;");
    }

    #[test]
    fn css_is_passed_through_unchanged() {
        let out = FileKind::Css.normalize(b".a { color: red; }").unwrap();
        assert_eq!(out, b".a { color: red; }");
    }

    #[test]
    fn extensionless_name_falls_back_to_content_type() {
        assert_eq!(
            pick_kind_with_content_type("manifest", Some("application/json; charset=utf-8")),
            FileKind::Json
        );
    }

    #[test]
    fn extensionless_name_with_unknown_content_type_stays_extensionless() {
        assert_eq!(
            pick_kind_with_content_type("LICENSE", Some("application/octet-stream")),
            FileKind::Extensionless
        );
    }

    #[test]
    fn extension_takes_priority_over_content_type() {
        assert_eq!(
            pick_kind_with_content_type("app.js", Some("text/plain")),
            FileKind::JavaScript
        );
    }
}
