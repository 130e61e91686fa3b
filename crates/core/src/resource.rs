//! A fetched (or not-yet-fetched) URL and its outcome (§4.3 "Resource").

use std::collections::HashMap;

/// The outcome of attempting to fetch a [`Resource`].
#[derive(Debug, Clone)]
pub enum Fetched {
    /// The request succeeded with a 2xx status.
    Success {
        status_code: u16,
        final_url: String,
        content_type: Option<String>,
        headers: Headers,
        body: Vec<u8>,
    },
    /// The request completed but was not a success (non-2xx, or a
    /// transport-level failure after retries were exhausted).
    Failure { status_code: Option<u16> },
}

/// A URL and, once fetched, its outcome. Two resources are equal iff their
/// URLs are equal -- fetch outcome is not part of identity (§4.3).
#[derive(Debug, Clone)]
pub struct Resource {
    url: String,
    fetched: Option<Fetched>,
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}
impl Eq for Resource {}

impl std::hash::Hash for Resource {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

impl Resource {
    /// A resource that has not yet been fetched.
    #[must_use]
    pub fn unretrieved(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fetched: None,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn is_retrieved(&self) -> bool {
        self.fetched.is_some()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.fetched, Some(Fetched::Success { .. }))
    }

    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match &self.fetched {
            Some(Fetched::Success { status_code, .. }) => Some(*status_code),
            Some(Fetched::Failure { status_code }) => *status_code,
            None => None,
        }
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        match &self.fetched {
            Some(Fetched::Success { content_type, .. }) => content_type.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        match &self.fetched {
            Some(Fetched::Success { body, .. }) => Some(body),
            _ => None,
        }
    }

    #[must_use]
    pub fn headers(&self) -> Option<&Headers> {
        match &self.fetched {
            Some(Fetched::Success { headers, .. }) => Some(headers),
            _ => None,
        }
    }

    #[must_use]
    pub fn final_url(&self) -> Option<&str> {
        match &self.fetched {
            Some(Fetched::Success { final_url, .. }) => Some(final_url),
            _ => None,
        }
    }

    /// Mark this resource as fetched, recording the outcome.
    pub fn mark_fetched(&mut self, fetched: Fetched) {
        self.fetched = Some(fetched);
    }

    #[must_use]
    pub fn fetched(&self) -> Option<&Fetched> {
        self.fetched.as_ref()
    }
}

/// Header map captured alongside a successful fetch outcome, consulted by
/// header-based hint rules (e.g. `X-Generator`).
pub type Headers = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_url_based() {
        let mut a = Resource::unretrieved("https://example.com/a.js");
        let b = Resource::unretrieved("https://example.com/a.js");
        assert_eq!(a, b);
        a.mark_fetched(Fetched::Success {
            status_code: 200,
            final_url: "https://example.com/a.js".into(),
            content_type: Some("application/javascript".into()),
            headers: HashMap::new(),
            body: vec![1, 2, 3],
        });
        assert_eq!(a, b);
    }

    #[test]
    fn unretrieved_has_no_status() {
        let r = Resource::unretrieved("https://example.com/a.js");
        assert!(!r.is_retrieved());
        assert_eq!(r.status_code(), None);
    }

    #[test]
    fn failure_without_body_is_not_success() {
        let mut r = Resource::unretrieved("https://example.com/missing.js");
        r.mark_fetched(Fetched::Failure {
            status_code: Some(404),
        });
        assert!(!r.is_success());
        assert_eq!(r.status_code(), Some(404));
        assert_eq!(r.body(), None);
    }
}
