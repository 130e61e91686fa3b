//! Asset fetcher (§4.3 "Fetching resources").
//!
//! Static files handled by this crate are small (HTML pages, JS/CSS bundles,
//! icons); unlike a package manager's artifact downloader there is no need
//! for chunked/ranged transfer, only a single GET with redirects followed
//! and a bounded timeout.

use std::time::Duration;

use thiserror::Error;

use crate::resource::{Fetched, Resource};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("building HTTP client: {0}")]
    ClientBuild(reqwest::Error),
}

/// Thin wrapper over `reqwest::Client` carrying the engine's user agent and
/// per-request timeout.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    /// Build a fetcher with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError::ClientBuild`] if the underlying TLS backend
    /// fails to initialize.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self { client })
    }

    /// Fetch `url`, following redirects, and record the outcome on a fresh
    /// [`Resource`]. Non-2xx responses and transport failures both produce a
    /// [`Fetched::Failure`] rather than an `Err` -- a fetch failure is
    /// ordinary engine input, not an exceptional condition (§4.3, §7 "Asset
    /// fetch failure").
    pub async fn fetch(&self, url: &str) -> Resource {
        let mut resource = Resource::unretrieved(url);
        match self.client.get(url).send().await {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let final_url = response.url().to_string();
                if response.status().is_success() {
                    let content_type = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned);
                    let headers = response
                        .headers()
                        .iter()
                        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                        .collect();
                    let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
                    resource.mark_fetched(Fetched::Success {
                        status_code,
                        final_url,
                        content_type,
                        headers,
                        body,
                    });
                } else {
                    resource.mark_fetched(Fetched::Failure {
                        status_code: Some(status_code),
                    });
                }
            }
            Err(_) => {
                resource.mark_fetched(Fetched::Failure { status_code: None });
            }
        }
        resource
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_fetch_records_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/style.css")
            .with_status(200)
            .with_header("content-type", "text/css")
            .with_body(".a{color:red}")
            .create_async()
            .await;

        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}/style.css", server.url());
        let resource = fetcher.fetch(&url).await;

        mock.assert_async().await;
        assert!(resource.is_success());
        assert_eq!(resource.content_type(), Some("text/css"));
        assert_eq!(resource.body().unwrap(), b".a{color:red}");
    }

    #[tokio::test]
    async fn not_found_is_a_failure_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing.js")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}/missing.js", server.url());
        let resource = fetcher.fetch(&url).await;

        assert!(!resource.is_success());
        assert_eq!(resource.status_code(), Some(404));
    }
}
