//! Fetching the worker's HTML document.

use futures_util::future::BoxFuture;

/// Maximum response body size (10 MB).
const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Response body from {url} is not UTF-8 text")]
    NotText { url: String },

    #[error("Response body exceeds maximum size ({size} bytes > {limit} bytes)")]
    TooLarge { size: usize, limit: usize },

    #[error("{0}")]
    Other(String),
}

/// Source of panel content. Completion is awaited on a spawned task, never by
/// the caller that asked for the load.
pub trait ContentFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<String, FetchError>>;
}

/// Plain `GET` over reqwest. No extra headers, auth, retries or timeout.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContentFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<String, FetchError>> {
        let client = self.client.clone();
        let url = url.to_string();
        Box::pin(async move {
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|source| FetchError::Request { url: url.clone(), source })?;

            let status = response.status();
            if !status.is_success() {
                // The worker's error pages are still worth showing.
                tracing::warn!(%url, %status, "worker answered with a non-success status");
            }

            let body = response
                .bytes()
                .await
                .map_err(|source| FetchError::Body { url: url.clone(), source })?;

            if body.len() > MAX_RESPONSE_BYTES {
                return Err(FetchError::TooLarge {
                    size: body.len(),
                    limit: MAX_RESPONSE_BYTES,
                });
            }

            String::from_utf8(body.to_vec()).map_err(|_| FetchError::NotText { url })
        })
    }
}
