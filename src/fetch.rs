//! HTTP fetching seam
//!
//! The crawler only talks to the network through [`Fetcher`], so tests can
//! serve a site from memory and callers can swap in their own client.

use std::time::Duration;

use url::Url;

use crate::{canonical::CanonicalUrl, error::MirrorError};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// A successfully fetched resource
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// URL the body was finally served from, after redirects
    ///
    /// Relative references in the body resolve against this URL.
    pub final_url: Url,
    /// Value of the `Content-Type` header, if any
    pub content_type: Option<String>,
    /// Raw response body, saved verbatim
    pub body: Vec<u8>,
}

impl FetchedResource {
    /// Whether the body should be scanned for references
    ///
    /// A missing content type is treated as HTML.
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_none_or(|ct| ct.to_ascii_lowercase().contains("html"))
    }
}

/// Retrieves the bytes behind a URL
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue a GET for `url`
    ///
    /// Transport errors and non-success statuses both fail with
    /// [`MirrorError::FetchFailure`].
    async fn fetch(&self, url: &CanonicalUrl) -> Result<FetchedResource, MirrorError>;
}

/// [`Fetcher`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher with no per-request timeout
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(None)
    }

    /// Build a fetcher, optionally bounding every request by `timeout`
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &CanonicalUrl) -> Result<FetchedResource, MirrorError> {
        let failure = |e: reqwest::Error| MirrorError::FetchFailure {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(url.as_url().clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(failure)?;

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(failure)?.to_vec();

        Ok(FetchedResource {
            final_url,
            content_type,
            body,
        })
    }
}
