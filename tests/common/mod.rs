#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use sitemirror::*;
use url::Url;

/// In-memory site served through the `Fetcher` seam
///
/// Pages are keyed by canonical URL string. Anything not registered fails
/// with a 404-style `FetchFailure`.
pub struct MockSite {
    pages: HashMap<String, (Option<String>, Vec<u8>)>,
    latency: Duration,
    pub requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockSite {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn html(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            (Some("text/html; charset=utf-8".to_string()), body.as_bytes().to_vec()),
        );
        self
    }

    pub fn asset(mut self, url: &str, content_type: &str, body: &[u8]) -> Self {
        self.pages
            .insert(url.to_string(), (Some(content_type.to_string()), body.to_vec()));
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|u| *u == url).count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait::async_trait]
impl Fetcher for MockSite {
    async fn fetch(&self, url: &CanonicalUrl) -> Result<FetchedResource, MirrorError> {
        self.requests.lock().push(url.to_string());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.pages.get(url.as_str()) {
            Some((content_type, body)) => Ok(FetchedResource {
                final_url: Url::parse(url.as_str()).unwrap(),
                content_type: content_type.clone(),
                body: body.clone(),
            }),
            None => Err(MirrorError::FetchFailure {
                url: url.to_string(),
                message: "HTTP status client error (404 Not Found)".to_string(),
            }),
        }
    }
}

/// Error sink that keeps failures in memory
#[derive(Default)]
pub struct RecordingSink {
    pub failures: Mutex<Vec<(String, String)>>,
}

impl ErrorSink for RecordingSink {
    fn log_failure(&self, url: &str, message: &str) {
        self.failures
            .lock()
            .push((url.to_string(), message.to_string()));
    }
}

/// Build a complete tree of pages `depth` levels deep with `branch` children each
///
/// Every page also references one stylesheet shared by the whole site.
pub fn tree_site(depth: usize, branch: usize) -> (MockSite, usize) {
    let mut site = MockSite::new().asset(
        "https://example.com/static/site.css",
        "text/css",
        b"body { margin: 0 }",
    );
    let mut pages = 0;

    fn children(path: &str, branch: usize) -> Vec<String> {
        (0..branch)
            .map(|i| {
                if path == "/" {
                    format!("/n{i}")
                } else {
                    format!("{path}/n{i}")
                }
            })
            .collect()
    }

    let mut level = vec!["/".to_string()];
    for d in 0..=depth {
        let mut next = Vec::new();
        for path in &level {
            let kids = if d < depth {
                children(path, branch)
            } else {
                Vec::new()
            };
            let links: String = kids
                .iter()
                .map(|k| format!(r#"<a href="{k}/">child</a>"#))
                .collect();
            let body = format!(
                r#"<html><head><link rel="stylesheet" href="/static/site.css"></head><body>{links}</body></html>"#
            );
            site = site.html(&format!("https://example.com{path}"), &body);
            pages += 1;
            next.extend(kids);
        }
        level = next;
    }

    (site, pages)
}

/// Crawler wired to `site`, with tight monitor timings for tests
pub fn crawler_for(site: Arc<MockSite>) -> CrawlerBuilder {
    Crawler::builder()
        .fetcher(site)
        .workers(4)
        .fetch_concurrency(4)
        .poll_interval(Duration::from_millis(20))
}
