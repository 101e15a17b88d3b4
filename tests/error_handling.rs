mod common;

use common::*;
use sitemirror::*;
use std::sync::Arc;
use tokio::time::Duration;

#[cfg(test)]
mod error_handling_tests {
    use super::*;

    #[test]
    fn test_fetch_failure_display_matches_log_line() {
        let error = MirrorError::FetchFailure {
            url: "https://example.com/missing.png".to_string(),
            message: "HTTP status client error (404 Not Found)".to_string(),
        };

        assert_eq!(
            error.to_string(),
            failure_line("https://example.com/missing.png", &error.log_message())
        );
    }

    #[test]
    fn test_filesystem_failure_keeps_source() {
        use std::error::Error;

        let error = MirrorError::FilesystemFailure {
            path: "/mirror/a/index.html".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };

        assert!(error.to_string().contains("/mirror/a/index.html"));
        assert_eq!(error.log_message(), "denied");
        assert!(error.source().is_some());
    }

    #[tokio::test]
    async fn test_save_collision_is_logged_and_crawl_continues() {
        // `/a.html` is saved as a file, so `/a.html/x` cannot get a directory
        let site = Arc::new(
            MockSite::new()
                .html(
                    "https://example.com/",
                    r#"<a href="/a.html">a</a><a href="/a.html/x">x</a><a href="/b">b</a>"#,
                )
                .html("https://example.com/a.html", "<p>a</p>")
                .html("https://example.com/a.html/x", "<p>x</p>")
                .html("https://example.com/b", "<p>b</p>"),
        );
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");

        let crawler = crawler_for(site).workers(1).fetch_concurrency(1).build().unwrap();
        let stats = tokio::time::timeout(
            Duration::from_secs(2),
            crawler.crawl("https://example.com/", &out),
        )
        .await
        .expect("crawl should complete despite the failed save")
        .unwrap();

        assert_eq!(stats.urls_visited, 4);
        assert_eq!(stats.artifacts_saved, 3);
        assert_eq!(stats.errors_encountered, 1);
        assert!(out.join("a.html").is_file());
        assert!(out.join("b").join("index.html").is_file());

        let log = std::fs::read_to_string(out.join(ERROR_LOG_FILE)).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(
            lines[0].starts_with("Could not fetch link https://example.com/a.html/x. Error message: "),
            "unexpected log line: {}",
            lines[0]
        );
    }
}
