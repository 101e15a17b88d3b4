use sitemirror::*;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod completion_tests {
    use super::*;

    #[test]
    fn test_pending_counter_accuracy() {
        let detector = CompletionDetector::new();

        for _ in 0..10 {
            detector.url_queued();
        }
        assert_eq!(detector.pending_count(), 10);

        for _ in 0..5 {
            detector.url_completed();
        }
        assert_eq!(detector.pending_count(), 5);

        for _ in 0..5 {
            detector.url_completed();
        }
        assert_eq!(detector.pending_count(), 0);
        assert!(detector.is_quiescent());
    }

    #[test]
    fn test_active_worker_tracking() {
        let detector = CompletionDetector::new();

        for _ in 0..3 {
            detector.fetch_started();
        }
        assert_eq!(detector.active_count(), 3);

        for _ in 0..2 {
            detector.fetch_finished();
        }
        assert_eq!(detector.active_count(), 1);
        assert!(!detector.is_quiescent());
    }

    #[tokio::test]
    async fn test_completion_detection() {
        let detector = CompletionDetector::new();

        detector.url_queued();
        detector.fetch_started();

        let detector_clone = detector.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            detector_clone.fetch_finished();
            detector_clone.url_completed();
        });

        tokio::time::timeout(Duration::from_secs(1), detector.wait_for_completion())
            .await
            .expect("Completion should be signaled within 1 second");

        assert_eq!(detector.pending_count(), 0);
        assert_eq!(detector.active_count(), 0);
    }

    #[tokio::test]
    async fn test_completion_not_signaled_with_pending_work() {
        let detector = CompletionDetector::new();

        detector.url_queued();
        detector.url_queued();
        detector.fetch_started();
        detector.fetch_finished();
        detector.url_completed();

        let result =
            tokio::time::timeout(Duration::from_millis(100), detector.wait_for_completion()).await;
        assert!(result.is_err(), "one URL is still pending");
    }

    #[tokio::test]
    async fn test_children_counted_before_parent_completes() {
        let detector = CompletionDetector::new();

        // seed
        detector.url_queued();
        detector.fetch_started();
        // the seed's two children are queued before the seed is released
        detector.url_queued();
        detector.url_queued();
        detector.fetch_finished();
        detector.url_completed();

        assert_eq!(detector.pending_count(), 2);
        assert!(!detector.is_quiescent());

        for _ in 0..2 {
            detector.fetch_started();
            detector.fetch_finished();
            detector.url_completed();
        }
        assert!(detector.is_quiescent());

        tokio::time::timeout(Duration::from_millis(100), detector.wait_for_completion())
            .await
            .expect("completion is sticky once signalled");
    }
}

#[cfg(test)]
mod monitor_tests {
    use super::*;

    fn url(s: &str) -> CanonicalUrl {
        canonicalize(s).unwrap()
    }

    #[tokio::test]
    async fn test_monitor_cancels_token_when_idle() {
        let queue = Arc::new(WorkQueue::new());
        let detector = CompletionDetector::new();
        let token = CancellationToken::new();

        let monitor = CompletionMonitor::new(
            queue,
            detector,
            Duration::ZERO,
            Duration::from_millis(10),
        );
        let raised = tokio::time::timeout(Duration::from_millis(200), monitor.run(token.clone()))
            .await
            .expect("monitor should finish");

        assert!(raised);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_monitor_waits_while_queue_has_items() {
        let queue = Arc::new(WorkQueue::new());
        let detector = CompletionDetector::new();
        let token = CancellationToken::new();

        queue.enqueue(url("https://example.com/a"));
        detector.url_queued();

        let monitor = CompletionMonitor::new(
            queue.clone(),
            detector.clone(),
            Duration::ZERO,
            Duration::from_millis(10),
        );
        let handle = tokio::spawn(monitor.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!token.is_cancelled(), "queue is not empty yet");

        // a worker takes the item and is still mid-fetch
        let item = queue.try_dequeue().unwrap();
        assert_eq!(item.as_str(), "https://example.com/a");
        detector.fetch_started();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!token.is_cancelled(), "in-flight work keeps the crawl alive");

        detector.fetch_finished();
        detector.url_completed();

        let raised = tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("monitor should notice completion within a poll interval")
            .unwrap();
        assert!(raised);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_monitor_wakes_early_on_completion_signal() {
        let queue = Arc::new(WorkQueue::new());
        let detector = CompletionDetector::new();
        let token = CancellationToken::new();

        detector.url_queued();

        // a poll interval far longer than the test's timeout
        let monitor = CompletionMonitor::new(
            queue,
            detector.clone(),
            Duration::ZERO,
            Duration::from_secs(60),
        );
        let handle = tokio::spawn(monitor.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        detector.url_completed();

        let raised = tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("completion signal should wake the monitor")
            .unwrap();
        assert!(raised);
    }

    #[tokio::test]
    async fn test_monitor_respects_grace_period() {
        let queue = Arc::new(WorkQueue::new());
        let token = CancellationToken::new();

        let monitor = CompletionMonitor::new(
            queue,
            CompletionDetector::new(),
            Duration::from_millis(100),
            Duration::from_millis(10),
        );
        let handle = tokio::spawn(monitor.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!token.is_cancelled(), "still inside the grace period");

        assert!(handle.await.unwrap());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_monitor_stops_on_external_cancellation() {
        let queue = Arc::new(WorkQueue::new());
        let detector = CompletionDetector::new();
        let token = CancellationToken::new();
        detector.url_queued();

        let monitor = CompletionMonitor::new(
            queue,
            detector,
            Duration::ZERO,
            Duration::from_millis(10),
        );
        let handle = tokio::spawn(monitor.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let raised = tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("monitor should stop")
            .unwrap();
        assert!(!raised);
    }
}

#[cfg(test)]
mod proptest_completion {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_pending_counter_tracks_operations(
            queue_count in 1usize..100,
            complete_count in 0usize..100
        ) {
            let detector = CompletionDetector::new();

            for _ in 0..queue_count {
                detector.url_queued();
            }
            prop_assert_eq!(detector.pending_count(), queue_count);

            let actual_complete = complete_count.min(queue_count);
            for _ in 0..actual_complete {
                detector.url_completed();
            }

            prop_assert_eq!(detector.pending_count(), queue_count - actual_complete);
            prop_assert_eq!(detector.is_quiescent(), actual_complete == queue_count);
        }
    }
}
