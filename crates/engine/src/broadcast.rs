//! Per-job progress fan-out.
//!
//! Topics are job ids. Publishing never blocks: each subscriber sits on a
//! small broadcast buffer and a slow one loses its own oldest events
//! (surfaced as a lag), without stalling the publisher or other
//! subscribers.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use scriberr_domain::job::ProgressEvent;

/// Per-subscriber buffer; beyond this, oldest events are dropped for that
/// subscriber only.
const SUBSCRIBER_BUFFER: usize = 16;

#[derive(Default)]
pub struct ProgressBroadcaster {
    topics: Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a job's events, creating the topic on first use.
    pub fn subscribe(&self, job_id: &str) -> broadcast::Receiver<ProgressEvent> {
        let mut topics = self.topics.lock();
        topics
            .entry(job_id.to_string())
            .or_insert_with(|| broadcast::channel(SUBSCRIBER_BUFFER).0)
            .subscribe()
    }

    /// Publish without blocking; a topic with no subscribers is a no-op.
    pub fn publish(&self, job_id: &str, event: ProgressEvent) {
        let topics = self.topics.lock();
        if let Some(tx) = topics.get(job_id) {
            let _ = tx.send(event);
        }
    }

    /// Publish a terminal event and tear the topic down; subscribers see
    /// the event and then a closed channel.
    pub fn publish_terminal(&self, job_id: &str, event: ProgressEvent) {
        let mut topics = self.topics.lock();
        if let Some(tx) = topics.remove(job_id) {
            let _ = tx.send(event);
        }
    }

    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriberr_domain::JobStatus;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[tokio::test]
    async fn events_reach_subscriber_in_order() {
        let bus = ProgressBroadcaster::new();
        let mut rx = bus.subscribe("job-1");

        bus.publish("job-1", ProgressEvent::status(JobStatus::Processing));
        bus.publish("job-1", ProgressEvent::progress(JobStatus::Processing, 50.0));

        assert_eq!(rx.recv().await.unwrap().status, JobStatus::Processing);
        assert_eq!(rx.recv().await.unwrap().progress, Some(50.0));
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = ProgressBroadcaster::new();
        let mut rx_a = bus.subscribe("a");
        let _rx_b = bus.subscribe("b");

        bus.publish("b", ProgressEvent::status(JobStatus::Processing));
        assert!(matches!(rx_a.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_block() {
        let bus = ProgressBroadcaster::new();
        bus.publish("ghost", ProgressEvent::status(JobStatus::Processing));
        assert_eq!(bus.topic_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_drops_its_oldest_only() {
        let bus = ProgressBroadcaster::new();
        let mut slow = bus.subscribe("job-1");

        // Overflow the per-subscriber buffer.
        for i in 0..(SUBSCRIBER_BUFFER + 4) {
            bus.publish(
                "job-1",
                ProgressEvent::progress(JobStatus::Processing, i as f32),
            );
        }

        // The slow reader observes a lag, then the newest events.
        match slow.recv().await {
            Err(RecvError::Lagged(n)) => assert_eq!(n as usize, 4),
            other => panic!("expected lag, got {other:?}"),
        }
        let next = slow.recv().await.unwrap();
        assert_eq!(next.progress, Some(4.0));
    }

    #[tokio::test]
    async fn terminal_event_closes_the_topic() {
        let bus = ProgressBroadcaster::new();
        let mut rx = bus.subscribe("job-1");

        bus.publish_terminal("job-1", ProgressEvent::status(JobStatus::Completed));
        assert_eq!(rx.recv().await.unwrap().status, JobStatus::Completed);
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
        assert_eq!(bus.topic_count(), 0);
    }
}
