//! Testing utilities for sessions.
//!
//! This module provides tools for deterministic tests:
//! - `MockBackend` answering with scripted replies instead of HTTP calls
//! - `report_payload` for building backend bodies
//! - `StoreLog` for recording every change a store goes through

use crate::backend::ReportBackend;
use crate::store::SharedStore;
use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

/// One scripted backend reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A raw response body, returned as-is.
    Body(String),
    /// A non-2xx HTTP status.
    Status(u16),
    /// A transport failure.
    NetworkError(String),
    /// The request ran past its deadline.
    Timeout,
    /// The request never completes.
    Pending,
}

impl MockReply {
    /// A well-formed report body.
    pub fn report(narrative: &str, locations: &[(&str, &str)]) -> Self {
        MockReply::Body(report_payload(narrative, locations))
    }
}

/// A backend that returns scripted replies in order.
///
/// Once the script runs out, every request gets an empty report.
pub struct MockBackend {
    replies: RefCell<VecDeque<MockReply>>,
    latency: Duration,
    requests: RefCell<Vec<String>>,
}

impl MockBackend {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            latency: Duration::ZERO,
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Delay every reply by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add a reply to the end of the script.
    pub fn queue_reply(&self, reply: MockReply) {
        self.replies.borrow_mut().push_back(reply);
    }

    /// Messages received so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

#[async_trait(?Send)]
impl ReportBackend for MockBackend {
    async fn submit(&self, message: &str) -> Result<String, analyst::Error> {
        self.requests.borrow_mut().push(message.to_string());
        let reply = self.replies.borrow_mut().pop_front();

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match reply.unwrap_or_else(|| MockReply::report("No further reports.", &[])) {
            MockReply::Body(body) => Ok(body),
            MockReply::Status(status) => Err(analyst::Error::Api {
                status,
                message: String::new(),
            }),
            MockReply::NetworkError(message) => Err(analyst::Error::Network(message)),
            MockReply::Timeout => Err(analyst::Error::Timeout(Duration::from_secs(60))),
            MockReply::Pending => std::future::pending().await,
        }
    }
}

/// Build a backend body: an envelope whose `response` is the encoded report.
pub fn report_payload(narrative: &str, locations: &[(&str, &str)]) -> String {
    let locations: Vec<serde_json::Value> = locations
        .iter()
        .map(|(name, explanation)| serde_json::json!({ "name": name, "explanation": explanation }))
        .collect();
    let report = serde_json::json!({
        "general_explanation": narrative,
        "locations": locations,
    });
    serde_json::json!({ "response": report.to_string() }).to_string()
}

/// Records every snapshot a store notifies with.
pub struct StoreLog<T> {
    frames: Rc<RefCell<Vec<Vec<T>>>>,
}

impl<T: Clone + 'static> StoreLog<T> {
    pub fn attach(store: &SharedStore<T>) -> Self {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&frames);
        store
            .subscribe(move |items: &[T]| sink.borrow_mut().push(items.to_vec()))
            .detach();
        Self { frames }
    }

    /// Every snapshot, oldest first.
    pub fn frames(&self) -> Vec<Vec<T>> {
        self.frames.borrow().clone()
    }

    /// Length of each snapshot, oldest first.
    pub fn lengths(&self) -> Vec<usize> {
        self.frames.borrow().iter().map(Vec::len).collect()
    }

    /// Number of notifications seen.
    pub fn count(&self) -> usize {
        self.frames.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingest;

    #[test]
    fn test_report_payload_round_trips_through_ingest() {
        let body = report_payload("Two sites flagged.", &[("Kharkiv", "E"), ("Atlantis", "F")]);
        let report = ingest(&body).unwrap();
        assert_eq!(report.narrative, "Two sites flagged.");
        assert_eq!(report.findings.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_backend_follows_script() {
        let backend = MockBackend::new(vec![MockReply::Status(500), MockReply::Timeout]);

        assert!(matches!(
            backend.submit("a").await,
            Err(analyst::Error::Api { status: 500, .. })
        ));
        assert!(matches!(
            backend.submit("b").await,
            Err(analyst::Error::Timeout(_))
        ));
        assert!(backend.submit("c").await.is_ok());
        assert_eq!(backend.requests(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_store_log_records_frames() {
        let store = SharedStore::new();
        let log = StoreLog::attach(&store);
        store.append(1);
        store.replace(vec![]);
        assert_eq!(log.frames(), vec![vec![1], vec![]]);
        assert_eq!(log.lengths(), vec![1, 0]);
    }
}
