//! Progress queues for long-running requests.
//!
//! A browser opens `/register-progress/{id}` before submitting work tagged with
//! the same id. The work publishes [`ProgressEvent`]s into the hub; the SSE
//! handler drains them until the `done` marker.
//!
//! # Design Decisions
//! - One subscriber per id; a new subscription replaces the old one
//! - Events published with no subscriber are dropped
//! - A subscription removes its own map entry on drop, never a newer one

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::observability::metrics;

/// Stage outcome carried by a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Running,
    Success,
    Error,
}

/// One message pushed to a waiting browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub status: ProgressStatus,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub done: bool,
}

impl ProgressEvent {
    pub fn running(step: impl Into<String>, message: impl Into<String>, progress: u8) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
            progress: Some(progress.min(100)),
            status: ProgressStatus::Running,
            done: false,
        }
    }

    pub fn success(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
            progress: Some(100),
            status: ProgressStatus::Success,
            done: false,
        }
    }

    pub fn error(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
            progress: None,
            status: ProgressStatus::Error,
            done: false,
        }
    }

    /// Terminal marker. Ends the stream and is never sent to the browser.
    pub fn done() -> Self {
        Self {
            step: "done".to_string(),
            message: String::new(),
            progress: None,
            status: ProgressStatus::Success,
            done: true,
        }
    }
}

/// Registry of progress queues keyed by request id.
#[derive(Clone, Default)]
pub struct ProgressHub {
    queues: Arc<DashMap<String, mpsc::UnboundedSender<ProgressEvent>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the queue for `request_id`, replacing any earlier subscriber.
    pub fn subscribe(&self, request_id: &str) -> ProgressSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        if self
            .queues
            .insert(request_id.to_string(), tx.clone())
            .is_some()
        {
            tracing::debug!(request_id = %request_id, "Replacing existing progress subscriber");
        }
        metrics::record_progress_subscribers(self.queues.len());

        ProgressSubscription {
            request_id: request_id.to_string(),
            tx,
            rx,
            hub: self.clone(),
        }
    }

    /// Deliver an event to the current subscriber of `request_id`.
    ///
    /// Returns `false` when nobody is listening.
    pub fn publish(&self, request_id: &str, event: ProgressEvent) -> bool {
        match self.queues.get(request_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                tracing::trace!(request_id = %request_id, step = %event.step, "No progress subscriber");
                false
            }
        }
    }

    /// Convenience handle bound to one request id.
    pub fn reporter(&self, request_id: impl Into<String>) -> ProgressReporter {
        ProgressReporter {
            hub: self.clone(),
            request_id: request_id.into(),
        }
    }

    pub fn is_subscribed(&self, request_id: &str) -> bool {
        self.queues.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    fn release(&self, request_id: &str, tx: &mpsc::UnboundedSender<ProgressEvent>) {
        self.queues
            .remove_if(request_id, |_, current| current.same_channel(tx));
        metrics::record_progress_subscribers(self.queues.len());
    }
}

/// Receiving side of a progress queue. Unregisters itself on drop.
pub struct ProgressSubscription {
    request_id: String,
    tx: mpsc::UnboundedSender<ProgressEvent>,
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    hub: ProgressHub,
}

impl ProgressSubscription {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Next event to forward, or `None` once the done marker arrives.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        match self.rx.recv().await {
            Some(event) if !event.done => Some(event),
            _ => None,
        }
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.hub.release(&self.request_id, &self.tx);
        tracing::debug!(request_id = %self.request_id, "Progress subscription closed");
    }
}

/// Publishing side used by long-running work.
#[derive(Clone)]
pub struct ProgressReporter {
    hub: ProgressHub,
    request_id: String,
}

impl ProgressReporter {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn step(&self, step: &str, message: impl Into<String>, progress: u8) {
        self.hub
            .publish(&self.request_id, ProgressEvent::running(step, message, progress));
    }

    pub fn success(&self, step: &str, message: impl Into<String>) {
        self.hub
            .publish(&self.request_id, ProgressEvent::success(step, message));
    }

    pub fn fail(&self, step: &str, message: impl Into<String>) {
        self.hub
            .publish(&self.request_id, ProgressEvent::error(step, message));
    }

    pub fn finish(&self) {
        self.hub.publish(&self.request_id, ProgressEvent::done());
    }
}
