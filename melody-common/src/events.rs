//! Event types for the detection event system
//!
//! Provides the shared event definitions and the EventBus used to push job
//! progress to SSE subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::detection::{Conclusion, JobState};

/// Detection event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DetectionEvent {
    /// A file was accepted and jobs were opened for the selected providers
    DetectionStarted {
        request_id: Uuid,
        filename: String,
        providers: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// One provider job changed state (or recorded another pending attempt)
    ProviderJobUpdated {
        request_id: Uuid,
        provider: String,
        job_id: Uuid,
        state: JobState,
        attempts: u32,
        /// Present once the job is FINISHED
        ai_probability: Option<f64>,
        /// Human-readable cause once the job is FAILED
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Every job of the request reached a terminal state
    DetectionConcluded {
        request_id: Uuid,
        conclusion: Conclusion,
        timestamp: DateTime<Utc>,
    },

    /// Caller abandoned the request, or its records were evicted
    DetectionAbandoned {
        request_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl DetectionEvent {
    /// SSE event name
    pub fn event_type(&self) -> &str {
        match self {
            DetectionEvent::DetectionStarted { .. } => "DetectionStarted",
            DetectionEvent::ProviderJobUpdated { .. } => "ProviderJobUpdated",
            DetectionEvent::DetectionConcluded { .. } => "DetectionConcluded",
            DetectionEvent::DetectionAbandoned { .. } => "DetectionAbandoned",
        }
    }

    /// Request this event belongs to
    pub fn request_id(&self) -> Uuid {
        match self {
            DetectionEvent::DetectionStarted { request_id, .. }
            | DetectionEvent::ProviderJobUpdated { request_id, .. }
            | DetectionEvent::DetectionConcluded { request_id, .. }
            | DetectionEvent::DetectionAbandoned { request_id, .. } => *request_id,
        }
    }

    /// Whether no further events will follow for this request
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            DetectionEvent::DetectionConcluded { .. } | DetectionEvent::DetectionAbandoned { .. }
        )
    }
}

/// Broadcast bus for detection events
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DetectionEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<DetectionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: DetectionEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let request_id = Uuid::new_v4();
        let event = DetectionEvent::DetectionConcluded {
            request_id,
            conclusion: Conclusion::Conflicting,
            timestamp: Utc::now(),
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "DetectionConcluded");
        assert_eq!(json["conclusion"], "CONFLICTING");
        assert_eq!(json["request_id"], request_id.to_string());
        assert_eq!(event.event_type(), "DetectionConcluded");
        assert!(event.is_final());
    }

    #[test]
    fn test_job_update_is_not_final() {
        let event = DetectionEvent::ProviderJobUpdated {
            request_id: Uuid::new_v4(),
            provider: "ircam".to_string(),
            job_id: Uuid::new_v4(),
            state: JobState::Polling,
            attempts: 2,
            ai_probability: None,
            error: None,
            timestamp: Utc::now(),
        };
        assert!(!event.is_final());
    }

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let request_id = Uuid::new_v4();
        bus.emit_lossy(DetectionEvent::DetectionAbandoned {
            request_id,
            timestamp: Utc::now(),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.request_id(), request_id);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        let event = DetectionEvent::DetectionAbandoned {
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        };
        bus.emit_lossy(event.clone());

        // Late subscribers only see what comes after them
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
        bus.emit_lossy(event);
        assert!(rx.try_recv().is_ok());
    }
}
