//! Event bus for UI and logging consumers
//!
//! Producers publish immutable payloads; publishing never blocks and a bus
//! with no subscribers silently drops events. Slow subscribers lag and lose
//! the oldest events rather than stalling detectors.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use minetrace_core::{ComprehensiveDetection, DetectedSignal, DirectionEstimate, SensorDomain};

/// Default buffered events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Notifications published during a tracking session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// A detector matched a reading
    SignalDetected { signal: DetectedSignal },

    /// Periodic detector status
    ScanProgress {
        detector: String,
        domain: SensorDomain,
        /// Elapsed fraction of the session (0-1)
        fraction: f64,
        /// Detections by this detector so far
        count: u64,
    },

    /// A new cross-domain detection was created
    MinerDetected { detection: ComprehensiveDetection },

    /// A detection's direction estimate changed
    DirectionUpdated {
        detection: ComprehensiveDetection,
        direction: DirectionEstimate,
    },

    /// The session ended by duration expiry or stop request
    SessionCompleted {
        cancelled: bool,
        comprehensive_detections: usize,
        signals: u64,
        elapsed_ms: u64,
    },
}

impl TrackerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerEvent::SignalDetected { .. } => "signal_detected",
            TrackerEvent::ScanProgress { .. } => "scan_progress",
            TrackerEvent::MinerDetected { .. } => "miner_detected",
            TrackerEvent::DirectionUpdated { .. } => "direction_updated",
            TrackerEvent::SessionCompleted { .. } => "session_completed",
        }
    }
}

/// Broadcast publisher for tracker events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TrackerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tx.subscribe()
    }

    /// Publish without blocking; dropped when nobody listens
    pub fn publish(&self, event: TrackerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(TrackerEvent::ScanProgress {
            detector: "rf-1".to_string(),
            domain: SensorDomain::Rf,
            fraction: 0.5,
            count: 3,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        let signal = DetectedSignal::builder(SensorDomain::Rf, 62_500.0, 40.0).build();
        bus.publish(TrackerEvent::SignalDetected { signal });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "signal_detected");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = TrackerEvent::SessionCompleted {
            cancelled: true,
            comprehensive_detections: 1,
            signals: 12,
            elapsed_ms: 1500,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session_completed");
        assert_eq!(json["cancelled"], true);
    }
}
