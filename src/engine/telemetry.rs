//! Telemetry events emitted by the transport controller.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::backend::TimeSource;

/// Telemetry event emitted by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp_ms: u64,
    pub kind: TelemetryEventKind,
    pub detail: Option<String>,
}

/// Types of telemetry events supported by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEventKind {
    EngineStarted { bpm: f64, sample_rate: u32 },
    EngineStopped,
    MuteChanged { muted: bool },
    /// The beep asset could not be used and the synthesized tone was substituted
    FallbackTone,
    Warning,
}

/// Publishes timestamped telemetry events to any number of subscribers.
#[derive(Clone)]
pub struct TelemetryPublisher {
    tx: broadcast::Sender<TelemetryEvent>,
    time_source: Arc<dyn TimeSource>,
    start_instant: Instant,
}

impl TelemetryPublisher {
    pub fn new(capacity: usize, time_source: Arc<dyn TimeSource>) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let start_instant = time_source.now();
        Self {
            tx,
            time_source,
            start_instant,
        }
    }

    pub fn publish(&self, kind: TelemetryEventKind, detail: Option<String>) {
        let timestamp_ms = self
            .time_source
            .now()
            .saturating_duration_since(self.start_instant)
            .as_millis() as u64;
        // No subscribers is not an error
        let _ = self.tx.send(TelemetryEvent {
            timestamp_ms,
            kind,
            detail,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.tx.subscribe()
    }
}
