//! Engine module housing the transport and its device collaborators.
//!
//! This module exposes trait-based backends (`backend`), the beat notifier,
//! telemetry events and the `TransportController` state machine
//! (`transport`).

pub mod backend;
pub mod notifier;
pub mod telemetry;
pub mod transport;

pub use backend::{
    AudioBackend, CpalBackend, StubBackend, StubTimeSource, SystemTimeSource, TimeSource,
};
pub use telemetry::{TelemetryEvent, TelemetryEventKind, TelemetryPublisher};
pub use transport::{TransportController, TransportState};
