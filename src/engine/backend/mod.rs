//! Backend abstractions for the transport controller.

use std::time::Instant;

use crate::audio::FrameSource;
use crate::error::AudioError;

/// Trait implemented by audio output devices.
///
/// The controller asks the backend for its hardware sample rate before it
/// builds a session, then hands over a [FrameSource] that the backend pulls
/// from on its real-time thread until [stop](AudioBackend::stop).
pub trait AudioBackend: Send + Sync {
    /// Sample rate the next stream will run at
    fn sample_rate(&self) -> Result<u32, AudioError>;
    fn start(&self, source: Box<dyn FrameSource>) -> Result<(), AudioError>;
    /// Stop pulling from the current source and drop it
    ///
    /// Must be a no-op when nothing is running.
    fn stop(&self) -> Result<(), AudioError>;
}

/// Trait representing a monotonic time source used for telemetry timestamps.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

mod cpal;
pub use self::cpal::CpalBackend;

mod stub;
pub use stub::{StubBackend, StubTimeSource};
