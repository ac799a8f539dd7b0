use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::audio::FrameSource;
use crate::error::AudioError;

use super::{AudioBackend, TimeSource};

/// Deterministic backend used for testing and offline tooling.
///
/// There is no device thread: the caller drives the render path by calling
/// [pull](StubBackend::pull), which plays the role of the audio callback.
pub struct StubBackend {
    sample_rate: AtomicU32,
    fail_start: bool,
    running: AtomicBool,
    source: Mutex<Option<Box<dyn FrameSource>>>,
}

impl StubBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: AtomicU32::new(sample_rate),
            fail_start: false,
            running: AtomicBool::new(false),
            source: Mutex::new(None),
        }
    }

    /// Backend whose `start` always fails, simulating an unavailable device
    pub fn failing(sample_rate: u32) -> Self {
        Self {
            fail_start: true,
            ..Self::new(sample_rate)
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Change the rate reported to the next `start`, as if the device was reconfigured
    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::SeqCst);
    }

    /// Render `frames` interleaved frames from the current source
    ///
    /// Returns silence when nothing is running.
    pub fn pull(&self, frames: usize, channels: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * channels.max(1)];
        if let Ok(mut source) = self.source.lock() {
            if let Some(source) = source.as_mut() {
                source.render(&mut out, channels);
            }
        }
        out
    }

    fn lock_source(&self) -> Result<std::sync::MutexGuard<'_, Option<Box<dyn FrameSource>>>, AudioError> {
        self.source.lock().map_err(|_| AudioError::LockPoisoned {
            component: "stub_source".to_string(),
        })
    }
}

impl AudioBackend for StubBackend {
    fn sample_rate(&self) -> Result<u32, AudioError> {
        Ok(self.sample_rate.load(Ordering::SeqCst))
    }

    fn start(&self, source: Box<dyn FrameSource>) -> Result<(), AudioError> {
        if self.fail_start {
            return Err(AudioError::StreamOpenFailed {
                reason: "stub device unavailable".to_string(),
            });
        }

        *self.lock_source()? = Some(source);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        self.lock_source()?.take();
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Deterministic time source for stub runs.
///
/// Each call to `now()` advances by a fixed 10ms to guarantee monotonic
/// timestamps even when no real audio stream is active.
pub struct StubTimeSource {
    start: Instant,
    offset_ms: AtomicU64,
}

impl StubTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }
}

impl Default for StubTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for StubTimeSource {
    fn now(&self) -> Instant {
        let ms = self.offset_ms.fetch_add(10, Ordering::SeqCst);
        self.start + Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f32);

    impl FrameSource for Constant {
        fn render(&mut self, out: &mut [f32], _channels: usize) {
            out.fill(self.0);
        }
    }

    #[test]
    fn test_pull_without_source_is_silent() {
        let backend = StubBackend::new(48000);
        assert_eq!(backend.pull(4, 2), vec![0.0; 8]);
        assert!(!backend.is_running());
    }

    #[test]
    fn test_start_pull_stop() {
        let backend = StubBackend::new(48000);
        assert_eq!(backend.sample_rate().unwrap(), 48000);
        backend.set_sample_rate(44100);
        assert_eq!(backend.sample_rate().unwrap(), 44100);

        backend.start(Box::new(Constant(0.5))).unwrap();
        assert!(backend.is_running());
        assert_eq!(backend.pull(3, 1), vec![0.5; 3]);

        backend.stop().unwrap();
        assert!(!backend.is_running());
        assert_eq!(backend.pull(3, 1), vec![0.0; 3]);

        // Stopping twice is a no-op
        backend.stop().unwrap();
    }

    #[test]
    fn test_failing_backend() {
        let backend = StubBackend::failing(44100);
        let err = backend.start(Box::new(Constant(1.0))).unwrap_err();
        assert!(matches!(err, AudioError::StreamOpenFailed { .. }));
        assert!(!backend.is_running());
    }

    #[test]
    fn test_stub_time_source_is_monotonic() {
        let time = StubTimeSource::new();
        let first = time.now();
        let second = time.now();
        assert_eq!(second - first, Duration::from_millis(10));
    }
}
