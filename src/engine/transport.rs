//! TransportController: Idle/Playing/Stopped state machine for one beep stream.
//!
//! The controller owns at most one session at a time. A session bundles the
//! beat clock, the render strategy handed to the backend, and the helper
//! threads (beat notifier, lookahead scheduler) that run beside it. The
//! render path never takes the controller lock; everything it shares with
//! the control path is an atomic or an `rtrb` ring.
//!
//! ```text
//!            start()                 stop()
//!   Idle ───────────────> Playing ──────────> Stopped
//!                          │  ^                  │
//!                          └──┘ start()          │ start()
//!                       (stop, then start)       v
//!                                             Playing
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::audio::clock::validate_bpm;
use crate::audio::lookahead::spawn_scheduler;
use crate::audio::{
    beat_channel, lookahead_session, offline_playback, BeatClock, BeatEvent, FrameSource,
    OfflineTrackSwap, StreamRenderer, Waveform, WaveformSource,
};
use crate::config::{AppConfig, RenderStrategy};
use crate::error::{log_audio_error, AudioError, WaveformError};

use super::backend::{AudioBackend, StubBackend, StubTimeSource, SystemTimeSource, TimeSource};
use super::notifier::spawn_notifier;
use super::telemetry::{TelemetryEvent, TelemetryEventKind, TelemetryPublisher};

/// Lifecycle state of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Playing,
    Stopped,
}

/// Everything that exists only while playing
struct Session {
    clock: BeatClock,
    strategy: RenderStrategy,
    /// Cleared first on teardown; gates the notifier and the scheduler
    active: Arc<AtomicBool>,
    notifier: Option<JoinHandle<()>>,
    scheduler: Option<JoinHandle<()>>,
    track_swap: Option<OfflineTrackSwap>,
    underruns: Option<Arc<AtomicU64>>,
    _waveform: Arc<Waveform>,
}

impl Session {
    /// Stop helper threads and wait for them
    fn halt(&mut self) {
        self.active.store(false, Ordering::Release);
        for (name, handle) in [
            ("scheduler", self.scheduler.take()),
            ("notifier", self.notifier.take()),
        ] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    tracing::warn!("[Transport] {} thread panicked", name);
                }
            }
        }
    }
}

struct TransportInner {
    state: TransportState,
    session: Option<Session>,
}

/// Inputs of a session, validated before the running session is touched
struct SessionPlan {
    clock: BeatClock,
    waveform: Arc<Waveform>,
    fallback_reason: Option<WaveformError>,
}

/// Owns the metronome transport for one host
///
/// There is no global instance: the host creates one controller per output
/// device and keeps it for as long as it needs the metronome.
pub struct TransportController {
    backend: Arc<dyn AudioBackend>,
    config: AppConfig,
    inner: Mutex<TransportInner>,
    /// Persists across sessions
    muted: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicU64>,
    beat_tx: broadcast::Sender<BeatEvent>,
    telemetry: TelemetryPublisher,
}

impl TransportController {
    pub fn new(backend: Arc<dyn AudioBackend>, config: AppConfig) -> Self {
        Self::with_time_source(backend, config, Arc::new(SystemTimeSource::default()))
    }

    pub fn with_time_source(
        backend: Arc<dyn AudioBackend>,
        config: AppConfig,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        let (beat_tx, _) = broadcast::channel(config.events.broadcast_capacity.max(1));
        let telemetry = TelemetryPublisher::new(config.events.broadcast_capacity, time_source);

        Self {
            backend,
            config,
            inner: Mutex::new(TransportInner {
                state: TransportState::Idle,
                session: None,
            }),
            muted: Arc::new(AtomicBool::new(false)),
            frames_rendered: Arc::new(AtomicU64::new(0)),
            beat_tx,
            telemetry,
        }
    }

    /// Controller driven by a [StubBackend]; the caller pulls audio through
    /// the returned handle.
    pub fn with_stub(sample_rate: u32, config: AppConfig) -> (Self, Arc<StubBackend>) {
        let stub = Arc::new(StubBackend::new(sample_rate));
        let backend: Arc<dyn AudioBackend> = stub.clone();
        let controller = Self::with_time_source(backend, config, Arc::new(StubTimeSource::new()));
        (controller, stub)
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, TransportInner>, AudioError> {
        self.inner.lock().map_err(|_| AudioError::LockPoisoned {
            component: "transport".to_string(),
        })
    }

    /// Lock for queries and mute; a poisoned lock still holds valid state
    fn peek_inner(&self) -> MutexGuard<'_, TransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // TRANSPORT CONTROL
    // ========================================================================

    /// Start the metronome at `bpm`, beeping with `beep` or the fallback tone
    ///
    /// A running session is stopped first. An invalid BPM or device sample
    /// rate is rejected before anything changes. If the session cannot be
    /// built after that (thread spawn or device failure) the previous session
    /// is still gone: the state is `Stopped` if something was playing,
    /// otherwise it is left as it was.
    pub fn start(&self, bpm: f64, beep: Option<&Path>) -> Result<(), AudioError> {
        let plan = match self.plan_session(bpm, beep) {
            Ok(plan) => plan,
            Err(err) => {
                log_audio_error(&err, "start");
                return Err(err);
            }
        };

        let mut inner = self.lock_inner()?;
        if inner.session.is_some() {
            tracing::info!("[Transport] Restarting: stopping running session first");
            if let Err(err) = self.teardown(&mut inner) {
                log_audio_error(&err, "start");
            }
        }

        match self.open_session(plan) {
            Ok(session) => {
                let sample_rate = session.clock.sample_rate() as u32;
                tracing::info!(
                    "[Transport] Playing at {} BPM ({:?}, {} Hz, period {:.3} samples, muted={})",
                    bpm,
                    session.strategy,
                    sample_rate,
                    session.clock.beat_period_samples(),
                    self.is_muted()
                );
                inner.session = Some(session);
                inner.state = TransportState::Playing;
                self.telemetry
                    .publish(TelemetryEventKind::EngineStarted { bpm, sample_rate }, None);
                Ok(())
            }
            Err(err) => {
                log_audio_error(&err, "start");
                self.telemetry.publish(
                    TelemetryEventKind::Warning,
                    Some(format!("Failed to start: {}", err)),
                );
                Err(err)
            }
        }
    }

    /// Stop playback
    ///
    /// No-op when nothing is playing. When this returns the backend no longer
    /// pulls audio and no further beat events will be delivered.
    pub fn stop(&self) -> Result<(), AudioError> {
        let mut inner = self.lock_inner()?;
        self.teardown(&mut inner)
    }

    /// Mute or unmute the beep
    ///
    /// Valid in every state. Timing is unaffected; only the output amplitude
    /// changes. The flag carries over to the next session.
    pub fn mute(&self, muted: bool) {
        // Flag and offline track change under one lock so concurrent callers
        // leave them agreeing
        let mut inner = self.peek_inner();
        let previous = self.muted.swap(muted, Ordering::SeqCst);
        if previous == muted {
            return;
        }

        if let Some(swap) = inner
            .session
            .as_mut()
            .and_then(|session| session.track_swap.as_mut())
        {
            if swap.rerender(muted) {
                tracing::debug!("[Transport] Replaced an offline track that was never played");
            }
        }
        drop(inner);

        tracing::info!("[Transport] Mute {}", if muted { "on" } else { "off" });
        self.telemetry
            .publish(TelemetryEventKind::MuteChanged { muted }, None);
    }

    /// Validate BPM and device rate and resolve the beep; touches no state
    fn plan_session(&self, bpm: f64, beep: Option<&Path>) -> Result<SessionPlan, AudioError> {
        validate_bpm(bpm)?;

        let sample_rate = self.backend.sample_rate()?;
        if sample_rate == 0 {
            return Err(AudioError::SampleRateInvalid { sample_rate: 0.0 });
        }

        let resolved = WaveformSource::resolve(beep, &self.config.tone, sample_rate);
        let clock = BeatClock::new(bpm, sample_rate as f64, resolved.waveform.len())?;

        Ok(SessionPlan {
            clock,
            waveform: Arc::new(resolved.waveform),
            fallback_reason: resolved.fallback_reason,
        })
    }

    fn open_session(&self, plan: SessionPlan) -> Result<Session, AudioError> {
        let SessionPlan {
            clock,
            waveform,
            fallback_reason,
        } = plan;
        if let Some(reason) = fallback_reason {
            self.telemetry
                .publish(TelemetryEventKind::FallbackTone, Some(reason.to_string()));
        }

        // The previous session's render path is gone, so the counter is ours
        self.frames_rendered.store(0, Ordering::Relaxed);

        let render = &self.config.render;
        let active = Arc::new(AtomicBool::new(true));
        let (emitter, receiver) = beat_channel(self.config.events.ring_capacity);

        let mut session = Session {
            clock,
            strategy: render.strategy,
            active: Arc::clone(&active),
            notifier: None,
            scheduler: None,
            track_swap: None,
            underruns: None,
            _waveform: Arc::clone(&waveform),
        };

        let source: Box<dyn FrameSource> = match render.strategy {
            RenderStrategy::Streaming => Box::new(StreamRenderer::new(
                Arc::clone(&waveform),
                clock,
                Arc::clone(&self.muted),
                Arc::clone(&self.frames_rendered),
                emitter,
            )),
            RenderStrategy::Offline => {
                let (playback, swap) = offline_playback(
                    Arc::clone(&waveform),
                    clock,
                    render.offline_beats,
                    self.muted.load(Ordering::SeqCst),
                    Arc::clone(&self.frames_rendered),
                    emitter,
                );
                session.track_swap = Some(swap);
                Box::new(playback)
            }
            RenderStrategy::Lookahead => {
                let (scheduler, playback) = lookahead_session(
                    Arc::clone(&waveform),
                    clock,
                    render.lookahead_secs,
                    Arc::clone(&self.muted),
                    Arc::clone(&self.frames_rendered),
                    emitter,
                );
                session.underruns = Some(playback.underrun_counter());
                session.scheduler = Some(spawn_scheduler(
                    scheduler,
                    Arc::clone(&self.frames_rendered),
                    Arc::clone(&active),
                    Duration::from_millis(render.scheduler_tick_ms.max(1)),
                )?);
                Box::new(playback)
            }
        };

        let notifier = spawn_notifier(
            receiver,
            self.beat_tx.clone(),
            Arc::clone(&active),
            Duration::from_millis(self.config.events.poll_interval_ms.max(1)),
            self.telemetry.clone(),
        );
        match notifier {
            Ok(handle) => session.notifier = Some(handle),
            Err(err) => {
                session.halt();
                return Err(err.into());
            }
        }

        if let Err(err) = self.backend.start(source) {
            session.halt();
            return Err(err);
        }

        Ok(session)
    }

    /// Tear down the running session, if any
    ///
    /// The active flag is cleared before the backend stops so helper threads
    /// stop forwarding immediately; they are joined after the backend has
    /// released the render path.
    fn teardown(&self, inner: &mut TransportInner) -> Result<(), AudioError> {
        let Some(mut session) = inner.session.take() else {
            return Ok(());
        };

        session.active.store(false, Ordering::Release);
        let result = self.backend.stop();
        session.halt();

        if let Some(underruns) = &session.underruns {
            let count = underruns.load(Ordering::Relaxed);
            if count > 0 {
                tracing::warn!("[Transport] Lookahead ring underran for {} frames", count);
            }
        }

        inner.state = TransportState::Stopped;
        tracing::info!(
            "[Transport] Stopped after {} frames",
            self.frames_rendered.load(Ordering::Relaxed)
        );
        self.telemetry.publish(TelemetryEventKind::EngineStopped, None);
        result
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn state(&self) -> TransportState {
        self.peek_inner().state
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Frames output by the current (or most recent) session
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// Clock of the running session
    pub fn clock(&self) -> Option<BeatClock> {
        self.peek_inner().session.as_ref().map(|session| session.clock)
    }

    /// Unrounded beat period of the running session, in samples
    pub fn beat_period_samples(&self) -> Option<f64> {
        self.clock().map(|clock| clock.beat_period_samples())
    }

    pub fn subscribe_beats(&self) -> broadcast::Receiver<BeatEvent> {
        self.beat_tx.subscribe()
    }

    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.telemetry.subscribe()
    }
}

impl Drop for TransportController {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Err(err) = self.teardown(&mut inner) {
                log_audio_error(&err, "drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn controller() -> (TransportController, Arc<StubBackend>) {
        TransportController::with_stub(44100, AppConfig::default())
    }

    #[test]
    fn test_initial_state() {
        let (transport, stub) = controller();
        assert_eq!(transport.state(), TransportState::Idle);
        assert!(!transport.is_muted());
        assert_eq!(transport.beat_period_samples(), None);
        assert!(!stub.is_running());
    }

    #[test]
    fn test_start_stop_transitions() {
        let (transport, stub) = controller();

        transport.start(120.0, None).unwrap();
        assert_eq!(transport.state(), TransportState::Playing);
        assert_eq!(transport.beat_period_samples(), Some(22050.0));
        assert!(stub.is_running());

        transport.stop().unwrap();
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.beat_period_samples(), None);
        assert!(!stub.is_running());

        transport.start(90.0, None).unwrap();
        assert_eq!(transport.state(), TransportState::Playing);
        assert_eq!(transport.beat_period_samples(), Some(29400.0));
    }

    #[test]
    fn test_invalid_bpm_changes_nothing() {
        let (transport, _stub) = controller();
        for bpm in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                transport.start(bpm, None),
                Err(AudioError::BpmInvalid { .. })
            ));
            assert_eq!(transport.state(), TransportState::Idle);
        }

        transport.start(100.0, None).unwrap();
        assert!(transport.start(0.0, None).is_err());
        assert_eq!(transport.state(), TransportState::Playing);
        assert_eq!(transport.clock().map(|c| c.bpm()), Some(100.0));

        // Positive but so small the beat period overflows
        assert!(matches!(
            transport.start(1e-310, None),
            Err(AudioError::BpmInvalid { .. })
        ));
        assert_eq!(transport.state(), TransportState::Playing);
        assert_eq!(transport.clock().map(|c| c.bpm()), Some(100.0));
    }

    #[test]
    fn test_stop_and_mute_when_idle_are_noops() {
        let (transport, _stub) = controller();
        transport.stop().unwrap();
        transport.stop().unwrap();
        assert_eq!(transport.state(), TransportState::Idle);

        transport.mute(true);
        transport.mute(true);
        assert!(transport.is_muted());
        assert_eq!(transport.state(), TransportState::Idle);
    }

    #[test]
    fn test_mute_persists_into_next_session() {
        let (transport, stub) = controller();
        transport.mute(true);
        transport.start(120.0, None).unwrap();

        let out = stub.pull(4410, 1);
        assert!(out.iter().all(|&x| x == 0.0));
        assert_eq!(transport.frames_rendered(), 4410);
    }

    #[test]
    fn test_zero_sample_rate_is_rejected() {
        let (transport, _stub) = TransportController::with_stub(0, AppConfig::default());
        assert!(matches!(
            transport.start(120.0, None),
            Err(AudioError::SampleRateInvalid { .. })
        ));
        assert_eq!(transport.state(), TransportState::Idle);
    }

    #[test]
    fn test_failing_backend_leaves_no_session() {
        let backend: Arc<dyn AudioBackend> = Arc::new(StubBackend::failing(44100));
        let transport = TransportController::new(backend, AppConfig::default());
        assert!(matches!(
            transport.start(120.0, None),
            Err(AudioError::StreamOpenFailed { .. })
        ));
        assert_eq!(transport.state(), TransportState::Idle);
        assert_eq!(transport.clock(), None);
    }

    #[test]
    fn test_telemetry_reports_lifecycle() {
        let (transport, _stub) = controller();
        let mut telemetry = transport.subscribe_telemetry();

        transport
            .start(120.0, Some(PathBuf::from("/missing/beep.wav").as_path()))
            .unwrap();
        transport.mute(true);
        transport.stop().unwrap();

        let kinds: Vec<TelemetryEventKind> = std::iter::from_fn(|| telemetry.try_recv().ok())
            .map(|event| event.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TelemetryEventKind::FallbackTone,
                TelemetryEventKind::EngineStarted {
                    bpm: 120.0,
                    sample_rate: 44100
                },
                TelemetryEventKind::MuteChanged { muted: true },
                TelemetryEventKind::EngineStopped,
            ]
        );
    }
}
