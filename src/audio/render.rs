//! Streaming render path - per-block metronome generation
//!
//! [`FrameGenerator`] is the single source of truth for what each output
//! sample is; the streaming, offline and lookahead strategies all pull from it
//! so they produce identical audio. [`StreamRenderer`] wraps the generator for
//! device callbacks.
//!
//! # Real-Time Safety
//! Everything reachable from [`StreamRenderer::render`] is:
//! - Lock-free (atomics and an `rtrb` SPSC ring only)
//! - Allocation-free (waveform and ring are pre-allocated)
//! - Bounded (constant work per frame)
//!
//! ```text
//! AudioBackend callback
//!   └─> StreamRenderer::render()            [real-time thread]
//!       ├─> MuteFlag.load()                  [every frame]
//!       ├─> FrameGenerator::next_frame()
//!       │     ├─> BeatClock::beat_index()    [edge detection]
//!       │     └─> BeatClock::is_beep_frame()
//!       └─> BeatEmitter::emit()              [SPSC ring → notifier thread]
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};
use serde::{Deserialize, Serialize};

use super::clock::BeatClock;
use super::waveform::Waveform;
use super::FrameSource;

/// Notification sent once per beat boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatEvent {
    /// Zero-based beat number within the session
    pub beat_index: u64,
    /// Absolute sample index of the first sample of the beat
    pub sample_index: u64,
}

/// Position of the render path within a session
///
/// Written only by the render path. `absolute_sample_index` never goes
/// backwards; a new cursor is created for every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackCursor {
    /// Samples produced since the session started
    pub absolute_sample_index: u64,
    /// Position inside the beep waveform
    pub beep_cursor: usize,
    /// Last beat reported, `-1` before the first sample
    pub last_emitted_beat: i64,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self {
            absolute_sample_index: 0,
            beep_cursor: 0,
            last_emitted_beat: -1,
        }
    }
}

impl Default for PlaybackCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Edge-detect a beat boundary at `sample_index`
///
/// Fires exactly once per beat regardless of how samples are split across
/// render calls, because the comparison is against the last emitted index
/// rather than against the block start.
#[inline]
pub fn detect_beat(
    clock: &BeatClock,
    last_emitted_beat: &mut i64,
    sample_index: u64,
) -> Option<BeatEvent> {
    let beat = clock.beat_index(sample_index);
    if beat as i64 != *last_emitted_beat {
        *last_emitted_beat = beat as i64;
        Some(BeatEvent {
            beat_index: beat,
            sample_index,
        })
    } else {
        None
    }
}

/// Sample-by-sample metronome signal
pub struct FrameGenerator {
    waveform: Arc<Waveform>,
    clock: BeatClock,
    cursor: PlaybackCursor,
}

impl FrameGenerator {
    pub fn new(waveform: Arc<Waveform>, clock: BeatClock) -> Self {
        Self {
            waveform,
            clock,
            cursor: PlaybackCursor::new(),
        }
    }

    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    pub fn clock(&self) -> &BeatClock {
        &self.clock
    }

    /// Produce the next sample and advance the cursor
    ///
    /// While muted the beep cursor still advances and zeros are written, so
    /// unmuting resumes in phase with where the beep would have been.
    #[inline]
    pub fn next_frame(&mut self, muted: bool) -> (f32, Option<BeatEvent>) {
        let n = self.cursor.absolute_sample_index;

        let beat = detect_beat(&self.clock, &mut self.cursor.last_emitted_beat, n);
        if beat.is_some() {
            // New beat, new beep window
            self.cursor.beep_cursor = 0;
        }

        let samples = self.waveform.samples();
        let sample = if !samples.is_empty() && self.clock.is_beep_frame(n) {
            let value = samples[self.cursor.beep_cursor];
            self.cursor.beep_cursor = (self.cursor.beep_cursor + 1) % samples.len();
            if muted {
                0.0
            } else {
                value
            }
        } else {
            0.0
        };

        self.cursor.absolute_sample_index += 1;
        (sample, beat)
    }
}

/// Producer half of the beat notification ring, owned by the render path
pub struct BeatEmitter {
    producer: Producer<BeatEvent>,
    dropped: Arc<AtomicU64>,
}

impl BeatEmitter {
    /// Push an event without blocking; a full ring counts a drop
    #[inline]
    pub fn emit(&mut self, event: BeatEvent) {
        if self.producer.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Consumer half of the beat notification ring
pub struct BeatReceiver {
    consumer: Consumer<BeatEvent>,
    dropped: Arc<AtomicU64>,
}

impl BeatReceiver {
    pub fn pop(&mut self) -> Option<BeatEvent> {
        self.consumer.pop().ok()
    }

    /// Events lost because the ring was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create the lock-free ring carrying beat events off the render path
pub fn beat_channel(capacity: usize) -> (BeatEmitter, BeatReceiver) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        BeatEmitter {
            producer,
            dropped: Arc::clone(&dropped),
        },
        BeatReceiver { consumer, dropped },
    )
}

/// Streaming strategy: renders every device block on demand
pub struct StreamRenderer {
    generator: FrameGenerator,
    muted: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicU64>,
    emitter: BeatEmitter,
}

impl StreamRenderer {
    pub fn new(
        waveform: Arc<Waveform>,
        clock: BeatClock,
        muted: Arc<AtomicBool>,
        frames_rendered: Arc<AtomicU64>,
        emitter: BeatEmitter,
    ) -> Self {
        Self {
            generator: FrameGenerator::new(waveform, clock),
            muted,
            frames_rendered,
            emitter,
        }
    }

    pub fn cursor(&self) -> &PlaybackCursor {
        self.generator.cursor()
    }
}

impl FrameSource for StreamRenderer {
    fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let mut frames = out.chunks_exact_mut(channels);

        for frame in &mut frames {
            let muted = self.muted.load(Ordering::Relaxed);
            let (sample, beat) = self.generator.next_frame(muted);
            if let Some(event) = beat {
                self.emitter.emit(event);
            }
            frame.fill(sample);
        }
        frames.into_remainder().fill(0.0);

        self.frames_rendered.store(
            self.generator.cursor().absolute_sample_index,
            Ordering::Relaxed,
        );
    }
}
