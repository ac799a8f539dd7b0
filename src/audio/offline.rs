//! Offline strategy - pre-rendered metronome track
//!
//! Renders a fixed number of beats into one buffer up front. Playback reads the
//! buffer once and then outputs silence. Because the buffer is shared with the
//! real-time thread, it is never mutated in place: a mute toggle re-renders a
//! fresh buffer on the control path and posts it to a single-slot mailbox.
//! The old buffer travels back through a retire ring so it is freed on the
//! control path, never inside the audio callback.
//!
//! Buffer flow:
//! 1. Control path renders a new buffer and posts it to the MAILBOX, dropping
//!    any buffer the audio thread has not picked up yet
//! 2. Audio thread takes it at the next block (`try_lock`, never blocks) and
//!    keeps its read position
//! 3. Audio thread pushes the replaced buffer to RETIRE
//! 4. Control path drains RETIRE and drops the old buffers
//!
//! The mailbox holds only the newest buffer, so the track the audio thread
//! ends up playing always matches the last `rerender` call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};

use rtrb::{Consumer, Producer, RingBuffer};

use super::clock::BeatClock;
use super::render::{detect_beat, BeatEmitter, FrameGenerator};
use super::waveform::Waveform;
use super::FrameSource;

/// Replaced buffers the audio thread can hand back before the control path drains them
const RETIRE_CAPACITY: usize = 8;

/// Shared, immutable pre-rendered track
pub type TrackBuffer = Arc<Vec<f32>>;

/// Newest re-rendered track not yet picked up by the audio thread
type TrackMailbox = Arc<Mutex<Option<TrackBuffer>>>;

/// Render `beats` whole beats into a single mono buffer
///
/// The buffer ends exactly at the onset of beat `beats`, and every sample is
/// identical to what the streaming strategy produces for the same input.
pub fn render_offline(waveform: &Arc<Waveform>, clock: BeatClock, beats: u32, muted: bool) -> Vec<f32> {
    let total = clock.beat_onset_sample(beats as u64) as usize;
    let mut generator = FrameGenerator::new(Arc::clone(waveform), clock);
    (0..total).map(|_| generator.next_frame(muted).0).collect()
}

/// Control-path handle for replacing the track of a running offline playback
pub struct OfflineTrackSwap {
    waveform: Arc<Waveform>,
    clock: BeatClock,
    beats: u32,
    mailbox: TrackMailbox,
    retired_rx: Consumer<TrackBuffer>,
}

impl OfflineTrackSwap {
    /// Re-render the whole track from scratch and post it for the audio thread
    ///
    /// Returns `true` when an earlier track was still waiting in the mailbox
    /// and has been replaced without ever being played.
    pub fn rerender(&mut self, muted: bool) -> bool {
        self.collect_retired();
        let buffer = Arc::new(render_offline(&self.waveform, self.clock, self.beats, muted));
        let superseded = self
            .mailbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(buffer);
        superseded.is_some()
    }

    /// Drop buffers the audio thread has finished with
    pub fn collect_retired(&mut self) -> usize {
        let mut count = 0;
        while self.retired_rx.pop().is_ok() {
            count += 1;
        }
        count
    }
}

/// Audio-thread side: plays the current track buffer
pub struct OfflinePlayback {
    buffer: TrackBuffer,
    clock: BeatClock,
    read_index: u64,
    last_emitted_beat: i64,
    mailbox: TrackMailbox,
    retire_tx: Producer<TrackBuffer>,
    pending_retire: Option<TrackBuffer>,
    frames_rendered: Arc<AtomicU64>,
    emitter: BeatEmitter,
}

impl OfflinePlayback {
    pub fn read_index(&self) -> u64 {
        self.read_index
    }

    pub fn track_len(&self) -> usize {
        self.buffer.len()
    }

    /// Hand a replaced buffer back to the control path
    ///
    /// The controller drains the retire ring before every re-render and at
    /// most one swap happens per re-render, so it cannot fill up in practice;
    /// `pending_retire` covers the remaining window without freeing on the
    /// audio thread.
    fn retire(&mut self, old: TrackBuffer) {
        if let Some(pending) = self.pending_retire.take() {
            if let Err(rtrb::PushError::Full(pending)) = self.retire_tx.push(pending) {
                self.pending_retire = Some(pending);
            }
        }
        if let Err(rtrb::PushError::Full(old)) = self.retire_tx.push(old) {
            if self.pending_retire.is_none() {
                self.pending_retire = Some(old);
            }
        }
    }

    /// Pick up a posted track; a contended mailbox is retried next block
    fn apply_swap(&mut self) {
        let next = match self.mailbox.try_lock() {
            Ok(mut slot) => slot.take(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().take(),
            Err(TryLockError::WouldBlock) => None,
        };
        if let Some(next) = next {
            let old = std::mem::replace(&mut self.buffer, next);
            self.retire(old);
        }
    }
}

impl FrameSource for OfflinePlayback {
    fn render(&mut self, out: &mut [f32], channels: usize) {
        self.apply_swap();

        let channels = channels.max(1);
        let mut frames = out.chunks_exact_mut(channels);
        for frame in &mut frames {
            let n = self.read_index;
            let sample = match self.buffer.get(n as usize) {
                Some(&sample) => {
                    if let Some(event) = detect_beat(&self.clock, &mut self.last_emitted_beat, n) {
                        self.emitter.emit(event);
                    }
                    sample
                }
                None => 0.0,
            };
            frame.fill(sample);
            self.read_index += 1;
        }
        frames.into_remainder().fill(0.0);

        self.frames_rendered
            .store(self.read_index, Ordering::Relaxed);
    }
}

/// Render the initial track and build both halves of an offline session
pub fn offline_playback(
    waveform: Arc<Waveform>,
    clock: BeatClock,
    beats: u32,
    muted: bool,
    frames_rendered: Arc<AtomicU64>,
    emitter: BeatEmitter,
) -> (OfflinePlayback, OfflineTrackSwap) {
    let buffer = Arc::new(render_offline(&waveform, clock, beats, muted));
    let mailbox: TrackMailbox = Arc::new(Mutex::new(None));
    let (retire_tx, retired_rx) = RingBuffer::new(RETIRE_CAPACITY);

    tracing::debug!(
        "[Offline] Pre-rendered {} beats ({} samples, muted={})",
        beats,
        buffer.len(),
        muted
    );

    let playback = OfflinePlayback {
        buffer,
        clock,
        read_index: 0,
        last_emitted_beat: -1,
        mailbox: Arc::clone(&mailbox),
        retire_tx,
        pending_retire: None,
        frames_rendered,
        emitter,
    };
    let swap = OfflineTrackSwap {
        waveform,
        clock,
        beats,
        mailbox,
        retired_rx,
    };
    (playback, swap)
}
