//! Lookahead strategy - background beat scheduling
//!
//! A scheduler thread keeps a rolling window of rendered audio queued ahead of
//! the device. Work is done in whole beat slots `[onset(k), onset(k+1))`, and
//! `next_unscheduled_beat` is the only scheduling state: every beat is queued
//! exactly once and consecutive slots touch, so nothing is duplicated and no
//! gap is left.
//!
//! The scheduler always renders unmuted audio. Muting is applied by the
//! playback side as samples leave the ring, so a mute toggle takes effect at
//! the next device block instead of after the queued horizon.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rtrb::{Consumer, Producer, RingBuffer};

use super::clock::BeatClock;
use super::render::{detect_beat, BeatEmitter, FrameGenerator};
use super::waveform::Waveform;
use super::FrameSource;

/// Producer side: renders beat slots into the sample ring
pub struct LookaheadScheduler {
    generator: FrameGenerator,
    producer: Producer<f32>,
    next_unscheduled_beat: u64,
    horizon_samples: u64,
}

impl LookaheadScheduler {
    /// First beat that has not been queued yet
    pub fn next_unscheduled_beat(&self) -> u64 {
        self.next_unscheduled_beat
    }

    /// Samples queued since the session started
    pub fn scheduled_samples(&self) -> u64 {
        self.generator.cursor().absolute_sample_index
    }

    pub fn horizon_samples(&self) -> u64 {
        self.horizon_samples
    }

    /// Queue whole beats until the horizon is covered
    ///
    /// `played` is the number of samples the device has consumed. A beat is
    /// scheduled while its onset lies before `played + horizon` and its slot
    /// fits in the ring. Returns the number of beats queued.
    pub fn top_up(&mut self, played: u64) -> u64 {
        let clock = *self.generator.clock();
        let target = played.saturating_add(self.horizon_samples);
        let mut queued = 0;

        loop {
            let onset = clock.beat_onset_sample(self.next_unscheduled_beat);
            if onset >= target {
                break;
            }
            let end = clock.beat_onset_sample(self.next_unscheduled_beat + 1);
            let slot = (end - onset) as usize;
            if self.producer.slots() < slot {
                break;
            }

            for _ in 0..slot {
                let (sample, _) = self.generator.next_frame(false);
                // Capacity was checked above
                let _ = self.producer.push(sample);
            }
            self.next_unscheduled_beat += 1;
            queued += 1;
        }

        queued
    }
}

/// Consumer side: plays queued samples on the audio thread
pub struct LookaheadPlayback {
    consumer: Consumer<f32>,
    clock: BeatClock,
    read_index: u64,
    last_emitted_beat: i64,
    muted: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicU64>,
    underruns: Arc<AtomicU64>,
    emitter: BeatEmitter,
}

impl LookaheadPlayback {
    pub fn read_index(&self) -> u64 {
        self.read_index
    }

    /// Frames output as silence because the ring ran dry
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Shared handle to the underrun counter, readable after the playback
    /// has been handed to a backend
    pub fn underrun_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.underruns)
    }
}

impl FrameSource for LookaheadPlayback {
    fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let muted = self.muted.load(Ordering::Relaxed);
        let mut frames = out.chunks_exact_mut(channels);

        for frame in &mut frames {
            let sample = match self.consumer.pop() {
                Ok(sample) => {
                    let n = self.read_index;
                    if let Some(event) = detect_beat(&self.clock, &mut self.last_emitted_beat, n) {
                        self.emitter.emit(event);
                    }
                    self.read_index += 1;
                    if muted {
                        0.0
                    } else {
                        sample
                    }
                }
                Err(_) => {
                    // Underrun: silence, timeline does not advance
                    self.underruns.fetch_add(1, Ordering::Relaxed);
                    0.0
                }
            };
            frame.fill(sample);
        }
        frames.into_remainder().fill(0.0);

        self.frames_rendered
            .store(self.read_index, Ordering::Relaxed);
    }
}

/// Build both halves of a lookahead session and queue the first horizon
///
/// The ring holds the horizon plus two beat slots, so a slot starting just
/// before the horizon always fits once the device has caught up.
pub fn lookahead_session(
    waveform: Arc<Waveform>,
    clock: BeatClock,
    lookahead_secs: f32,
    muted: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicU64>,
    emitter: BeatEmitter,
) -> (LookaheadScheduler, LookaheadPlayback) {
    let horizon_samples = ((lookahead_secs.max(0.0) as f64) * clock.sample_rate())
        .ceil()
        .max(1.0) as u64;
    let capacity = horizon_samples as usize + 2 * clock.beat_period_samples().ceil() as usize + 1;
    let (producer, consumer) = RingBuffer::new(capacity);

    let mut scheduler = LookaheadScheduler {
        generator: FrameGenerator::new(waveform, clock),
        producer,
        next_unscheduled_beat: 0,
        horizon_samples,
    };
    let primed = scheduler.top_up(0);

    tracing::debug!(
        "[Lookahead] Horizon {} samples, ring {} samples, primed {} beats",
        horizon_samples,
        capacity,
        primed
    );

    let playback = LookaheadPlayback {
        consumer,
        clock,
        read_index: 0,
        last_emitted_beat: -1,
        muted,
        frames_rendered,
        underruns: Arc::new(AtomicU64::new(0)),
        emitter,
    };
    (scheduler, playback)
}

/// Run the scheduler on its own thread until `running` is cleared
///
/// Every `tick` the scheduler reads how far the device has played and tops up
/// the ring.
pub fn spawn_scheduler(
    mut scheduler: LookaheadScheduler,
    frames_rendered: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    tick: Duration,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("beep-lookahead".to_string())
        .spawn(move || {
            tracing::debug!("[Lookahead] Scheduler thread started");
            while running.load(Ordering::Acquire) {
                scheduler.top_up(frames_rendered.load(Ordering::Relaxed));
                thread::sleep(tick);
            }
            tracing::debug!(
                "[Lookahead] Scheduler thread exiting after {} beats",
                scheduler.next_unscheduled_beat()
            );
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::offline::render_offline;
    use crate::audio::render::{beat_channel, BeatReceiver};
    use crate::config::ToneConfig;

    struct Session {
        scheduler: LookaheadScheduler,
        playback: LookaheadPlayback,
        muted: Arc<AtomicBool>,
        frames: Arc<AtomicU64>,
        rx: BeatReceiver,
        waveform: Arc<Waveform>,
        clock: BeatClock,
    }

    fn session(bpm: f64, lookahead_secs: f32) -> Session {
        let waveform = Arc::new(Waveform::synthesize(&ToneConfig::click(), 44100));
        let clock = BeatClock::new(bpm, 44100.0, waveform.len()).unwrap();
        let muted = Arc::new(AtomicBool::new(false));
        let frames = Arc::new(AtomicU64::new(0));
        let (emitter, rx) = beat_channel(256);
        let (scheduler, playback) = lookahead_session(
            Arc::clone(&waveform),
            clock,
            lookahead_secs,
            Arc::clone(&muted),
            Arc::clone(&frames),
            emitter,
        );
        Session {
            scheduler,
            playback,
            muted,
            frames,
            rx,
            waveform,
            clock,
        }
    }

    #[test]
    fn test_primes_whole_beats_up_to_horizon() {
        // 0.5 s at 120 BPM covers exactly one beat
        let s = session(120.0, 0.5);
        assert_eq!(s.scheduler.horizon_samples(), 22050);
        assert_eq!(s.scheduler.next_unscheduled_beat(), 1);
        assert_eq!(s.scheduler.scheduled_samples(), 22050);

        let s = session(120.0, 0.6);
        assert_eq!(s.scheduler.next_unscheduled_beat(), 2);
        assert_eq!(s.scheduler.scheduled_samples(), 44100);
    }

    #[test]
    fn test_top_up_without_progress_schedules_nothing() {
        let mut s = session(120.0, 1.0);
        let before = s.scheduler.next_unscheduled_beat();
        assert_eq!(s.scheduler.top_up(0), 0);
        assert_eq!(s.scheduler.top_up(0), 0);
        assert_eq!(s.scheduler.next_unscheduled_beat(), before);
    }

    #[test]
    fn test_played_audio_matches_offline_render() {
        let mut s = session(133.0, 0.4);
        let beats = 12;
        let reference = render_offline(&s.waveform, s.clock, beats, false);

        let mut played = Vec::with_capacity(reference.len());
        let mut block = vec![0.0; 512];
        while played.len() < reference.len() {
            s.playback.render(&mut block, 1);
            played.extend_from_slice(&block);
            s.scheduler.top_up(s.frames.load(Ordering::Relaxed));
        }

        assert_eq!(s.playback.underruns(), 0);
        assert_eq!(played[..reference.len()], reference[..]);

        let indices: Vec<u64> = std::iter::from_fn(|| s.rx.pop())
            .map(|e| e.beat_index)
            .collect();
        let expected: Vec<u64> = (0..indices.len() as u64).collect();
        assert!(indices.len() >= beats as usize);
        assert_eq!(indices, expected);
    }

    #[test]
    fn test_underrun_outputs_silence_without_advancing() {
        let mut s = session(120.0, 0.5);
        let mut block = vec![1.0; 22050 + 100];
        s.playback.render(&mut block, 1);

        assert_eq!(s.playback.read_index(), 22050);
        assert_eq!(s.playback.underruns(), 100);
        assert!(block[22050..].iter().all(|&x| x == 0.0));
        assert_eq!(s.frames.load(Ordering::Relaxed), 22050);

        // Catching up resumes exactly at beat 1
        s.scheduler.top_up(s.frames.load(Ordering::Relaxed));
        let mut next = vec![0.0; 10];
        s.playback.render(&mut next, 1);
        assert_eq!(s.playback.read_index(), 22060);
        let reference = render_offline(&s.waveform, s.clock, 2, false);
        assert_eq!(next[..], reference[22050..22060]);

        let indices: Vec<u64> = std::iter::from_fn(|| s.rx.pop())
            .map(|e| e.beat_index)
            .collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_mute_applies_at_playback() {
        let mut s = session(120.0, 1.0);
        let reference = render_offline(&s.waveform, s.clock, 1, false);

        s.muted.store(true, Ordering::Relaxed);
        let mut block = vec![0.0; 2000];
        s.playback.render(&mut block, 2);
        assert!(block.iter().all(|&x| x == 0.0));

        // Unmuting resumes mid-beep, in phase with the timeline
        s.muted.store(false, Ordering::Relaxed);
        s.playback.render(&mut block, 2);
        assert_eq!(s.playback.read_index(), 2000);
        for (frame, expected) in block.chunks_exact(2).zip(&reference[1000..2000]) {
            assert_eq!(frame, [*expected, *expected]);
        }
        assert!(block.iter().any(|&x| x != 0.0));
    }

    #[test]
    fn test_scheduler_thread_stops_when_cleared() {
        let s = session(120.0, 0.5);
        let running = Arc::new(AtomicBool::new(true));
        let handle = spawn_scheduler(
            s.scheduler,
            Arc::clone(&s.frames),
            Arc::clone(&running),
            Duration::from_millis(1),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(10));
        running.store(false, Ordering::Release);
        handle.join().unwrap();
    }
}
