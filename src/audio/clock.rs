//! BeatClock - sample-accurate beat arithmetic
//!
//! Every query is derived directly from an absolute sample counter against the
//! unrounded beat period (`sample_rate * 60 / bpm`). Nothing is accumulated
//! beat over beat, so fractional periods never drift: beat `k` always starts
//! within one sample of `k * period` no matter how long the session runs.
//!
//! All functions are pure, allocation-free and safe to call from the audio
//! callback.

use crate::error::AudioError;

/// Converts BPM (beats per minute) to samples per beat, unrounded.
///
/// Formula: samples_per_beat = (sample_rate × 60) / BPM
///
/// # Examples
/// ```
/// use beep_player::audio::clock::samples_per_beat;
/// assert_eq!(samples_per_beat(120.0, 44100.0), 22050.0);
/// ```
#[inline]
pub fn samples_per_beat(bpm: f64, sample_rate: f64) -> f64 {
    sample_rate * 60.0 / bpm
}

/// Immutable timing model of one transport session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatClock {
    bpm: f64,
    sample_rate: f64,
    beat_period: f64,
    beep_window: f64,
}

impl BeatClock {
    /// Create a clock for a session
    ///
    /// # Arguments
    /// * `bpm` - Tempo, finite and > 0
    /// * `sample_rate` - Device sample rate in Hz, finite and > 0
    /// * `beep_window_samples` - Audible part of each beat (the beep length)
    ///
    /// # Errors
    /// `BpmInvalid` or `SampleRateInvalid` for non-positive or non-finite input.
    pub fn new(bpm: f64, sample_rate: f64, beep_window_samples: usize) -> Result<Self, AudioError> {
        validate_bpm(bpm)?;
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(AudioError::SampleRateInvalid { sample_rate });
        }

        let beat_period = samples_per_beat(bpm, sample_rate);
        if !beat_period.is_finite() || beat_period <= 0.0 {
            return Err(AudioError::BpmInvalid { bpm });
        }

        Ok(Self {
            bpm,
            sample_rate,
            beat_period,
            beep_window: beep_window_samples as f64,
        })
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Beat period in samples (fractional, never rounded)
    pub fn beat_period_samples(&self) -> f64 {
        self.beat_period
    }

    pub fn beep_window_samples(&self) -> f64 {
        self.beep_window
    }

    /// Offset of `sample_index` from the start of its beat, in samples
    #[inline]
    pub fn position_in_beat(&self, sample_index: u64) -> f64 {
        (sample_index as f64) % self.beat_period
    }

    /// Whether `sample_index` falls inside the beep window of its beat
    ///
    /// A beep longer than the beat period is cut off by the next beat, since
    /// the position restarts from zero at every boundary.
    #[inline]
    pub fn is_beep_frame(&self, sample_index: u64) -> bool {
        self.position_in_beat(sample_index) < self.beep_window
    }

    /// Index of the beat containing `sample_index`
    ///
    /// Computed from the same remainder as [`position_in_beat`](Self::position_in_beat)
    /// so both always agree on which side of a boundary a sample lies.
    #[inline]
    pub fn beat_index(&self, sample_index: u64) -> u64 {
        let n = sample_index as f64;
        let start = n - n % self.beat_period;
        (start / self.beat_period).round() as u64
    }

    /// First sample belonging to beat `beat`
    pub fn beat_onset_sample(&self, beat: u64) -> u64 {
        let mut onset = (beat as f64 * self.beat_period).ceil() as u64;
        while self.beat_index(onset) < beat {
            onset += 1;
        }
        while onset > 0 && self.beat_index(onset - 1) >= beat {
            onset -= 1;
        }
        onset
    }
}

/// Reject non-finite or non-positive tempos
pub fn validate_bpm(bpm: f64) -> Result<(), AudioError> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(AudioError::BpmInvalid { bpm });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_per_beat_formula() {
        assert_eq!(samples_per_beat(120.0, 44100.0), 22050.0);
        assert_eq!(samples_per_beat(90.0, 44100.0), 29400.0);
        assert_eq!(samples_per_beat(60.0, 48000.0), 48000.0);
        assert_eq!(samples_per_beat(240.0, 48000.0), 12000.0);
        assert!((samples_per_beat(140.0, 48000.0) - 20571.428_571).abs() < 1e-3);
    }

    #[test]
    fn test_rejects_invalid_arguments() {
        assert_eq!(
            BeatClock::new(0.0, 44100.0, 100),
            Err(AudioError::BpmInvalid { bpm: 0.0 })
        );
        assert!(matches!(
            BeatClock::new(-60.0, 44100.0, 100),
            Err(AudioError::BpmInvalid { .. })
        ));
        assert!(matches!(
            BeatClock::new(f64::NAN, 44100.0, 100),
            Err(AudioError::BpmInvalid { .. })
        ));
        assert!(matches!(
            BeatClock::new(120.0, 0.0, 100),
            Err(AudioError::SampleRateInvalid { .. })
        ));
        assert!(matches!(
            BeatClock::new(120.0, f64::INFINITY, 100),
            Err(AudioError::SampleRateInvalid { .. })
        ));
    }

    #[test]
    fn test_120_bpm_at_44100() {
        let clock = BeatClock::new(120.0, 44100.0, 2205).unwrap();
        assert_eq!(clock.beat_period_samples(), 22050.0);
        assert_eq!(clock.beat_onset_sample(0), 0);
        assert_eq!(clock.beat_onset_sample(1), 22050);
        assert_eq!(clock.beat_onset_sample(10), 220500);

        assert_eq!(clock.beat_index(22049), 0);
        assert_eq!(clock.beat_index(22050), 1);
        assert_eq!(clock.beat_index(220500), 10);
    }

    #[test]
    fn test_90_bpm_is_integral() {
        let clock = BeatClock::new(90.0, 44100.0, 2205).unwrap();
        assert_eq!(clock.beat_period_samples(), 29400.0);
        for k in 0..100 {
            assert_eq!(clock.beat_onset_sample(k), k * 29400);
        }
    }

    #[test]
    fn test_beep_window() {
        let clock = BeatClock::new(120.0, 44100.0, 2205).unwrap();
        assert!(clock.is_beep_frame(0));
        assert!(clock.is_beep_frame(2204));
        assert!(!clock.is_beep_frame(2205));
        assert!(!clock.is_beep_frame(22049));
        assert!(clock.is_beep_frame(22050));
        assert!(clock.is_beep_frame(22050 + 2204));
        assert!(!clock.is_beep_frame(22050 + 2205));
    }

    #[test]
    fn test_beep_longer_than_period_is_truncated_by_boundary() {
        // 600 BPM at 1000 Hz: 100-sample beats, 250-sample beep
        let clock = BeatClock::new(600.0, 1000.0, 250).unwrap();
        assert!(clock.is_beep_frame(99));
        assert_eq!(clock.beat_index(99), 0);
        assert_eq!(clock.position_in_beat(100), 0.0);
        assert_eq!(clock.beat_index(100), 1);
    }

    #[test]
    fn test_no_drift_across_tempo_range() {
        for sample_rate in [44100.0, 48000.0] {
            for bpm in (20..=300).step_by(7) {
                let bpm = bpm as f64 + 0.37;
                let clock = BeatClock::new(bpm, sample_rate, 10).unwrap();
                let exact = sample_rate * 60.0 / bpm;
                for k in [1_u64, 2, 3, 10, 100, 1_000, 10_000, 100_000] {
                    let onset = clock.beat_onset_sample(k) as f64;
                    let ideal = (k as f64 * exact).round();
                    assert!(
                        (onset - ideal).abs() <= 1.0,
                        "beat {} at {} BPM / {} Hz: onset {} vs ideal {}",
                        k,
                        bpm,
                        sample_rate,
                        onset,
                        ideal
                    );
                }
            }
        }
    }

    #[test]
    fn test_onset_is_first_sample_of_beat() {
        let clock = BeatClock::new(137.0, 48000.0, 10).unwrap();
        for k in 1..500 {
            let onset = clock.beat_onset_sample(k);
            assert_eq!(clock.beat_index(onset), k);
            assert_eq!(clock.beat_index(onset - 1), k - 1);
            assert!(clock.position_in_beat(onset) < 1.0);
        }
    }

    #[test]
    fn test_beat_index_consistent_with_position() {
        let clock = BeatClock::new(133.0, 44100.0, 10).unwrap();
        let period = clock.beat_period_samples();
        for n in (0..2_000_000_u64).step_by(997) {
            let reconstructed = clock.beat_index(n) as f64 * period + clock.position_in_beat(n);
            assert!((reconstructed - n as f64).abs() < 1e-6);
        }
    }
}
