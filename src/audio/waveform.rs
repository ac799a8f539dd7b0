//! Waveform - beep asset decoding and fallback tone synthesis
//!
//! A [`Waveform`] is an immutable mono buffer of normalized `f32` samples plus
//! its sample rate. It is built once per transport session, shared with the
//! render path behind an `Arc`, and dropped on stop.
//!
//! Beep assets are either RIFF/WAVE files (decoded with `hound`) or headerless
//! little-endian 16-bit PCM. Any failure to produce samples from an asset is
//! non-fatal: [`WaveformSource::resolve`] logs it and substitutes a
//! deterministic sine tone.

use std::f64::consts::TAU;
use std::fs;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};

use crate::config::ToneConfig;
use crate::error::{log_waveform_error, WaveformError};

/// Upper bound on the length of a resampled beep
const MAX_RESAMPLED_SECS: usize = 10;

/// Where the samples of a waveform came from
#[derive(Debug, Clone, PartialEq)]
pub enum WaveformOrigin {
    /// Decoded from a beep asset on disk
    Asset(PathBuf),
    /// Generated sine tone
    Synthesized { frequency_hz: f32 },
}

/// Immutable mono sample buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
    origin: WaveformOrigin,
}

impl Waveform {
    /// Wrap already-decoded samples, clamping them into [-1.0, 1.0]
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, origin: WaveformOrigin) -> Self {
        let samples = samples.into_iter().map(|s| s.clamp(-1.0, 1.0)).collect();
        Self {
            samples,
            sample_rate,
            origin,
        }
    }

    /// Decode a beep asset
    ///
    /// # Arguments
    /// * `path` - WAV file, or headerless 16-bit little-endian mono PCM
    /// * `raw_sample_rate` - Sample rate assumed for headerless PCM
    ///
    /// # Errors
    /// `NotFound`/`Io` when the file cannot be read, `UnsupportedFormat` when
    /// a WAV header cannot be decoded, `EmptyDecode` when no samples remain.
    pub fn load(path: &Path, raw_sample_rate: u32) -> Result<Self, WaveformError> {
        let bytes = fs::read(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => WaveformError::NotFound {
                path: path.display().to_string(),
            },
            _ => WaveformError::from(err),
        })?;

        let (samples, sample_rate) = if bytes.starts_with(b"RIFF") {
            decode_wav(&bytes)?
        } else {
            (decode_pcm16_le(&bytes), raw_sample_rate)
        };

        if samples.is_empty() {
            return Err(WaveformError::EmptyDecode {
                path: path.display().to_string(),
            });
        }

        Ok(Self::from_samples(
            samples,
            sample_rate,
            WaveformOrigin::Asset(path.to_path_buf()),
        ))
    }

    /// Generate the fallback sine tone
    ///
    /// `samples[i] = sin(2π·f·i / sample_rate) · amplitude`, with
    /// `round(duration · sample_rate)` samples (never fewer than one).
    /// Identical inputs always produce identical output.
    pub fn synthesize(tone: &ToneConfig, sample_rate: u32) -> Self {
        let rate = sample_rate as f64;
        let len = ((tone.duration_ms as f64 / 1000.0) * rate).round().max(1.0) as usize;
        let freq = tone.frequency_hz as f64;
        let amplitude = tone.amplitude as f64;

        let samples = (0..len)
            .map(|i| ((TAU * freq * i as f64 / rate).sin() * amplitude) as f32)
            .collect();

        Self::from_samples(
            samples,
            sample_rate,
            WaveformOrigin::Synthesized {
                frequency_hz: tone.frequency_hz,
            },
        )
    }

    /// Linearly resample to `target_rate`
    ///
    /// The beep window is measured in device samples, so assets recorded at
    /// another rate are converted before the session starts. The result is
    /// capped at `MAX_RESAMPLED_SECS` of audio. A waveform without a usable
    /// source rate is returned unchanged.
    pub fn resampled(self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate
            || self.samples.is_empty()
            || target_rate == 0
            || self.sample_rate == 0
        {
            return self;
        }

        let ratio = target_rate as f64 / self.sample_rate as f64;
        let max_len = target_rate as usize * MAX_RESAMPLED_SECS;
        let out_len = ((self.samples.len() as f64 * ratio).round() as usize).clamp(1, max_len);
        let last = self.samples.len() - 1;

        let samples = (0..out_len)
            .map(|i| {
                let src_pos = i as f64 / ratio;
                let idx = src_pos.floor() as usize;
                if idx >= last {
                    self.samples[last]
                } else {
                    let frac = (src_pos - idx as f64) as f32;
                    self.samples[idx] * (1.0 - frac) + self.samples[idx + 1] * frac
                }
            })
            .collect();

        Self {
            samples,
            sample_rate: target_rate,
            origin: self.origin,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of samples (the beep window length)
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn origin(&self) -> &WaveformOrigin {
        &self.origin
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self.origin, WaveformOrigin::Synthesized { .. })
    }
}

fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32), WaveformError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(WaveformError::UnsupportedFormat {
            reason: "WAV header declares a sample rate of 0 Hz".to_string(),
        });
    }
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|x| x as f32 / max))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    // Downmix to mono by averaging each frame
    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

fn decode_pcm16_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Waveform resolved for a session, with the reason a fallback was used
#[derive(Debug, Clone)]
pub struct ResolvedWaveform {
    pub waveform: Waveform,
    /// `Some` when an asset was requested but the fallback tone was substituted
    pub fallback_reason: Option<WaveformError>,
}

/// Builds the session waveform from an optional beep asset
pub struct WaveformSource;

impl WaveformSource {
    /// Resolve the beep for a session at the device sample rate
    ///
    /// * `None` or an empty path: synthesize directly, no load attempted.
    /// * Load failure: logged, fallback tone synthesized.
    /// * Success: the asset, resampled to `device_rate`.
    pub fn resolve(asset: Option<&Path>, tone: &ToneConfig, device_rate: u32) -> ResolvedWaveform {
        let path = match asset {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => {
                tracing::debug!("[WaveformSource] No beep asset requested, synthesizing tone");
                return ResolvedWaveform {
                    waveform: Waveform::synthesize(tone, device_rate),
                    fallback_reason: None,
                };
            }
        };

        match Waveform::load(path, device_rate) {
            Ok(waveform) => {
                tracing::info!(
                    "[WaveformSource] Loaded beep asset {:?}: {} samples @ {} Hz",
                    path,
                    waveform.len(),
                    waveform.sample_rate()
                );
                ResolvedWaveform {
                    waveform: waveform.resampled(device_rate),
                    fallback_reason: None,
                }
            }
            Err(err) => {
                log_waveform_error(&err, "resolve");
                tracing::warn!(
                    "[WaveformSource] Falling back to {} Hz synthesized tone",
                    tone.frequency_hz
                );
                ResolvedWaveform {
                    waveform: Waveform::synthesize(tone, device_rate),
                    fallback_reason: Some(err),
                }
            }
        }
    }
}
