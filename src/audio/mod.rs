// Audio module - waveform assets, beat arithmetic and the render strategies

pub mod clock;
pub mod lookahead;
pub mod offline;
pub mod render;
pub mod waveform;

// Re-export commonly used types for convenience
pub use clock::{samples_per_beat, BeatClock};
pub use lookahead::{lookahead_session, LookaheadPlayback, LookaheadScheduler};
pub use offline::{offline_playback, render_offline, OfflinePlayback, OfflineTrackSwap};
pub use render::{
    beat_channel, BeatEmitter, BeatEvent, BeatReceiver, FrameGenerator, PlaybackCursor,
    StreamRenderer,
};
pub use waveform::{ResolvedWaveform, Waveform, WaveformOrigin, WaveformSource};

/// Anything that can fill a device block
///
/// Implemented by every render strategy and called from the audio callback, so
/// implementations must not block, allocate or log.
///
/// `out` is interleaved: `out.len() / channels` frames of `channels` samples.
/// Trailing samples that do not form a whole frame are zeroed.
pub trait FrameSource: Send {
    fn render(&mut self, out: &mut [f32], channels: usize);
}
