// Beep Player Core - Rust Metronome Engine
// Sample-accurate beep scheduling with lock-free render strategies

// Module declarations
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;

// Re-exports for convenience
pub use audio::{BeatEvent, FrameSource};
pub use config::{AppConfig, RenderStrategy};
pub use engine::{TransportController, TransportState};
pub use error::{AudioError, ErrorCode, WaveformError};
