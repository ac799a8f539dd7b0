// Error types for the beep player engine
//
// This module defines custom error types for audio engine and waveform
// operations, providing structured error handling with stable numeric codes
// that a host bridge can forward unchanged.

mod audio;
mod waveform;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use waveform::{log_waveform_error, WaveformError, WaveformErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the host boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_trait_objects() {
        let audio_err: &dyn ErrorCode = &AudioError::BpmInvalid { bpm: 0.0 };
        assert_eq!(audio_err.code(), AudioErrorCodes::BPM_INVALID);

        let waveform_err: &dyn ErrorCode = &WaveformError::EmptyDecode {
            path: "beep.wav".to_string(),
        };
        assert_eq!(waveform_err.code(), WaveformErrorCodes::EMPTY_DECODE);
    }

    #[test]
    fn test_error_propagation() {
        fn may_fail() -> Result<(), AudioError> {
            Err(AudioError::SampleRateInvalid { sample_rate: 0.0 })
        }

        fn caller() -> Result<(), AudioError> {
            may_fail()?;
            Ok(())
        }

        assert!(caller().is_err());
    }
}
