// Waveform error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Waveform error code constants
///
/// Error code range: 2001-2004
pub struct WaveformErrorCodes {}

impl WaveformErrorCodes {
    /// Beep asset does not exist
    pub const NOT_FOUND: i32 = 2001;

    /// Beep asset could not be read
    pub const IO: i32 = 2002;

    /// Beep asset uses a container or sample format that cannot be decoded
    pub const UNSUPPORTED_FORMAT: i32 = 2003;

    /// Beep asset decoded to zero samples
    pub const EMPTY_DECODE: i32 = 2004;
}

/// Log a waveform error with structured context
///
/// Waveform errors are never fatal (the engine substitutes the fallback
/// tone), so callers log and continue.
pub fn log_waveform_error(err: &WaveformError, context: &str) {
    error!(
        "Waveform error in {}: code={}, component=WaveformSource, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while loading a beep asset
#[derive(Debug, Clone, PartialEq)]
pub enum WaveformError {
    /// Asset path does not exist
    NotFound { path: String },

    /// Reading the asset failed
    Io { details: String },

    /// Header or sample format could not be decoded
    UnsupportedFormat { reason: String },

    /// Asset decoded successfully but contains no samples
    EmptyDecode { path: String },
}

impl ErrorCode for WaveformError {
    fn code(&self) -> i32 {
        match self {
            WaveformError::NotFound { .. } => WaveformErrorCodes::NOT_FOUND,
            WaveformError::Io { .. } => WaveformErrorCodes::IO,
            WaveformError::UnsupportedFormat { .. } => WaveformErrorCodes::UNSUPPORTED_FORMAT,
            WaveformError::EmptyDecode { .. } => WaveformErrorCodes::EMPTY_DECODE,
        }
    }

    fn message(&self) -> String {
        match self {
            WaveformError::NotFound { path } => format!("Beep asset not found: {}", path),
            WaveformError::Io { details } => format!("Failed to read beep asset: {}", details),
            WaveformError::UnsupportedFormat { reason } => {
                format!("Unsupported beep asset format: {}", reason)
            }
            WaveformError::EmptyDecode { path } => {
                format!("Beep asset decoded to zero samples: {}", path)
            }
        }
    }
}

impl fmt::Display for WaveformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WaveformError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for WaveformError {}

impl From<std::io::Error> for WaveformError {
    fn from(err: std::io::Error) -> Self {
        WaveformError::Io {
            details: err.to_string(),
        }
    }
}

impl From<hound::Error> for WaveformError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => WaveformError::Io {
                details: io.to_string(),
            },
            other => WaveformError::UnsupportedFormat {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_error_codes() {
        assert_eq!(
            WaveformError::NotFound {
                path: "a.wav".to_string()
            }
            .code(),
            2001
        );
        assert_eq!(
            WaveformError::Io {
                details: "denied".to_string()
            }
            .code(),
            2002
        );
        assert_eq!(
            WaveformError::UnsupportedFormat {
                reason: "bad header".to_string()
            }
            .code(),
            2003
        );
        assert_eq!(
            WaveformError::EmptyDecode {
                path: "a.wav".to_string()
            }
            .code(),
            2004
        );
    }

    #[test]
    fn test_waveform_error_messages() {
        let err = WaveformError::NotFound {
            path: "/tmp/missing.wav".to_string(),
        };
        assert!(err.message().contains("/tmp/missing.wav"));

        let err = WaveformError::EmptyDecode {
            path: "empty.pcm".to_string(),
        };
        assert!(err.message().contains("zero samples"));
    }

    #[test]
    fn test_hound_error_conversion() {
        let err: WaveformError = hound::Error::FormatError("no RIFF tag found").into();
        match err {
            WaveformError::UnsupportedFormat { reason } => {
                assert!(!reason.is_empty());
            }
            other => panic!("Expected UnsupportedFormat, got {:?}", other),
        }

        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated");
        let err: WaveformError = hound::Error::IoError(io).into();
        assert!(matches!(err, WaveformError::Io { .. }));
    }
}
