//! Audio file formats for octavo.
//!
//! Decodes WAV files into clip sample data and encodes rendered frames as
//! 16-bit stereo WAV.

mod wav_format;

pub use wav_format::{decode_wav, frames_to_wav, write_wav};

/// Error type for format parsing.
#[derive(Debug)]
pub enum FormatError {
    /// Invalid file header or magic bytes
    InvalidHeader,
    /// Unexpected end of file
    UnexpectedEof,
    /// Sample format or bit depth not handled
    Unsupported(String),
    /// I/O error
    Io(String),
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatError::InvalidHeader => write!(f, "Invalid file header"),
            FormatError::UnexpectedEof => write!(f, "Unexpected end of file"),
            FormatError::Unsupported(what) => write!(f, "Unsupported format: {}", what),
            FormatError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for FormatError {}

impl From<hound::Error> for FormatError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                FormatError::UnexpectedEof
            }
            hound::Error::IoError(io) => FormatError::Io(io.to_string()),
            hound::Error::FormatError(_) => FormatError::InvalidHeader,
            hound::Error::UnfinishedSample => FormatError::UnexpectedEof,
            other => FormatError::Unsupported(other.to_string()),
        }
    }
}

impl From<std::io::Error> for FormatError {
    fn from(e: std::io::Error) -> Self {
        FormatError::Io(e.to_string())
    }
}
