//! Tertulia AVI - container reader with A/V synchronization.
//!
//! Opens a `RIFF/AVI ` file, walks the `hdrl` headers, and produces one
//! bridge-compatible [`Port`](tertulia_bridge::Port) per supported stream:
//! PCM16, A-law, and µ-law audio (companded payloads are decoded to PCM16 on
//! the fly), plus MJPEG, H.264, several YUV/RGB layouts, and the common
//! MPEG-4 FourCC family for video.
//!
//! Sibling streams share an [`AvSync`] synchronizer that equalizes their
//! presentation time: drift corrections are biased onto the video timeline
//! (silence frames to slow down, chunk skips to speed up), audio only ever
//! skips forward on gross drift. At end of file each stream raises EOF once
//! — through the shared event channel and the optional per-stream callback —
//! and, when looping is enabled, the set rewinds together once every sibling
//! has drained.
//!
//! ```rust,ignore
//! use tertulia_avi::{AviOptions, AviReader};
//!
//! let reader = AviReader::open("clip.avi", AviOptions::default())?;
//! let (streams, events) = reader.into_parts();
//! for stream in streams {
//!     // audio streams attach straight to the bridge
//! }
//! ```

mod reader;
pub mod riff;
pub mod sync;

pub use reader::{
    AudioCodec, AviEvent, AviOptions, AviReader, AviStream, MAX_STREAMS, VideoCodec,
};
pub use sync::{AvSync, MediaId};

/// Error types for AVI parsing and reading.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a readable AVI container.
    #[error("invalid media: {0}")]
    InvalidMediaType(&'static str),

    /// The container uses a feature this reader does not handle.
    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// The end of the movi section was reached.
    #[error("end of file")]
    EndOfFile,
}

/// Convenience result type for AVI operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for tertulia_bridge::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::EndOfFile => tertulia_bridge::Error::EndOfFile,
            Error::NotSupported(what) => tertulia_bridge::Error::NotSupported(what),
            Error::InvalidMediaType(_) => tertulia_bridge::Error::InvalidMediaType,
            Error::Io(err) => tertulia_bridge::Error::Internal(err.to_string()),
        }
    }
}
