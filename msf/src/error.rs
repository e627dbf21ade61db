//! Error type for MSF reading.

use std::fmt::{self, Display};

/// Errors produced while opening an MSF file or reading its streams.
///
/// Malformed input never panics; every malformed input maps to one of these
/// variants. I/O errors from the byte source are surfaced unchanged in
/// [`MsfError::Io`]. Nothing in this crate retries.
#[derive(Debug)]
pub enum MsfError {
    /// The byte source refused a read.
    Io(std::io::Error),

    /// Neither the v2 nor the v7 signature matched.
    BadSignature,

    /// A short read at a required point: the file ended inside the header, the
    /// directory, or a stream that the directory says should be longer.
    Truncated,

    /// The header disagrees with the file: the page count does not match the file
    /// size, a page number points outside the file, or the page size is not a
    /// positive multiple of 4.
    InconsistentSize,

    /// The requested stream index is out of range or names a nil slot.
    NoSuchStream(u32),

    /// A seek or read reached past a stream's declared size.
    OutOfBounds {
        /// The stream offset at which the operation would have ended.
        end: u64,
        /// The declared size of the stream.
        stream_size: u32,
    },
}

impl From<std::io::Error> for MsfError {
    fn from(e: std::io::Error) -> Self {
        MsfError::Io(e)
    }
}

impl Display for MsfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MsfError::Io(e) => write!(f, "i/o error: {e}"),
            MsfError::BadSignature => f.write_str("file does not have an MSF signature"),
            MsfError::Truncated => f.write_str("file ended before a required field"),
            MsfError::InconsistentSize => {
                f.write_str("MSF header is inconsistent with the file contents")
            }
            MsfError::NoSuchStream(stream) => {
                write!(f, "stream {stream} does not exist")
            }
            MsfError::OutOfBounds { end, stream_size } => write!(
                f,
                "offset {end} is beyond the end of the stream (size {stream_size})"
            ),
        }
    }
}

impl std::error::Error for MsfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MsfError::Io(e) => Some(e),
            _ => None,
        }
    }
}
