//! Error type for PDB reading.

use crate::parser::ParserError;
use std::fmt::{self, Display};
use sympdb_msf::MsfError;

/// Errors produced while decoding the PDB-level data structures.
///
/// Container-level failures are carried unchanged in [`PdbError::Msf`]. Malformed
/// input never panics; every malformed input maps to one of these variants.
#[derive(Debug)]
pub enum PdbError {
    /// The MSF container layer failed.
    Msf(MsfError),

    /// The type stream's version is not one this decoder understands.
    UnsupportedVersion(u32),

    /// The type stream contradicts itself: the header self-check failed, a record
    /// overruns the payload, a pad byte is invalid, or a numeric encoding is unknown.
    ///
    /// The carried string is a fixed description for display; match on the variant,
    /// not the text.
    CorruptTypeStream(&'static str),

    /// A name lookup exhausted its candidates.
    NotFound,
}

impl From<MsfError> for PdbError {
    fn from(e: MsfError) -> Self {
        PdbError::Msf(e)
    }
}

impl From<ParserError> for PdbError {
    fn from(_: ParserError) -> Self {
        PdbError::CorruptTypeStream("malformed type record")
    }
}

impl Display for PdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdbError::Msf(e) => Display::fmt(e, f),
            PdbError::UnsupportedVersion(version) => {
                write!(f, "type stream version {version} is not supported")
            }
            PdbError::CorruptTypeStream(what) => {
                write!(f, "type stream is corrupt: {what}")
            }
            PdbError::NotFound => f.write_str("no type record with that name"),
        }
    }
}

impl std::error::Error for PdbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PdbError::Msf(e) => Some(e),
            _ => None,
        }
    }
}
