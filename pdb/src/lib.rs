//! Reads Microsoft Program Database (PDB) files.
//!
//! A PDB file is an MSF container (see the `sympdb-msf` crate) whose streams hold
//! debug information. This crate adds the PDB-level decoding on top of the
//! container: well-known stream indices and the Type Information (TPI) stream,
//! including enumeration of type records and name-based lookup through the type
//! hash stream.
//!
//! ```ignore
//! let pdb = sympdb::Pdb::open(Path::new("app.pdb"))?;
//! let types = pdb.read_type_stream()?;
//! types.for_each_type(|index, record| {
//!     println!("{index:?}: {:?}", record.kind);
//!     true
//! })?;
//! ```
//!
//! # References
//! * <https://llvm.org/docs/PDB/index.html>
//! * <https://github.com/microsoft/microsoft-pdb>

#![forbid(unused_must_use)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::needless_lifetimes)]

mod error;
pub mod parser;
mod stream_index;
pub mod tpi;
pub mod types;

pub use bstr::BStr;
pub use error::PdbError;
pub use stream_index::{Stream, StreamIndexU16, NIL_STREAM_INDEX};
pub use sympdb_msf as msf;
pub use sync_file::{RandomAccessFile, ReadAt};

use msf::Msf;
use std::fs::File;
use std::path::Path;

#[cfg(test)]
#[static_init::dynamic]
static INIT_LOGGER: () = {
    let _ = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .compact()
        .without_time()
        .try_init();
};

/// Allows reading the contents of a PDB file.
///
/// This type provides read-only access. It dereferences to the underlying
/// [`Msf`] container, so the stream-level operations (`num_streams`,
/// `get_stream_reader`, `read_stream_to_vec`, ...) are available directly on
/// `Pdb`.
pub struct Pdb<F = RandomAccessFile> {
    msf: Msf<F>,
}

impl Pdb<RandomAccessFile> {
    /// Opens a PDB file.
    pub fn open(file_name: &Path) -> Result<Self, PdbError> {
        Ok(Self {
            msf: Msf::open(file_name)?,
        })
    }

    /// Opens a PDB, given a [`File`] that has already been opened.
    pub fn open_from_file(file: File) -> Result<Self, PdbError> {
        Self::open_with_file(RandomAccessFile::from(file))
    }
}

impl<F: ReadAt> Pdb<F> {
    /// Opens a PDB, given a byte source that has already been opened.
    ///
    /// This reads the MSF file header and the stream directory, so the returned
    /// object knows how to find each of the streams.
    pub fn open_with_file(file: F) -> Result<Self, PdbError> {
        Ok(Self {
            msf: Msf::open_with_file(file)?,
        })
    }

    /// Gets access to the underlying MSF container.
    pub fn container(&self) -> &Msf<F> {
        &self.msf
    }

    /// Consumes this `Pdb` and returns the underlying MSF container.
    pub fn into_container(self) -> Msf<F> {
        self.msf
    }
}

impl<F> std::ops::Deref for Pdb<F> {
    type Target = Msf<F>;

    fn deref(&self) -> &Self::Target {
        &self.msf
    }
}
