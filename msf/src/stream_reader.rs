//! A cursor over the contents of one stream.

use super::*;
use std::io::{Read, Seek, SeekFrom};

/// Allows reading a stream.
///
/// A `StreamReader` borrows its [`Msf`] container for the duration of its life; it
/// holds the stream's page list and a position, nothing more. Multiple readers over
/// the same container may be used at the same time, since all reads are positional.
///
/// The [`StreamReader::seek_to`] and [`StreamReader::read_exact`] methods are
/// bounds-checked against the stream's declared size and report
/// [`MsfError::OutOfBounds`]. The [`Read`], [`Seek`], and [`ReadAt`] trait
/// implementations have the usual `std::io` end-of-file behavior instead.
pub struct StreamReader<'a, F> {
    /// Size in bytes of the stream. This value is never [`NIL_STREAM_SIZE`]; nil
    /// slots cannot be opened.
    stream_size: u32,
    /// Page size of the MSF file.
    page_size: u32,
    /// Maps page indices within the stream to page indices within the MSF file.
    page_map: &'a [Page],
    /// Provides access to the MSF file contents.
    file: &'a F,
    /// The seek position of the stream reader.
    pos: u64,
}

impl<'a, F: ReadAt> StreamReader<'a, F> {
    pub(crate) fn new(msf: &'a Msf<F>, stream_size: u32, page_map: &'a [Page]) -> Self {
        Self {
            stream_size,
            page_size: msf.page_size,
            page_map,
            file: &msf.file,
            pos: 0,
        }
    }

    /// Size in bytes of the stream.
    pub fn len(&self) -> u32 {
        self.stream_size
    }

    /// Tests whether this stream is empty (zero-length).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current position of this reader within the stream.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Moves this reader to `offset`.
    ///
    /// Positions in `0..=len()` are legal; the end position is a legal place to
    /// stand, although any nonzero read from it fails. Fails with
    /// [`MsfError::OutOfBounds`] for positions beyond the end.
    pub fn seek_to(&mut self, offset: u64) -> Result<(), MsfError> {
        if offset > u64::from(self.stream_size) {
            return Err(MsfError::OutOfBounds {
                end: offset,
                stream_size: self.stream_size,
            });
        }
        self.pos = offset;
        Ok(())
    }

    /// Fills `buf` with the logical stream bytes at the current position and advances
    /// the position by exactly `buf.len()`.
    ///
    /// Fails with [`MsfError::OutOfBounds`], without reading anything, if the read
    /// would extend past the stream's declared size. Fails with
    /// [`MsfError::Truncated`] if the directory claims pages the file does not have.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), MsfError> {
        let end = self.pos + buf.len() as u64;
        if end > u64::from(self.stream_size) {
            return Err(MsfError::OutOfBounds {
                end,
                stream_size: self.stream_size,
            });
        }

        let (n, new_pos) = super::read::read_stream_core(
            self.file,
            self.page_size,
            self.stream_size,
            self.page_map,
            self.pos,
            buf,
        )
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                MsfError::Truncated
            } else {
                MsfError::Io(e)
            }
        })?;

        // The bounds check above makes a short transfer impossible for an in-bounds
        // read over a well-formed page table.
        if n != buf.len() {
            return Err(MsfError::Truncated);
        }

        self.pos = new_pos;
        Ok(())
    }
}

impl<'a, F: ReadAt> Seek for StreamReader<'a, F> {
    fn seek(&mut self, from: SeekFrom) -> std::io::Result<u64> {
        let new_pos: i64 = match from {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(signed_offset) => signed_offset + i64::from(self.stream_size),
            SeekFrom::Current(signed_offset) => self.pos as i64 + signed_offset,
        };

        if new_pos < 0 {
            return Err(std::io::ErrorKind::InvalidInput.into());
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

impl<'a, F: ReadAt> Read for StreamReader<'a, F> {
    fn read(&mut self, dst: &mut [u8]) -> std::io::Result<usize> {
        let (n, new_pos) = super::read::read_stream_core(
            self.file,
            self.page_size,
            self.stream_size,
            self.page_map,
            self.pos,
            dst,
        )?;

        self.pos = new_pos;
        Ok(n)
    }
}

impl<'a, F: ReadAt> ReadAt for StreamReader<'a, F> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        let (n, _new_pos) = super::read::read_stream_core(
            self.file,
            self.page_size,
            self.stream_size,
            self.page_map,
            offset,
            buf,
        )?;
        if n != buf.len() {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        }
        Ok(())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        let (n, _new_pos) = super::read::read_stream_core(
            self.file,
            self.page_size,
            self.stream_size,
            self.page_map,
            offset,
            buf,
        )?;
        Ok(n)
    }
}
