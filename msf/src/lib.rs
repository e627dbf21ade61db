//! Reads Multi-Stream Files (MSF). MSF is the container format used by Microsoft
//! Program Database (PDB) files.
//!
//! An MSF file contains a set of numbered _streams_. Each stream is a sequence of bytes,
//! like a file. The bytes of a stream are usually not stored contiguously on disk; the
//! file is divided into fixed-size _pages_ and each stream is described by an ordered
//! list of page numbers. Managing that mapping is the main purpose of the MSF format.
//!
//! The page lists themselves live in the _stream directory_ (stream 0), and the
//! directory is reached from the file header through a page map: the header names a
//! single page, that page holds the directory's page list, and those pages hold the
//! directory bytes.
//!
//! This crate is read-only. It knows nothing about the data structures stored *within*
//! streams; the `sympdb` crate builds the PDB-level decoders on top of it.
//!
//! # References
//! * <https://llvm.org/docs/PDB/MsfFile.html>
//! * <https://github.com/microsoft/microsoft-pdb>

#![forbid(unused_must_use)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::needless_lifetimes)]

mod error;
mod open;
mod pages;
mod read;
mod stream_reader;


pub use error::MsfError;
pub use stream_reader::StreamReader;

use std::fs::File;
use std::mem::size_of;
use std::path::Path;
use sync_file::{RandomAccessFile, ReadAt};
use zerocopy::byteorder::{LE, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use self::pages::{num_pages_for_stream_size, StreamPageMapper};

/// Identifies a page number within the MSF file.
type Page = u32;

/// The magic that identifies v7 ("big") MSF files. This includes the `\x1aDS\0\0\0`
/// tag bytes that follow the printable signature.
const MSF_BIG_MAGIC: [u8; 32] = *b"Microsoft C/C++ MSF 7.00\r\n\x1a\x44\x53\x00\x00\x00";

/// The magic that identifies MSF files before the transition to the v7 format,
/// including the `\x1aJG\0\0` tag bytes.
const MSF_SMALL_MAGIC: [u8; 0x2c] = *b"Microsoft C/C++ program database 2.00\r\n\x1a\x4a\x47\0\0";

/// The header of a v7 MSF file. This is at file offset 0.
#[derive(Clone, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct BigMsfHeader {
    /// Identifies this file as an MSF file. Value must be [`MSF_BIG_MAGIC`].
    magic: [u8; 32],

    /// The size of each page, in bytes. Must be a positive multiple of 4;
    /// 0x400, 0x800, and 0x1000 are the values seen in practice.
    page_size: U32<LE>,

    /// Page number of the free page map. The free page map is allocator state;
    /// readers carry the value but never interpret it.
    free_page_map: U32<LE>,

    /// The number of pages in this MSF file.
    num_pages: U32<LE>,

    /// Size of the stream directory, in bytes.
    stream_dir_size: U32<LE>,

    reserved: U32<LE>,

    /// The page which contains the stream directory's page map: an array of page
    /// numbers which, in order, contain the stream directory bytes.
    stream_dir_map_page: U32<LE>,
}

/// The length of the v7 MSF file header.
const BIG_MSF_HEADER_LEN: usize = size_of::<BigMsfHeader>();
static_assertions::const_assert_eq!(BIG_MSF_HEADER_LEN, 56);

/// The header of an MSF file before the transition to the v7 format.
///
/// Only the page size is decoded; this crate recognizes the old format but does not
/// read its stream directory.
#[derive(Clone, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct SmallMsfHeader {
    /// Identifies this file as an old-format MSF. Value must be [`MSF_SMALL_MAGIC`].
    magic: [u8; 0x2c],
    page_size: U32<LE>,
}

static_assertions::const_assert_eq!(size_of::<SmallMsfHeader>(), 0x30);

/// This size marks a stream as "not present". A nil stream is different from a
/// stream with a length of zero bytes; a nil slot cannot be opened at all.
pub const NIL_STREAM_SIZE: u32 = 0xffff_ffff;

/// The stream index of the stream directory itself.
pub const STREAM_DIR_STREAM: u32 = 0;

/// Converts a page number to a file offset.
fn page_to_offset(page: Page, page_size: u32) -> u64 {
    u64::from(page) * u64::from(page_size)
}

/// Divides, rounding up.
fn div_round_up(value: u32, divisor: u32) -> u32 {
    ((u64::from(value) + u64::from(divisor) - 1) / u64::from(divisor)) as u32
}

/// Allows reading the streams of a PDB/MSF file.
///
/// The [`Msf::open`] function opens an MSF file for read access, given a path. Use
/// [`Msf::open_with_file`] to open any byte source that implements [`ReadAt`].
pub struct Msf<F = RandomAccessFile> {
    /// The data source.
    file: F,

    kind: MsfKind,

    /// Bytes per page. A positive multiple of 4.
    page_size: u32,

    /// The number of pages in the file, from the header.
    num_pages: u32,

    /// The page number of the free page map. Opaque to readers.
    free_page_map: Page,

    /// Contains the sizes of all streams. The length of `stream_sizes` implicitly
    /// defines the number of streams.
    ///
    /// Values in this vector may be [`NIL_STREAM_SIZE`], indicating that the slot is
    /// present but holds no stream.
    stream_sizes: Vec<u32>,

    /// Contains the page numbers for all streams, concatenated in stream order.
    stream_pages: Vec<Page>,

    /// Offsets into `stream_pages` where the pages for a given stream start. Has one
    /// extra entry at the end, so `stream_page_starts[i]..stream_page_starts[i + 1]`
    /// is always a valid range.
    stream_page_starts: Vec<u32>,
}

/// Specifies the version of an MSF file.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MsfKind {
    /// The obsolete v2 encoding. Only the header is recognized.
    Small,
    /// The v7 ("big") encoding.
    Big,
}

impl<F> Msf<F> {
    /// Returns the page size used for this file, in bytes.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// The number of pages in this file, according to the header.
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// The encoding of this file.
    pub fn kind(&self) -> MsfKind {
        self.kind
    }

    /// The page number of the free page map. The value is carried for diagnostic
    /// purposes only; readers never interpret the map.
    pub fn free_page_map(&self) -> Page {
        self.free_page_map
    }

    /// The total number of streams in this file, including nil slots.
    pub fn num_streams(&self) -> u32 {
        self.stream_sizes.len() as u32
    }

    /// Gets the size of a given stream, in bytes, and its page list.
    ///
    /// Fails with [`MsfError::NoSuchStream`] if `stream` is out of range or names a
    /// nil slot.
    pub fn stream_size_and_pages(&self, stream: u32) -> Result<(u32, &[Page]), MsfError> {
        let Some(&stream_size) = self.stream_sizes.get(stream as usize) else {
            return Err(MsfError::NoSuchStream(stream));
        };

        if stream_size == NIL_STREAM_SIZE {
            return Err(MsfError::NoSuchStream(stream));
        }

        let start = self.stream_page_starts[stream as usize] as usize;
        let end = self.stream_page_starts[stream as usize + 1] as usize;
        Ok((stream_size, &self.stream_pages[start..end]))
    }

    /// Gets the size of a given stream, in bytes.
    ///
    /// Returns 0 for nil slots and for out-of-range stream indexes.
    pub fn stream_size(&self, stream: u32) -> u32 {
        match self.stream_sizes.get(stream as usize) {
            Some(&NIL_STREAM_SIZE) | None => 0,
            Some(&size) => size,
        }
    }

    /// Indicates that a stream index is in range and does not name a nil slot.
    pub fn is_stream_valid(&self, stream: u32) -> bool {
        match self.stream_sizes.get(stream as usize) {
            Some(&size) => size != NIL_STREAM_SIZE,
            None => false,
        }
    }

    /// Return the nominal length of this file, in bytes.
    ///
    /// This is the number of pages multiplied by the page size. The opener verifies
    /// that the on-disk size rounds up to exactly this many pages.
    pub fn nominal_size(&self) -> u64 {
        page_to_offset(self.num_pages, self.page_size)
    }

    /// Extracts the underlying file for this MSF.
    pub fn into_file(self) -> F {
        self.file
    }

    /// Gets access to the contained file.
    pub fn file(&self) -> &F {
        &self.file
    }
}

impl<F: ReadAt> Msf<F> {
    /// Returns a cursor over the contents of a given stream. The returned object
    /// implements the [`std::io::Read`], [`std::io::Seek`], and [`ReadAt`] traits, as
    /// well as the bounds-checked [`StreamReader::seek_to`] and
    /// [`StreamReader::read_exact`] operations.
    pub fn get_stream_reader(&self, stream: u32) -> Result<StreamReader<'_, F>, MsfError> {
        let (stream_size, stream_pages) = self.stream_size_and_pages(stream)?;
        Ok(StreamReader::new(self, stream_size, stream_pages))
    }

    /// Reads a portion of a stream to a vector.
    pub fn read_stream_section_to_vec(
        &self,
        stream: u32,
        start: u32,
        size: u32,
    ) -> Result<Vec<u8>, MsfError> {
        let mut reader = self.get_stream_reader(stream)?;
        let mut buffer: Vec<u8> = vec![0; size as usize];
        reader.seek_to(u64::from(start))?;
        reader.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Reads an entire stream to a vector.
    pub fn read_stream_to_vec(&self, stream: u32) -> Result<Vec<u8>, MsfError> {
        let mut reader = self.get_stream_reader(stream)?;
        let mut stream_data: Vec<u8> = vec![0; reader.len() as usize];
        reader.read_exact(&mut stream_data)?;
        Ok(stream_data)
    }
}

/// Checks whether the header of a file appears to be a valid MSF file.
///
/// This only looks at the signature; it does not validate anything else. It is useful
/// for quickly determining whether a file could be an MSF file.
pub fn is_file_header_msf(header: &[u8]) -> bool {
    header.starts_with(&MSF_BIG_MAGIC) || header.starts_with(&MSF_SMALL_MAGIC)
}
