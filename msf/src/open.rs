//! Code for opening MSF files.

use super::*;
use tracing::{trace_span, warn};

impl Msf<RandomAccessFile> {
    /// Opens an MSF file for read access, given a file name.
    pub fn open(file_name: &Path) -> Result<Self, MsfError> {
        let file = File::open(file_name)?;
        Self::open_with_file(RandomAccessFile::from(file))
    }
}

impl<F: ReadAt> Msf<F> {
    /// Opens an MSF file, given a byte source that has already been opened.
    ///
    /// This reads the MSF file header and the stream directory, so the returned
    /// object knows how to find each of the streams and the pages of the streams.
    pub fn open_with_file(file: F) -> Result<Self, MsfError> {
        let _span = trace_span!("Msf::open_with_file").entered();

        let mut header_bytes = [0u8; BIG_MSF_HEADER_LEN];
        let header_len = read_at_most(&file, &mut header_bytes, 0)?;

        if header_bytes[..header_len].starts_with(&MSF_BIG_MAGIC) {
            if header_len < BIG_MSF_HEADER_LEN {
                return Err(MsfError::Truncated);
            }
            // unwrap() cannot fail; header_bytes is exactly the size of BigMsfHeader.
            let header = BigMsfHeader::read_from_bytes(&header_bytes[..]).unwrap();
            Self::open_big(file, &header)
        } else if header_bytes[..header_len].starts_with(&MSF_SMALL_MAGIC) {
            if header_len < size_of::<SmallMsfHeader>() {
                return Err(MsfError::Truncated);
            }
            let (header, _) = SmallMsfHeader::ref_from_prefix(&header_bytes[..header_len]).unwrap();

            let page_size = header.page_size.get();
            if page_size == 0 || page_size % 4 != 0 {
                return Err(MsfError::InconsistentSize);
            }

            // Support for the old format stops at header recognition. The container
            // opens, but it exposes no streams.
            Ok(Self {
                file,
                kind: MsfKind::Small,
                page_size,
                num_pages: 0,
                free_page_map: 0,
                stream_sizes: Vec::new(),
                stream_pages: Vec::new(),
                stream_page_starts: vec![0],
            })
        } else if header_len < MSF_SMALL_MAGIC.len() {
            Err(MsfError::Truncated)
        } else {
            Err(MsfError::BadSignature)
        }
    }

    fn open_big(file: F, header: &BigMsfHeader) -> Result<Self, MsfError> {
        let page_size = header.page_size.get();
        if page_size == 0 || page_size % 4 != 0 {
            return Err(MsfError::InconsistentSize);
        }

        let num_pages = header.num_pages.get();
        check_file_size(&file, page_size, num_pages)?;

        let stream_dir_size = header.stream_dir_size.get();

        let (stream_sizes, stream_pages, stream_page_starts) = if stream_dir_size == 0 {
            // An empty directory is legal; the file contains no streams at all.
            (Vec::new(), Vec::new(), vec![0])
        } else {
            read_stream_directory(
                &file,
                page_size,
                num_pages,
                stream_dir_size,
                header.stream_dir_map_page.get(),
            )?
        };

        Ok(Self {
            file,
            kind: MsfKind::Big,
            page_size,
            num_pages,
            free_page_map: header.free_page_map.get(),
            stream_sizes,
            stream_pages,
            stream_page_starts,
        })
    }
}

/// Verifies that `ceil(file_bytes / page_size) == num_pages`.
///
/// The [`ReadAt`] seam has no length query, so the bound is checked with two 1-byte
/// probe reads: the last page must contain at least one byte, and the byte after the
/// last page must not exist.
fn check_file_size<F: ReadAt>(file: &F, page_size: u32, num_pages: u32) -> Result<(), MsfError> {
    let mut probe = [0u8; 1];
    let nominal_size = page_to_offset(num_pages, page_size);

    if num_pages > 0 {
        let last_page_start = nominal_size - u64::from(page_size);
        if file.read_at(&mut probe, last_page_start)? == 0 {
            return Err(MsfError::InconsistentSize);
        }
    }

    if file.read_at(&mut probe, nominal_size)? != 0 {
        return Err(MsfError::InconsistentSize);
    }

    Ok(())
}

/// Reads and decodes the stream directory of a v7 file.
///
/// The directory is reached through two levels of indirection: the header names
/// `map_page`, the contents of `map_page` are the directory's own page list, and
/// those pages, concatenated, are the directory bytes.
///
/// Returns `(stream_sizes, stream_pages, stream_page_starts)`.
fn read_stream_directory<F: ReadAt>(
    file: &F,
    page_size: u32,
    num_pages: u32,
    stream_dir_size: u32,
    map_page: Page,
) -> Result<(Vec<u32>, Vec<Page>, Vec<u32>), MsfError> {
    let _span = trace_span!("read_stream_directory").entered();

    if map_page >= num_pages {
        return Err(MsfError::InconsistentSize);
    }

    let dir_num_pages = div_round_up(stream_dir_size, page_size);

    // The directory's page list must fit within the single map page.
    if u64::from(dir_num_pages) * 4 > u64::from(page_size) {
        return Err(MsfError::InconsistentSize);
    }

    let mut map_bytes = vec![0u8; dir_num_pages as usize * 4];
    read_exact_or_truncated(file, &mut map_bytes, page_to_offset(map_page, page_size))?;
    // unwrap() cannot fail; map_bytes has a length that is a multiple of 4.
    let dir_pages = <[U32<LE>]>::ref_from_bytes(map_bytes.as_slice()).unwrap();

    // Read the directory contents. The final page may be partial.
    let mut dir_bytes = vec![0u8; stream_dir_size as usize];
    for (chunk, page) in dir_bytes.chunks_mut(page_size as usize).zip(dir_pages) {
        let page = page.get();
        if page >= num_pages {
            return Err(MsfError::InconsistentSize);
        }
        read_exact_or_truncated(file, chunk, page_to_offset(page, page_size))?;
    }

    parse_stream_directory(&dir_bytes, page_size, num_pages)
}

/// Decodes the directory bytes: `u32 stream_count`, then the stream sizes, then the
/// concatenated page lists.
///
/// The page count of each stream is derived from its *byte* size. A nil slot
/// ([`NIL_STREAM_SIZE`]) owns no pages.
fn parse_stream_directory(
    dir: &[u8],
    page_size: u32,
    num_pages: u32,
) -> Result<(Vec<u32>, Vec<Page>, Vec<u32>), MsfError> {
    let Ok((num_streams, rest)) = U32::<LE>::read_from_prefix(dir) else {
        return Err(MsfError::Truncated);
    };
    let num_streams = num_streams.get() as usize;

    let Ok((sizes, mut rest)) = <[U32<LE>]>::ref_from_prefix_with_elems(rest, num_streams) else {
        return Err(MsfError::Truncated);
    };

    let mut stream_sizes: Vec<u32> = Vec::with_capacity(num_streams);
    let mut stream_pages: Vec<Page> = Vec::new();
    let mut stream_page_starts: Vec<u32> = Vec::with_capacity(num_streams + 1);

    for size in sizes {
        stream_page_starts.push(stream_pages.len() as u32);
        let size = size.get();

        let num_stream_pages = num_pages_for_stream_size(size, page_size) as usize;
        let Ok((pages, r)) = <[U32<LE>]>::ref_from_prefix_with_elems(rest, num_stream_pages) else {
            return Err(MsfError::Truncated);
        };
        rest = r;

        for page in pages {
            let page = page.get();
            if page >= num_pages {
                return Err(MsfError::InconsistentSize);
            }
            stream_pages.push(page);
        }

        stream_sizes.push(size);
    }
    stream_page_starts.push(stream_pages.len() as u32);

    if !rest.is_empty() {
        warn!(
            unused_bytes = rest.len(),
            "stream directory contained unused bytes"
        );
    }

    Ok((stream_sizes, stream_pages, stream_page_starts))
}

/// Reads exactly `buf.len()` bytes at `offset`, mapping a short read to
/// [`MsfError::Truncated`].
fn read_exact_or_truncated<F: ReadAt>(
    file: &F,
    buf: &mut [u8],
    offset: u64,
) -> Result<(), MsfError> {
    match file.read_exact_at(buf, offset) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(MsfError::Truncated),
        Err(e) => Err(MsfError::Io(e)),
    }
}

/// Reads as many bytes as the source can provide at `offset`, up to `buf.len()`.
fn read_at_most<F: ReadAt>(file: &F, buf: &mut [u8], mut offset: u64) -> Result<usize, MsfError> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read_at(&mut buf[total..], offset)?;
        if n == 0 {
            break;
        }
        total += n;
        offset += n as u64;
    }
    Ok(total)
}
