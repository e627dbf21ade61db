//! Page arithmetic: mapping byte ranges within a stream to byte ranges in the file.

use super::*;

/// Given the size of a stream in bytes, returns the number of pages needed to store it.
///
/// This function correctly handles the case where the stream size is
/// [`NIL_STREAM_SIZE`]. In this case, it returns 0.
pub(crate) fn num_pages_for_stream_size(stream_size: u32, page_size: u32) -> u32 {
    if stream_size == NIL_STREAM_SIZE {
        0
    } else {
        div_round_up(stream_size, page_size)
    }
}

/// Maps ranges of bytes within a stream to contiguous ranges of bytes in the
/// containing MSF file.
pub(crate) struct StreamPageMapper<'a> {
    pages: &'a [Page],
    page_size: u32,
    stream_size: u32,
}

impl<'a> StreamPageMapper<'a> {
    pub(crate) fn new(pages: &'a [Page], page_size: u32, stream_size: u32) -> Self {
        assert_eq!(
            num_pages_for_stream_size(stream_size, page_size) as usize,
            pages.len()
        );

        Self {
            pages,
            page_size,
            stream_size,
        }
    }

    /// Maps a byte offset and a length within a stream to a contiguous run of bytes
    /// within the MSF file.
    ///
    /// Repeated calls to this function (with increasing values of `pos`) can be used
    /// to read the contents of a stream using the smallest number of read calls to
    /// the underlying file: physically consecutive pages are coalesced into a single
    /// transfer.
    ///
    /// Returns `(file_offset, transfer_len)`. If this returns `None` then no bytes
    /// can be mapped; this occurs when `pos >= stream_size` or `bytes_wanted` is 0.
    ///
    /// Invariants: if `Some`, then `0 < transfer_len <= bytes_wanted`.
    pub(crate) fn map(&self, pos: u32, bytes_wanted: u32) -> Option<(u64, u32)> {
        if self.stream_size == NIL_STREAM_SIZE || pos >= self.stream_size {
            return None;
        }

        let bytes_available = self.stream_size - pos;
        let max_transfer_size = bytes_available.min(bytes_wanted);
        if max_transfer_size == 0 {
            return None;
        }

        let first_page_index = pos / self.page_size;
        let offset_within_page = pos % self.page_size;
        let first_page = self.pages[first_page_index as usize];
        let file_offset = page_to_offset(first_page, self.page_size) + u64::from(offset_within_page);

        // Start with the bytes remaining in the first page, then extend the transfer
        // across as many physically consecutive pages as the request covers.
        let mut transfer_size = (self.page_size - offset_within_page).min(max_transfer_size);
        let mut last_page = first_page;
        let mut next_index = first_page_index as usize + 1;

        while transfer_size < max_transfer_size {
            let next_page = self.pages[next_index];
            if next_page != last_page + 1 {
                break;
            }
            transfer_size = (transfer_size + self.page_size).min(max_transfer_size);
            last_page = next_page;
            next_index += 1;
        }

        Some((file_offset, transfer_size))
    }
}

#[test]
fn test_page_mapper_nil() {
    let mapper = StreamPageMapper::new(&[], 0x1000, NIL_STREAM_SIZE);
    assert_eq!(mapper.map(0, 0), None);
    assert_eq!(mapper.map(0x1000, 0x1000), None);
}

#[test]
fn test_page_mapper_basic() {
    let mapper = StreamPageMapper::new(&[5, 6, 7, 300, 301], 0x1000, 0x4abc);

    assert_eq!(mapper.map(0, 0), None, "empty read within stream boundary");

    assert_eq!(
        mapper.map(0x1000_0000, 0x1000),
        None,
        "outside stream boundary"
    );

    assert_eq!(
        mapper.map(0, 0x10),
        Some((0x5000, 0x10)),
        "aligned start, within first page"
    );

    assert_eq!(
        mapper.map(0, 0x1000),
        Some((0x5000, 0x1000)),
        "aligned start, exactly one page"
    );

    assert_eq!(
        mapper.map(0, 0x1eee),
        Some((0x5000, 0x1eee)),
        "crosses a page boundary into a consecutive page"
    );

    assert_eq!(
        mapper.map(0, 0x3eee),
        Some((0x5000, 0x3000)),
        "clipped where the page run stops being consecutive"
    );

    assert_eq!(
        mapper.map(0, 0x1000_0000),
        Some((0x5000, 0x3000)),
        "request beyond stream size, max contiguous span"
    );

    assert_eq!(
        mapper.map(0xccc, 0x10),
        Some((0x5ccc, 0x10)),
        "unaligned start, ends within first page"
    );

    assert_eq!(
        mapper.map(0xccc, 0x1000_0000),
        Some((0x5ccc, 0x2334)),
        "unaligned start, clipped at the non-consecutive page"
    );

    assert_eq!(
        mapper.map(0x3000, 0x1000_0000),
        Some((300 * 0x1000, 0x1abc)),
        "tail pages are consecutive and the final page is partial"
    );
}

#[test]
fn test_page_mapper_odd_page_size() {
    // Page sizes only have to be a positive multiple of 4.
    let mapper = StreamPageMapper::new(&[2, 3, 9], 12, 30);

    assert_eq!(mapper.map(0, 30), Some((24, 24)), "two consecutive pages");
    assert_eq!(mapper.map(24, 30), Some((108, 6)), "partial final page");
    assert_eq!(mapper.map(25, 2), Some((109, 2)), "unaligned start");
    assert_eq!(mapper.map(30, 1), None, "at end");
}
