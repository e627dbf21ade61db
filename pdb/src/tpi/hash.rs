//! The type-name hash and the auxiliary type hash stream.
//!
//! The hash stream is a small header followed by three substreams, located by
//! `(offset, size)` pairs relative to the start of the stream:
//!
//! * Record buckets: one `u32` per type record, holding the bucket of the record's
//!   name (`hash(name) % bucket_count`). Name lookup scans this table instead of
//!   decoding every record.
//! * Index offsets: `(TypeIndex, payload offset)` pairs at intervals through the
//!   record payload, for seeking without walking from the start.
//! * Adjustments: carried opaquely; this reader exposes the bytes and interprets
//!   nothing.

use crate::error::PdbError;
use crate::types::TypeIndexLe;
use std::mem::size_of;
use std::ops::Range;
use zerocopy::byteorder::{LE, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Hashes a type name, ignoring ASCII case.
///
/// The name's NUL terminator participates in the hash: 0 to 3 trailing bytes
/// (including that NUL) are folded into a tail value, and the remaining prefix is
/// folded as little-endian `u32` words with a rotate between words. Masking each
/// byte with `0xDF` is what makes the hash case-insensitive.
///
/// The bucket of a name is `type_name_hash(name) % bucket_count`.
pub fn type_name_hash(name: &[u8]) -> u32 {
    // Index into the name as if the NUL terminator were present.
    let byte_at = |i: usize| -> u8 {
        if i < name.len() {
            name[i]
        } else {
            0
        }
    };

    let mut len = name.len() + 1;

    let mut tail: u32 = 0;
    while len & 3 != 0 {
        tail = (tail << 8) | u32::from(byte_at(len - 1) & 0xdf);
        len -= 1;
    }

    let mut sum: u32 = 0;
    let mut i = 0;
    while i < len {
        let word = u32::from_le_bytes([
            byte_at(i),
            byte_at(i + 1),
            byte_at(i + 2),
            byte_at(i + 3),
        ]);
        sum = (sum ^ (word & 0xdfdf_dfdf)).rotate_left(4);
        i += 4;
    }

    sum ^ tail
}

/// An entry in the index-offset substream.
#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Debug)]
pub struct HashIndexPair {
    /// The type index at the start of this range.
    pub type_index: TypeIndexLe,
    /// The offset within the record payload (not the entire type stream) where this
    /// record begins.
    pub offset: U32<LE>,
}

/// The fixed header of the type hash stream.
#[derive(Clone, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Debug)]
#[repr(C)]
struct TypeHashHeader {
    /// Size in bytes of each hash key. Always 4.
    key_size: U32<LE>,
    /// The modulus applied to every hash value.
    bucket_count: U32<LE>,
    record_buckets: SubstreamLocation,
    index_offsets: SubstreamLocation,
    adjustments: SubstreamLocation,
}

/// Locates one substream within the hash stream.
#[derive(Clone, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Debug)]
#[repr(C)]
struct SubstreamLocation {
    offset: U32<LE>,
    size: U32<LE>,
}

static_assertions::const_assert_eq!(size_of::<TypeHashHeader>(), 32);

impl SubstreamLocation {
    /// Validates this location against the containing stream and returns it as a
    /// byte range.
    fn to_range(&self, stream_len: usize) -> Result<Range<usize>, PdbError> {
        let start = self.offset.get() as usize;
        let len = self.size.get() as usize;
        let Some(end) = start.checked_add(len) else {
            return Err(PdbError::CorruptTypeStream("hash substream range overflows"));
        };
        if end > stream_len {
            return Err(PdbError::CorruptTypeStream(
                "hash substream lies outside the hash stream",
            ));
        }
        Ok(start..end)
    }
}

/// The decoded type hash stream.
pub struct TypeHashStream<StreamData: AsRef<[u8]>> {
    stream_data: StreamData,
    bucket_count: u32,
    record_buckets: Range<usize>,
    index_offsets: Range<usize>,
    adjustments: Range<usize>,
}

impl<StreamData: AsRef<[u8]>> TypeHashStream<StreamData> {
    /// Parses and validates a type hash stream.
    ///
    /// `num_types` is the record count of the type stream this hash belongs to; the
    /// record-bucket substream must hold exactly one key per record.
    pub fn parse(stream_data: StreamData, num_types: u32) -> Result<Self, PdbError> {
        let stream_bytes: &[u8] = stream_data.as_ref();

        let Ok((header, _)) = TypeHashHeader::read_from_prefix(stream_bytes) else {
            return Err(PdbError::CorruptTypeStream("hash stream is shorter than its header"));
        };

        if header.key_size.get() != 4 {
            return Err(PdbError::CorruptTypeStream("hash key size is not 4"));
        }

        let bucket_count = header.bucket_count.get();
        if bucket_count == 0 {
            return Err(PdbError::CorruptTypeStream("hash bucket count is zero"));
        }

        let record_buckets = header.record_buckets.to_range(stream_bytes.len())?;
        if record_buckets.len() as u64 != u64::from(num_types) * 4 {
            return Err(PdbError::CorruptTypeStream(
                "hash stream does not hold one key per type record",
            ));
        }

        let index_offsets = header.index_offsets.to_range(stream_bytes.len())?;
        if index_offsets.len() % size_of::<HashIndexPair>() != 0 {
            return Err(PdbError::CorruptTypeStream(
                "index-offset substream is not a whole number of pairs",
            ));
        }

        let adjustments = header.adjustments.to_range(stream_bytes.len())?;

        Ok(Self {
            stream_data,
            bucket_count,
            record_buckets,
            index_offsets,
            adjustments,
        })
    }

    /// The modulus applied to every hash value.
    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    /// The bucket of each type record's name, in type index order.
    pub fn record_buckets(&self) -> &[U32<LE>] {
        let bytes = &self.stream_data.as_ref()[self.record_buckets.clone()];
        // unwrap() cannot fail; the range length was validated as a multiple of 4.
        <[U32<LE>]>::ref_from_bytes(bytes).unwrap()
    }

    /// The `(type index, payload offset)` pairs of the index-offset substream.
    pub fn index_offsets(&self) -> &[HashIndexPair] {
        let bytes = &self.stream_data.as_ref()[self.index_offsets.clone()];
        // unwrap() cannot fail; the range length was validated as a multiple of 8.
        <[HashIndexPair]>::ref_from_bytes(bytes).unwrap()
    }

    /// The raw bytes of the adjustment substream.
    pub fn adjustment_bytes(&self) -> &[u8] {
        &self.stream_data.as_ref()[self.adjustments.clone()]
    }

    /// The bucket a name would hash into.
    pub fn bucket_for_name(&self, name: &[u8]) -> u32 {
        type_name_hash(name) % self.bucket_count
    }
}
