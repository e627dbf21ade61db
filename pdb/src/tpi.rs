//! Type Information Stream (TPI)
//!
//! Layout of the type stream (stream 2):
//!
//! * `TypeStreamHeader` - version and the bounds of the record payload
//! * type records - a length-prefixed sequence of leaves, one per type index in
//!   `type_index_begin..type_index_end`
//!
//! A type stream may also have an associated type hash stream, named by the
//! `hash_stream` field of the header. The hash stream carries a bucket value for
//! every record, which is what makes name lookup cheaper than a full scan. See
//! [`hash::TypeHashStream`].

pub mod hash;

use crate::error::PdbError;
use crate::stream_index::StreamIndexU16;
use crate::types::{build_types_starts, TypeIndex, TypeIndexLe, TypeRecord, TypesIter};
use crate::Pdb;
use bstr::BStr;
use std::cell::OnceCell;
use std::mem::size_of;
use sync_file::ReadAt;
use tracing::trace_span;
use zerocopy::byteorder::{LE, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use self::hash::{type_name_hash, TypeHashStream};

/// The type stream versions this decoder accepts. The values are the build dates
/// of the MSVC toolsets that introduced each revision.
pub const SUPPORTED_VERSIONS: &[u32] = &[
    19941610, // VC 2.0
    19950623, // VC 4.0
    19950814, // VC 4.1
    19960307, // VC 5.0
    19970604, // VC 6.0
    19990604, // VC 7.0
    20000404, // VC 7.1
    20040203, // VC 8.0
];

/// The fixed prefix of the type stream header.
///
/// The full header is `header_size` bytes; fields past this prefix vary with
/// `version` and are skipped, not decoded.
#[derive(Clone, Eq, PartialEq, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Debug)]
#[repr(C)]
pub struct TypeStreamHeader {
    /// One of [`SUPPORTED_VERSIONS`].
    pub version: U32<LE>,
    /// Size of the full header in bytes; the record payload starts here.
    pub header_size: U32<LE>,
    /// The first type index described by this stream.
    pub type_index_begin: TypeIndexLe,
    /// One past the last type index described by this stream.
    pub type_index_end: TypeIndexLe,
    /// The number of bytes of record payload following the header.
    pub type_record_bytes: U32<LE>,
    /// The stream holding the type hash, or NIL if there is none.
    pub hash_stream: StreamIndexU16,
}

/// The size of the decoded portion of the type stream header.
pub const TYPE_STREAM_HEADER_PREFIX_LEN: usize = size_of::<TypeStreamHeader>();
static_assertions::const_assert_eq!(TYPE_STREAM_HEADER_PREFIX_LEN, 22);

/// Contains a type stream and provides enumeration and name lookup over its
/// records.
///
/// The stream owns its backing bytes; a `TypeStream<Vec<u8>>` produced by
/// [`Pdb::read_type_stream`] holds no reference to the container it came from.
pub struct TypeStream<StreamData: AsRef<[u8]>> {
    /// The entire type stream, including header and type records.
    stream_data: StreamData,

    /// Decoded copy of the header prefix. `None` for a zero-length stream.
    header: Option<TypeStreamHeader>,

    /// The auxiliary hash stream, when the header names one and the container
    /// has it. Without it, name lookup degrades to a linear scan.
    hash: Option<TypeHashStream<Vec<u8>>>,

    /// Byte offsets of each record within the payload, built on first use.
    record_starts: OnceCell<Vec<u32>>,
}

impl<StreamData: AsRef<[u8]>> TypeStream<StreamData> {
    /// Parses the header of a type stream and validates it against the stream
    /// length.
    ///
    /// A zero-length stream parses as an empty type stream.
    pub fn parse(stream_data: StreamData) -> Result<Self, PdbError> {
        let stream_bytes: &[u8] = stream_data.as_ref();

        if stream_bytes.is_empty() {
            return Ok(Self {
                stream_data,
                header: None,
                hash: None,
                record_starts: OnceCell::new(),
            });
        }

        let Ok((version, _)) = U32::<LE>::read_from_prefix(stream_bytes) else {
            return Err(PdbError::CorruptTypeStream("stream is shorter than a version field"));
        };
        let version = version.get();
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(PdbError::UnsupportedVersion(version));
        }

        let Ok((header, _)) = TypeStreamHeader::read_from_prefix(stream_bytes) else {
            return Err(PdbError::CorruptTypeStream("stream is shorter than its header"));
        };

        let header_size = header.header_size.get();
        if (header_size as usize) < TYPE_STREAM_HEADER_PREFIX_LEN {
            return Err(PdbError::CorruptTypeStream("header_size is smaller than the header"));
        }

        let type_index_begin = header.type_index_begin.get();
        let type_index_end = header.type_index_end.get();
        if type_index_end < type_index_begin {
            return Err(PdbError::CorruptTypeStream("type index range is inverted"));
        }
        if type_index_begin < TypeIndex::MIN_BEGIN {
            return Err(PdbError::CorruptTypeStream(
                "type_index_begin lies in the primitive type range",
            ));
        }

        // The header and the payload together must account for the whole stream.
        let expected_len = u64::from(header_size) + u64::from(header.type_record_bytes.get());
        if expected_len != stream_bytes.len() as u64 {
            return Err(PdbError::CorruptTypeStream(
                "header_size + type_record_bytes does not equal the stream size",
            ));
        }

        Ok(Self {
            stream_data,
            header: Some(header),
            hash: None,
            record_starts: OnceCell::new(),
        })
    }

    /// Attaches the auxiliary type hash stream.
    ///
    /// The hash data is validated against the number of records in this stream.
    pub fn attach_hash_stream(&mut self, hash_data: Vec<u8>) -> Result<(), PdbError> {
        self.hash = Some(TypeHashStream::parse(hash_data, self.num_types())?);
        Ok(())
    }

    /// Gets a reference to the decoded stream header, if the stream is non-empty.
    pub fn header(&self) -> Option<&TypeStreamHeader> {
        self.header.as_ref()
    }

    /// Returns the stream index of the related hash stream, if the header names one.
    pub fn hash_stream(&self) -> Option<u32> {
        self.header()?.hash_stream.get()
    }

    /// The auxiliary hash stream, if one was attached.
    pub fn type_hash(&self) -> Option<&TypeHashStream<Vec<u8>>> {
        self.hash.as_ref()
    }

    /// The type index of the first type record.
    pub fn type_index_begin(&self) -> TypeIndex {
        match &self.header {
            Some(h) => h.type_index_begin.get(),
            None => TypeIndex::MIN_BEGIN,
        }
    }

    /// The type index of the last type record, plus 1.
    pub fn type_index_end(&self) -> TypeIndex {
        match &self.header {
            Some(h) => h.type_index_end.get(),
            None => TypeIndex::MIN_BEGIN,
        }
    }

    /// The number of types defined in the type stream.
    pub fn num_types(&self) -> u32 {
        self.type_index_end().0 - self.type_index_begin().0
    }

    /// Gets the byte offset within the stream of the record payload.
    pub fn records_offset(&self) -> usize {
        match &self.header {
            Some(h) => h.header_size.get() as usize,
            None => 0,
        }
    }

    /// Returns the encoded type records.
    pub fn type_records_bytes(&self) -> &[u8] {
        match &self.header {
            Some(h) => {
                let start = h.header_size.get() as usize;
                let len = h.type_record_bytes.get() as usize;
                &self.stream_data.as_ref()[start..start + len]
            }
            None => &[],
        }
    }

    /// Returns `true` if `type_index` refers to a primitive type.
    pub fn is_primitive(&self, type_index: TypeIndex) -> bool {
        type_index < self.type_index_begin()
    }

    /// Iterates the records contained within this type stream.
    pub fn iter_type_records(&self) -> TypesIter<'_> {
        TypesIter::new(self.type_records_bytes())
    }

    /// Gets the "starts" vector for the byte offsets of the records in this stream.
    ///
    /// This function will create the starts vector on demand.
    pub fn record_starts(&self) -> &[u32] {
        self.record_starts.get_or_init(|| {
            build_types_starts(self.num_types() as usize, self.type_records_bytes())
        })
    }

    /// Retrieves the type record identified by `type_index`.
    ///
    /// Fails with [`PdbError::NotFound`] if `type_index` refers to a primitive type
    /// or lies outside this stream's index range.
    pub fn record(&self, type_index: TypeIndex) -> Result<TypeRecord<'_>, PdbError> {
        let Some(relative) = type_index.0.checked_sub(self.type_index_begin().0) else {
            return Err(PdbError::NotFound);
        };
        if relative >= self.num_types() {
            return Err(PdbError::NotFound);
        }

        let starts = self.record_starts();
        let Some(&record_start) = starts.get(relative as usize) else {
            return Err(PdbError::CorruptTypeStream("record payload ends early"));
        };

        let all_records = self.type_records_bytes();
        let mut iter = TypesIter::new(&all_records[record_start as usize..]);
        match iter.next() {
            Some(record) => Ok(record),
            None => Err(PdbError::CorruptTypeStream("record payload ends early")),
        }
    }

    /// Enumerates the type records in order, paired with their type indexes.
    ///
    /// The callback returns `true` to continue and `false` to stop early. A
    /// well-formed stream yields exactly `num_types()` records whose encodings
    /// consume exactly the record payload; anything else fails with
    /// [`PdbError::CorruptTypeStream`].
    pub fn for_each_type<'s, C>(&'s self, mut callback: C) -> Result<(), PdbError>
    where
        C: FnMut(TypeIndex, TypeRecord<'s>) -> bool,
    {
        let begin = self.type_index_begin().0;
        let mut iter = self.iter_type_records();

        for i in 0..self.num_types() {
            let Some(record) = iter.next() else {
                return Err(PdbError::CorruptTypeStream(
                    "payload ran out before the declared record count",
                ));
            };

            if !callback(TypeIndex(begin + i), record) {
                return Ok(());
            }
        }

        // Only trailing padding may remain after the last record.
        if iter.next().is_some() || !iter.rest().is_empty() {
            return Err(PdbError::CorruptTypeStream(
                "payload continues past the declared record count",
            ));
        }

        Ok(())
    }

    /// Finds the type record whose declared name equals `name`.
    ///
    /// With an attached hash stream, only the records in the name's hash bucket are
    /// decoded. Without one, this is a linear scan. The hash is case-insensitive but
    /// the final comparison is exact, byte for byte.
    ///
    /// Fails with [`PdbError::NotFound`] when every candidate is exhausted.
    pub fn lookup_type(&self, name: &BStr) -> Result<TypeRecord<'_>, PdbError> {
        let _span = trace_span!("lookup_type").entered();

        if let Some(hash) = &self.hash {
            let bucket = type_name_hash(name) % hash.bucket_count();
            let begin = self.type_index_begin().0;

            for (i, record_bucket) in hash.record_buckets().iter().enumerate() {
                if record_bucket.get() != bucket {
                    continue;
                }
                let record = self.record(TypeIndex(begin + i as u32))?;
                if record.name() == Some(name) {
                    return Ok(record);
                }
            }

            Err(PdbError::NotFound)
        } else {
            let mut found = None;
            self.for_each_type(|_, record| {
                if record.name() == Some(name) {
                    found = Some(record);
                    false
                } else {
                    true
                }
            })?;
            found.ok_or(PdbError::NotFound)
        }
    }
}

impl<F: ReadAt> Pdb<F> {
    /// Reads the type stream (stream 2) and, when present, its auxiliary hash
    /// stream.
    ///
    /// The hash stream is attached only when the header names a stream index that
    /// actually exists in this container; otherwise name lookup falls back to a
    /// linear scan.
    pub fn read_type_stream(&self) -> Result<TypeStream<Vec<u8>>, PdbError> {
        let stream_data = self.read_stream_to_vec(crate::Stream::TPI.into())?;
        let mut types = TypeStream::parse(stream_data)?;

        if let Some(hash_stream) = types.hash_stream() {
            if hash_stream < self.num_streams() {
                let hash_data = self.read_stream_to_vec(hash_stream)?;
                types.attach_hash_stream(hash_data)?;
            }
        }

        Ok(types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(
        version: u32,
        header_size: u32,
        begin: u32,
        end: u32,
        record_bytes: u32,
        hash_stream: u16,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&version.to_le_bytes());
        out.extend_from_slice(&header_size.to_le_bytes());
        out.extend_from_slice(&begin.to_le_bytes());
        out.extend_from_slice(&end.to_le_bytes());
        out.extend_from_slice(&record_bytes.to_le_bytes());
        out.extend_from_slice(&hash_stream.to_le_bytes());
        out.resize(header_size as usize, 0);
        out
    }

    #[test]
    fn empty_stream() {
        let ts = TypeStream::parse(Vec::new()).unwrap();
        assert_eq!(ts.num_types(), 0);
        assert!(ts.header().is_none());
        assert!(ts.hash_stream().is_none());
        assert!(ts.lookup_type(BStr::new("anything")).is_err());
    }

    #[test]
    fn unsupported_version() {
        let data = header_bytes(19930101, 0x38, 0x1000, 0x1000, 0, 0xffff);
        match TypeStream::parse(data) {
            Err(PdbError::UnsupportedVersion(v)) => assert_eq!(v, 19930101),
            other => panic!("expected UnsupportedVersion, got {:?}", other.err()),
        }
    }

    #[test]
    fn header_size_mismatch() {
        // Header claims 4 payload bytes; the stream has none.
        let data = header_bytes(20040203, 0x38, 0x1000, 0x1001, 4, 0xffff);
        assert!(matches!(
            TypeStream::parse(data),
            Err(PdbError::CorruptTypeStream(_))
        ));
    }

    #[test]
    fn inverted_index_range() {
        let data = header_bytes(20040203, 0x38, 0x1002, 0x1000, 0, 0xffff);
        assert!(matches!(
            TypeStream::parse(data),
            Err(PdbError::CorruptTypeStream(_))
        ));
    }

    #[test]
    fn no_records() {
        let data = header_bytes(20040203, 0x38, 0x1000, 0x1000, 0, 0xffff);
        let ts = TypeStream::parse(data).unwrap();
        assert_eq!(ts.num_types(), 0);
        assert!(ts.hash_stream().is_none(), "0xffff is the nil stream index");

        let mut count = 0;
        ts.for_each_type(|_, _| {
            count += 1;
            true
        })
        .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn record_count_must_match_payload() {
        // One well-formed pointer record, but the header promises two records.
        let mut payload = Vec::new();
        payload.extend_from_slice(&10u16.to_le_bytes());
        payload.extend_from_slice(&0x1002u16.to_le_bytes());
        payload.extend_from_slice(&[0u8; 8]);

        let mut data = header_bytes(
            20040203,
            0x38,
            0x1000,
            0x1002,
            payload.len() as u32,
            0xffff,
        );
        data.extend_from_slice(&payload);

        let ts = TypeStream::parse(data).unwrap();
        let err = ts.for_each_type(|_, _| true).unwrap_err();
        assert!(matches!(err, PdbError::CorruptTypeStream(_)));
    }
}
