//! End-to-end tests over a synthetic PDB: a v7 MSF image carrying a type stream
//! and its auxiliary hash stream.

use anyhow::Result;
use bstr::BStr;
use std::sync::Mutex;
use sympdb::tpi::hash::type_name_hash;
use sympdb::types::{fields::Field, Leaf, TypeData, TypeIndex};
use sympdb::{Pdb, PdbError, ReadAt};

const PAGE_SIZE: u32 = 0x400;
const TPI_VERSION: u32 = 20040203;
const TPI_HEADER_SIZE: u32 = 0x38;
const BUCKET_COUNT: u32 = 0x1000;

/// An in-memory byte store that stands in for a disk file.
struct TestFile {
    data: Mutex<Vec<u8>>,
}

impl TestFile {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }
}

impl ReadAt for TestFile {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        let lock = self.data.lock().unwrap();
        lock.read_exact_at(buf, offset)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        let lock = self.data.lock().unwrap();
        lock.read_at(buf, offset)
    }
}

/// Builds synthetic v7 MSF images, page by page. Page 0 is reserved for the header.
struct ImageBuilder {
    pages: Vec<Vec<u8>>,
}

impl ImageBuilder {
    fn new() -> Self {
        Self {
            pages: vec![vec![0; PAGE_SIZE as usize]],
        }
    }

    fn add_page(&mut self, data: &[u8]) -> u32 {
        assert!(data.len() <= PAGE_SIZE as usize);
        let mut page = data.to_vec();
        page.resize(PAGE_SIZE as usize, 0);
        self.pages.push(page);
        (self.pages.len() - 1) as u32
    }

    fn add_stream(&mut self, data: &[u8]) -> Vec<u32> {
        data.chunks(PAGE_SIZE as usize)
            .map(|chunk| self.add_page(chunk))
            .collect()
    }

    /// Writes the stream directory, its page map, and the file header. `streams`
    /// holds `(size, page_list)` pairs for streams `1..`; stream 0 is the directory
    /// itself.
    fn finish(mut self, streams: &[(u32, Vec<u32>)]) -> Vec<u8> {
        let page_size = PAGE_SIZE as usize;
        let total_data_pages: usize = streams.iter().map(|(_, pages)| pages.len()).sum();
        let num_streams = streams.len() + 1;

        let mut dir_num_pages = 0usize;
        loop {
            let dir_size = 4 + 4 * num_streams + 4 * (dir_num_pages + total_data_pages);
            let n = dir_size.div_ceil(page_size);
            if n == dir_num_pages {
                break;
            }
            dir_num_pages = n;
        }
        let dir_size = (4 + 4 * num_streams + 4 * (dir_num_pages + total_data_pages)) as u32;

        let first_dir_page = self.pages.len() as u32;
        let dir_page_list: Vec<u32> = (0..dir_num_pages as u32)
            .map(|i| first_dir_page + i)
            .collect();

        let mut dir = Vec::new();
        dir.extend_from_slice(&(num_streams as u32).to_le_bytes());
        dir.extend_from_slice(&dir_size.to_le_bytes());
        for &(size, _) in streams {
            dir.extend_from_slice(&size.to_le_bytes());
        }
        for &page in &dir_page_list {
            dir.extend_from_slice(&page.to_le_bytes());
        }
        for (_, pages) in streams {
            for &page in pages {
                dir.extend_from_slice(&page.to_le_bytes());
            }
        }
        assert_eq!(dir.len(), dir_size as usize);

        for chunk in dir.chunks(page_size) {
            self.add_page(chunk);
        }

        let mut map = Vec::new();
        for &page in &dir_page_list {
            map.extend_from_slice(&page.to_le_bytes());
        }
        let map_page = self.add_page(&map);

        let num_pages = self.pages.len() as u32;
        let header = &mut self.pages[0];
        header[..32]
            .copy_from_slice(b"Microsoft C/C++ MSF 7.00\r\n\x1a\x44\x53\x00\x00\x00");
        header[32..36].copy_from_slice(&PAGE_SIZE.to_le_bytes());
        header[36..40].copy_from_slice(&1u32.to_le_bytes());
        header[40..44].copy_from_slice(&num_pages.to_le_bytes());
        header[44..48].copy_from_slice(&dir_size.to_le_bytes());
        header[48..52].copy_from_slice(&0u32.to_le_bytes());
        header[52..56].copy_from_slice(&map_page.to_le_bytes());

        self.pages.concat()
    }
}

/// Appends alignment padding bytes until `buf.len()` is a multiple of 4.
fn pad_to_4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        let distance = 4 - buf.len() % 4;
        buf.push(0xf0 + distance as u8);
    }
}

/// Encodes one type record: length prefix, kind, body, then alignment padding.
fn type_record(kind: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(body.len() as u16 + 2).to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(body);
    pad_to_4(&mut out);
    out
}

fn enumerate_field(name: &str, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0x1502u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // attr
    out.extend_from_slice(value);
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    pad_to_4(&mut out);
    out
}

fn member_field(name: &str, ty: u32, offset: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0x150du16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // attr
    out.extend_from_slice(&ty.to_le_bytes());
    out.extend_from_slice(&offset.to_le_bytes()); // immediate numeric
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    pad_to_4(&mut out);
    out
}

/// The fixture type records. Entry `i` describes type index `0x1000 + i`, and each
/// entry carries the name used for its hash bucket, if it has one.
fn sample_records() -> Vec<(Vec<u8>, Option<&'static str>)> {
    let t_int = 0x74u32; // primitive: int32

    // 0x1000: the field list of enum Color
    let mut color_fields = Vec::new();
    color_fields.extend_from_slice(&enumerate_field("Red", &0u16.to_le_bytes()));
    color_fields.extend_from_slice(&enumerate_field("Green", &1u16.to_le_bytes()));
    // LF_LONG 0x00012345: wider than an immediate
    color_fields.extend_from_slice(&enumerate_field(
        "Blue",
        &[0x03, 0x80, 0x45, 0x23, 0x01, 0x00],
    ));

    // 0x1001: enum Color
    let mut color = Vec::new();
    color.extend_from_slice(&3u16.to_le_bytes()); // count
    color.extend_from_slice(&0u16.to_le_bytes()); // property
    color.extend_from_slice(&t_int.to_le_bytes()); // underlying type
    color.extend_from_slice(&0x1000u32.to_le_bytes()); // field list
    color.extend_from_slice(b"Color\0");

    // 0x1002: the field list of struct Point
    let mut point_fields = Vec::new();
    point_fields.extend_from_slice(&member_field("x", t_int, 0));
    point_fields.extend_from_slice(&member_field("y", t_int, 4));

    // 0x1003: struct Point
    let mut point = Vec::new();
    point.extend_from_slice(&2u16.to_le_bytes()); // count
    point.extend_from_slice(&0u16.to_le_bytes()); // property
    point.extend_from_slice(&0x1002u32.to_le_bytes()); // field list
    point.extend_from_slice(&0u32.to_le_bytes()); // derivation list
    point.extend_from_slice(&0u32.to_le_bytes()); // vtable shape
    point.extend_from_slice(&8u16.to_le_bytes()); // immediate numeric: size
    point.extend_from_slice(b"Point\0");

    // 0x1004: pointer to Point
    let mut pointer = Vec::new();
    pointer.extend_from_slice(&0x1003u32.to_le_bytes());
    pointer.extend_from_slice(&0x0000_040cu32.to_le_bytes());

    // 0x1005: union Blob
    let mut blob = Vec::new();
    blob.extend_from_slice(&1u16.to_le_bytes()); // count
    blob.extend_from_slice(&0u16.to_le_bytes()); // property
    blob.extend_from_slice(&0x1002u32.to_le_bytes()); // field list
    blob.extend_from_slice(&8u16.to_le_bytes()); // immediate numeric: size
    blob.extend_from_slice(b"Blob\0");

    // 0x1006: argument list (int, Point)
    let mut args = Vec::new();
    args.extend_from_slice(&2u32.to_le_bytes());
    args.extend_from_slice(&t_int.to_le_bytes());
    args.extend_from_slice(&0x1003u32.to_le_bytes());

    // 0x1007: procedure int(int, Point)
    let mut proc = Vec::new();
    proc.extend_from_slice(&t_int.to_le_bytes()); // return value
    proc.push(0); // calling convention
    proc.push(0); // reserved
    proc.extend_from_slice(&2u16.to_le_bytes()); // parameter count
    proc.extend_from_slice(&0x1006u32.to_le_bytes()); // argument list

    vec![
        (type_record(0x1203, &color_fields), None),
        (type_record(0x1507, &color), Some("Color")),
        (type_record(0x1203, &point_fields), None),
        (type_record(0x1505, &point), Some("Point")),
        (type_record(0x1002, &pointer), None),
        (type_record(0x1506, &blob), Some("Blob")),
        (type_record(0x1201, &args), None),
        (type_record(0x1008, &proc), None),
    ]
}

fn build_tpi(records: &[(Vec<u8>, Option<&'static str>)], hash_stream: u16) -> Vec<u8> {
    let payload: Vec<u8> = records.iter().flat_map(|(r, _)| r.clone()).collect();

    let mut out = Vec::new();
    out.extend_from_slice(&TPI_VERSION.to_le_bytes());
    out.extend_from_slice(&TPI_HEADER_SIZE.to_le_bytes());
    out.extend_from_slice(&0x1000u32.to_le_bytes());
    out.extend_from_slice(&(0x1000 + records.len() as u32).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&hash_stream.to_le_bytes());
    out.resize(TPI_HEADER_SIZE as usize, 0);
    out.extend_from_slice(&payload);
    out
}

fn build_hash_stream(records: &[(Vec<u8>, Option<&'static str>)]) -> Vec<u8> {
    let mut buckets: Vec<u32> = records
        .iter()
        .map(|(_, name)| match name {
            Some(name) => type_name_hash(name.as_bytes()) % BUCKET_COUNT,
            None => 0,
        })
        .collect();

    // Record 0 shares a bucket with "Point", so lookups must reject it by name.
    buckets[0] = type_name_hash(b"Point") % BUCKET_COUNT;

    let pairs: &[(u32, u32)] = &[(0x1000, 0)];

    let values_offset = 32u32;
    let values_size = (buckets.len() * 4) as u32;
    let pairs_offset = values_offset + values_size;
    let pairs_size = (pairs.len() * 8) as u32;

    let mut out = Vec::new();
    out.extend_from_slice(&4u32.to_le_bytes()); // key size
    out.extend_from_slice(&BUCKET_COUNT.to_le_bytes());
    out.extend_from_slice(&values_offset.to_le_bytes());
    out.extend_from_slice(&values_size.to_le_bytes());
    out.extend_from_slice(&pairs_offset.to_le_bytes());
    out.extend_from_slice(&pairs_size.to_le_bytes());
    out.extend_from_slice(&(pairs_offset + pairs_size).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    for bucket in &buckets {
        out.extend_from_slice(&bucket.to_le_bytes());
    }
    for (ti, off) in pairs {
        out.extend_from_slice(&ti.to_le_bytes());
        out.extend_from_slice(&off.to_le_bytes());
    }
    out
}

/// Assembles the whole PDB: info stream, TPI, DBI, and optionally the hash stream.
fn build_pdb(hash_stream: u16) -> Vec<u8> {
    let records = sample_records();
    let tpi = build_tpi(&records, hash_stream);
    let hash = build_hash_stream(&records);

    let mut builder = ImageBuilder::new();
    let info_pages = builder.add_stream(b"pdb info placeholder");
    let tpi_pages = builder.add_stream(&tpi);
    let hash_pages = builder.add_stream(&hash);

    builder.finish(&[
        (20, info_pages),
        (tpi.len() as u32, tpi_pages),
        (0, Vec::new()), // DBI: present but empty
        (hash.len() as u32, hash_pages),
    ])
}

fn open_fixture(hash_stream: u16) -> Pdb<TestFile> {
    Pdb::open_with_file(TestFile::new(build_pdb(hash_stream))).unwrap()
}

#[test]
fn open_and_enumerate() -> Result<()> {
    let pdb = open_fixture(4);
    assert_eq!(pdb.num_streams(), 5);

    let types = pdb.read_type_stream()?;
    assert_eq!(types.num_types(), 8);
    assert_eq!(types.type_index_begin(), TypeIndex(0x1000));
    assert_eq!(types.type_index_end(), TypeIndex(0x1008));
    assert!(types.type_hash().is_some());

    let mut seen = Vec::new();
    types.for_each_type(|index, record| {
        seen.push((index, record.kind));
        true
    })?;

    assert_eq!(seen.len(), 8);
    assert_eq!(seen[0], (TypeIndex(0x1000), Leaf::LF_FIELDLIST));
    assert_eq!(seen[1], (TypeIndex(0x1001), Leaf::LF_ENUM));
    assert_eq!(seen[3], (TypeIndex(0x1003), Leaf::LF_STRUCTURE));
    assert_eq!(seen[7], (TypeIndex(0x1007), Leaf::LF_PROCEDURE));
    Ok(())
}

#[test]
fn enumerate_stops_early() -> Result<()> {
    let pdb = open_fixture(4);
    let types = pdb.read_type_stream()?;

    let mut count = 0;
    types.for_each_type(|_, _| {
        count += 1;
        count < 3
    })?;
    assert_eq!(count, 3);
    Ok(())
}

#[test]
fn lookup_through_hash() -> Result<()> {
    let pdb = open_fixture(4);
    let types = pdb.read_type_stream()?;

    let record = types.lookup_type(BStr::new("Point"))?;
    assert_eq!(record.kind, Leaf::LF_STRUCTURE);
    let TypeData::Struct(point) = record.parse()? else {
        panic!("expected a struct");
    };
    assert_eq!(point.name, "Point");
    assert_eq!(point.fixed.field_list.get(), TypeIndex(0x1002));
    assert_eq!(u32::try_from(point.length).unwrap(), 8);

    let record = types.lookup_type(BStr::new("Blob"))?;
    assert_eq!(record.kind, Leaf::LF_UNION);

    Ok(())
}

/// The hash is case-insensitive, so the bucket matches, but identity is exact.
#[test]
fn lookup_is_case_sensitive() -> Result<()> {
    let pdb = open_fixture(4);
    let types = pdb.read_type_stream()?;

    let hash = types.type_hash().unwrap();
    assert_eq!(hash.bucket_for_name(b"Point"), hash.bucket_for_name(b"point"));

    assert!(matches!(
        types.lookup_type(BStr::new("point")),
        Err(PdbError::NotFound)
    ));
    Ok(())
}

#[test]
fn lookup_missing_name() -> Result<()> {
    let pdb = open_fixture(4);
    let types = pdb.read_type_stream()?;
    assert!(matches!(
        types.lookup_type(BStr::new("NoSuchType")),
        Err(PdbError::NotFound)
    ));
    Ok(())
}

/// The record a lookup returns is the record enumeration yields for the same index.
#[test]
fn lookup_and_enumerate_agree() -> Result<()> {
    let pdb = open_fixture(4);
    let types = pdb.read_type_stream()?;

    let looked_up = types.lookup_type(BStr::new("Color"))?;

    let mut enumerated = None;
    types.for_each_type(|index, record| {
        if index == TypeIndex(0x1001) {
            enumerated = Some((record.kind, record.data.to_vec()));
            false
        } else {
            true
        }
    })?;

    let (kind, data) = enumerated.unwrap();
    assert_eq!(looked_up.kind, kind);
    assert_eq!(looked_up.data, &data[..]);
    Ok(())
}

#[test]
fn decode_enum_and_its_fields() -> Result<()> {
    let pdb = open_fixture(4);
    let types = pdb.read_type_stream()?;

    let record = types.lookup_type(BStr::new("Color"))?;
    let TypeData::Enum(color) = record.parse()? else {
        panic!("expected an enum");
    };
    assert_eq!(color.fixed.count.get(), 3);
    assert_eq!(color.fixed.underlying_type.get(), TypeIndex(0x74));
    let field_list_index = color.fixed.fields.get();

    let fields_record = types.record(field_list_index)?;
    let TypeData::FieldList(fields) = fields_record.parse()? else {
        panic!("expected a field list");
    };

    let enumerators: Vec<(String, u64)> = fields
        .iter()
        .map(|field| {
            let Field::Enumerate(e) = field else {
                panic!("expected an enumerator");
            };
            (e.name.to_string(), u64::try_from(e.value).unwrap())
        })
        .collect();

    assert_eq!(
        enumerators,
        vec![
            ("Red".to_string(), 0),
            ("Green".to_string(), 1),
            ("Blue".to_string(), 0x12345),
        ]
    );
    Ok(())
}

#[test]
fn decode_pointer_and_struct_members() -> Result<()> {
    let pdb = open_fixture(4);
    let types = pdb.read_type_stream()?;

    let TypeData::Pointer(ptr) = types.record(TypeIndex(0x1004))?.parse()? else {
        panic!("expected a pointer");
    };
    assert_eq!(ptr.fixed.ty.get(), TypeIndex(0x1003));

    let TypeData::FieldList(members) = types.record(TypeIndex(0x1002))?.parse()? else {
        panic!("expected a field list");
    };
    let names: Vec<String> = members
        .iter()
        .map(|field| {
            let Field::Member(m) = field else {
                panic!("expected a member");
            };
            m.name.to_string()
        })
        .collect();
    assert_eq!(names, vec!["x".to_string(), "y".to_string()]);

    // Primitive indexes have no record.
    assert!(matches!(
        types.record(TypeIndex(0x74)),
        Err(PdbError::NotFound)
    ));
    Ok(())
}

/// With no hash stream named in the header, lookup degrades to a linear scan.
#[test]
fn lookup_without_hash_stream() -> Result<()> {
    let pdb = open_fixture(0xffff);
    let types = pdb.read_type_stream()?;
    assert!(types.type_hash().is_none());
    assert!(types.hash_stream().is_none());

    let record = types.lookup_type(BStr::new("Blob"))?;
    assert_eq!(record.kind, Leaf::LF_UNION);

    assert!(matches!(
        types.lookup_type(BStr::new("blob")),
        Err(PdbError::NotFound)
    ));
    Ok(())
}

/// A hash stream index beyond the directory is ignored rather than fatal.
#[test]
fn lookup_with_out_of_range_hash_stream() -> Result<()> {
    let pdb = open_fixture(9);
    let types = pdb.read_type_stream()?;
    assert_eq!(types.hash_stream(), Some(9));
    assert!(types.type_hash().is_none());

    let record = types.lookup_type(BStr::new("Point"))?;
    assert_eq!(record.kind, Leaf::LF_STRUCTURE);
    Ok(())
}
