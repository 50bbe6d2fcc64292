//! Shared envelope and primitive codecs for the binary formats.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::IndexError;
use crate::filtering::{Metadata, MetadataStore};
use crate::metric::Metric;

/// Magic bytes identifying this crate's formats.
pub(crate) const MAGIC: [u8; 4] = *b"VCNX";

/// Current format version. Blobs with a different version are rejected.
pub(crate) const FORMAT_VERSION: u16 = 1;

pub(crate) const KIND_SCALAR: u8 = 1;
pub(crate) const KIND_PQ: u8 = 2;
pub(crate) const KIND_AQ: u8 = 3;
pub(crate) const KIND_HNSW: u8 = 4;
pub(crate) const KIND_NSG: u8 = 5;
pub(crate) const KIND_IVF_FLAT: u8 = 6;
pub(crate) const KIND_IVF_PQ: u8 = 7;
pub(crate) const KIND_SCANN: u8 = 8;

pub(crate) type Reader<'a> = Cursor<&'a [u8]>;

/// Start a blob: magic, version, kind.
pub(crate) fn begin(kind: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&MAGIC);
    write_u16(&mut buf, FORMAT_VERSION);
    buf.push(kind);
    buf
}

/// Finish a blob: append the CRC32 of everything written so far.
pub(crate) fn finish(mut buf: Vec<u8>) -> Vec<u8> {
    let checksum = crc32fast::hash(&buf);
    buf.write_u32::<LittleEndian>(checksum).expect("write to Vec");
    buf
}

/// Validate the envelope and return a reader positioned at the body.
pub(crate) fn open(bytes: &[u8], expected_kind: u8) -> Result<Reader<'_>, IndexError> {
    // magic + version + kind + checksum
    if bytes.len() < 4 + 2 + 1 + 4 {
        return Err(IndexError::corrupt("blob shorter than envelope"));
    }
    let (body, tail) = bytes.split_at(bytes.len() - 4);
    let stored = u32::from_le_bytes(tail.try_into().expect("4-byte tail"));
    let actual = crc32fast::hash(body);
    if stored != actual {
        return Err(IndexError::CorruptData {
            message: "checksum mismatch".to_string(),
            expected: Some(stored.to_string()),
            actual: Some(actual.to_string()),
        });
    }

    let mut r = Cursor::new(body);
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)
        .map_err(|_| IndexError::corrupt("truncated magic"))?;
    if magic != MAGIC {
        return Err(IndexError::CorruptData {
            message: "bad magic".to_string(),
            expected: Some(format!("{:?}", MAGIC)),
            actual: Some(format!("{:?}", magic)),
        });
    }

    let version = read_u16(&mut r)?;
    if version != FORMAT_VERSION {
        return Err(IndexError::VersionUnsupported {
            found: version,
            supported: FORMAT_VERSION,
        });
    }

    let kind = read_u8(&mut r)?;
    if kind != expected_kind {
        return Err(IndexError::CorruptData {
            message: "kind tag mismatch".to_string(),
            expected: Some(expected_kind.to_string()),
            actual: Some(kind.to_string()),
        });
    }

    Ok(r)
}

/// The reader must be fully consumed once a structure is decoded.
pub(crate) fn expect_end(r: &Reader<'_>) -> Result<(), IndexError> {
    if r.position() as usize != r.get_ref().len() {
        return Err(IndexError::corrupt("trailing bytes after body"));
    }
    Ok(())
}

pub(crate) fn remaining(r: &Reader<'_>) -> usize {
    r.get_ref().len().saturating_sub(r.position() as usize)
}

// ── primitive writers (Vec<u8> cannot fail) ─────────────────────────────────

pub(crate) fn write_u8(buf: &mut Vec<u8>, x: u8) {
    buf.push(x);
}

pub(crate) fn write_u16(buf: &mut Vec<u8>, x: u16) {
    buf.write_u16::<LittleEndian>(x).expect("write to Vec");
}

pub(crate) fn write_u32(buf: &mut Vec<u8>, x: u32) {
    buf.write_u32::<LittleEndian>(x).expect("write to Vec");
}

pub(crate) fn write_u64(buf: &mut Vec<u8>, x: u64) {
    buf.write_u64::<LittleEndian>(x).expect("write to Vec");
}

pub(crate) fn write_f32(buf: &mut Vec<u8>, x: f32) {
    buf.write_f32::<LittleEndian>(x).expect("write to Vec");
}

pub(crate) fn write_f64(buf: &mut Vec<u8>, x: f64) {
    buf.write_f64::<LittleEndian>(x).expect("write to Vec");
}

pub(crate) fn write_bool(buf: &mut Vec<u8>, x: bool) {
    buf.push(u8::from(x));
}

// ── primitive readers (truncation surfaces as CorruptData) ──────────────────

pub(crate) fn read_u8(r: &mut Reader<'_>) -> Result<u8, IndexError> {
    r.read_u8().map_err(|_| IndexError::corrupt("truncated input"))
}

pub(crate) fn read_u16(r: &mut Reader<'_>) -> Result<u16, IndexError> {
    r.read_u16::<LittleEndian>()
        .map_err(|_| IndexError::corrupt("truncated input"))
}

pub(crate) fn read_u32(r: &mut Reader<'_>) -> Result<u32, IndexError> {
    r.read_u32::<LittleEndian>()
        .map_err(|_| IndexError::corrupt("truncated input"))
}

pub(crate) fn read_u64(r: &mut Reader<'_>) -> Result<u64, IndexError> {
    r.read_u64::<LittleEndian>()
        .map_err(|_| IndexError::corrupt("truncated input"))
}

pub(crate) fn read_f32(r: &mut Reader<'_>) -> Result<f32, IndexError> {
    r.read_f32::<LittleEndian>()
        .map_err(|_| IndexError::corrupt("truncated input"))
}

pub(crate) fn read_f64(r: &mut Reader<'_>) -> Result<f64, IndexError> {
    r.read_f64::<LittleEndian>()
        .map_err(|_| IndexError::corrupt("truncated input"))
}

pub(crate) fn read_bool(r: &mut Reader<'_>) -> Result<bool, IndexError> {
    match read_u8(r)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(IndexError::CorruptData {
            message: "invalid bool".to_string(),
            expected: Some("0 or 1".to_string()),
            actual: Some(other.to_string()),
        }),
    }
}

/// Read a declared element count and sanity-check it against the bytes left.
pub(crate) fn read_len(r: &mut Reader<'_>, elem_size: usize) -> Result<usize, IndexError> {
    let len = read_u32(r)? as usize;
    if elem_size > 0 && len.saturating_mul(elem_size) > remaining(r) {
        return Err(IndexError::CorruptData {
            message: "declared length exceeds remaining bytes".to_string(),
            expected: Some(format!("<= {} bytes", remaining(r))),
            actual: Some(format!("{} x {} bytes", len, elem_size)),
        });
    }
    Ok(len)
}

// ── compound codecs ─────────────────────────────────────────────────────────

pub(crate) fn write_f32_slice(buf: &mut Vec<u8>, xs: &[f32]) {
    write_u32(buf, xs.len() as u32);
    for &x in xs {
        write_f32(buf, x);
    }
}

pub(crate) fn read_f32_vec(r: &mut Reader<'_>) -> Result<Vec<f32>, IndexError> {
    let len = read_len(r, 4)?;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(read_f32(r)?);
    }
    Ok(out)
}

/// Read a float vector whose length must match a declared value.
pub(crate) fn read_f32_vec_exact(
    r: &mut Reader<'_>,
    expected: usize,
) -> Result<Vec<f32>, IndexError> {
    let v = read_f32_vec(r)?;
    if v.len() != expected {
        return Err(IndexError::CorruptData {
            message: "vector length mismatch".to_string(),
            expected: Some(expected.to_string()),
            actual: Some(v.len().to_string()),
        });
    }
    Ok(v)
}

pub(crate) fn write_u32_slice(buf: &mut Vec<u8>, xs: &[u32]) {
    write_u32(buf, xs.len() as u32);
    for &x in xs {
        write_u32(buf, x);
    }
}

pub(crate) fn read_u32_vec(r: &mut Reader<'_>) -> Result<Vec<u32>, IndexError> {
    let len = read_len(r, 4)?;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(read_u32(r)?);
    }
    Ok(out)
}

pub(crate) fn write_byte_slice(buf: &mut Vec<u8>, xs: &[u8]) {
    write_u32(buf, xs.len() as u32);
    buf.extend_from_slice(xs);
}

pub(crate) fn read_byte_vec(r: &mut Reader<'_>) -> Result<Vec<u8>, IndexError> {
    let len = read_len(r, 1)?;
    let mut out = vec![0u8; len];
    r.read_exact(&mut out)
        .map_err(|_| IndexError::corrupt("truncated input"))?;
    Ok(out)
}

pub(crate) fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_byte_slice(buf, s.as_bytes());
}

pub(crate) fn read_string(r: &mut Reader<'_>) -> Result<String, IndexError> {
    let bytes = read_byte_vec(r)?;
    String::from_utf8(bytes).map_err(|_| IndexError::corrupt("invalid utf-8 string"))
}

pub(crate) fn write_metric(buf: &mut Vec<u8>, metric: Metric) {
    write_u8(buf, metric.tag());
}

pub(crate) fn read_metric(r: &mut Reader<'_>) -> Result<Metric, IndexError> {
    let tag = read_u8(r)?;
    Metric::from_tag(tag).ok_or_else(|| IndexError::CorruptData {
        message: "unknown metric tag".to_string(),
        expected: Some("0..=2".to_string()),
        actual: Some(tag.to_string()),
    })
}

pub(crate) fn write_metadata_store(buf: &mut Vec<u8>, store: &MetadataStore) {
    // Sorted by id so equal stores serialize identically
    let mut entries: Vec<(&u32, &Metadata)> = store.iter().collect();
    entries.sort_by_key(|(id, _)| **id);
    write_u32(buf, entries.len() as u32);
    for (id, metadata) in entries {
        write_u32(buf, *id);
        let mut fields: Vec<(&String, &u32)> = metadata.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        write_u32(buf, fields.len() as u32);
        for (key, value) in fields {
            write_string(buf, key);
            write_u32(buf, *value);
        }
    }
}

pub(crate) fn read_metadata_store(r: &mut Reader<'_>) -> Result<MetadataStore, IndexError> {
    let count = read_len(r, 8)?;
    let mut store = MetadataStore::new();
    for _ in 0..count {
        let id = read_u32(r)?;
        let field_count = read_len(r, 8)?;
        let mut metadata = Metadata::new();
        for _ in 0..field_count {
            let key = read_string(r)?;
            let value = read_u32(r)?;
            metadata.insert(key, value);
        }
        store.insert(id, metadata);
    }
    Ok(store)
}

/// Write `[subspace][centroid][component]` codebooks.
pub(crate) fn write_codebooks(buf: &mut Vec<u8>, codebooks: &[Vec<Vec<f32>>]) {
    write_u32(buf, codebooks.len() as u32);
    for book in codebooks {
        write_u32(buf, book.len() as u32);
        for centroid in book {
            write_f32_slice(buf, centroid);
        }
    }
}

/// Read codebooks and validate their shape against the declared parameters:
/// `m` books of exactly `ksub` centroids whose widths follow `widths`.
pub(crate) fn read_codebooks(
    r: &mut Reader<'_>,
    m: usize,
    ksub: usize,
    widths: &[usize],
) -> Result<Vec<Vec<Vec<f32>>>, IndexError> {
    let book_count = read_len(r, 4)?;
    if book_count != m {
        return Err(IndexError::CorruptData {
            message: "codebook count contradicts m".to_string(),
            expected: Some(m.to_string()),
            actual: Some(book_count.to_string()),
        });
    }
    let mut codebooks = Vec::with_capacity(m);
    for (sub, &width) in widths.iter().enumerate() {
        let centroid_count = read_len(r, 4)?;
        if centroid_count != ksub {
            return Err(IndexError::CorruptData {
                message: format!("codebook {} size contradicts declared bits", sub),
                expected: Some(ksub.to_string()),
                actual: Some(centroid_count.to_string()),
            });
        }
        let mut book = Vec::with_capacity(ksub);
        for _ in 0..ksub {
            book.push(read_f32_vec_exact(r, width)?);
        }
        codebooks.push(book);
    }
    Ok(codebooks)
}
