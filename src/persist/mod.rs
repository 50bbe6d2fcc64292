//! Versioned binary serialization for indexes and quantizers.
//!
//! Every blob shares the same envelope: a 4-byte magic, a little-endian `u16`
//! format version, a one-byte kind tag, the body, and a trailing CRC32 of
//! everything before it. Loading rejects bad magic, wrong kind, incompatible
//! versions, truncation, checksum mismatches, and internally inconsistent
//! lengths.

pub(crate) mod format;
mod hnsw;
mod ivf;
mod nsg;
mod quantizer;
