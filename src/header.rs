//! File header — format anchor at offset 0.
//!
//! # On-disk layout (256 bytes, all multi-byte fields big-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   magic              = "FRAG"
//!    4      1   format_version     = 2
//!    5      4   header_size        (BE u32, = HEADER_SIZE)
//!    9      1   flags              0x01 = encrypted
//!   10      1   active_version     index into the version table
//!   11      1   versions_count     number of populated version slots
//!   12      8   index_offset       (BE u64, = HEADER_SIZE)
//!   20      8   index_size         (BE u64) bytes reserved for the index
//!   28      4   index_used         (BE u32) live+tombstone slot count
//!   32      8   data_start         (BE u64) = index_offset + index_size
//!   40      8   data_end           (BE u64)
//!   48     16   reserved           zero
//!   64  6×32   version table       fixed-width zero-padded UTF-8 names
//! ```
//!
//! Endianness is big-endian throughout; this is frozen for format_version 2.
//! No field assumes native alignment or machine word size — every access
//! goes through explicit byte slicing, the same discipline the teacher
//! format uses for its little-endian superblock.

use std::io::{self, Read, Write};

use crate::error::FragmentError;

pub const MAGIC: &[u8; 4] = b"FRAG";
pub const FORMAT_VERSION: u8 = 2;
pub const HEADER_SIZE: usize = 256;
pub const VERSION_TABLE_OFFSET: usize = 64;
pub const VERSION_ENTRY_SIZE: usize = 32;
pub const MAX_VERSIONS: usize = (HEADER_SIZE - VERSION_TABLE_OFFSET) / VERSION_ENTRY_SIZE; // 6
pub const INDEX_ENTRY_SIZE: usize = 10;
pub const INITIAL_INDEX_CAPACITY: u32 = 1024;

pub const HEADER_FLAG_ENCRYPTED: u8 = 0x01;

/// In-memory view of the 256-byte header plus the immutable version table.
#[derive(Debug, Clone)]
pub struct Header {
    pub format_version: u8,
    pub flags: u8,
    pub active_version: u8,
    pub versions: Vec<String>,
    pub index_offset: u64,
    pub index_size: u64,
    pub index_used: u32,
    pub data_start: u64,
    pub data_end: u64,
}

impl Header {
    /// Build a fresh header for a newly created store with the default
    /// initial index capacity.
    pub fn new(versions: &[String], active: &str) -> Result<Self, FragmentError> {
        Self::with_capacity(versions, active, INITIAL_INDEX_CAPACITY)
    }

    /// Build a fresh header for a newly created store.
    ///
    /// Validates the version table per spec: non-empty, each name fits in
    /// `VERSION_ENTRY_SIZE - 1` bytes (room for at least the zero padding
    /// to be meaningful), count within `MAX_VERSIONS`, and `active` present.
    pub fn with_capacity(
        versions: &[String],
        active: &str,
        index_capacity: u32,
    ) -> Result<Self, FragmentError> {
        if versions.is_empty() {
            return Err(FragmentError::NoVersions);
        }
        if versions.len() > MAX_VERSIONS {
            return Err(FragmentError::TooManyVersions {
                count: versions.len(),
            });
        }
        for name in versions {
            validate_version_name(name)?;
        }
        let active_version = versions
            .iter()
            .position(|v| v == active)
            .ok_or_else(|| FragmentError::UnknownVersion {
                name: active.to_owned(),
            })? as u8;

        let index_size = (index_capacity.max(1) as u64) * (INDEX_ENTRY_SIZE as u64);
        let index_offset = HEADER_SIZE as u64;
        let data_start = index_offset + index_size;

        Ok(Self {
            format_version: FORMAT_VERSION,
            flags: 0,
            active_version,
            versions: versions.to_vec(),
            index_offset,
            index_size,
            index_used: 0,
            data_start,
            data_end: data_start,
        })
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & HEADER_FLAG_ENCRYPTED != 0
    }

    pub fn index_capacity(&self) -> u64 {
        self.index_size / INDEX_ENTRY_SIZE as u64
    }

    pub fn version_index(&self, name: &str) -> Option<u8> {
        self.versions.iter().position(|v| v == name).map(|i| i as u8)
    }

    pub fn version_name(&self, idx: u8) -> Option<&str> {
        self.versions.get(idx as usize).map(|s| s.as_str())
    }

    pub fn active_version_name(&self) -> &str {
        // Safe: `active_version` is validated in range at construction and
        // never mutated without re-validating (see set_active_version).
        &self.versions[self.active_version as usize]
    }

    /// Write the 256-byte header, big-endian, zero-padded.
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.format_version;
        buf[5..9].copy_from_slice(&(HEADER_SIZE as u32).to_be_bytes());
        buf[9] = self.flags;
        buf[10] = self.active_version;
        buf[11] = self.versions.len() as u8;
        buf[12..20].copy_from_slice(&self.index_offset.to_be_bytes());
        buf[20..28].copy_from_slice(&self.index_size.to_be_bytes());
        buf[28..32].copy_from_slice(&self.index_used.to_be_bytes());
        buf[32..40].copy_from_slice(&self.data_start.to_be_bytes());
        buf[40..48].copy_from_slice(&self.data_end.to_be_bytes());
        // 48..64 reserved, left zero.

        for (i, name) in self.versions.iter().enumerate() {
            let start = VERSION_TABLE_OFFSET + i * VERSION_ENTRY_SIZE;
            let bytes = name.as_bytes();
            buf[start..start + bytes.len()].copy_from_slice(bytes);
            // remaining bytes in the slot are already zero.
        }

        w.write_all(&buf)
    }

    /// Read and validate the 256-byte header.
    pub fn read<R: Read>(mut r: R) -> Result<Self, FragmentError> {
        let mut buf = [0u8; HEADER_SIZE];
        r.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                FragmentError::BadHeader {
                    reason: "file shorter than header size".into(),
                }
            } else {
                FragmentError::Io(e)
            }
        })?;

        if &buf[0..4] != MAGIC {
            return Err(FragmentError::InvalidFormat);
        }

        let format_version = buf[4];
        if format_version != FORMAT_VERSION {
            return Err(FragmentError::UnsupportedVersion {
                found: format_version,
            });
        }

        let header_size = u32::from_be_bytes(buf[5..9].try_into().unwrap());
        if header_size as usize != HEADER_SIZE {
            return Err(FragmentError::BadHeader {
                reason: format!("header_size {header_size} != {HEADER_SIZE}"),
            });
        }

        let flags = buf[9];
        let active_version = buf[10];
        let versions_count = buf[11] as usize;
        if versions_count == 0 {
            return Err(FragmentError::NoVersions);
        }
        if versions_count > MAX_VERSIONS {
            return Err(FragmentError::TooManyVersions {
                count: versions_count,
            });
        }

        let index_offset = u64::from_be_bytes(buf[12..20].try_into().unwrap());
        let index_size = u64::from_be_bytes(buf[20..28].try_into().unwrap());
        let index_used = u32::from_be_bytes(buf[28..32].try_into().unwrap());
        let data_start = u64::from_be_bytes(buf[32..40].try_into().unwrap());
        let data_end = u64::from_be_bytes(buf[40..48].try_into().unwrap());

        if index_offset != HEADER_SIZE as u64 {
            return Err(FragmentError::BadHeader {
                reason: format!("index_offset {index_offset} != {HEADER_SIZE}"),
            });
        }
        if data_start != index_offset + index_size {
            return Err(FragmentError::BadHeader {
                reason: "data_start does not follow index region".into(),
            });
        }
        if data_end < data_start {
            return Err(FragmentError::BadHeader {
                reason: "data_end precedes data_start".into(),
            });
        }
        let capacity = index_size / INDEX_ENTRY_SIZE as u64;
        if index_used as u64 > capacity {
            return Err(FragmentError::BadHeader {
                reason: format!("index_used {index_used} exceeds capacity {capacity}"),
            });
        }

        let mut versions = Vec::with_capacity(versions_count);
        for i in 0..versions_count {
            let start = VERSION_TABLE_OFFSET + i * VERSION_ENTRY_SIZE;
            let slot = &buf[start..start + VERSION_ENTRY_SIZE];
            let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
            let name = std::str::from_utf8(&slot[..end])
                .map_err(|_| FragmentError::BadHeader {
                    reason: format!("version table entry {i} is not valid UTF-8"),
                })?
                .to_owned();
            validate_version_name(&name)?;
            versions.push(name);
        }

        if active_version as usize >= versions.len() {
            return Err(FragmentError::BadHeader {
                reason: format!(
                    "active_version {active_version} out of range for {} versions",
                    versions.len()
                ),
            });
        }

        Ok(Self {
            format_version,
            flags,
            active_version,
            versions,
            index_offset,
            index_size,
            index_used,
            data_start,
            data_end,
        })
    }
}

fn validate_version_name(name: &str) -> Result<(), FragmentError> {
    if name.is_empty() {
        return Err(FragmentError::BadVersionName {
            reason: "version name must not be empty".into(),
        });
    }
    if name.as_bytes().len() >= VERSION_ENTRY_SIZE {
        return Err(FragmentError::BadVersionName {
            reason: format!(
                "version name {name:?} is {} bytes, must be < {VERSION_ENTRY_SIZE}",
                name.as_bytes().len()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn round_trips_through_bytes() {
        let h = Header::new(&v(&["public", "private"]), "public").unwrap();
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        let h2 = Header::read(&buf[..]).unwrap();
        assert_eq!(h2.versions, h.versions);
        assert_eq!(h2.active_version, h.active_version);
        assert_eq!(h2.data_start, h.data_start);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = [0u8; HEADER_SIZE];
        assert!(matches!(Header::read(&buf[..]), Err(FragmentError::InvalidFormat)));
    }

    #[test]
    fn rejects_empty_versions() {
        assert!(matches!(Header::new(&v(&[]), "x"), Err(FragmentError::NoVersions)));
    }

    #[test]
    fn rejects_too_many_versions() {
        let names = v(&["a", "b", "c", "d", "e", "f", "g"]);
        assert!(matches!(
            Header::new(&names, "a"),
            Err(FragmentError::TooManyVersions { count: 7 })
        ));
    }

    #[test]
    fn max_versions_succeeds() {
        let names = v(&["a", "b", "c", "d", "e", "f"]);
        assert!(Header::new(&names, "a").is_ok());
    }

    #[test]
    fn rejects_oversized_version_name() {
        let long = "x".repeat(VERSION_ENTRY_SIZE);
        assert!(matches!(
            Header::new(&v(&[&long]), &long),
            Err(FragmentError::BadVersionName { .. })
        ));
    }

    #[test]
    fn accepts_max_length_version_name() {
        let long = "x".repeat(VERSION_ENTRY_SIZE - 1);
        assert!(Header::new(&v(&[&long]), &long).is_ok());
    }
}
