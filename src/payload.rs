//! Payload codec: the bytes stored inside one fragment's chunk.
//!
//! A payload packs every version's text for one fragment as a
//! structure-of-arrays — all entry headers first, then all data blobs
//! concatenated in the same order — rather than interleaving header and
//! blob per entry. This lets a reader size one contiguous allocation for
//! the blob region up front instead of growing it entry by entry.
//!
//! ```text
//! entry_count:  u16 (BE)
//! entries[entry_count]:
//!     version_index: u8
//!     length:         u32 (BE)
//! data: concatenation of entries[i].length bytes, in entry order
//! ```
//!
//! The empty payload is the two-byte sentinel `entry_count = 0` with no
//! entries and no data, and must be accepted as valid on read, not treated
//! as truncation.

use crate::error::FragmentError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEntry {
    pub version_index: u8,
    pub data: Vec<u8>,
}

pub fn encode(entries: &[PayloadEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for e in entries {
        out.push(e.version_index);
        out.extend_from_slice(&(e.data.len() as u32).to_be_bytes());
    }
    for e in entries {
        out.extend_from_slice(&e.data);
    }
    out
}

pub fn decode(buf: &[u8]) -> Result<Vec<PayloadEntry>, FragmentError> {
    if buf.len() < 2 {
        return Err(FragmentError::CorruptPayload {
            reason: format!("payload is {} bytes, need at least 2 for entry_count", buf.len()),
        });
    }
    let entry_count = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    if entry_count == 0 {
        // the empty sentinel: valid, not corruption.
        return Ok(Vec::new());
    }

    let headers_start = 2;
    let headers_len = entry_count
        .checked_mul(5)
        .ok_or_else(|| FragmentError::CorruptPayload {
            reason: "entry_count overflow computing header region size".into(),
        })?;
    let headers_end = headers_start
        .checked_add(headers_len)
        .ok_or_else(|| FragmentError::CorruptPayload {
            reason: "entry_count overflow computing header region end".into(),
        })?;
    if headers_end > buf.len() {
        return Err(FragmentError::CorruptPayload {
            reason: format!(
                "entry headers need {headers_len} bytes but payload has only {} after the count",
                buf.len() - headers_start
            ),
        });
    }

    let mut headers = Vec::with_capacity(entry_count);
    for i in 0..entry_count {
        let off = headers_start + i * 5;
        let version_index = buf[off];
        let length = u32::from_be_bytes([buf[off + 1], buf[off + 2], buf[off + 3], buf[off + 4]]);
        headers.push((version_index, length as usize));
    }

    let mut entries = Vec::with_capacity(entry_count);
    let mut cursor = headers_end;
    for (version_index, length) in headers {
        let end = cursor
            .checked_add(length)
            .ok_or_else(|| FragmentError::CorruptPayload {
                reason: "entry length overflow computing data region end".into(),
            })?;
        if end > buf.len() {
            return Err(FragmentError::CorruptPayload {
                reason: format!(
                    "entry claims {length} bytes at offset {cursor} but payload ends at {}",
                    buf.len()
                ),
            });
        }
        entries.push(PayloadEntry {
            version_index,
            data: buf[cursor..end].to_vec(),
        });
        cursor = end;
    }

    if cursor != buf.len() {
        return Err(FragmentError::CorruptPayload {
            reason: format!(
                "payload has {} trailing bytes after the last entry",
                buf.len() - cursor
            ),
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_round_trips() {
        let encoded = encode(&[]);
        assert_eq!(encoded, vec![0, 0]);
        assert_eq!(decode(&encoded).unwrap(), vec![]);
    }

    #[test]
    fn single_entry_round_trips() {
        let entries = vec![PayloadEntry {
            version_index: 0,
            data: b"hello".to_vec(),
        }];
        let encoded = encode(&entries);
        assert_eq!(decode(&encoded).unwrap(), entries);
    }

    #[test]
    fn multi_entry_round_trips_structure_of_arrays() {
        let entries = vec![
            PayloadEntry { version_index: 0, data: b"public text".to_vec() },
            PayloadEntry { version_index: 1, data: b"private text, longer".to_vec() },
        ];
        let encoded = encode(&entries);
        // headers block: 2 (count) + 2*5 (two headers) = 12 bytes before any data.
        assert_eq!(&encoded[0..2], &[0, 2]);
        assert_eq!(decode(&encoded).unwrap(), entries);
    }

    #[test]
    fn truncated_header_region_is_corrupt() {
        let buf = vec![0, 1]; // claims 1 entry but has no header bytes
        assert!(matches!(decode(&buf), Err(FragmentError::CorruptPayload { .. })));
    }

    #[test]
    fn truncated_data_region_is_corrupt() {
        let mut buf = vec![0, 1, 0, 0, 0, 10]; // one entry claiming 10 bytes
        buf.extend_from_slice(b"short"); // only 5 supplied
        assert!(matches!(decode(&buf), Err(FragmentError::CorruptPayload { .. })));
    }

    #[test]
    fn trailing_garbage_is_corrupt() {
        let mut encoded = encode(&[PayloadEntry { version_index: 0, data: b"hi".to_vec() }]);
        encoded.push(0xff);
        assert!(matches!(decode(&encoded), Err(FragmentError::CorruptPayload { .. })));
    }

    #[test]
    fn too_short_for_count_is_corrupt() {
        assert!(matches!(decode(&[0u8; 1]), Err(FragmentError::CorruptPayload { .. })));
    }
}
