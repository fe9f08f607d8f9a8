//! Checksum-guarded snapshot files
//!
//! Layout: a JSON array of records followed by an 8-byte footer
//! (`u32` LE body length, `u32` LE CRC32 of the body). Every load
//! verifies the checksum; any mismatch refuses the whole file.

use std::fs;
use std::path::Path;

use crc32fast::Hasher;

use crate::model::StoredRecord;

use super::errors::{StoreError, StoreResult};

const FOOTER_LEN: usize = 8;

fn checksum(body: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(body);
    hasher.finalize()
}

/// Serializes records and writes body + footer.
pub(super) fn write(path: &Path, records: &[&StoredRecord]) -> StoreResult<()> {
    let body = serde_json::to_vec(records)
        .map_err(|e| StoreError::Corrupt(format!("failed to serialize records: {e}")))?;

    let crc = checksum(&body);
    let mut bytes = body;
    let body_len = bytes.len() as u32;
    bytes.extend_from_slice(&body_len.to_le_bytes());
    bytes.extend_from_slice(&crc.to_le_bytes());

    fs::write(path, bytes)?;
    Ok(())
}

/// Reads a snapshot file, verifying length and checksum before parsing.
pub(super) fn read(path: &Path) -> StoreResult<Vec<StoredRecord>> {
    let bytes = fs::read(path)?;
    if bytes.len() < FOOTER_LEN {
        return Err(StoreError::Corrupt("file shorter than footer".into()));
    }

    let body_end = bytes.len() - FOOTER_LEN;
    let body = &bytes[..body_end];
    let footer = &bytes[body_end..];

    let stored_len = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]) as usize;
    if stored_len != body.len() {
        return Err(StoreError::Corrupt(format!(
            "length mismatch: footer says {stored_len}, body is {}",
            body.len()
        )));
    }

    let stored_crc = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]);
    let actual_crc = checksum(body);
    if stored_crc != actual_crc {
        return Err(StoreError::Corrupt("checksum mismatch".into()));
    }

    serde_json::from_slice(body)
        .map_err(|e| StoreError::Corrupt(format!("body failed to parse: {e}")))
}
