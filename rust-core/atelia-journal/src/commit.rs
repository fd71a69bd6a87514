// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia Journal - Commit record payload
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A commit record marks a consistent checkpoint of the journal. Its payload
// is fixed-shape (all integers little-endian):
//
// ```text
// [8 bytes: epoch_seq]
// [8 bytes: root_object_id]
// [8 bytes: version_index_ptr (packed SizedPtr into the data log)]
// [8 bytes: data_tail]         -- data log tail, fence included
// [8 bytes: next_object_id]
// ```

use atelia_rbf::SizedPtr;
use serde::{Deserialize, Serialize};

use crate::error::{JournalError, JournalResult};

pub const COMMIT_RECORD_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Monotonically increasing commit number, starting at 1.
    pub epoch_seq: u64,
    pub root_object_id: u64,
    /// Ticket of the version index in the data log.
    pub version_index_ptr: SizedPtr,
    /// Data log length covered by this commit.
    pub data_tail: u64,
    /// Next unallocated object id.
    pub next_object_id: u64,
}

impl CommitRecord {
    pub fn encode(&self) -> [u8; COMMIT_RECORD_LEN] {
        let fields = [
            self.epoch_seq,
            self.root_object_id,
            self.version_index_ptr.packed(),
            self.data_tail,
            self.next_object_id,
        ];
        let mut out = [0u8; COMMIT_RECORD_LEN];
        for (chunk, value) in out.chunks_exact_mut(8).zip(fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Parse a frame payload. Bytes past the fixed shape are ignored.
    pub fn decode(payload: &[u8], offset: u64) -> JournalResult<Self> {
        if payload.len() < COMMIT_RECORD_LEN {
            return Err(JournalError::RecordTruncated {
                offset,
                len: payload.len(),
                min: COMMIT_RECORD_LEN,
            });
        }
        let mut fields = [0u64; 5];
        for (value, chunk) in fields.iter_mut().zip(payload.chunks_exact(8)) {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            *value = u64::from_le_bytes(bytes);
        }
        Ok(Self {
            epoch_seq: fields[0],
            root_object_id: fields[1],
            version_index_ptr: SizedPtr::from_packed(fields[2]),
            data_tail: fields[3],
            next_object_id: fields[4],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CommitRecord {
        CommitRecord {
            epoch_seq: 3,
            root_object_id: 17,
            version_index_ptr: SizedPtr::new(128, 48).unwrap(),
            data_tail: 512,
            next_object_id: 18,
        }
    }

    #[test]
    fn test_fixed_layout() {
        let bytes = sample().encode();
        assert_eq!(&bytes[0..8], &3u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &17u64.to_le_bytes());
        assert_eq!(&bytes[24..32], &512u64.to_le_bytes());
        assert_eq!(&bytes[32..40], &18u64.to_le_bytes());
        assert_eq!(CommitRecord::decode(&bytes, 0).unwrap(), sample());
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = sample().encode().to_vec();
        bytes.extend_from_slice(b"future");
        assert_eq!(CommitRecord::decode(&bytes, 0).unwrap(), sample());
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = sample().encode();
        assert!(matches!(
            CommitRecord::decode(&bytes[..39], 8),
            Err(JournalError::RecordTruncated { len: 39, min: 40, .. })
        ));
    }

    #[test]
    fn test_json_form() {
        let json = serde_json::to_string(&sample()).unwrap();
        let parsed: CommitRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sample());
    }
}
