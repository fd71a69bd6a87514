// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia Journal - Object version record payload
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ```text
// [8 bytes: prev_version_ptr (packed SizedPtr, LE)]  -- 0 for a base version
// [N bytes: diff]
// ```

use atelia_rbf::SizedPtr;

use crate::error::{JournalError, JournalResult};

pub const PREV_VERSION_PTR_SIZE: usize = 8;
pub const MIN_PAYLOAD_LEN: usize = PREV_VERSION_PTR_SIZE;

/// A parsed version payload borrowing its diff bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectVersionRecord<'a> {
    /// Ticket of the previous version, `SizedPtr::NULL` for a base version.
    pub prev: SizedPtr,
    pub diff: &'a [u8],
}

impl<'a> ObjectVersionRecord<'a> {
    pub fn new(prev: SizedPtr, diff: &'a [u8]) -> Self {
        Self { prev, diff }
    }

    /// Parse a frame payload. `offset` is only used for error reports.
    pub fn parse(payload: &'a [u8], offset: u64) -> JournalResult<Self> {
        if payload.len() < MIN_PAYLOAD_LEN {
            return Err(JournalError::RecordTruncated {
                offset,
                len: payload.len(),
                min: MIN_PAYLOAD_LEN,
            });
        }
        let (head, diff) = payload.split_at(PREV_VERSION_PTR_SIZE);
        let mut packed = [0u8; PREV_VERSION_PTR_SIZE];
        packed.copy_from_slice(head);
        Ok(Self {
            prev: SizedPtr::from_packed(u64::from_le_bytes(packed)),
            diff,
        })
    }

    pub fn is_base(&self) -> bool {
        self.prev.is_null()
    }

    pub fn encoded_len(&self) -> usize {
        PREV_VERSION_PTR_SIZE + self.diff.len()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&encode_header(self.prev));
        out.extend_from_slice(self.diff);
    }
}

/// The fixed header of a version payload.
pub fn encode_header(prev: SizedPtr) -> [u8; PREV_VERSION_PTR_SIZE] {
    prev.packed().to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_then_parse() {
        let prev = SizedPtr::new(64, 40).unwrap();
        let record = ObjectVersionRecord::new(prev, b"set k=v");
        let mut bytes = Vec::new();
        record.encode_into(&mut bytes);
        assert_eq!(bytes.len(), record.encoded_len());

        let parsed = ObjectVersionRecord::parse(&bytes, 0).unwrap();
        assert_eq!(parsed, record);
        assert!(!parsed.is_base());
    }

    #[test]
    fn test_base_version_has_null_prev() {
        let bytes = [0u8; 8];
        let parsed = ObjectVersionRecord::parse(&bytes, 0).unwrap();
        assert!(parsed.is_base());
        assert!(parsed.diff.is_empty());
    }

    #[test]
    fn test_truncated_payload() {
        assert!(matches!(
            ObjectVersionRecord::parse(&[1, 2, 3], 12),
            Err(JournalError::RecordTruncated { offset: 12, len: 3, min: 8 })
        ));
    }
}
