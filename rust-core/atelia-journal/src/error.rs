// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia Journal - Error types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Errors raised while encoding, reading or reconciling StateJournal records.
// Frame-level failures from the underlying logs are wrapped unchanged.

use atelia_rbf::RbfError;
use thiserror::Error;

use crate::tags::RecordType;

/// Errors that can occur in the record layer.
#[derive(Debug, Error)]
pub enum JournalError {
    /// The underlying RBF log failed.
    #[error(transparent)]
    Rbf(#[from] RbfError),

    /// An I/O error outside the logs themselves (e.g. creating the journal
    /// directory).
    #[error("Journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The low 16 bits of a frame tag name no known record type.
    #[error("Unknown record type in frame tag {tag:#010x}")]
    UnknownRecordType {
        /// The raw frame tag.
        tag: u32,
    },

    /// An object-version tag carries an unknown object kind.
    #[error("Unknown object kind in frame tag {tag:#010x}")]
    UnknownObjectKind {
        /// The raw frame tag.
        tag: u32,
    },

    /// A record type without sub-types carries a non-zero sub-type.
    #[error("Frame tag {tag:#010x} has sub-type bits set for a record type without sub-types")]
    InvalidSubType {
        /// The raw frame tag.
        tag: u32,
    },

    /// A ticket points at a frame of a different record class.
    #[error("Frame at offset {offset} has tag {actual:#010x}, expected a {expected:?} record")]
    FrameTagMismatch {
        /// Frame start offset.
        offset: u64,
        /// The record class the reader wanted.
        expected: RecordType,
        /// The tag found in the frame.
        actual: u32,
    },

    /// A record payload is shorter than its fixed header.
    #[error("Record at offset {offset} is truncated: {len} bytes, need at least {min}")]
    RecordTruncated {
        /// Frame start offset.
        offset: u64,
        /// Payload length found.
        len: usize,
        /// Minimum payload length for the record type.
        min: usize,
    },

    /// A ticket points at an abandoned (tombstoned) frame.
    #[error("Frame at offset {offset} is a tombstone")]
    TombstoneRecord {
        /// Frame start offset.
        offset: u64,
    },

    /// A version's back-pointer does not point strictly backwards.
    #[error("Version at offset {offset} has invalid previous-version pointer {prev:#018x}")]
    InvalidPrevVersion {
        /// Frame start offset.
        offset: u64,
        /// The packed pointer found.
        prev: u64,
    },

    /// A version-index diff is not a whole number of entries.
    #[error("Version index record at offset {offset} has a {len}-byte diff, not a multiple of {entry}")]
    InvalidIndexDiff {
        /// Frame start offset.
        offset: u64,
        /// Diff length found.
        len: usize,
        /// Encoded size of one entry.
        entry: usize,
    },

    /// The meta log holds commits, but none of them fits inside the data log.
    #[error("No commit record fits the data log ({data_len} bytes); data written before the last commit is missing")]
    MissingCommit {
        /// Length of the data log.
        data_len: u64,
    },
}

/// Convenience type alias for journal results.
pub type JournalResult<T> = Result<T, JournalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_tag_mismatch() {
        let error = JournalError::FrameTagMismatch {
            offset: 96,
            expected: RecordType::ObjectVersion,
            actual: 0x0000_0002,
        };
        let message = format!("{error}");
        assert!(message.contains("96"));
        assert!(message.contains("0x00000002"));
        assert!(message.contains("ObjectVersion"));
    }

    #[test]
    fn test_rbf_errors_are_transparent() {
        let error = JournalError::from(RbfError::BuilderAlreadyOpen);
        assert_eq!(format!("{error}"), format!("{}", RbfError::BuilderAlreadyOpen));
    }

    #[test]
    fn test_error_display_truncated() {
        let error = JournalError::RecordTruncated {
            offset: 4,
            len: 3,
            min: 8,
        };
        let message = format!("{error}");
        assert!(message.contains("3 bytes"));
        assert!(message.contains("at least 8"));
    }
}
