// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - Error types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Every fallible RBF operation returns `RbfResult`. Errors fall into three
// groups: construction errors raised before any byte is written, I/O errors
// passed through from the backing store, and integrity errors found while
// decoding a frame. Scan termination is not an error (see `scan::ScanOutcome`).

use thiserror::Error;

/// Errors that can occur during RBF operations.
#[derive(Debug, Error)]
pub enum RbfError {
    /// An I/O error occurred while reading or writing the backing store.
    #[error("RBF I/O error: {0}")]
    Io(#[from] std::io::Error),

    // -- construction / argument errors ------------------------------------
    /// A signed offset was negative.
    #[error("Offset {value} is out of range (must be non-negative)")]
    OutOfRange {
        /// The rejected value.
        value: i64,
    },

    /// An offset or length was not 4-byte aligned.
    #[error("Value {value} is not 4-byte aligned")]
    Misaligned {
        /// The rejected value.
        value: u64,
    },

    /// An `(offset, length)` pair does not fit the packed ticket encoding.
    #[error("Ticket ({offset}, {len}) exceeds the packable range")]
    TicketTooLarge {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: u64,
    },

    /// A status length outside `1..=4` was requested.
    #[error("Status length {len} is outside 1..=4")]
    InvalidStatusLen {
        /// Requested status length.
        len: usize,
    },

    /// The tail-meta region is longer than the hard cap.
    #[error("Tail meta of {len} bytes exceeds maximum {max}")]
    TailMetaTooLarge {
        /// Requested tail-meta length.
        len: usize,
        /// The cap.
        max: usize,
    },

    /// Payload plus tail-meta is longer than a frame can carry.
    #[error("Payload of {len} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Requested payload-and-meta length.
        len: usize,
        /// The cap.
        max: usize,
    },

    /// The declared tail-meta suffix is longer than the bytes written.
    #[error("Tail meta length {tail_meta_len} exceeds payload-and-meta length {payload_and_meta_len}")]
    TailMetaExceedsPayload {
        /// Declared tail-meta length.
        tail_meta_len: usize,
        /// Bytes written to the frame body.
        payload_and_meta_len: usize,
    },

    /// A frame builder is already open on this file.
    #[error("A frame builder is already open on this file")]
    BuilderAlreadyOpen,

    /// The builder was already committed or aborted.
    #[error("Frame builder is already committed or aborted")]
    BuilderFinished,

    /// Reservations other than the frame's own length field are still unfilled.
    #[error("{count} reservation(s) still open")]
    PendingReservations {
        /// Number of unfilled reservations.
        count: usize,
    },

    /// The reservation token does not belong to any open reservation.
    #[error("Unknown reservation token {id}")]
    UnknownReservation {
        /// Token id.
        id: u64,
    },

    /// `fill` was given a byte slice of the wrong size.
    #[error("Reservation expects {expected} bytes, got {actual}")]
    ReservationSizeMismatch {
        /// Reserved length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },

    /// A rewind or patch targeted bytes that were already pushed to storage.
    #[error("Position {position} is before the flushed boundary {flushed}")]
    AlreadyFlushed {
        /// Requested position.
        position: u64,
        /// First byte still held in the write buffer.
        flushed: u64,
    },

    /// Appending would move the tail beyond the largest addressable offset.
    #[error("Log end {end} would exceed the addressable maximum {max}")]
    FileTooLarge {
        /// Would-be end offset.
        end: u64,
        /// Largest addressable offset.
        max: u64,
    },

    /// `truncate` was asked for a length that is not a committed frame boundary.
    #[error("Cannot truncate to {len}: not a fence boundary at or below the tail {tail}")]
    InvalidTruncate {
        /// Requested length.
        len: u64,
        /// Logical tail.
        tail: u64,
    },

    /// `create` was called on a non-empty backing store.
    #[error("Cannot create a log over a non-empty store ({len} bytes)")]
    StorageNotEmpty {
        /// Current length of the store.
        len: u64,
    },

    /// The backing store does not hold a valid RBF log.
    #[error("Not an RBF file: {reason}")]
    NotAnRbfFile {
        /// Which check failed.
        reason: String,
    },

    /// A ticket points outside the committed region of the log.
    #[error("Ticket ({offset}, {len}) lies outside the committed log (tail {tail})")]
    TicketOutOfBounds {
        /// Ticket offset.
        offset: u64,
        /// Ticket length.
        len: u64,
        /// Logical tail.
        tail: u64,
    },

    /// A caller-supplied buffer is too small.
    #[error("Buffer of {available} bytes is too small, {needed} required")]
    BufferTooSmall {
        /// Required size.
        needed: usize,
        /// Supplied size.
        available: usize,
    },

    // -- integrity errors -------------------------------------------------
    /// Expected fence magic was not found.
    #[error("Fence mismatch at offset {offset}")]
    FenceMismatch {
        /// Offset of the expected fence.
        offset: u64,
    },

    /// The redundant frame length copies disagree.
    #[error("Length mismatch at offset {offset}: expected {expected}, found {found}")]
    LengthMismatch {
        /// Frame start.
        offset: u64,
        /// Length from the ticket or trailer.
        expected: u64,
        /// Length found in the frame.
        found: u64,
    },

    /// The header tag disagrees with the trailer's copy.
    #[error("Tag mismatch at offset {offset}: header {header:#010x}, trailer {trailer:#010x}")]
    TagMismatch {
        /// Frame start.
        offset: u64,
        /// Header tag.
        header: u32,
        /// Trailer tag.
        trailer: u32,
    },

    /// The trailer codeword checksum does not match its contents.
    #[error("Trailer CRC mismatch at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    TrailerCrcMismatch {
        /// Offset of the trailer codeword.
        offset: u64,
        /// Stored CRC.
        expected: u32,
        /// Computed CRC.
        actual: u32,
    },

    /// The payload checksum does not match the frame body.
    #[error("Payload CRC mismatch at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    PayloadCrcMismatch {
        /// Frame start.
        offset: u64,
        /// Stored CRC.
        expected: u32,
        /// Computed CRC.
        actual: u32,
    },

    /// Alignment padding after the tail-meta is not all zero.
    #[error("Non-zero frame padding at offset {offset}")]
    NonZeroPadding {
        /// Frame start.
        offset: u64,
    },

    /// Reserved descriptor or status bits are set.
    #[error("Reserved bits set in frame descriptor {descriptor:#010x} at offset {offset}")]
    ReservedBitsSet {
        /// Offset of the trailer codeword.
        offset: u64,
        /// Raw descriptor.
        descriptor: u32,
    },

    /// A decoded frame length is structurally impossible.
    #[error("Invalid frame length {len} at offset {offset}")]
    InvalidFrameLength {
        /// Frame start (or trailer position when the start is unknown).
        offset: u64,
        /// Decoded length.
        len: u64,
    },

    /// The store ended before the requested bytes could be read.
    #[error("Short read at offset {offset}: wanted {expected} bytes, got {actual}")]
    ShortRead {
        /// Read offset.
        offset: u64,
        /// Bytes requested.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },
}

impl RbfError {
    /// Returns `true` for errors that describe damaged or foreign bytes
    /// rather than an environment failure. The reverse scanner resyncs
    /// over these and propagates everything else.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            RbfError::FenceMismatch { .. }
                | RbfError::LengthMismatch { .. }
                | RbfError::TagMismatch { .. }
                | RbfError::TrailerCrcMismatch { .. }
                | RbfError::PayloadCrcMismatch { .. }
                | RbfError::NonZeroPadding { .. }
                | RbfError::ReservedBitsSet { .. }
                | RbfError::InvalidFrameLength { .. }
                | RbfError::Misaligned { .. }
                | RbfError::TicketTooLarge { .. }
                | RbfError::ShortRead { .. }
        )
    }
}

/// Convenience type alias for RBF results.
pub type RbfResult<T> = Result<T, RbfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_trailer_crc_mismatch() {
        let error = RbfError::TrailerCrcMismatch {
            offset: 64,
            expected: 0xDEADBEEF,
            actual: 0xCAFEBABE,
        };
        let message = format!("{error}");
        assert!(message.contains("64"));
        assert!(message.contains("0xdeadbeef"));
        assert!(message.contains("0xcafebabe"));
    }

    #[test]
    fn test_error_display_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file gone");
        let error = RbfError::Io(io_error);
        assert!(format!("{error}").contains("file gone"));
    }

    #[test]
    fn test_error_display_tail_meta_too_large() {
        let error = RbfError::TailMetaTooLarge {
            len: 70_000,
            max: 65_535,
        };
        let message = format!("{error}");
        assert!(message.contains("70000"));
        assert!(message.contains("65535"));
    }

    #[test]
    fn test_corruption_classification() {
        assert!(RbfError::FenceMismatch { offset: 4 }.is_corruption());
        assert!(RbfError::InvalidFrameLength { offset: 4, len: 3 }.is_corruption());
        assert!(!RbfError::BuilderAlreadyOpen.is_corruption());
        let io_error = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert!(!RbfError::Io(io_error).is_corruption());
    }
}
