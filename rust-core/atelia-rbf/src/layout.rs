// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - Wire layout constants and frame-size arithmetic
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ```text
// Fence(4) | HeadLen(4) | Tag(4) | Payload | TailMeta | Padding(0-3)
//          | PayloadCrc32C(4) | TrailerCodeword(16) | Fence(4)
// ```
//
// `HeadLen` counts everything from itself up to the end of the trailer
// codeword, fences excluded. All integers are little-endian except the
// trailer CRC (see `frame::TrailerCodeword`).

use crate::error::{RbfError, RbfResult};

/// Fence magic, ASCII "RBF1".
pub const FENCE_BYTES: [u8; 4] = *b"RBF1";
/// Fence magic as a little-endian `u32`.
pub const FENCE: u32 = 0x3146_4252;
/// Size of a fence.
pub const FENCE_LEN: usize = 4;
/// Length of an empty log: just the genesis fence.
pub const GENESIS_LEN: u64 = FENCE_LEN as u64;

/// Every frame start and the file length are multiples of this.
pub const ALIGNMENT: u64 = 4;

pub const HEAD_LEN_SIZE: usize = 4;
pub const TAG_SIZE: usize = 4;
pub const PAYLOAD_CRC_SIZE: usize = 4;
pub const TRAILER_CODEWORD_SIZE: usize = 16;

/// Offset of the tag within a frame.
pub const TAG_OFFSET: usize = HEAD_LEN_SIZE;
/// Offset of the first payload byte within a frame.
pub const PAYLOAD_OFFSET: usize = HEAD_LEN_SIZE + TAG_SIZE;

/// Bytes a frame carries on top of its payload and padding.
pub const FIXED_OVERHEAD: usize =
    HEAD_LEN_SIZE + TAG_SIZE + PAYLOAD_CRC_SIZE + TRAILER_CODEWORD_SIZE;
/// An empty frame (no payload, no padding).
pub const MIN_FRAME_LEN: usize = FIXED_OVERHEAD;
/// Largest frame length a ticket can address.
pub const MAX_FRAME_LEN: usize = ((1usize << 26) - 1) << 2;
/// Largest payload plus tail-meta a single frame can carry.
pub const MAX_PAYLOAD_AND_META_LEN: usize = MAX_FRAME_LEN - FIXED_OVERHEAD;
/// Tail-meta length is stored in 16 bits of the frame descriptor.
pub const MAX_TAIL_META_LEN: usize = u16::MAX as usize;

/// Status-byte count for the legacy single-length layout: the smallest
/// value in `1..=4` with `(payload_len + status_len) % 4 == 0`.
pub fn status_len(payload_len: usize) -> usize {
    1 + (4 - (payload_len + 1) % 4) % 4
}

/// Zero bytes needed after `payload_and_meta_len` to reach 4-byte alignment.
pub fn padding_len(payload_and_meta_len: usize) -> usize {
    (4 - payload_and_meta_len % 4) % 4
}

/// Total frame length (fences excluded) for a body of `payload_and_meta_len`.
pub fn frame_len(payload_and_meta_len: usize) -> usize {
    FIXED_OVERHEAD + payload_and_meta_len + padding_len(payload_and_meta_len)
}

pub fn align_up(value: u64) -> u64 {
    (value + (ALIGNMENT - 1)) & !(ALIGNMENT - 1)
}

pub fn align_down(value: u64) -> u64 {
    value & !(ALIGNMENT - 1)
}

pub fn is_aligned(value: u64) -> bool {
    value & (ALIGNMENT - 1) == 0
}

/// Check the construction-time length rules for one frame body.
pub fn validate_lengths(payload_and_meta_len: usize, tail_meta_len: usize) -> RbfResult<()> {
    if tail_meta_len > MAX_TAIL_META_LEN {
        return Err(RbfError::TailMetaTooLarge {
            len: tail_meta_len,
            max: MAX_TAIL_META_LEN,
        });
    }
    if payload_and_meta_len > MAX_PAYLOAD_AND_META_LEN {
        return Err(RbfError::PayloadTooLarge {
            len: payload_and_meta_len,
            max: MAX_PAYLOAD_AND_META_LEN,
        });
    }
    if tail_meta_len > payload_and_meta_len {
        return Err(RbfError::TailMetaExceedsPayload {
            tail_meta_len,
            payload_and_meta_len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_bytes_match_le_value() {
        assert_eq!(u32::from_le_bytes(FENCE_BYTES), FENCE);
    }

    #[test]
    fn test_status_len_aligns_payload() {
        for payload_len in 0..64 {
            let s = status_len(payload_len);
            assert!((1..=4).contains(&s));
            assert_eq!((payload_len + s) % 4, 0, "payload_len={payload_len}");
        }
        assert_eq!(status_len(0), 4);
        assert_eq!(status_len(3), 1);
    }

    #[test]
    fn test_frame_len_formula() {
        assert_eq!(frame_len(0), 28);
        assert_eq!(frame_len(1), 32);
        assert_eq!(frame_len(4), 32);
        assert_eq!(frame_len(5), 36);
        for n in 0..100 {
            assert_eq!(frame_len(n) % 4, 0);
        }
    }

    #[test]
    fn test_max_lengths_are_aligned() {
        assert!(is_aligned(MAX_FRAME_LEN as u64));
        assert!(is_aligned(MAX_PAYLOAD_AND_META_LEN as u64));
        assert_eq!(frame_len(MAX_PAYLOAD_AND_META_LEN), MAX_FRAME_LEN);
    }

    #[test]
    fn test_alignment_helpers() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(5), 8);
        assert_eq!(align_down(7), 4);
        assert!(is_aligned(12));
        assert!(!is_aligned(13));
    }

    #[test]
    fn test_validate_lengths() {
        assert!(validate_lengths(10, 10).is_ok());
        assert!(matches!(
            validate_lengths(10, 11),
            Err(RbfError::TailMetaExceedsPayload { .. })
        ));
        assert!(matches!(
            validate_lengths(100_000, 70_000),
            Err(RbfError::TailMetaTooLarge { .. })
        ));
        assert!(matches!(
            validate_lengths(MAX_PAYLOAD_AND_META_LEN + 1, 0),
            Err(RbfError::PayloadTooLarge { .. })
        ));
    }
}
