// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - Frame value types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tag, status byte, the 16-byte trailer codeword, and the views returned by
// frame reads.
//
// ## Trailer codeword (16 bytes)
//
// ```text
// [0..4)   TrailerCrc32C   u32 BE   CRC32C of bytes [4..16)
// [4..8)   FrameDescriptor u32 LE
// [8..12)  FrameTag        u32 LE   copy of the header tag
// [12..16) FrameLength     u32 LE   copy of HeadLen
// ```
//
// FrameDescriptor bits:
//
// ```text
// 31       tombstone
// 30..29   padding length (0-3)
// 28..16   reserved, must be zero
// 15..0    tail_meta length
// ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crc;
use crate::error::{RbfError, RbfResult};
use crate::layout::{FIXED_OVERHEAD, TRAILER_CODEWORD_SIZE};
use crate::ptr::SizedPtr;

// ---------------------------------------------------------------------------
// FrameTag
// ---------------------------------------------------------------------------

/// Opaque 4-byte frame discriminator. RBF never interprets the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct FrameTag(pub u32);

impl FrameTag {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    pub const fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl From<u32> for FrameTag {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for FrameTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// FrameStatus
// ---------------------------------------------------------------------------

/// The status byte: bit 7 marks a tombstone, bits 0-1 hold `status_len - 1`,
/// bits 2-6 are reserved.
///
/// In the trailer-codeword layout the status length is the padding count plus
/// the status byte itself, so `padding_len() == status_len() - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameStatus(u8);

impl FrameStatus {
    const TOMBSTONE: u8 = 0x80;
    const LEN_MASK: u8 = 0x03;
    const RESERVED_MASK: u8 = 0x7C;

    /// `status_len` must be in `1..=4`.
    pub fn new(tombstone: bool, status_len: usize) -> RbfResult<Self> {
        if !(1..=4).contains(&status_len) {
            return Err(RbfError::InvalidStatusLen { len: status_len });
        }
        Ok(Self::from_padding(tombstone, status_len - 1))
    }

    pub(crate) fn from_padding(tombstone: bool, padding_len: usize) -> Self {
        debug_assert!(padding_len < 4);
        let mut byte = (padding_len as u8) & Self::LEN_MASK;
        if tombstone {
            byte |= Self::TOMBSTONE;
        }
        Self(byte)
    }

    /// Decode a status byte, rejecting reserved bits. `at` is only used for
    /// the error report.
    pub fn from_byte(byte: u8, at: u64) -> RbfResult<Self> {
        if byte & Self::RESERVED_MASK != 0 {
            return Err(RbfError::ReservedBitsSet {
                offset: at,
                descriptor: (byte as u32) << 24,
            });
        }
        Ok(Self(byte))
    }

    pub fn is_tombstone(self) -> bool {
        self.0 & Self::TOMBSTONE != 0
    }

    pub fn status_len(self) -> usize {
        (self.0 & Self::LEN_MASK) as usize + 1
    }

    pub fn padding_len(self) -> usize {
        (self.0 & Self::LEN_MASK) as usize
    }

    pub fn to_byte(self) -> u8 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// TrailerCodeword
// ---------------------------------------------------------------------------

const DESCRIPTOR_TOMBSTONE: u32 = 0x8000_0000;
const DESCRIPTOR_PADDING_SHIFT: u32 = 29;
const DESCRIPTOR_PADDING_MASK: u32 = 0x6000_0000;
const DESCRIPTOR_RESERVED_MASK: u32 = 0x1FFF_0000;
const DESCRIPTOR_TAIL_META_MASK: u32 = 0x0000_FFFF;

/// Decoded trailer codeword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailerCodeword {
    pub status: FrameStatus,
    pub tag: FrameTag,
    pub tail_meta_len: u16,
    pub frame_len: u32,
}

impl TrailerCodeword {
    pub fn descriptor(&self) -> u32 {
        let mut descriptor = ((self.status.padding_len() as u32) << DESCRIPTOR_PADDING_SHIFT)
            & DESCRIPTOR_PADDING_MASK;
        if self.status.is_tombstone() {
            descriptor |= DESCRIPTOR_TOMBSTONE;
        }
        descriptor | self.tail_meta_len as u32
    }

    pub fn encode(&self) -> [u8; TRAILER_CODEWORD_SIZE] {
        let mut out = [0u8; TRAILER_CODEWORD_SIZE];
        out[4..8].copy_from_slice(&self.descriptor().to_le_bytes());
        out[8..12].copy_from_slice(&self.tag.to_le_bytes());
        out[12..16].copy_from_slice(&self.frame_len.to_le_bytes());
        let checksum = crc::compute(&out[4..]);
        out[0..4].copy_from_slice(&checksum.to_be_bytes());
        out
    }

    /// Decode and verify a trailer codeword (L2 trust). `at` is the offset of
    /// the codeword, reported in errors.
    pub fn decode(bytes: &[u8; TRAILER_CODEWORD_SIZE], at: u64) -> RbfResult<Self> {
        let stored = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let actual = crc::compute(&bytes[4..]);
        if stored != actual {
            return Err(RbfError::TrailerCrcMismatch {
                offset: at,
                expected: stored,
                actual,
            });
        }

        let descriptor = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if descriptor & DESCRIPTOR_RESERVED_MASK != 0 {
            return Err(RbfError::ReservedBitsSet {
                offset: at,
                descriptor,
            });
        }
        let status = FrameStatus::from_padding(
            descriptor & DESCRIPTOR_TOMBSTONE != 0,
            ((descriptor & DESCRIPTOR_PADDING_MASK) >> DESCRIPTOR_PADDING_SHIFT) as usize,
        );

        Ok(Self {
            status,
            tag: FrameTag(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]])),
            tail_meta_len: (descriptor & DESCRIPTOR_TAIL_META_MASK) as u16,
            frame_len: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        })
    }

    /// Payload plus tail-meta length implied by this trailer, or `None` when
    /// the fields cannot describe a real frame.
    pub fn payload_and_meta_len(&self) -> Option<usize> {
        let body = (self.frame_len as usize)
            .checked_sub(FIXED_OVERHEAD)?
            .checked_sub(self.status.padding_len())?;
        if body < self.tail_meta_len as usize {
            return None;
        }
        Some(body)
    }
}

// ---------------------------------------------------------------------------
// Read views
// ---------------------------------------------------------------------------

/// Frame metadata established from the header and trailer codeword only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub ticket: SizedPtr,
    pub tag: FrameTag,
    pub payload_len: usize,
    pub tail_meta_len: usize,
    pub is_tombstone: bool,
}

impl FrameInfo {
    pub fn payload_and_meta_len(&self) -> usize {
        self.payload_len + self.tail_meta_len
    }
}

/// A fully verified frame borrowed from a caller buffer.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub ticket: SizedPtr,
    pub tag: FrameTag,
    pub payload: &'a [u8],
    pub tail_meta: &'a [u8],
    pub is_tombstone: bool,
}

impl<'a> Frame<'a> {
    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            ticket: self.ticket,
            tag: self.tag,
            payload_len: self.payload.len(),
            tail_meta_len: self.tail_meta.len(),
            is_tombstone: self.is_tombstone,
        }
    }
}
