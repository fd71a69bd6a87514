// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - Addresses and frame tickets
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `Address` is a plain file offset. `SizedPtr` is the ticket handed back by
// every append: an `(offset, length)` pair packed into one `u64` so higher
// layers can store it in an 8-byte field.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RbfError, RbfResult};
use crate::layout::{align_down, is_aligned};

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A byte offset into a log. Offset 0 is the genesis fence and doubles as null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(u64);

impl Address {
    pub const NULL: Address = Address(0);

    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Non-null and 4-byte aligned.
    pub fn is_valid(self) -> bool {
        !self.is_null() && is_aligned(self.0)
    }

    pub fn align_down(self) -> Self {
        Self(align_down(self.0))
    }
}

impl TryFrom<i64> for Address {
    type Error = RbfError;

    fn try_from(value: i64) -> RbfResult<Self> {
        u64::try_from(value)
            .map(Address)
            .map_err(|_| RbfError::OutOfRange { value })
    }
}

impl From<Address> for u64 {
    fn from(address: Address) -> u64 {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:#x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SizedPtr
// ---------------------------------------------------------------------------

const OFFSET_BITS: u32 = 38;
const LENGTH_BITS: u32 = 26;
const ALIGN_SHIFT: u32 = 2;
const LENGTH_MASK: u64 = (1 << LENGTH_BITS) - 1;

/// A frame ticket: `(offset, length)` packed as
/// `(offset >> 2) << 26 | (length >> 2)`.
///
/// Both halves must be 4-byte aligned. The all-zero value is null and never
/// refers to a frame, since no frame can start at the genesis fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SizedPtr(u64);

impl SizedPtr {
    pub const NULL: SizedPtr = SizedPtr(0);
    /// Largest representable offset.
    pub const MAX_OFFSET: u64 = ((1u64 << OFFSET_BITS) - 1) << ALIGN_SHIFT;
    /// Largest representable length.
    pub const MAX_LEN: u64 = ((1u64 << LENGTH_BITS) - 1) << ALIGN_SHIFT;

    pub fn new(offset: u64, len: u64) -> RbfResult<Self> {
        if !is_aligned(offset) {
            return Err(RbfError::Misaligned { value: offset });
        }
        if !is_aligned(len) {
            return Err(RbfError::Misaligned { value: len });
        }
        if offset > Self::MAX_OFFSET || len > Self::MAX_LEN {
            return Err(RbfError::TicketTooLarge { offset, len });
        }
        Ok(Self(((offset >> ALIGN_SHIFT) << LENGTH_BITS) | (len >> ALIGN_SHIFT)))
    }

    /// Reinterpret a stored packed value. Any `u64` decodes to an aligned pair.
    pub const fn from_packed(packed: u64) -> Self {
        Self(packed)
    }

    pub const fn packed(self) -> u64 {
        self.0
    }

    pub const fn offset(self) -> u64 {
        (self.0 >> LENGTH_BITS) << ALIGN_SHIFT
    }

    pub const fn len(self) -> u64 {
        (self.0 & LENGTH_MASK) << ALIGN_SHIFT
    }

    /// One past the last byte of the frame (the position of its trailing fence).
    pub const fn end(self) -> u64 {
        self.offset() + self.len()
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }

    pub fn contains(self, position: u64) -> bool {
        position >= self.offset() && position < self.end()
    }

    pub fn address(self) -> Address {
        Address(self.offset())
    }
}

impl fmt::Display for SizedPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}+{}]", self.offset(), self.len())
    }
}
