// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - CRC32C (Castagnoli)
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reflected polynomial 0x82F63B78, initial value and final XOR both
// all-ones. The `crc32c` crate picks a hardware path when one exists.

/// CRC32C of `data`.
pub fn compute(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

/// Returns `true` when `data` checksums to `expected`.
pub fn verify(data: &[u8], expected: u32) -> bool {
    compute(data) == expected
}

/// Incremental CRC32C accumulator. Feeding the same bytes in any split
/// gives the same result as one call to [`compute`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32c {
    crc: u32,
}

impl Crc32c {
    pub fn new() -> Self {
        Self { crc: 0 }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.crc = crc32c::crc32c_append(self.crc, data);
    }

    pub fn finalize(self) -> u32 {
        self.crc
    }
}
