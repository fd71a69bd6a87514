// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - Page cache for backward reads
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The reverse scanner reads a fence, a trailer and a header for every
// candidate frame, and steps back four bytes at a time while resyncing.
// `ReverseReadCache` keeps a handful of 4 KiB pages so those small reads hit
// memory instead of each issuing a syscall. Eviction is clock
// (second chance). Reads spanning more than two pages bypass the cache.

use crate::error::{RbfError, RbfResult};
use crate::storage::Storage;

pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
pub const MIN_SLOTS: usize = 2;
pub const MAX_SLOTS: usize = 64;

/// Counters collected by a [`ReverseReadCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Page lookups served from memory.
    pub hits: u64,
    /// Page lookups that loaded from storage.
    pub misses: u64,
    /// Reads too large for the cache, sent straight to storage.
    pub passthrough_reads: u64,
    /// Bytes loaded from storage.
    pub bytes_loaded: u64,
}

struct Slot {
    page: u64,
    data: Vec<u8>,
    referenced: bool,
}

/// Read-through page cache over a borrowed store, bounded by `limit`.
pub struct ReverseReadCache<'a, S: Storage + ?Sized> {
    storage: &'a S,
    limit: u64,
    slots: Vec<Slot>,
    capacity: usize,
    hand: usize,
    stats: ReadStats,
}

impl<'a, S: Storage + ?Sized> ReverseReadCache<'a, S> {
    /// Cache reads of `storage` below `limit` using up to `slots` pages.
    pub fn new(storage: &'a S, limit: u64, slots: usize) -> Self {
        let capacity = slots.clamp(MIN_SLOTS, MAX_SLOTS);
        Self {
            storage,
            limit,
            slots: Vec::with_capacity(capacity),
            capacity,
            hand: 0,
            stats: ReadStats::default(),
        }
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Read exactly `buf.len()` bytes at `offset`; the range must end at or
    /// before `limit`.
    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> RbfResult<()> {
        let end = offset + buf.len() as u64;
        if end > self.limit {
            return Err(RbfError::ShortRead {
                offset,
                expected: buf.len(),
                actual: self.limit.saturating_sub(offset) as usize,
            });
        }
        if buf.is_empty() {
            return Ok(());
        }

        let first_page = offset >> PAGE_SHIFT;
        let last_page = (end - 1) >> PAGE_SHIFT;
        if last_page - first_page > 1 {
            self.stats.passthrough_reads += 1;
            return self.storage.read_exact_at(offset, buf);
        }

        let mut copied = 0usize;
        for page in first_page..=last_page {
            let page_start = page << PAGE_SHIFT;
            let from = (offset + copied as u64 - page_start) as usize;
            let slot = self.slot_for(page)?;
            let data = &self.slots[slot].data;
            let n = (buf.len() - copied).min(data.len().saturating_sub(from));
            if n == 0 {
                return Err(RbfError::ShortRead {
                    offset,
                    expected: buf.len(),
                    actual: copied,
                });
            }
            buf[copied..copied + n].copy_from_slice(&data[from..from + n]);
            copied += n;
        }
        Ok(())
    }

    fn slot_for(&mut self, page: u64) -> RbfResult<usize> {
        if let Some(index) = self.slots.iter().position(|s| s.page == page) {
            self.stats.hits += 1;
            self.slots[index].referenced = true;
            return Ok(index);
        }

        self.stats.misses += 1;
        let page_start = page << PAGE_SHIFT;
        let valid = (self.limit - page_start).min(PAGE_SIZE as u64) as usize;
        let mut data = vec![0u8; valid];
        self.storage.read_exact_at(page_start, &mut data)?;
        self.stats.bytes_loaded += valid as u64;

        let slot = Slot {
            page,
            data,
            referenced: true,
        };
        if self.slots.len() < self.capacity {
            self.slots.push(slot);
            return Ok(self.slots.len() - 1);
        }
        let victim = self.pick_victim();
        self.slots[victim] = slot;
        Ok(victim)
    }

    fn pick_victim(&mut self) -> usize {
        loop {
            let index = self.hand;
            self.hand = (self.hand + 1) % self.capacity;
            if self.slots[index].referenced {
                self.slots[index].referenced = false;
            } else {
                return index;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn patterned(len: usize) -> MemoryStorage {
        MemoryStorage::from_bytes((0..len).map(|i| (i % 251) as u8).collect())
    }

    #[test]
    fn test_reads_match_storage() {
        let storage = patterned(3 * PAGE_SIZE + 100);
        let limit = storage.len().unwrap();
        let mut cache = ReverseReadCache::new(&storage, limit, 4);
        for &(offset, len) in &[(0u64, 4usize), (4090, 16), (PAGE_SIZE as u64 * 3, 100), (12, 3000)] {
            let mut got = vec![0u8; len];
            cache.read_exact_at(offset, &mut got).unwrap();
            let mut want = vec![0u8; len];
            storage.read_exact_at(offset, &mut want).unwrap();
            assert_eq!(got, want, "offset={offset} len={len}");
        }
    }

    #[test]
    fn test_backward_reads_hit_cache() {
        let storage = patterned(PAGE_SIZE);
        let mut cache = ReverseReadCache::new(&storage, PAGE_SIZE as u64, 2);
        let mut word = [0u8; 4];
        let mut offset = PAGE_SIZE as u64 - 4;
        loop {
            cache.read_exact_at(offset, &mut word).unwrap();
            if offset == 0 {
                break;
            }
            offset -= 4;
        }
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, (PAGE_SIZE / 4 - 1) as u64);
    }

    #[test]
    fn test_read_past_limit_is_short() {
        let storage = patterned(64);
        let mut cache = ReverseReadCache::new(&storage, 32, 2);
        let mut buf = [0u8; 8];
        assert!(matches!(
            cache.read_exact_at(28, &mut buf),
            Err(RbfError::ShortRead { actual: 4, .. })
        ));
    }

    #[test]
    fn test_large_read_passes_through() {
        let storage = patterned(4 * PAGE_SIZE);
        let mut cache = ReverseReadCache::new(&storage, 4 * PAGE_SIZE as u64, 2);
        let mut buf = vec![0u8; 3 * PAGE_SIZE];
        cache.read_exact_at(10, &mut buf).unwrap();
        assert_eq!(cache.stats().passthrough_reads, 1);
        assert_eq!(buf[0], 10);
    }

    #[test]
    fn test_eviction_keeps_results_correct() {
        let storage = patterned(8 * PAGE_SIZE);
        let mut cache = ReverseReadCache::new(&storage, 8 * PAGE_SIZE as u64, 2);
        for page in (0..8u64).rev() {
            let mut buf = [0u8; 1];
            let offset = page * PAGE_SIZE as u64 + 7;
            cache.read_exact_at(offset, &mut buf).unwrap();
            assert_eq!(buf[0], (offset % 251) as u8);
        }
        assert_eq!(cache.stats().misses, 8);
    }
}
