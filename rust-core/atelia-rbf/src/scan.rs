// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - Reverse scan with resync
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Walks a log from its tail back to the genesis fence. The candidate
// trailing fence starts at the aligned tail. For each candidate:
//
// 1. the four bytes must be the fence magic;
// 2. the trailer codeword before it must pass its CRC and reserved-bit
//    checks and give an aligned length of at least the minimum frame;
// 3. the implied frame start must be aligned, at or after the genesis
//    fence, preceded by a fence, and carry a matching `HeadLen`/tag.
//
// A candidate that passes is yielded and the scan continues from the
// frame's leading fence. One that fails is damage: the scan steps back
// four bytes and retries. Damage never raises an error; it is reported
// through `ScanOutcome` once the scan reaches offset 0.

use tracing::{debug, warn};

use crate::cache::{ReadStats, ReverseReadCache};
use crate::error::{RbfError, RbfResult};
use crate::frame::{FrameInfo, TrailerCodeword};
use crate::layout::{
    align_down, is_aligned, FENCE_BYTES, FENCE_LEN, GENESIS_LEN, MIN_FRAME_LEN,
    TRAILER_CODEWORD_SIZE,
};
use crate::ptr::SizedPtr;
use crate::reader::read_frame_info;
use crate::storage::Storage;

/// How a finished reverse scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every byte between the tail and genesis belonged to a valid frame.
    Genesis,
    /// Damaged bytes were skipped on the way to genesis.
    Corrupted {
        /// Fence end of the nearest valid frame below the damage closest to
        /// the tail (the genesis length when no such frame exists). Cutting
        /// the log here drops the torn tail.
        boundary: u64,
        /// Total bytes stepped over while resyncing.
        skipped_bytes: u64,
    },
}

/// Iterator over frames from tail to genesis.
///
/// Yields `Err` only for I/O failures, after which it is exhausted.
pub struct ReverseScan<'a, S: Storage + ?Sized> {
    cache: ReverseReadCache<'a, S>,
    cursor: u64,
    show_tombstones: bool,
    damaged: bool,
    boundary: Option<u64>,
    skipped: u64,
    yielded: u64,
    /// Start of the damaged run being stepped over, and its length so far.
    run: Option<(u64, u64)>,
    runs: u64,
    outcome: Option<ScanOutcome>,
    failed: bool,
}

impl<'a, S: Storage + ?Sized> ReverseScan<'a, S> {
    /// Scan `storage` backwards from `tail`.
    pub fn new(storage: &'a S, tail: u64, show_tombstones: bool, cache_pages: usize) -> Self {
        let aligned = align_down(tail);
        let torn = tail - aligned;
        Self {
            cache: ReverseReadCache::new(storage, tail, cache_pages),
            cursor: aligned.saturating_sub(FENCE_LEN as u64),
            show_tombstones,
            damaged: torn > 0,
            boundary: None,
            skipped: torn,
            yielded: 0,
            run: (torn > 0).then_some((tail, torn)),
            runs: u64::from(torn > 0),
            outcome: None,
            failed: false,
        }
    }

    /// `None` until the iterator is exhausted, or if it stopped on an I/O error.
    pub fn outcome(&self) -> Option<ScanOutcome> {
        self.outcome
    }

    pub fn stats(&self) -> ReadStats {
        self.cache.stats()
    }

    /// Number of separate damaged regions stepped over so far.
    pub fn damaged_runs(&self) -> u64 {
        self.runs
    }

    fn enter_damage(&mut self, error: &RbfError) {
        match &mut self.run {
            Some((_, skipped)) => *skipped += FENCE_LEN as u64,
            None => {
                warn!(offset = self.cursor, %error, "Reverse scan hit damaged bytes");
                self.run = Some((self.cursor + FENCE_LEN as u64, FENCE_LEN as u64));
                self.runs += 1;
            }
        }
    }

    fn leave_damage(&mut self, resynced_at: u64) {
        if let Some((from, skipped_bytes)) = self.run.take() {
            warn!(from, resynced_at, skipped_bytes, "Reverse scan resynced");
        }
    }

    /// Validate the frame whose trailing fence would sit at `fence_at`.
    fn check_candidate(&mut self, fence_at: u64) -> RbfResult<FrameInfo> {
        if fence_at < GENESIS_LEN + MIN_FRAME_LEN as u64 {
            return Err(RbfError::InvalidFrameLength {
                offset: fence_at,
                len: 0,
            });
        }

        let mut fence = [0u8; FENCE_LEN];
        self.cache.read_exact_at(fence_at, &mut fence)?;
        if fence != FENCE_BYTES {
            return Err(RbfError::FenceMismatch { offset: fence_at });
        }

        let trailer_at = fence_at - TRAILER_CODEWORD_SIZE as u64;
        let mut trailer = [0u8; TRAILER_CODEWORD_SIZE];
        self.cache.read_exact_at(trailer_at, &mut trailer)?;
        let codeword = TrailerCodeword::decode(&trailer, trailer_at)?;

        let frame_len = codeword.frame_len as u64;
        if frame_len < MIN_FRAME_LEN as u64
            || !is_aligned(frame_len)
            || frame_len > fence_at - GENESIS_LEN
        {
            return Err(RbfError::InvalidFrameLength {
                offset: trailer_at,
                len: frame_len,
            });
        }

        let ticket = SizedPtr::new(fence_at - frame_len, frame_len)?;
        read_frame_info(&mut self.cache, ticket)
    }

    fn finish(&mut self) {
        self.leave_damage(0);
        let outcome = if self.damaged {
            ScanOutcome::Corrupted {
                boundary: self.boundary.unwrap_or(GENESIS_LEN),
                skipped_bytes: self.skipped,
            }
        } else {
            ScanOutcome::Genesis
        };
        debug!(frames = self.yielded, ?outcome, "Reverse scan finished");
        self.outcome = Some(outcome);
    }
}

impl<S: Storage + ?Sized> Iterator for ReverseScan<'_, S> {
    type Item = RbfResult<FrameInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.outcome.is_some() || self.failed {
                return None;
            }
            if self.cursor == 0 {
                self.finish();
                return None;
            }

            match self.check_candidate(self.cursor) {
                Ok(info) => {
                    if self.damaged && self.boundary.is_none() {
                        self.boundary = Some(self.cursor + FENCE_LEN as u64);
                    }
                    self.leave_damage(self.cursor + FENCE_LEN as u64);
                    self.cursor = info.ticket.offset() - FENCE_LEN as u64;
                    if info.is_tombstone && !self.show_tombstones {
                        continue;
                    }
                    self.yielded += 1;
                    return Some(Ok(info));
                }
                Err(error) if error.is_corruption() => {
                    self.enter_damage(&error);
                    self.damaged = true;
                    self.skipped += FENCE_LEN as u64;
                    self.cursor -= FENCE_LEN as u64;
                }
                Err(error) => {
                    self.failed = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RbfOptions;
    use crate::file::RbfFile;
    use crate::frame::FrameTag;
    use crate::storage::MemoryStorage;

    fn build(count: u32) -> (MemoryStorage, Vec<SizedPtr>) {
        let storage = MemoryStorage::new();
        let mut file = RbfFile::create(storage.clone(), RbfOptions::default()).unwrap();
        let tickets = (0..count)
            .map(|i| {
                let payload = vec![i as u8; (i as usize * 7) % 23];
                file.append(FrameTag(i), &payload).unwrap()
            })
            .collect();
        (storage, tickets)
    }

    fn scan_all(storage: &MemoryStorage) -> (Vec<FrameInfo>, Option<ScanOutcome>) {
        let tail = storage.len().unwrap();
        let mut scan = ReverseScan::new(storage, tail, false, 4);
        let frames = scan.by_ref().map(|r| r.unwrap()).collect();
        (frames, scan.outcome())
    }

    #[test]
    fn test_empty_log_reaches_genesis() {
        let (storage, _) = build(0);
        let (frames, outcome) = scan_all(&storage);
        assert!(frames.is_empty());
        assert_eq!(outcome, Some(ScanOutcome::Genesis));
    }

    #[test]
    fn test_reverse_order_matches_tickets() {
        let (storage, tickets) = build(10);
        let (frames, outcome) = scan_all(&storage);
        let scanned: Vec<SizedPtr> = frames.iter().map(|f| f.ticket).collect();
        let expected: Vec<SizedPtr> = tickets.into_iter().rev().collect();
        assert_eq!(scanned, expected);
        assert_eq!(outcome, Some(ScanOutcome::Genesis));
    }

    #[test]
    fn test_torn_tail_is_invisible() {
        let (storage, tickets) = build(3);
        let clean_len = storage.len().unwrap();
        storage.modify(|bytes| bytes.extend_from_slice(&[0xAB; 11]));

        let (frames, outcome) = scan_all(&storage);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].ticket, tickets[2]);
        assert_eq!(
            outcome,
            Some(ScanOutcome::Corrupted {
                boundary: clean_len,
                skipped_bytes: 11,
            })
        );
    }

    #[test]
    fn test_half_written_frame_is_skipped() {
        let (storage, tickets) = build(2);
        let clean_len = storage.len().unwrap();
        // Append a complete frame, then chop its last 6 bytes.
        let mut file = RbfFile::open(storage.clone(), RbfOptions::default()).unwrap();
        file.append(FrameTag(99), b"doomed payload").unwrap();
        drop(file);
        storage.modify(|bytes| {
            let len = bytes.len();
            bytes.truncate(len - 6);
        });

        let (frames, outcome) = scan_all(&storage);
        let scanned: Vec<SizedPtr> = frames.iter().map(|f| f.ticket).collect();
        assert_eq!(scanned, vec![tickets[1], tickets[0]]);
        match outcome {
            Some(ScanOutcome::Corrupted { boundary, .. }) => assert_eq!(boundary, clean_len),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_mid_log_trailer_damage_resyncs_to_earlier_frames() {
        let (storage, tickets) = build(5);
        let damaged_trailer = tickets[2].end() as usize - 8;
        storage.modify(|bytes| bytes[damaged_trailer] ^= 0x40);

        let (frames, outcome) = scan_all(&storage);
        let scanned: Vec<SizedPtr> = frames.iter().map(|f| f.ticket).collect();
        assert_eq!(scanned, vec![tickets[4], tickets[3], tickets[1], tickets[0]]);
        match outcome {
            Some(ScanOutcome::Corrupted { boundary, skipped_bytes }) => {
                assert_eq!(boundary, tickets[1].end() + 4);
                assert_eq!(skipped_bytes, tickets[2].len() + 4);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_each_damaged_region_counts_once() {
        let (storage, tickets) = build(5);
        let damaged_trailer = tickets[2].end() as usize - 8;
        storage.modify(|bytes| {
            bytes[damaged_trailer] ^= 0x40;
            bytes.extend_from_slice(&[0xCD; 64]);
        });

        let tail = storage.len().unwrap();
        let mut scan = ReverseScan::new(&storage, tail, false, 4);
        assert_eq!(scan.by_ref().count(), 4);
        assert_eq!(scan.damaged_runs(), 2);
        match scan.outcome() {
            Some(ScanOutcome::Corrupted { skipped_bytes, .. }) => {
                assert_eq!(skipped_bytes, 64 + tickets[2].len() + 4);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_tombstone_filter() {
        let storage = MemoryStorage::new();
        let mut file = RbfFile::create(storage.clone(), RbfOptions::default()).unwrap();
        let first = file.append(FrameTag(1), b"a").unwrap();
        let aborted = {
            let builder = file.begin_frame(FrameTag(2)).unwrap();
            builder.abort().unwrap()
        };
        let last = file.append(FrameTag(3), b"c").unwrap();

        let visible: Vec<SizedPtr> = file.scan_reverse(false).map(|r| r.unwrap().ticket).collect();
        assert_eq!(visible, vec![last, first]);
        let all: Vec<SizedPtr> = file.scan_reverse(true).map(|r| r.unwrap().ticket).collect();
        assert_eq!(all, vec![last, aborted, first]);
    }

    #[test]
    fn test_garbage_only_file_ends_at_genesis_boundary() {
        let mut bytes = b"RBF1".to_vec();
        bytes.extend((0..200u32).map(|i| (i * 37 % 256) as u8));
        let storage = MemoryStorage::from_bytes(bytes);
        let (frames, outcome) = scan_all(&storage);
        assert!(frames.is_empty());
        assert_eq!(
            outcome,
            Some(ScanOutcome::Corrupted {
                boundary: GENESIS_LEN,
                skipped_bytes: 200,
            })
        );
    }
}
