// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - Reservable append writer
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `ReservableWriter` is a buffered, forward-only writer over a `Storage`.
// A caller can reserve a span now and fill it later; nothing at or after the
// first unfilled reservation is ever pushed to storage. While a CRC section
// is active every byte is folded into a running CRC32C exactly once, in file
// order. Bytes behind an unfilled reservation are folded when it is filled.

use tracing::debug;

use crate::crc::Crc32c;
use crate::error::{RbfError, RbfResult};
use crate::storage::Storage;

/// Handle to an open reservation. Consumed by `commit`/`fill`.
#[derive(Debug, PartialEq, Eq)]
pub struct ReservationToken {
    id: u64,
}

impl ReservationToken {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy)]
struct Reservation {
    id: u64,
    offset: u64,
    len: usize,
}

#[derive(Debug)]
struct CrcCursor {
    hasher: Crc32c,
    folded_to: u64,
}

/// Buffered append writer with span reservation and a running CRC.
pub struct ReservableWriter<S: Storage> {
    storage: S,
    /// Absolute offset of `buf[0]`; everything before it is in storage.
    base: u64,
    buf: Vec<u8>,
    /// Open reservations, ordered by offset.
    reservations: Vec<Reservation>,
    next_token: u64,
    crc: Option<CrcCursor>,
    flush_threshold: usize,
}

impl<S: Storage> ReservableWriter<S> {
    /// Wrap `storage`, appending from `start`.
    pub fn new(storage: S, start: u64, capacity: usize, flush_threshold: usize) -> Self {
        Self {
            storage,
            base: start,
            buf: Vec::with_capacity(capacity),
            reservations: Vec::new(),
            next_token: 1,
            crc: None,
            flush_threshold,
        }
    }

    /// Absolute offset of the next byte to be written.
    pub fn position(&self) -> u64 {
        self.base + self.buf.len() as u64
    }

    /// Offset up to which bytes have been pushed to storage.
    pub fn flushed_position(&self) -> u64 {
        self.base
    }

    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    pub fn open_reservations(&self) -> usize {
        self.reservations.len()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    // -----------------------------------------------------------------------
    // Writing
    // -----------------------------------------------------------------------

    pub fn write(&mut self, data: &[u8]) -> RbfResult<()> {
        self.buf.extend_from_slice(data);
        self.advance_crc();
        if self.buf.len() >= self.flush_threshold {
            self.push_ready()?;
        }
        Ok(())
    }

    /// Reserve `len` zeroed bytes at the current position.
    pub fn reserve(&mut self, len: usize) -> ReservationToken {
        let id = self.next_token;
        self.next_token += 1;
        let offset = self.position();
        self.buf.resize(self.buf.len() + len, 0);
        self.reservations.push(Reservation { id, offset, len });
        ReservationToken { id }
    }

    /// Mutable view of a reserved span.
    pub fn reservation_mut(&mut self, token: &ReservationToken) -> RbfResult<&mut [u8]> {
        let reservation = self.find(token.id)?;
        let start = (reservation.offset - self.base) as usize;
        Ok(&mut self.buf[start..start + reservation.len])
    }

    /// Close a reservation with whatever bytes it currently holds.
    pub fn commit(&mut self, token: ReservationToken) -> RbfResult<()> {
        let index = self
            .reservations
            .iter()
            .position(|r| r.id == token.id)
            .ok_or(RbfError::UnknownReservation { id: token.id })?;
        self.reservations.remove(index);
        self.advance_crc();
        Ok(())
    }

    /// Copy `bytes` into a reservation and close it.
    pub fn fill(&mut self, token: ReservationToken, bytes: &[u8]) -> RbfResult<()> {
        let span = self.reservation_mut(&token)?;
        if span.len() != bytes.len() {
            return Err(RbfError::ReservationSizeMismatch {
                expected: span.len(),
                actual: bytes.len(),
            });
        }
        span.copy_from_slice(bytes);
        self.commit(token)
    }

    /// Overwrite already-written, still-buffered bytes at `position`.
    pub fn patch(&mut self, position: u64, bytes: &[u8]) -> RbfResult<()> {
        if position < self.base || position + bytes.len() as u64 > self.position() {
            return Err(RbfError::AlreadyFlushed {
                position,
                flushed: self.base,
            });
        }
        let start = (position - self.base) as usize;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Discard every buffered byte at or after `position`, together with the
    /// reservations and CRC section that covered them.
    pub fn rollback_to(&mut self, position: u64) -> RbfResult<()> {
        if position < self.base || position > self.position() {
            return Err(RbfError::AlreadyFlushed {
                position,
                flushed: self.base,
            });
        }
        let dropped = self.position() - position;
        self.buf.truncate((position - self.base) as usize);
        self.reservations.retain(|r| r.offset < position);
        self.crc = None;
        debug!(position, dropped, "Rolled back unflushed bytes");
        Ok(())
    }

    fn find(&self, id: u64) -> RbfResult<Reservation> {
        self.reservations
            .iter()
            .find(|r| r.id == id)
            .copied()
            .ok_or(RbfError::UnknownReservation { id })
    }

    // -----------------------------------------------------------------------
    // Running CRC
    // -----------------------------------------------------------------------

    /// Start folding bytes from the current position.
    pub fn begin_crc(&mut self) {
        self.crc = Some(CrcCursor {
            hasher: Crc32c::new(),
            folded_to: self.position(),
        });
    }

    /// Re-fold from `from`, which must still be buffered. Used after `patch`.
    pub fn restart_crc(&mut self, from: u64) -> RbfResult<()> {
        if from < self.base {
            return Err(RbfError::AlreadyFlushed {
                position: from,
                flushed: self.base,
            });
        }
        self.crc = Some(CrcCursor {
            hasher: Crc32c::new(),
            folded_to: from,
        });
        self.advance_crc();
        Ok(())
    }

    /// End the CRC section and return its checksum. Fails while a
    /// reservation inside the section is still open.
    pub fn finish_crc(&mut self) -> RbfResult<u32> {
        self.advance_crc();
        let position = self.position();
        let pending = self.reservations.len();
        match self.crc.take() {
            Some(cursor) if cursor.folded_to == position => Ok(cursor.hasher.finalize()),
            Some(cursor) => {
                self.crc = Some(cursor);
                Err(RbfError::PendingReservations { count: pending })
            }
            None => Ok(Crc32c::new().finalize()),
        }
    }

    fn advance_crc(&mut self) {
        let base = self.base;
        let end = self.position();
        let Some(cursor) = self.crc.as_mut() else {
            return;
        };
        let stop = self
            .reservations
            .iter()
            .map(|r| r.offset)
            .find(|&offset| offset >= cursor.folded_to)
            .unwrap_or(end);
        if stop > cursor.folded_to {
            let from = (cursor.folded_to - base) as usize;
            let to = (stop - base) as usize;
            cursor.hasher.update(&self.buf[from..to]);
            cursor.folded_to = stop;
        }
    }

    // -----------------------------------------------------------------------
    // Pushing to storage
    // -----------------------------------------------------------------------

    /// The end of the prefix that may be pushed: stops at the first open
    /// reservation and at the CRC cursor.
    fn pushable_end(&self) -> u64 {
        let mut end = self.position();
        if let Some(first) = self.reservations.first() {
            end = end.min(first.offset);
        }
        if let Some(cursor) = &self.crc {
            end = end.min(cursor.folded_to);
        }
        end
    }

    fn push_ready(&mut self) -> RbfResult<()> {
        let end = self.pushable_end();
        if end <= self.base {
            return Ok(());
        }
        let n = (end - self.base) as usize;
        self.storage.write_at(self.base, &self.buf[..n])?;
        self.buf.drain(..n);
        self.base = end;
        Ok(())
    }

    /// Push every pushable byte and flush the store.
    pub fn flush(&mut self) -> RbfResult<()> {
        self.push_ready()?;
        self.storage.flush()
    }

    /// Flush, then make the store durable.
    pub fn sync(&mut self) -> RbfResult<()> {
        self.flush()?;
        self.storage.sync()
    }

    /// Cut the store to `len`. Requires an empty buffer.
    pub fn truncate(&mut self, len: u64) -> RbfResult<()> {
        self.flush()?;
        if !self.buf.is_empty() || !self.reservations.is_empty() {
            return Err(RbfError::PendingReservations {
                count: self.reservations.len(),
            });
        }
        self.storage.truncate(len)?;
        self.base = len;
        self.crc = None;
        Ok(())
    }

    /// Cut back to `position` whether or not the bytes after it already
    /// reached the store. Unlike `truncate` this never flushes first, so it
    /// can undo a write whose flush failed.
    pub fn rewind_to(&mut self, position: u64) -> RbfResult<()> {
        if position >= self.base {
            return self.rollback_to(position);
        }
        self.buf.clear();
        self.reservations.clear();
        self.crc = None;
        self.storage.truncate(position)?;
        self.base = position;
        debug!(position, "Rewound pushed bytes");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc;
    use crate::storage::MemoryStorage;

    fn writer(threshold: usize) -> (ReservableWriter<MemoryStorage>, MemoryStorage) {
        let storage = MemoryStorage::new();
        let view = storage.clone();
        (ReservableWriter::new(storage, 0, 64, threshold), view)
    }

    #[test]
    fn test_write_and_flush() {
        let (mut w, view) = writer(1024);
        w.write(b"hello").unwrap();
        assert_eq!(view.snapshot(), b"");
        w.flush().unwrap();
        assert_eq!(view.snapshot(), b"hello");
        assert_eq!(w.position(), 5);
        assert_eq!(w.flushed_position(), 5);
    }

    #[test]
    fn test_reservation_blocks_flush() {
        let (mut w, view) = writer(1024);
        w.write(b"ab").unwrap();
        let token = w.reserve(4);
        w.write(b"cd").unwrap();
        w.flush().unwrap();
        assert_eq!(view.snapshot(), b"ab");

        w.fill(token, b"WXYZ").unwrap();
        w.flush().unwrap();
        assert_eq!(view.snapshot(), b"abWXYZcd");
        assert_eq!(w.open_reservations(), 0);
    }

    #[test]
    fn test_threshold_never_crosses_reservation() {
        let (mut w, view) = writer(4);
        let token = w.reserve(4);
        w.write(&[1u8; 32]).unwrap();
        assert_eq!(view.snapshot(), b"");
        w.fill(token, &[9u8; 4]).unwrap();
        w.write(&[2u8; 4]).unwrap();
        assert_eq!(view.snapshot().len(), 40);
    }

    #[test]
    fn test_reservation_mut_then_commit() {
        let (mut w, view) = writer(1024);
        let token = w.reserve(2);
        w.reservation_mut(&token).unwrap().copy_from_slice(b"ok");
        w.commit(token).unwrap();
        w.flush().unwrap();
        assert_eq!(view.snapshot(), b"ok");
    }

    #[test]
    fn test_fill_size_mismatch() {
        let (mut w, _) = writer(1024);
        let token = w.reserve(4);
        assert!(matches!(
            w.fill(token, b"abc"),
            Err(RbfError::ReservationSizeMismatch { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_crc_skips_open_reservation_until_filled() {
        let (mut w, _) = writer(1024);
        let head = w.reserve(4);
        w.begin_crc();
        w.write(b"tag!").unwrap();
        let inner = w.reserve(2);
        w.write(b"body").unwrap();
        assert!(matches!(w.finish_crc(), Err(RbfError::PendingReservations { .. })));

        w.fill(inner, b"xy").unwrap();
        let checksum = w.finish_crc().unwrap();
        assert_eq!(checksum, crc::compute(b"tag!xybody"));
        w.fill(head, &[0u8; 4]).unwrap();
    }

    #[test]
    fn test_crc_restart_after_patch() {
        let (mut w, _) = writer(1024);
        let _head = w.reserve(4);
        w.begin_crc();
        w.write(b"AAAApayload").unwrap();
        w.patch(4, b"BBBB").unwrap();
        w.restart_crc(4).unwrap();
        assert_eq!(w.finish_crc().unwrap(), crc::compute(b"BBBBpayload"));
    }

    #[test]
    fn test_rollback_discards_unflushed() {
        let (mut w, view) = writer(1024);
        w.write(b"keep").unwrap();
        w.flush().unwrap();
        let _token = w.reserve(4);
        w.begin_crc();
        w.write(b"discard me").unwrap();
        w.rollback_to(4).unwrap();
        assert_eq!(w.position(), 4);
        assert_eq!(w.open_reservations(), 0);
        w.flush().unwrap();
        assert_eq!(view.snapshot(), b"keep");
        assert!(matches!(w.rollback_to(2), Err(RbfError::AlreadyFlushed { .. })));
    }

    #[test]
    fn test_rewind_cuts_pushed_bytes() {
        let (mut w, view) = writer(1024);
        w.write(b"keep").unwrap();
        w.flush().unwrap();
        w.write(b"pushed").unwrap();
        w.flush().unwrap();
        w.write(b"buffered").unwrap();

        w.rewind_to(4).unwrap();
        assert_eq!(w.position(), 4);
        assert_eq!(w.flushed_position(), 4);
        assert_eq!(view.snapshot(), b"keep");

        w.write(b"next").unwrap();
        w.flush().unwrap();
        assert_eq!(view.snapshot(), b"keepnext");
    }

    #[test]
    fn test_unknown_token() {
        let (mut w, _) = writer(1024);
        let token = w.reserve(1);
        let id = token.id();
        w.commit(token).unwrap();
        assert!(matches!(
            w.commit(ReservationToken { id }),
            Err(RbfError::UnknownReservation { .. })
        ));
    }

    #[test]
    fn test_sync_reaches_storage() {
        let (mut w, view) = writer(1024);
        w.write(b"data").unwrap();
        w.sync().unwrap();
        assert_eq!(view.sync_count(), 1);
        assert_eq!(view.snapshot(), b"data");
    }
}
