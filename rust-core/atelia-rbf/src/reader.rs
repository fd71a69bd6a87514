// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - Random frame reads
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reads by ticket at two trust levels:
//
// - L2 (`read_frame_info`, `read_tail_meta`): leading fence, head length,
//   trailer codeword checksum and the redundant length/tag copies.
// - L3 (`read_frame`): everything in L2 plus the payload CRC. Required
//   before trusting payload bytes.
//
// `RbfReader` is a read-only view over a store, typically a second handle
// on a log that another `RbfFile` is appending to.

use std::path::Path;

use tracing::info;

use crate::cache::ReverseReadCache;
use crate::config::RbfOptions;
use crate::crc;
use crate::error::{RbfError, RbfResult};
use crate::frame::{Frame, FrameInfo, TrailerCodeword};
use crate::layout::{
    is_aligned, FENCE_BYTES, FENCE_LEN, GENESIS_LEN, MIN_FRAME_LEN, PAYLOAD_CRC_SIZE,
    PAYLOAD_OFFSET, TAG_OFFSET, TRAILER_CODEWORD_SIZE,
};
use crate::pool::{BufferPool, PooledFrame, PooledTailMeta};
use crate::ptr::SizedPtr;
use crate::scan::ReverseScan;
use crate::storage::{FileStorage, Storage};

// ---------------------------------------------------------------------------
// Byte sources
// ---------------------------------------------------------------------------

/// Something frame bytes can be read from: a store, or a page cache over one.
pub(crate) trait ByteSource {
    fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> RbfResult<()>;
}

impl<S: Storage + ?Sized> ByteSource for &S {
    fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> RbfResult<()> {
        (**self).read_exact_at(offset, buf)
    }
}

impl<S: Storage + ?Sized> ByteSource for ReverseReadCache<'_, S> {
    fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> RbfResult<()> {
        self.read_exact_at(offset, buf)
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Check the genesis fence and return the store length.
pub(crate) fn validate_genesis<S: Storage + ?Sized>(
    storage: &S,
    require_aligned_len: bool,
) -> RbfResult<u64> {
    let len = storage.len()?;
    if len < GENESIS_LEN {
        return Err(RbfError::NotAnRbfFile {
            reason: format!("{len} bytes is shorter than the genesis fence"),
        });
    }
    if require_aligned_len && !is_aligned(len) {
        return Err(RbfError::NotAnRbfFile {
            reason: format!("length {len} is not 4-byte aligned"),
        });
    }
    let mut fence = [0u8; FENCE_LEN];
    storage.read_exact_at(0, &mut fence)?;
    if fence != FENCE_BYTES {
        return Err(RbfError::NotAnRbfFile {
            reason: "missing genesis fence".to_string(),
        });
    }
    Ok(len)
}

/// A ticket may only address a whole frame, fence included, below `tail`.
pub(crate) fn check_ticket(ticket: SizedPtr, tail: u64) -> RbfResult<()> {
    if ticket.offset() < GENESIS_LEN
        || ticket.len() < MIN_FRAME_LEN as u64
        || ticket.end() + FENCE_LEN as u64 > tail
    {
        return Err(RbfError::TicketOutOfBounds {
            offset: ticket.offset(),
            len: ticket.len(),
            tail,
        });
    }
    Ok(())
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Cross-check the frame header (`Fence | HeadLen | Tag`) against its
/// trailer codeword.
fn parse_frame_info(
    ticket: SizedPtr,
    head: &[u8; 12],
    trailer: &[u8; TRAILER_CODEWORD_SIZE],
) -> RbfResult<FrameInfo> {
    let start = ticket.offset();
    if head[..FENCE_LEN] != FENCE_BYTES {
        return Err(RbfError::FenceMismatch {
            offset: start - FENCE_LEN as u64,
        });
    }
    let head_len = le_u32(&head[4..8]) as u64;
    if head_len != ticket.len() {
        return Err(RbfError::LengthMismatch {
            offset: start,
            expected: ticket.len(),
            found: head_len,
        });
    }

    let codeword = TrailerCodeword::decode(trailer, ticket.end() - TRAILER_CODEWORD_SIZE as u64)?;
    if codeword.frame_len as u64 != ticket.len() {
        return Err(RbfError::LengthMismatch {
            offset: start,
            expected: ticket.len(),
            found: codeword.frame_len as u64,
        });
    }
    let header_tag = le_u32(&head[8..12]);
    if header_tag != codeword.tag.value() {
        return Err(RbfError::TagMismatch {
            offset: start,
            header: header_tag,
            trailer: codeword.tag.value(),
        });
    }
    let body = codeword
        .payload_and_meta_len()
        .ok_or(RbfError::InvalidFrameLength {
            offset: start,
            len: ticket.len(),
        })?;
    let tail_meta_len = codeword.tail_meta_len as usize;

    Ok(FrameInfo {
        ticket,
        tag: codeword.tag,
        payload_len: body - tail_meta_len,
        tail_meta_len,
        is_tombstone: codeword.status.is_tombstone(),
    })
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// L2 read of a frame's metadata.
pub(crate) fn read_frame_info<B: ByteSource>(src: &mut B, ticket: SizedPtr) -> RbfResult<FrameInfo> {
    let mut head = [0u8; 12];
    src.read_bytes(ticket.offset() - FENCE_LEN as u64, &mut head)?;
    let mut trailer = [0u8; TRAILER_CODEWORD_SIZE];
    src.read_bytes(ticket.end() - TRAILER_CODEWORD_SIZE as u64, &mut trailer)?;
    parse_frame_info(ticket, &head, &trailer)
}

/// L3 read of a whole frame into `buf`, which must hold `ticket.len()` bytes.
pub(crate) fn read_frame_into<'b, B: ByteSource>(
    src: &mut B,
    ticket: SizedPtr,
    buf: &'b mut [u8],
) -> RbfResult<Frame<'b>> {
    let len = ticket.len() as usize;
    if buf.len() < len {
        return Err(RbfError::BufferTooSmall {
            needed: len,
            available: buf.len(),
        });
    }
    let start = ticket.offset();

    let mut head = [0u8; 12];
    src.read_bytes(start - FENCE_LEN as u64, &mut head[..FENCE_LEN])?;
    let frame: &'b mut [u8] = &mut buf[..len];
    src.read_bytes(start, frame)?;
    let frame: &'b [u8] = frame;

    head[FENCE_LEN..].copy_from_slice(&frame[..PAYLOAD_OFFSET]);
    let mut trailer = [0u8; TRAILER_CODEWORD_SIZE];
    trailer.copy_from_slice(&frame[len - TRAILER_CODEWORD_SIZE..]);
    let info = parse_frame_info(ticket, &head, &trailer)?;

    let crc_at = len - TRAILER_CODEWORD_SIZE - PAYLOAD_CRC_SIZE;
    let expected = le_u32(&frame[crc_at..crc_at + PAYLOAD_CRC_SIZE]);
    let actual = crc::compute(&frame[TAG_OFFSET..crc_at]);
    if expected != actual {
        return Err(RbfError::PayloadCrcMismatch {
            offset: start,
            expected,
            actual,
        });
    }

    let payload_end = PAYLOAD_OFFSET + info.payload_len;
    let body_end = payload_end + info.tail_meta_len;
    if frame[body_end..crc_at].iter().any(|&b| b != 0) {
        return Err(RbfError::NonZeroPadding { offset: start });
    }
    Ok(Frame {
        ticket,
        tag: info.tag,
        payload: &frame[PAYLOAD_OFFSET..payload_end],
        tail_meta: &frame[payload_end..payload_end + info.tail_meta_len],
        is_tombstone: info.is_tombstone,
    })
}

/// L2 read of a frame's tail-meta into `buf`.
pub(crate) fn read_tail_meta_into<'b, B: ByteSource>(
    src: &mut B,
    ticket: SizedPtr,
    buf: &'b mut [u8],
) -> RbfResult<(FrameInfo, &'b [u8])> {
    let info = read_frame_info(src, ticket)?;
    if buf.len() < info.tail_meta_len {
        return Err(RbfError::BufferTooSmall {
            needed: info.tail_meta_len,
            available: buf.len(),
        });
    }
    let at = ticket.offset() + (PAYLOAD_OFFSET + info.payload_len) as u64;
    let out: &'b mut [u8] = &mut buf[..info.tail_meta_len];
    src.read_bytes(at, out)?;
    let out: &'b [u8] = out;
    Ok((info, out))
}

pub(crate) fn read_pooled_frame<B: ByteSource>(
    src: &mut B,
    ticket: SizedPtr,
    pool: &BufferPool,
) -> RbfResult<PooledFrame> {
    let mut buf = pool.rent(ticket.len() as usize);
    let info = read_frame_into(src, ticket, &mut buf)?.info();
    Ok(PooledFrame::new(buf, info))
}

pub(crate) fn read_pooled_tail_meta<B: ByteSource>(
    src: &mut B,
    ticket: SizedPtr,
    pool: &BufferPool,
) -> RbfResult<PooledTailMeta> {
    let info = read_frame_info(src, ticket)?;
    let mut buf = pool.rent(info.tail_meta_len);
    let at = ticket.offset() + (PAYLOAD_OFFSET + info.payload_len) as u64;
    src.read_bytes(at, &mut buf)?;
    Ok(PooledTailMeta::new(buf, info))
}

// ---------------------------------------------------------------------------
// FrameSource
// ---------------------------------------------------------------------------

/// Read access shared by [`RbfReader`] and `RbfFile`, so record-layer
/// readers work over either a writer's own handle or a read-only one.
pub trait FrameSource {
    type Store: Storage;

    fn tail_offset(&self) -> u64;

    fn read_frame_info(&self, ticket: SizedPtr) -> RbfResult<FrameInfo>;

    fn read_pooled_frame(&self, ticket: SizedPtr) -> RbfResult<PooledFrame>;

    fn scan_reverse(&self, show_tombstones: bool) -> ReverseScan<'_, Self::Store>;
}

// ---------------------------------------------------------------------------
// RbfReader
// ---------------------------------------------------------------------------

/// A read-only view of an RBF log.
///
/// The logical tail is the store length observed at open (or at the last
/// `refresh`). Reads never look past it.
pub struct RbfReader<S: Storage> {
    storage: S,
    tail: u64,
    pool: BufferPool,
    options: RbfOptions,
}

impl<S: Storage> RbfReader<S> {
    /// Open a log for reading. Validates the genesis fence and 4-byte
    /// length alignment.
    pub fn open(storage: S, options: RbfOptions) -> RbfResult<Self> {
        let tail = validate_genesis(&storage, true)?;
        info!(storage = storage.name(), tail, "Opened RBF reader");
        Ok(Self::new(storage, tail, options))
    }

    /// Open a log that may end in a torn, unaligned tail. Only the genesis
    /// fence is validated; the reverse scanner copes with the rest.
    pub fn open_for_recovery(storage: S, options: RbfOptions) -> RbfResult<Self> {
        let tail = validate_genesis(&storage, false)?;
        info!(storage = storage.name(), tail, "Opened RBF reader for recovery");
        Ok(Self::new(storage, tail, options))
    }

    fn new(storage: S, tail: u64, options: RbfOptions) -> Self {
        Self {
            storage,
            tail,
            pool: BufferPool::new(options.pool_max_retained),
            options,
        }
    }

    /// Re-read the store length, picking up frames appended since open.
    pub fn refresh(&mut self) -> RbfResult<u64> {
        self.tail = self.storage.len()?;
        Ok(self.tail)
    }

    pub fn tail_offset(&self) -> u64 {
        self.tail
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn read_frame<'b>(&self, ticket: SizedPtr, buf: &'b mut [u8]) -> RbfResult<Frame<'b>> {
        check_ticket(ticket, self.tail)?;
        read_frame_into(&mut &self.storage, ticket, buf)
    }

    pub fn read_pooled_frame(&self, ticket: SizedPtr) -> RbfResult<PooledFrame> {
        check_ticket(ticket, self.tail)?;
        read_pooled_frame(&mut &self.storage, ticket, &self.pool)
    }

    pub fn read_frame_info(&self, ticket: SizedPtr) -> RbfResult<FrameInfo> {
        check_ticket(ticket, self.tail)?;
        read_frame_info(&mut &self.storage, ticket)
    }

    pub fn read_tail_meta<'b>(&self, ticket: SizedPtr, buf: &'b mut [u8]) -> RbfResult<&'b [u8]> {
        check_ticket(ticket, self.tail)?;
        Ok(read_tail_meta_into(&mut &self.storage, ticket, buf)?.1)
    }

    pub fn read_pooled_tail_meta(&self, ticket: SizedPtr) -> RbfResult<PooledTailMeta> {
        check_ticket(ticket, self.tail)?;
        read_pooled_tail_meta(&mut &self.storage, ticket, &self.pool)
    }

    /// Enumerate frames from the tail back to genesis.
    pub fn scan_reverse(&self, show_tombstones: bool) -> ReverseScan<'_, S> {
        ReverseScan::new(&self.storage, self.tail, show_tombstones, self.options.read_cache_pages)
    }
}

impl<S: Storage> FrameSource for RbfReader<S> {
    type Store = S;

    fn tail_offset(&self) -> u64 {
        self.tail
    }

    fn read_frame_info(&self, ticket: SizedPtr) -> RbfResult<FrameInfo> {
        RbfReader::read_frame_info(self, ticket)
    }

    fn read_pooled_frame(&self, ticket: SizedPtr) -> RbfResult<PooledFrame> {
        RbfReader::read_pooled_frame(self, ticket)
    }

    fn scan_reverse(&self, show_tombstones: bool) -> ReverseScan<'_, S> {
        RbfReader::scan_reverse(self, show_tombstones)
    }
}

impl RbfReader<FileStorage> {
    /// Open a read-only handle on the log at `path`.
    pub fn open_path(path: impl AsRef<Path>, options: RbfOptions) -> RbfResult<Self> {
        Self::open(FileStorage::open_read_only(path)?, options)
    }
}
