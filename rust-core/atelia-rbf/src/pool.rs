// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - Pooled read buffers
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Frame reads that cannot borrow a caller buffer rent one from a
// `BufferPool`. The rented buffer goes back to the pool when its owner is
// dropped, so a result can be released early (`release`) but never twice.

use std::fmt;
use std::ops::{Deref, DerefMut, Range};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::frame::{Frame, FrameInfo, FrameTag};
use crate::layout::PAYLOAD_OFFSET;
use crate::ptr::SizedPtr;

/// Buffers with more capacity than this are freed instead of pooled.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 1 << 20;

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers handed out.
    pub rented: u64,
    /// Buffers handed back.
    pub returned: u64,
    /// Buffers currently idle in the pool.
    pub retained: usize,
}

impl PoolStats {
    pub fn outstanding(&self) -> u64 {
        // The two counters are loaded separately, so `returned` can run ahead.
        self.rented.saturating_sub(self.returned)
    }
}

struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    max_retained: usize,
    max_buffer_bytes: usize,
    rented: AtomicU64,
    returned: AtomicU64,
}

/// A shared pool of byte buffers. Cloning shares the pool.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    pub fn new(max_retained: usize) -> Self {
        Self::with_limits(max_retained, DEFAULT_MAX_BUFFER_BYTES)
    }

    /// A pool keeping at most `max_retained` idle buffers, none larger than
    /// `max_buffer_bytes`.
    pub fn with_limits(max_retained: usize, max_buffer_bytes: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                max_retained,
                max_buffer_bytes,
                rented: AtomicU64::new(0),
                returned: AtomicU64::new(0),
            }),
        }
    }

    /// Rent a zeroed buffer of exactly `len` bytes.
    pub fn rent(&self, len: usize) -> PooledBuffer {
        let reused = {
            let mut free = self.inner.free.lock();
            free.iter()
                .position(|b| b.capacity() >= len)
                .map(|index| free.swap_remove(index))
        };
        let mut buf = reused.unwrap_or_else(|| Vec::with_capacity(len));
        buf.clear();
        buf.resize(len, 0);
        self.inner.rented.fetch_add(1, Ordering::Relaxed);
        PooledBuffer {
            buf,
            pool: self.clone(),
        }
    }

    fn give_back(&self, mut buf: Vec<u8>) {
        self.inner.returned.fetch_add(1, Ordering::Relaxed);
        if buf.capacity() > self.inner.max_buffer_bytes {
            return;
        }
        let mut free = self.inner.free.lock();
        if free.len() < self.inner.max_retained {
            buf.clear();
            free.push(buf);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            rented: self.inner.rented.load(Ordering::Relaxed),
            returned: self.inner.returned.load(Ordering::Relaxed),
            retained: self.inner.free.lock().len(),
        }
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("max_retained", &self.inner.max_retained)
            .field("max_buffer_bytes", &self.inner.max_buffer_bytes)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A buffer on loan from a [`BufferPool`].
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: BufferPool,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buf));
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer").field("len", &self.buf.len()).finish()
    }
}

// ---------------------------------------------------------------------------
// PooledFrame / PooledTailMeta
// ---------------------------------------------------------------------------

/// A verified frame held in a pooled buffer.
#[derive(Debug)]
pub struct PooledFrame {
    buf: PooledBuffer,
    info: FrameInfo,
    payload: Range<usize>,
    tail_meta: Range<usize>,
}

impl PooledFrame {
    /// `buf` holds the whole frame starting at its `HeadLen` field.
    pub(crate) fn new(buf: PooledBuffer, info: FrameInfo) -> Self {
        let payload = PAYLOAD_OFFSET..PAYLOAD_OFFSET + info.payload_len;
        let tail_meta = payload.end..payload.end + info.tail_meta_len;
        Self {
            buf,
            info,
            payload,
            tail_meta,
        }
    }

    pub fn frame(&self) -> Frame<'_> {
        Frame {
            ticket: self.info.ticket,
            tag: self.info.tag,
            payload: self.payload(),
            tail_meta: self.tail_meta(),
            is_tombstone: self.info.is_tombstone,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[self.payload.clone()]
    }

    pub fn tail_meta(&self) -> &[u8] {
        &self.buf[self.tail_meta.clone()]
    }

    pub fn tag(&self) -> FrameTag {
        self.info.tag
    }

    pub fn ticket(&self) -> SizedPtr {
        self.info.ticket
    }

    pub fn is_tombstone(&self) -> bool {
        self.info.is_tombstone
    }

    pub fn info(&self) -> FrameInfo {
        self.info
    }

    /// Return the buffer to the pool now.
    pub fn release(self) {}
}

/// A frame's tail-meta held in a pooled buffer.
#[derive(Debug)]
pub struct PooledTailMeta {
    buf: PooledBuffer,
    info: FrameInfo,
}

impl PooledTailMeta {
    /// `buf` holds exactly the tail-meta bytes.
    pub(crate) fn new(buf: PooledBuffer, info: FrameInfo) -> Self {
        Self { buf, info }
    }

    pub fn tail_meta(&self) -> &[u8] {
        &self.buf
    }

    pub fn info(&self) -> FrameInfo {
        self.info
    }

    pub fn tag(&self) -> FrameTag {
        self.info.tag
    }

    pub fn is_tombstone(&self) -> bool {
        self.info.is_tombstone
    }

    /// Return the buffer to the pool now.
    pub fn release(self) {}
}
