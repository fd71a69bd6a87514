// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - Log file façade
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `RbfFile` is the single-writer handle on a log. It owns the store through
// a `ReservableWriter`, tracks the logical tail (the end of the last
// committed frame's fence), and applies the configured `SyncMode` after
// every committed or tombstoned frame.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::builder::FrameBuilder;
use crate::config::{RbfOptions, SyncMode};
use crate::crc;
use crate::error::{RbfError, RbfResult};
use crate::frame::{Frame, FrameInfo, FrameStatus, FrameTag, TrailerCodeword};
use crate::layout::{
    is_aligned, validate_lengths, FENCE_BYTES, FENCE_LEN, GENESIS_LEN, MIN_FRAME_LEN,
};
use crate::pool::{BufferPool, PooledFrame, PooledTailMeta};
use crate::ptr::SizedPtr;
use crate::reader::{self, check_ticket, validate_genesis, FrameSource};
use crate::scan::ReverseScan;
use crate::storage::{FileStorage, Storage};
use crate::writer::ReservableWriter;

/// A writable RBF log.
pub struct RbfFile<S: Storage> {
    pub(crate) writer: ReservableWriter<S>,

    /// End of the last committed frame's fence.
    pub(crate) tail: u64,

    /// Set while a `FrameBuilder` is open. Only observable after the
    /// builder was leaked with `mem::forget`.
    pub(crate) builder_open: bool,

    options: RbfOptions,
    pool: BufferPool,

    /// Timestamp of the last fsync (for `SyncMode::Periodic`).
    last_sync: Instant,
}

impl<S: Storage> RbfFile<S> {
    /// Initialize an empty store with the genesis fence.
    pub fn create(mut storage: S, options: RbfOptions) -> RbfResult<Self> {
        let len = storage.len()?;
        if len != 0 {
            return Err(RbfError::StorageNotEmpty { len });
        }
        storage.write_at(0, &FENCE_BYTES)?;
        let mut file = Self::with_tail(storage, GENESIS_LEN, options);
        file.writer.flush()?;
        file.maybe_sync()?;
        info!(storage = file.writer.storage().name(), "Created RBF log");
        Ok(file)
    }

    /// Open an existing log. The store must start with the genesis fence,
    /// have an aligned length and end in a fence.
    pub fn open(storage: S, options: RbfOptions) -> RbfResult<Self> {
        let tail = validate_genesis(&storage, true)?;
        if tail > GENESIS_LEN {
            let mut fence = [0u8; FENCE_LEN];
            storage.read_exact_at(tail - FENCE_LEN as u64, &mut fence)?;
            if fence != FENCE_BYTES {
                return Err(RbfError::NotAnRbfFile {
                    reason: "log does not end in a fence; run recover".to_string(),
                });
            }
        }
        info!(storage = storage.name(), tail, "Opened RBF log");
        Ok(Self::with_tail(storage, tail, options))
    }

    /// Open a log that may end in a torn write. Everything after the last
    /// structurally valid frame is truncated before the log is opened.
    pub fn recover(mut storage: S, options: RbfOptions) -> RbfResult<Self> {
        let len = validate_genesis(&storage, false)?;
        let last = ReverseScan::new(&storage, len, true, options.read_cache_pages)
            .next()
            .transpose()?;
        let keep = last.map_or(GENESIS_LEN, |info| info.ticket.end() + FENCE_LEN as u64);
        if keep < len {
            warn!(
                storage = storage.name(),
                len,
                keep,
                dropped = len - keep,
                "Truncating torn RBF tail"
            );
            storage.truncate(keep)?;
            storage.sync()?;
        }
        Self::open(storage, options)
    }

    fn with_tail(storage: S, tail: u64, options: RbfOptions) -> Self {
        Self {
            writer: ReservableWriter::new(
                storage,
                tail,
                options.write_buffer_capacity,
                options.flush_threshold,
            ),
            tail,
            builder_open: false,
            pool: BufferPool::new(options.pool_max_retained),
            options,
            last_sync: Instant::now(),
        }
    }

    // -----------------------------------------------------------------------
    // Appending
    // -----------------------------------------------------------------------

    /// Append one frame with no tail-meta.
    pub fn append(&mut self, tag: FrameTag, payload: &[u8]) -> RbfResult<SizedPtr> {
        self.append_with_tail_meta(tag, payload, &[])
    }

    /// Append one frame whose body is `payload` followed by `tail_meta`.
    pub fn append_with_tail_meta(
        &mut self,
        tag: FrameTag,
        payload: &[u8],
        tail_meta: &[u8],
    ) -> RbfResult<SizedPtr> {
        validate_lengths(payload.len() + tail_meta.len(), tail_meta.len())?;
        let mut builder = self.begin_frame(tag)?;
        builder.write_bytes(payload)?;
        builder.write_bytes(tail_meta)?;
        builder.commit(tail_meta.len())
    }

    /// Start a streamed frame. Dropping the builder without committing
    /// leaves a tombstone.
    pub fn begin_frame(&mut self, tag: FrameTag) -> RbfResult<FrameBuilder<'_, S>> {
        FrameBuilder::begin(self, tag)
    }

    /// End of the last committed frame, including its fence.
    pub fn tail_offset(&self) -> u64 {
        self.tail
    }

    /// Push buffered bytes to the store.
    pub fn flush(&mut self) -> RbfResult<()> {
        self.writer.flush()
    }

    /// Flush and fsync, whatever the `SyncMode`.
    pub fn durable_flush(&mut self) -> RbfResult<()> {
        self.writer.sync()?;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Cut the log back to `len`, which must be the end of a fence at or
    /// below the tail. Used by recovery to drop uncommitted frames.
    pub fn truncate(&mut self, len: u64) -> RbfResult<()> {
        if self.builder_open {
            return Err(RbfError::BuilderAlreadyOpen);
        }
        if len < GENESIS_LEN || len > self.tail || !is_aligned(len) {
            return Err(RbfError::InvalidTruncate {
                len,
                tail: self.tail,
            });
        }
        self.writer.flush()?;
        let mut fence = [0u8; FENCE_LEN];
        self.writer
            .storage()
            .read_exact_at(len - FENCE_LEN as u64, &mut fence)?;
        if fence != FENCE_BYTES {
            return Err(RbfError::InvalidTruncate {
                len,
                tail: self.tail,
            });
        }

        let previous = self.tail;
        self.writer.truncate(len)?;
        self.tail = len;
        info!(
            storage = self.writer.storage().name(),
            from = previous,
            to = len,
            "Truncated RBF log"
        );
        Ok(())
    }

    /// Push a finished frame and move the tail past it. If the push fails
    /// the frame's bytes are cut away and the tail stays where it was. A
    /// sync failure after a successful push leaves the frame visible.
    pub(crate) fn finish_append(&mut self, ticket: SizedPtr, tombstone: bool) -> RbfResult<()> {
        if let Err(error) = self.writer.flush() {
            self.discard_failed_append(ticket, &error);
            return Err(error);
        }
        self.tail = self.writer.position();
        self.maybe_sync()?;
        debug!(
            offset = ticket.offset(),
            len = ticket.len(),
            tombstone,
            "Committed RBF frame"
        );
        Ok(())
    }

    fn discard_failed_append(&mut self, ticket: SizedPtr, error: &RbfError) {
        let tail = self.tail;
        match self.writer.rewind_to(tail) {
            Ok(()) => warn!(
                offset = ticket.offset(),
                tail,
                %error,
                "Discarded RBF frame after failed push"
            ),
            Err(rewind) => warn!(
                offset = ticket.offset(),
                tail,
                %error,
                %rewind,
                "Could not discard failed RBF frame; recover the log before appending"
            ),
        }
    }

    /// Append the minimal tombstone frame: no payload, no padding.
    pub(crate) fn append_tombstone(&mut self, tag: FrameTag) -> RbfResult<SizedPtr> {
        let start = self.writer.position();
        let ticket = self.ticket_for(start, MIN_FRAME_LEN as u64)?;
        let trailer = TrailerCodeword {
            status: FrameStatus::from_padding(true, 0),
            tag,
            tail_meta_len: 0,
            frame_len: MIN_FRAME_LEN as u32,
        };

        let mut bytes = Vec::with_capacity(MIN_FRAME_LEN + FENCE_LEN);
        bytes.extend_from_slice(&(MIN_FRAME_LEN as u32).to_le_bytes());
        bytes.extend_from_slice(&tag.to_le_bytes());
        bytes.extend_from_slice(&crc::compute(&tag.to_le_bytes()).to_le_bytes());
        bytes.extend_from_slice(&trailer.encode());
        bytes.extend_from_slice(&FENCE_BYTES);
        self.writer.write(&bytes)?;
        self.finish_append(ticket, true)?;
        Ok(ticket)
    }

    /// Ticket for a frame at `start`, refusing frames whose fence would end
    /// beyond the largest addressable offset.
    pub(crate) fn ticket_for(&self, start: u64, frame_len: u64) -> RbfResult<SizedPtr> {
        let end = start + frame_len + FENCE_LEN as u64;
        if end > SizedPtr::MAX_OFFSET {
            return Err(RbfError::FileTooLarge {
                end,
                max: SizedPtr::MAX_OFFSET,
            });
        }
        SizedPtr::new(start, frame_len)
    }

    fn maybe_sync(&mut self) -> RbfResult<()> {
        match self.options.sync_mode {
            SyncMode::Fsync => {
                self.writer.sync()?;
                self.last_sync = Instant::now();
            }
            SyncMode::Periodic(interval) => {
                if self.last_sync.elapsed() >= interval {
                    self.writer.sync()?;
                    self.last_sync = Instant::now();
                }
            }
            SyncMode::Async => {
                // No-op: rely on OS page cache.
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    pub fn read_frame<'b>(&self, ticket: SizedPtr, buf: &'b mut [u8]) -> RbfResult<Frame<'b>> {
        check_ticket(ticket, self.tail)?;
        reader::read_frame_into(&mut self.writer.storage(), ticket, buf)
    }

    pub fn read_pooled_frame(&self, ticket: SizedPtr) -> RbfResult<PooledFrame> {
        check_ticket(ticket, self.tail)?;
        reader::read_pooled_frame(&mut self.writer.storage(), ticket, &self.pool)
    }

    pub fn read_frame_info(&self, ticket: SizedPtr) -> RbfResult<FrameInfo> {
        check_ticket(ticket, self.tail)?;
        reader::read_frame_info(&mut self.writer.storage(), ticket)
    }

    pub fn read_tail_meta<'b>(&self, ticket: SizedPtr, buf: &'b mut [u8]) -> RbfResult<&'b [u8]> {
        check_ticket(ticket, self.tail)?;
        Ok(reader::read_tail_meta_into(&mut self.writer.storage(), ticket, buf)?.1)
    }

    pub fn read_pooled_tail_meta(&self, ticket: SizedPtr) -> RbfResult<PooledTailMeta> {
        check_ticket(ticket, self.tail)?;
        reader::read_pooled_tail_meta(&mut self.writer.storage(), ticket, &self.pool)
    }

    /// Enumerate committed frames from the tail back to genesis.
    pub fn scan_reverse(&self, show_tombstones: bool) -> ReverseScan<'_, S> {
        ReverseScan::new(
            self.writer.storage(),
            self.tail,
            show_tombstones,
            self.options.read_cache_pages,
        )
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn options(&self) -> &RbfOptions {
        &self.options
    }

    pub fn storage(&self) -> &S {
        self.writer.storage()
    }

    /// Flush and hand back the store.
    pub fn into_storage(mut self) -> RbfResult<S> {
        self.writer.flush()?;
        Ok(self.writer.into_storage())
    }
}

impl<S: Storage> FrameSource for RbfFile<S> {
    type Store = S;

    fn tail_offset(&self) -> u64 {
        self.tail
    }

    fn read_frame_info(&self, ticket: SizedPtr) -> RbfResult<FrameInfo> {
        RbfFile::read_frame_info(self, ticket)
    }

    fn read_pooled_frame(&self, ticket: SizedPtr) -> RbfResult<PooledFrame> {
        RbfFile::read_pooled_frame(self, ticket)
    }

    fn scan_reverse(&self, show_tombstones: bool) -> ReverseScan<'_, S> {
        RbfFile::scan_reverse(self, show_tombstones)
    }
}

impl RbfFile<FileStorage> {
    /// Create a new log file at `path`. Fails if the file exists.
    pub fn create_path(path: impl AsRef<Path>, options: RbfOptions) -> RbfResult<Self> {
        Self::create(FileStorage::create(path)?, options)
    }

    /// Open an existing, cleanly closed log file.
    pub fn open_path(path: impl AsRef<Path>, options: RbfOptions) -> RbfResult<Self> {
        Self::open(FileStorage::open(path)?, options)
    }

    /// Open an existing log file, trimming a torn tail.
    pub fn recover_path(path: impl AsRef<Path>, options: RbfOptions) -> RbfResult<Self> {
        Self::recover(FileStorage::open(path)?, options)
    }

    /// Recover the log at `path` if it has content, otherwise initialize it.
    pub fn open_or_create_path(path: impl AsRef<Path>, options: RbfOptions) -> RbfResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Self::create_path(path, options);
        }
        let storage = FileStorage::open(path)?;
        if storage.is_empty()? {
            Self::create(storage, options)
        } else {
            Self::recover(storage, options)
        }
    }
}
