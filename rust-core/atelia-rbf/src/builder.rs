// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - Streaming frame builder
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A `FrameBuilder` writes one frame in place: `begin` reserves the head
// length and writes the tag, the caller streams payload and tail-meta
// bytes, and `commit` seals the frame with padding, payload CRC, trailer
// codeword and fence. Dropping an open builder discards the unflushed
// bytes and appends a minimal tombstone carrying the same tag.

use std::io;

use tracing::warn;

use crate::error::{RbfError, RbfResult};
use crate::file::RbfFile;
use crate::frame::{FrameStatus, FrameTag, TrailerCodeword};
use crate::layout::{
    frame_len, padding_len, validate_lengths, FENCE_BYTES, HEAD_LEN_SIZE, PAYLOAD_OFFSET,
    TAG_OFFSET,
};
use crate::ptr::SizedPtr;
use crate::storage::Storage;
use crate::writer::ReservationToken;

/// Lifecycle of a [`FrameBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Open,
    Committed,
    Aborted,
}

/// An open frame on an [`RbfFile`].
///
/// The builder holds the file's `&mut` borrow, so no other append can run
/// while it is alive.
pub struct FrameBuilder<'a, S: Storage> {
    file: &'a mut RbfFile<S>,
    tag: FrameTag,
    frame_start: u64,
    head_len: Option<ReservationToken>,
    state: BuilderState,
}

impl<'a, S: Storage> FrameBuilder<'a, S> {
    pub(crate) fn begin(file: &'a mut RbfFile<S>, tag: FrameTag) -> RbfResult<Self> {
        if file.builder_open {
            return Err(RbfError::BuilderAlreadyOpen);
        }
        let frame_start = file.writer.position();
        let head_len = file.writer.reserve(HEAD_LEN_SIZE);
        file.writer.begin_crc();
        if let Err(error) = file.writer.write(&tag.to_le_bytes()) {
            file.writer.rollback_to(frame_start)?;
            return Err(error);
        }
        file.builder_open = true;
        Ok(Self {
            file,
            tag,
            frame_start,
            head_len: Some(head_len),
            state: BuilderState::Open,
        })
    }

    pub fn tag(&self) -> FrameTag {
        self.tag
    }

    /// Offset of the frame's `HeadLen` field, which is also its ticket offset.
    pub fn frame_start(&self) -> u64 {
        self.frame_start
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    /// Payload plus tail-meta bytes written so far.
    pub fn payload_len(&self) -> usize {
        (self.file.writer.position() - self.frame_start) as usize - PAYLOAD_OFFSET
    }

    fn ensure_open(&self) -> RbfResult<()> {
        if self.state == BuilderState::Open {
            Ok(())
        } else {
            Err(RbfError::BuilderFinished)
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> RbfResult<()> {
        self.ensure_open()?;
        self.file.writer.write(bytes)
    }

    /// Reserve `len` payload bytes to be filled before `commit`.
    pub fn reserve(&mut self, len: usize) -> RbfResult<ReservationToken> {
        self.ensure_open()?;
        Ok(self.file.writer.reserve(len))
    }

    pub fn reservation_mut(&mut self, token: &ReservationToken) -> RbfResult<&mut [u8]> {
        self.ensure_open()?;
        self.file.writer.reservation_mut(token)
    }

    pub fn commit_reservation(&mut self, token: ReservationToken) -> RbfResult<()> {
        self.ensure_open()?;
        self.file.writer.commit(token)
    }

    pub fn fill(&mut self, token: ReservationToken, bytes: &[u8]) -> RbfResult<()> {
        self.ensure_open()?;
        self.file.writer.fill(token, bytes)
    }

    /// Seal the frame. The last `tail_meta_len` bytes written are its
    /// tail-meta.
    pub fn commit(&mut self, tail_meta_len: usize) -> RbfResult<SizedPtr> {
        self.commit_as(self.tag, tail_meta_len)
    }

    /// Seal the frame under `tag`, replacing the tag given to `begin_frame`.
    ///
    /// Validation failures leave the builder open with nothing written. If
    /// pushing the sealed frame to the store fails, the frame is discarded,
    /// the tail does not move, and the builder is finished.
    pub fn commit_as(&mut self, tag: FrameTag, tail_meta_len: usize) -> RbfResult<SizedPtr> {
        self.ensure_open()?;
        let pending = self.file.writer.open_reservations().saturating_sub(1);
        if pending > 0 {
            return Err(RbfError::PendingReservations { count: pending });
        }

        let body = self.payload_len();
        validate_lengths(body, tail_meta_len)?;
        let len = frame_len(body);
        let ticket = self.file.ticket_for(self.frame_start, len as u64)?;

        let writer = &mut self.file.writer;
        if tag != self.tag {
            let tag_at = self.frame_start + TAG_OFFSET as u64;
            writer.patch(tag_at, &tag.to_le_bytes())?;
            writer.restart_crc(tag_at)?;
            self.tag = tag;
        }

        let padding = padding_len(body);
        writer.write(&[0u8; 3][..padding])?;
        let payload_crc = writer.finish_crc()?;
        writer.write(&payload_crc.to_le_bytes())?;
        let trailer = TrailerCodeword {
            status: FrameStatus::from_padding(false, padding),
            tag,
            tail_meta_len: tail_meta_len as u16,
            frame_len: len as u32,
        };
        writer.write(&trailer.encode())?;
        writer.write(&FENCE_BYTES)?;

        if let Some(head) = self.head_len.take() {
            writer.fill(head, &(len as u32).to_le_bytes())?;
        }
        self.state = BuilderState::Committed;
        self.file.builder_open = false;
        self.file.finish_append(ticket, false)?;
        Ok(ticket)
    }

    /// Abandon the frame explicitly and return the tombstone's ticket.
    pub fn abort(mut self) -> RbfResult<SizedPtr> {
        self.ensure_open()?;
        self.abort_in_place()
    }

    fn abort_in_place(&mut self) -> RbfResult<SizedPtr> {
        self.state = BuilderState::Aborted;
        self.head_len = None;
        self.file.builder_open = false;
        self.file.writer.rollback_to(self.frame_start)?;
        self.file.append_tombstone(self.tag)
    }
}

impl<S: Storage> io::Write for FrameBuilder<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.write_bytes(buf) {
            Ok(()) => Ok(buf.len()),
            Err(RbfError::Io(error)) => Err(error),
            Err(other) => Err(io::Error::other(other)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Storage> Drop for FrameBuilder<'_, S> {
    fn drop(&mut self) {
        if self.state == BuilderState::Open {
            if let Err(error) = self.abort_in_place() {
                warn!(
                    frame_start = self.frame_start,
                    tag = %self.tag,
                    %error,
                    "Auto-abort of dropped frame builder failed"
                );
            }
        }
    }
}
