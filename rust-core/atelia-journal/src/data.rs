// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia Journal - Data record writer and reader
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Object versions are stored as data-class frames whose payload is a
// previous-version pointer followed by a diff. Each append returns the
// ticket that the object's next version points back to, so the versions of
// one object form a chain ending at a base version (null pointer).

use atelia_rbf::{
    FrameBuilder, FrameSource, PooledFrame, RbfFile, ReverseScan, ScanOutcome, SizedPtr, Storage,
};
use tracing::warn;

use crate::error::{JournalError, JournalResult};
use crate::tags::{data_kind, object_version_tag, ObjectKind, RecordType};
use crate::version::{encode_header, ObjectVersionRecord, PREV_VERSION_PTR_SIZE};

// ---------------------------------------------------------------------------
// DataRecord
// ---------------------------------------------------------------------------

/// A verified version record held in a pooled frame buffer.
#[derive(Debug)]
pub struct DataRecord {
    kind: ObjectKind,
    prev: SizedPtr,
    frame: PooledFrame,
}

impl DataRecord {
    fn from_frame(frame: PooledFrame) -> JournalResult<Self> {
        let offset = frame.ticket().offset();
        let kind = data_kind(frame.tag()).ok_or(JournalError::FrameTagMismatch {
            offset,
            expected: RecordType::ObjectVersion,
            actual: frame.tag().value(),
        })?;
        if frame.is_tombstone() {
            return Err(JournalError::TombstoneRecord { offset });
        }
        let prev = ObjectVersionRecord::parse(frame.payload(), offset)?.prev;
        Ok(Self { kind, prev, frame })
    }

    pub fn ticket(&self) -> SizedPtr {
        self.frame.ticket()
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Ticket of the previous version; null for a base version.
    pub fn prev(&self) -> SizedPtr {
        self.prev
    }

    pub fn is_base(&self) -> bool {
        self.prev.is_null()
    }

    pub fn diff(&self) -> &[u8] {
        &self.frame.payload()[PREV_VERSION_PTR_SIZE..]
    }

    pub fn tail_meta(&self) -> &[u8] {
        self.frame.tail_meta()
    }

    pub fn record(&self) -> ObjectVersionRecord<'_> {
        ObjectVersionRecord::new(self.prev, self.diff())
    }

    /// Return the frame buffer to the pool now.
    pub fn release(self) {}
}

// ---------------------------------------------------------------------------
// DataRecordWriter
// ---------------------------------------------------------------------------

/// Appends version records to a data log.
pub struct DataRecordWriter<'a, S: Storage> {
    file: &'a mut RbfFile<S>,
}

impl<'a, S: Storage> DataRecordWriter<'a, S> {
    pub fn new(file: &'a mut RbfFile<S>) -> Self {
        Self { file }
    }

    /// Append one version of a `kind` object and return its ticket.
    pub fn append_version(
        &mut self,
        kind: ObjectKind,
        prev: SizedPtr,
        diff: &[u8],
    ) -> JournalResult<SizedPtr> {
        let mut builder = self.begin_version(kind, prev)?;
        builder.write_bytes(diff)?;
        Ok(builder.commit(0)?)
    }

    /// Start a streamed version record. The header is already written; the
    /// caller writes the diff and commits (or drops to abandon it).
    pub fn begin_version(
        &mut self,
        kind: ObjectKind,
        prev: SizedPtr,
    ) -> JournalResult<FrameBuilder<'_, S>> {
        let tail = self.file.tail_offset();
        if !prev.is_null() && prev.end() >= tail {
            return Err(JournalError::InvalidPrevVersion {
                offset: tail,
                prev: prev.packed(),
            });
        }
        let mut builder = self.file.begin_frame(object_version_tag(kind))?;
        builder.write_bytes(&encode_header(prev))?;
        Ok(builder)
    }
}

// ---------------------------------------------------------------------------
// DataRecordReader
// ---------------------------------------------------------------------------

/// Reads version records from a log, ignoring frames of other classes.
pub struct DataRecordReader<'a, F: FrameSource> {
    source: &'a F,
}

impl<'a, F: FrameSource> DataRecordReader<'a, F> {
    pub fn new(source: &'a F) -> Self {
        Self { source }
    }

    /// Version records from the tail back to genesis. Foreign-class frames
    /// and tombstones are skipped; so are records whose payload fails
    /// verification, with a warning.
    pub fn scan_reverse(&self) -> DataRecordScan<'a, F> {
        DataRecordScan {
            source: self.source,
            frames: self.source.scan_reverse(false),
        }
    }

    /// Read the version record at `ticket`.
    pub fn try_read_at(&self, ticket: SizedPtr) -> JournalResult<DataRecord> {
        let frame = self.source.read_pooled_frame(ticket)?;
        DataRecord::from_frame(frame)
    }

    /// Follow previous-version pointers from `ticket` back to a base version.
    pub fn walk_chain(&self, ticket: SizedPtr) -> VersionChain<'a, F> {
        VersionChain {
            reader: DataRecordReader {
                source: self.source,
            },
            next: Some(ticket),
        }
    }
}

/// Iterator returned by [`DataRecordReader::scan_reverse`].
pub struct DataRecordScan<'a, F: FrameSource> {
    source: &'a F,
    frames: ReverseScan<'a, F::Store>,
}

impl<F: FrameSource> DataRecordScan<'_, F> {
    /// How the underlying frame scan ended, once exhausted.
    pub fn outcome(&self) -> Option<ScanOutcome> {
        self.frames.outcome()
    }
}

impl<F: FrameSource> Iterator for DataRecordScan<'_, F> {
    type Item = JournalResult<DataRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let info = match self.frames.next()? {
                Ok(info) => info,
                Err(error) => return Some(Err(error.into())),
            };
            if data_kind(info.tag).is_none() {
                continue;
            }
            let offset = info.ticket.offset();
            match self.source.read_pooled_frame(info.ticket) {
                Ok(frame) => match DataRecord::from_frame(frame) {
                    Ok(record) => return Some(Ok(record)),
                    Err(error) => {
                        warn!(offset, %error, "Skipping unparsable version record");
                    }
                },
                Err(error) if error.is_corruption() => {
                    warn!(offset, %error, "Skipping damaged version record");
                }
                Err(error) => return Some(Err(error.into())),
            }
        }
    }
}

/// Iterator returned by [`DataRecordReader::walk_chain`], newest first.
pub struct VersionChain<'a, F: FrameSource> {
    reader: DataRecordReader<'a, F>,
    next: Option<SizedPtr>,
}

impl<F: FrameSource> Iterator for VersionChain<'_, F> {
    type Item = JournalResult<DataRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let ticket = self.next.take()?;
        let record = match self.reader.try_read_at(ticket) {
            Ok(record) => record,
            Err(error) => return Some(Err(error)),
        };
        if !record.is_base() {
            // Pointers only ever point backwards; anything else is a cycle.
            if record.prev().offset() >= ticket.offset() {
                return Some(Err(JournalError::InvalidPrevVersion {
                    offset: ticket.offset(),
                    prev: record.prev().packed(),
                }));
            }
            self.next = Some(record.prev());
        }
        Some(Ok(record))
    }
}
