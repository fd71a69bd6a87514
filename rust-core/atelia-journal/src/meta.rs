// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia Journal - Meta record writer and reader
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use atelia_rbf::{FrameSource, RbfFile, ReverseScan, ScanOutcome, SizedPtr, Storage};
use tracing::warn;

use crate::commit::CommitRecord;
use crate::error::{JournalError, JournalResult};
use crate::tags::{is_meta_tag, RecordType, META_COMMIT_TAG};

/// A commit record together with the ticket it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaRecord {
    pub ticket: SizedPtr,
    pub commit: CommitRecord,
}

/// Appends commit records to a meta log.
pub struct MetaRecordWriter<'a, S: Storage> {
    file: &'a mut RbfFile<S>,
}

impl<'a, S: Storage> MetaRecordWriter<'a, S> {
    pub fn new(file: &'a mut RbfFile<S>) -> Self {
        Self { file }
    }

    pub fn append_commit(&mut self, commit: &CommitRecord) -> JournalResult<SizedPtr> {
        Ok(self.file.append(META_COMMIT_TAG, &commit.encode())?)
    }
}

/// Reads commit records from a log, ignoring frames of other classes.
pub struct MetaRecordReader<'a, F: FrameSource> {
    source: &'a F,
}

impl<'a, F: FrameSource> MetaRecordReader<'a, F> {
    pub fn new(source: &'a F) -> Self {
        Self { source }
    }

    /// Commit records from the tail back to genesis.
    pub fn scan_reverse(&self) -> MetaRecordScan<'a, F> {
        MetaRecordScan {
            source: self.source,
            frames: self.source.scan_reverse(false),
        }
    }

    pub fn try_read_at(&self, ticket: SizedPtr) -> JournalResult<MetaRecord> {
        let frame = self.source.read_pooled_frame(ticket)?;
        let offset = ticket.offset();
        if !is_meta_tag(frame.tag()) {
            return Err(JournalError::FrameTagMismatch {
                offset,
                expected: RecordType::MetaCommit,
                actual: frame.tag().value(),
            });
        }
        if frame.is_tombstone() {
            return Err(JournalError::TombstoneRecord { offset });
        }
        let commit = CommitRecord::decode(frame.payload(), offset)?;
        Ok(MetaRecord { ticket, commit })
    }

    /// The newest readable commit, if any.
    pub fn latest(&self) -> JournalResult<Option<MetaRecord>> {
        self.scan_reverse().next().transpose()
    }
}

/// Iterator returned by [`MetaRecordReader::scan_reverse`].
pub struct MetaRecordScan<'a, F: FrameSource> {
    source: &'a F,
    frames: ReverseScan<'a, F::Store>,
}

impl<F: FrameSource> MetaRecordScan<'_, F> {
    pub fn outcome(&self) -> Option<ScanOutcome> {
        self.frames.outcome()
    }
}

impl<F: FrameSource> Iterator for MetaRecordScan<'_, F> {
    type Item = JournalResult<MetaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let info = match self.frames.next()? {
                Ok(info) => info,
                Err(error) => return Some(Err(error.into())),
            };
            if !is_meta_tag(info.tag) {
                continue;
            }
            match MetaRecordReader::new(self.source).try_read_at(info.ticket) {
                Ok(record) => return Some(Ok(record)),
                Err(JournalError::Rbf(error)) if !error.is_corruption() => {
                    return Some(Err(error.into()));
                }
                Err(error) => {
                    warn!(offset = info.ticket.offset(), %error, "Skipping unreadable commit record");
                }
            }
        }
    }
}
