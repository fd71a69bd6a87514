// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia Journal - Two-log commit coordinator
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A `Journal` pairs a data log (object versions) with a meta log (commit
// records). A commit makes the data log durable first, then appends and
// syncs a commit record naming the data tail it covers. On open, the
// newest commit that fits inside the data log wins and any data written
// after it is cut away.

use std::fs;
use std::path::Path;

use atelia_rbf::layout::{FENCE_LEN, GENESIS_LEN};
use atelia_rbf::{FileStorage, FrameBuilder, RbfFile, RbfOptions, SizedPtr, Storage};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::commit::CommitRecord;
use crate::data::{DataRecordReader, DataRecordWriter, VersionChain};
use crate::error::{JournalError, JournalResult};
use crate::meta::{MetaRecordReader, MetaRecordWriter};
use crate::tags::ObjectKind;
use crate::version_index::VersionIndex;

/// File name of the data log inside a journal directory.
pub const DATA_FILE_NAME: &str = "data.rbf";

/// File name of the meta log inside a journal directory.
pub const META_FILE_NAME: &str = "meta.rbf";

/// Options for the two logs of a [`Journal`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalOptions {
    pub data: RbfOptions,
    pub meta: RbfOptions,
}

/// A data log and a meta log committed together.
pub struct Journal<S: Storage> {
    data: RbfFile<S>,
    meta: RbfFile<S>,
    last_commit: Option<CommitRecord>,
}

impl<S: Storage> Journal<S> {
    /// Initialize a journal on two empty stores.
    pub fn create(data: S, meta: S, options: JournalOptions) -> JournalResult<Self> {
        let data = RbfFile::create(data, options.data)?;
        let meta = RbfFile::create(meta, options.meta)?;
        Ok(Self {
            data,
            meta,
            last_commit: None,
        })
    }

    /// Open a journal, trimming torn tails from both logs and discarding
    /// data written after the last commit.
    pub fn open(data: S, meta: S, options: JournalOptions) -> JournalResult<Self> {
        let data = RbfFile::recover(data, options.data)?;
        let meta = RbfFile::recover(meta, options.meta)?;
        Self::from_logs(data, meta)
    }

    /// Reconcile two already-open logs.
    pub fn from_logs(mut data: RbfFile<S>, mut meta: RbfFile<S>) -> JournalResult<Self> {
        let data_len = data.tail_offset();
        let mut chosen = None;
        let mut stale = 0u64;
        for record in MetaRecordReader::new(&meta).scan_reverse() {
            let record = record?;
            let tail = record.commit.data_tail;
            if (GENESIS_LEN..=data_len).contains(&tail) {
                chosen = Some(record);
                break;
            }
            warn!(
                epoch_seq = record.commit.epoch_seq,
                data_tail = tail,
                data_len,
                "Commit record points past the data log"
            );
            stale += 1;
        }

        let committed_tail = match chosen {
            Some(record) => {
                if stale > 0 {
                    meta.truncate(record.ticket.end() + FENCE_LEN as u64)?;
                }
                record.commit.data_tail
            }
            None if stale > 0 => return Err(JournalError::MissingCommit { data_len }),
            None => GENESIS_LEN,
        };
        if data_len > committed_tail {
            warn!(
                data_len,
                committed_tail,
                dropped = data_len - committed_tail,
                "Discarding uncommitted data records"
            );
            data.truncate(committed_tail)?;
        }

        let last_commit = chosen.map(|record| record.commit);
        info!(
            epoch_seq = last_commit.map_or(0, |c| c.epoch_seq),
            data_tail = data.tail_offset(),
            "Opened journal"
        );
        Ok(Self {
            data,
            meta,
            last_commit,
        })
    }

    // -----------------------------------------------------------------------
    // Writing
    // -----------------------------------------------------------------------

    pub fn append_version(
        &mut self,
        kind: ObjectKind,
        prev: SizedPtr,
        diff: &[u8],
    ) -> JournalResult<SizedPtr> {
        DataRecordWriter::new(&mut self.data).append_version(kind, prev, diff)
    }

    pub fn begin_version(
        &mut self,
        kind: ObjectKind,
        prev: SizedPtr,
    ) -> JournalResult<FrameBuilder<'_, S>> {
        DataRecordWriter::new(&mut self.data).begin_version(kind, prev)
    }

    /// Make every appended version durable and record a checkpoint.
    pub fn commit(
        &mut self,
        root_object_id: u64,
        version_index_ptr: SizedPtr,
        next_object_id: u64,
    ) -> JournalResult<CommitRecord> {
        self.data.durable_flush()?;
        let commit = CommitRecord {
            epoch_seq: self.epoch_seq() + 1,
            root_object_id,
            version_index_ptr,
            data_tail: self.data.tail_offset(),
            next_object_id,
        };
        MetaRecordWriter::new(&mut self.meta).append_commit(&commit)?;
        self.meta.durable_flush()?;
        self.last_commit = Some(commit);
        info!(
            epoch_seq = commit.epoch_seq,
            data_tail = commit.data_tail,
            "Committed journal epoch"
        );
        Ok(commit)
    }

    /// Persist the index's pending changes, then commit with the index as
    /// the version-index pointer and its next free id.
    pub fn commit_index(
        &mut self,
        root_object_id: u64,
        index: &mut VersionIndex,
    ) -> JournalResult<CommitRecord> {
        let head = index.persist(&mut DataRecordWriter::new(&mut self.data))?;
        self.commit(root_object_id, head, index.next_object_id())
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    /// The version index named by the last commit, empty before the first.
    pub fn load_version_index(&self) -> JournalResult<VersionIndex> {
        let head = self.last_commit.map_or(SizedPtr::NULL, |c| c.version_index_ptr);
        VersionIndex::load(&self.data_reader(), head)
    }

    /// Epoch of the last commit, 0 before the first.
    pub fn epoch_seq(&self) -> u64 {
        self.last_commit.map_or(0, |c| c.epoch_seq)
    }

    pub fn last_commit(&self) -> Option<CommitRecord> {
        self.last_commit
    }

    /// Data-log bytes appended since the last commit.
    pub fn uncommitted_bytes(&self) -> u64 {
        let committed = self.last_commit.map_or(GENESIS_LEN, |c| c.data_tail);
        self.data.tail_offset() - committed
    }

    pub fn data_reader(&self) -> DataRecordReader<'_, RbfFile<S>> {
        DataRecordReader::new(&self.data)
    }

    pub fn meta_reader(&self) -> MetaRecordReader<'_, RbfFile<S>> {
        MetaRecordReader::new(&self.meta)
    }

    pub fn walk_chain(&self, ticket: SizedPtr) -> VersionChain<'_, RbfFile<S>> {
        self.data_reader().walk_chain(ticket)
    }

    pub fn data(&self) -> &RbfFile<S> {
        &self.data
    }

    pub fn meta(&self) -> &RbfFile<S> {
        &self.meta
    }
}

impl Journal<FileStorage> {
    /// Open the journal in `dir`, creating the directory and both logs if
    /// needed.
    pub fn open_dir(dir: impl AsRef<Path>, options: JournalOptions) -> JournalResult<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            fs::create_dir_all(dir)?;
            info!(dir = %dir.display(), "Created journal directory");
        }
        let data = RbfFile::open_or_create_path(dir.join(DATA_FILE_NAME), options.data)?;
        let meta = RbfFile::open_or_create_path(dir.join(META_FILE_NAME), options.meta)?;
        Self::from_logs(data, meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelia_rbf::{MemoryStorage, RbfError};
    use tempfile::TempDir;

    fn stores() -> (MemoryStorage, MemoryStorage) {
        (MemoryStorage::new(), MemoryStorage::new())
    }

    #[test]
    fn test_commit_syncs_both_logs() {
        let (data, meta) = stores();
        let mut journal =
            Journal::create(data.clone(), meta.clone(), JournalOptions::default()).unwrap();
        let base = journal
            .append_version(ObjectKind::Dict, SizedPtr::NULL, b"{}")
            .unwrap();
        let commit = journal.commit(1, base, 2).unwrap();

        assert_eq!(commit.epoch_seq, 1);
        assert_eq!(commit.data_tail, data.len().unwrap());
        assert_eq!(data.sync_count(), 1);
        assert_eq!(meta.sync_count(), 1);
        assert_eq!(journal.meta_reader().latest().unwrap().unwrap().commit, commit);
        assert_eq!(journal.uncommitted_bytes(), 0);
    }

    #[test]
    fn test_reopen_discards_uncommitted_versions() {
        let (data, meta) = stores();
        let (committed, lost) = {
            let mut journal =
                Journal::create(data.clone(), meta.clone(), JournalOptions::default()).unwrap();
            let committed = journal
                .append_version(ObjectKind::Dict, SizedPtr::NULL, b"v1")
                .unwrap();
            journal.commit(1, committed, 2).unwrap();
            let lost = journal
                .append_version(ObjectKind::Dict, committed, b"v2")
                .unwrap();
            assert!(journal.uncommitted_bytes() > 0);
            (committed, lost)
        };

        let mut journal = Journal::open(data.clone(), meta, JournalOptions::default()).unwrap();
        assert_eq!(journal.epoch_seq(), 1);
        assert_eq!(journal.data().tail_offset(), committed.end() + 4);
        assert_eq!(data.len().unwrap(), committed.end() + 4);
        assert!(matches!(
            journal.data_reader().try_read_at(lost),
            Err(JournalError::Rbf(RbfError::TicketOutOfBounds { .. }))
        ));

        let next = journal.commit(1, committed, 2).unwrap();
        assert_eq!(next.epoch_seq, 2);
    }

    #[test]
    fn test_fresh_journal_drops_data_without_commit() {
        let (data, meta) = stores();
        {
            let mut journal =
                Journal::create(data.clone(), meta.clone(), JournalOptions::default()).unwrap();
            journal
                .append_version(ObjectKind::Dict, SizedPtr::NULL, b"never committed")
                .unwrap();
        }
        let journal = Journal::open(data.clone(), meta, JournalOptions::default()).unwrap();
        assert_eq!(journal.epoch_seq(), 0);
        assert_eq!(data.len().unwrap(), GENESIS_LEN);
    }

    #[test]
    fn test_lost_data_is_missing_commit() {
        let (data, meta) = stores();
        {
            let mut journal =
                Journal::create(data.clone(), meta.clone(), JournalOptions::default()).unwrap();
            let base = journal
                .append_version(ObjectKind::Dict, SizedPtr::NULL, b"v1")
                .unwrap();
            journal.commit(1, base, 2).unwrap();
        }
        data.modify(|bytes| bytes.truncate(GENESIS_LEN as usize));
        assert!(matches!(
            Journal::open(data, meta, JournalOptions::default()),
            Err(JournalError::MissingCommit { data_len: 4 })
        ));
    }

    #[test]
    fn test_torn_meta_tail_keeps_previous_commit() {
        let (data, meta) = stores();
        {
            let mut journal =
                Journal::create(data.clone(), meta.clone(), JournalOptions::default()).unwrap();
            let base = journal
                .append_version(ObjectKind::Dict, SizedPtr::NULL, b"v1")
                .unwrap();
            journal.commit(1, base, 2).unwrap();
        }
        meta.modify(|bytes| bytes.extend_from_slice(&[0x5A; 21]));
        let journal = Journal::open(data, meta, JournalOptions::default()).unwrap();
        assert_eq!(journal.epoch_seq(), 1);
    }

    #[test]
    fn test_open_dir_lifecycle() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("journal");
        let head = {
            let mut journal = Journal::open_dir(&root, JournalOptions::default()).unwrap();
            let base = journal
                .append_version(ObjectKind::Dict, SizedPtr::NULL, b"a=1")
                .unwrap();
            let head = journal.append_version(ObjectKind::Dict, base, b"b=2").unwrap();
            journal.commit(7, head, 8).unwrap();
            head
        };
        assert!(root.join(DATA_FILE_NAME).exists());
        assert!(root.join(META_FILE_NAME).exists());

        let journal = Journal::open_dir(&root, JournalOptions::default()).unwrap();
        let commit = journal.last_commit().unwrap();
        assert_eq!(commit.root_object_id, 7);
        assert_eq!(commit.version_index_ptr, head);
        let diffs: Vec<Vec<u8>> = journal
            .walk_chain(head)
            .map(|r| r.unwrap().diff().to_vec())
            .collect();
        assert_eq!(diffs, vec![b"b=2".to_vec(), b"a=1".to_vec()]);
    }

    #[test]
    fn test_version_index_survives_reopen() {
        let (data, meta) = stores();
        let (a, b) = {
            let mut journal =
                Journal::create(data.clone(), meta.clone(), JournalOptions::default()).unwrap();
            let mut index = journal.load_version_index().unwrap();
            let a = journal
                .append_version(ObjectKind::Dict, SizedPtr::NULL, b"a=1")
                .unwrap();
            index.set(16, a);
            journal.commit_index(16, &mut index).unwrap();

            let b = journal
                .append_version(ObjectKind::Array, SizedPtr::NULL, b"[1]")
                .unwrap();
            index.set(17, b);
            let commit = journal.commit_index(16, &mut index).unwrap();
            assert_eq!(commit.version_index_ptr, index.head());
            assert_eq!(commit.next_object_id, 18);

            // Uncommitted index changes are lost with the data after them.
            index.remove(16);
            index.persist(&mut DataRecordWriter::new(&mut journal.data)).unwrap();
            (a, b)
        };

        let journal = Journal::open(data, meta, JournalOptions::default()).unwrap();
        let index = journal.load_version_index().unwrap();
        assert_eq!(index.get(16), Some(a));
        assert_eq!(index.get(17), Some(b));
        assert_eq!(index.len(), 2);
        let diffs: Vec<Vec<u8>> = journal
            .walk_chain(index.get(17).unwrap())
            .map(|r| r.unwrap().diff().to_vec())
            .collect();
        assert_eq!(diffs, vec![b"[1]".to_vec()]);
    }

    #[test]
    fn test_options_json() {
        let options: JournalOptions =
            serde_json::from_str(r#"{"meta":{"sync_mode":"Fsync"}}"#).unwrap();
        assert_eq!(options.meta.sync_mode, atelia_rbf::SyncMode::Fsync);
        assert_eq!(options.data, RbfOptions::default());
    }
}
