// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia Journal - Version index
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The version index maps object ids to the ticket of each object's newest
// version. It is itself a dict object (well-known id 0) stored as a version
// chain in the data log, and a commit record's `version_index_ptr` names its
// head. Each version's diff is a run of fixed-size entries:
//
// ```text
// [8 bytes: object_id]
// [8 bytes: version_ptr (packed SizedPtr, 0 = removed)]
// ```
//
// Loading replays the chain from the base version forward, so later
// entries for the same id win.

use std::collections::BTreeMap;

use atelia_rbf::{FrameSource, SizedPtr, Storage};
use tracing::debug;

use crate::data::{DataRecordReader, DataRecordWriter};
use crate::error::{JournalError, JournalResult};
use crate::tags::ObjectKind;

/// Object id reserved for the version index itself.
pub const VERSION_INDEX_OBJECT_ID: u64 = 0;

/// Ids below this are reserved for well-known objects.
pub const MIN_USER_OBJECT_ID: u64 = 16;

/// Encoded size of one index entry.
pub const INDEX_ENTRY_LEN: usize = 16;

/// Object id to newest-version ticket map, persisted as a version chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionIndex {
    entries: BTreeMap<u64, SizedPtr>,
    /// Changes since the last persisted version. `NULL` marks a removal.
    pending: BTreeMap<u64, SizedPtr>,
    head: SizedPtr,
}

impl VersionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index whose newest version is `head`. A null `head`
    /// yields an empty index.
    pub fn load<F: FrameSource>(
        reader: &DataRecordReader<'_, F>,
        head: SizedPtr,
    ) -> JournalResult<Self> {
        let mut index = Self {
            head,
            ..Self::default()
        };
        if head.is_null() {
            return Ok(index);
        }

        let chain = reader
            .walk_chain(head)
            .collect::<JournalResult<Vec<_>>>()?;
        for record in chain.iter().rev() {
            for (object_id, ptr) in decode_diff(record.diff(), record.ticket().offset())? {
                if ptr.is_null() {
                    index.entries.remove(&object_id);
                } else {
                    index.entries.insert(object_id, ptr);
                }
            }
        }
        debug!(
            head = head.packed(),
            versions = chain.len(),
            objects = index.entries.len(),
            "Loaded version index"
        );
        Ok(index)
    }

    /// Newest version of `object_id`, including unpersisted changes.
    pub fn get(&self, object_id: u64) -> Option<SizedPtr> {
        self.entries.get(&object_id).copied()
    }

    pub fn set(&mut self, object_id: u64, version: SizedPtr) {
        if version.is_null() {
            self.remove(object_id);
            return;
        }
        if self.entries.insert(object_id, version) != Some(version) {
            self.pending.insert(object_id, version);
        }
    }

    pub fn remove(&mut self, object_id: u64) {
        if self.entries.remove(&object_id).is_some() {
            self.pending.insert(object_id, SizedPtr::NULL);
        }
    }

    pub fn object_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when changes are waiting for `persist`.
    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Ticket of the newest persisted version, null before the first.
    pub fn head(&self) -> SizedPtr {
        self.head
    }

    /// One past the largest indexed id, never below the reserved range.
    pub fn next_object_id(&self) -> u64 {
        self.entries
            .keys()
            .next_back()
            .map_or(MIN_USER_OBJECT_ID, |&max| max + 1)
            .max(MIN_USER_OBJECT_ID)
    }

    /// Append the pending changes as a new version and return the new
    /// head. Without pending changes nothing is written.
    pub fn persist<S: Storage>(
        &mut self,
        writer: &mut DataRecordWriter<'_, S>,
    ) -> JournalResult<SizedPtr> {
        if self.pending.is_empty() {
            return Ok(self.head);
        }
        let diff = encode_diff(&self.pending);
        self.head = writer.append_version(ObjectKind::Dict, self.head, &diff)?;
        debug!(
            head = self.head.packed(),
            changes = self.pending.len(),
            "Persisted version index"
        );
        self.pending.clear();
        Ok(self.head)
    }
}

fn encode_diff(changes: &BTreeMap<u64, SizedPtr>) -> Vec<u8> {
    let mut out = Vec::with_capacity(changes.len() * INDEX_ENTRY_LEN);
    for (object_id, ptr) in changes {
        out.extend_from_slice(&object_id.to_le_bytes());
        out.extend_from_slice(&ptr.packed().to_le_bytes());
    }
    out
}

fn decode_diff(diff: &[u8], offset: u64) -> JournalResult<Vec<(u64, SizedPtr)>> {
    if diff.len() % INDEX_ENTRY_LEN != 0 {
        return Err(JournalError::InvalidIndexDiff {
            offset,
            len: diff.len(),
            entry: INDEX_ENTRY_LEN,
        });
    }
    Ok(diff
        .chunks_exact(INDEX_ENTRY_LEN)
        .map(|entry| {
            let mut id = [0u8; 8];
            let mut ptr = [0u8; 8];
            id.copy_from_slice(&entry[..8]);
            ptr.copy_from_slice(&entry[8..]);
            (u64::from_le_bytes(id), SizedPtr::from_packed(u64::from_le_bytes(ptr)))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelia_rbf::{MemoryStorage, RbfFile, RbfOptions};

    fn data_log() -> RbfFile<MemoryStorage> {
        RbfFile::create(MemoryStorage::new(), RbfOptions::default()).unwrap()
    }

    fn object(file: &mut RbfFile<MemoryStorage>, diff: &[u8]) -> SizedPtr {
        DataRecordWriter::new(file)
            .append_version(ObjectKind::Dict, SizedPtr::NULL, diff)
            .unwrap()
    }

    #[test]
    fn test_empty_index() {
        let file = data_log();
        let index = VersionIndex::load(&DataRecordReader::new(&file), SizedPtr::NULL).unwrap();
        assert!(index.is_empty());
        assert!(index.head().is_null());
        assert_eq!(index.get(16), None);
        assert_eq!(index.next_object_id(), MIN_USER_OBJECT_ID);
    }

    #[test]
    fn test_persist_and_load_replays_in_order() {
        let mut file = data_log();
        let a = object(&mut file, b"a");
        let b = object(&mut file, b"b");
        let a2 = object(&mut file, b"a2");

        let mut index = VersionIndex::new();
        index.set(16, a);
        index.set(17, b);
        let first = index.persist(&mut DataRecordWriter::new(&mut file)).unwrap();
        index.set(16, a2);
        index.remove(17);
        let second = index.persist(&mut DataRecordWriter::new(&mut file)).unwrap();
        assert!(second.offset() > first.offset());
        assert!(!index.has_changes());

        let loaded = VersionIndex::load(&DataRecordReader::new(&file), second).unwrap();
        assert_eq!(loaded.get(16), Some(a2));
        assert_eq!(loaded.get(17), None);
        assert_eq!(loaded.object_ids().collect::<Vec<_>>(), vec![16]);
        assert_eq!(loaded.head(), second);

        let older = VersionIndex::load(&DataRecordReader::new(&file), first).unwrap();
        assert_eq!(older.get(16), Some(a));
        assert_eq!(older.get(17), Some(b));
    }

    #[test]
    fn test_persist_without_changes_writes_nothing() {
        let mut file = data_log();
        let a = object(&mut file, b"a");
        let mut index = VersionIndex::new();
        index.set(20, a);
        let head = index.persist(&mut DataRecordWriter::new(&mut file)).unwrap();
        let tail = file.tail_offset();

        index.set(20, a);
        index.remove(99);
        assert!(!index.has_changes());
        assert_eq!(index.persist(&mut DataRecordWriter::new(&mut file)).unwrap(), head);
        assert_eq!(file.tail_offset(), tail);
    }

    #[test]
    fn test_next_object_id_skips_reserved_range() {
        let mut file = data_log();
        let a = object(&mut file, b"a");
        let mut index = VersionIndex::new();
        index.set(3, a);
        assert_eq!(index.next_object_id(), MIN_USER_OBJECT_ID);
        index.set(40, a);
        assert_eq!(index.next_object_id(), 41);
    }

    #[test]
    fn test_ragged_diff_rejected() {
        let mut file = data_log();
        let bad = object(&mut file, &[0u8; INDEX_ENTRY_LEN + 3]);
        assert!(matches!(
            VersionIndex::load(&DataRecordReader::new(&file), bad),
            Err(JournalError::InvalidIndexDiff { len: 19, entry: 16, .. })
        ));
    }
}
