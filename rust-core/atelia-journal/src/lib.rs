// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia Journal - StateJournal record layer
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Typed records on top of RBF frames. Object versions live in a data log;
// commit records live in a meta log. Each class is recognised by its frame
// tag, so readers of one class pass over frames of the other even when both
// share a file.
//
// # Architecture
//
// ```text
// Journal
//  ├── data log (RbfFile)  ── DataRecordWriter / DataRecordReader
//  │     ObjectVersion frames: [prev_version_ptr][diff]
//  │     VersionIndex: object id -> newest version, itself a version chain
//  └── meta log (RbfFile)  ── MetaRecordWriter / MetaRecordReader
//        MetaCommit frames:    [epoch_seq][root_object_id][version_index_ptr]
//                              [data_tail][next_object_id]
// ```
//
// ## Frame tags
//
// ```text
// bits 31..16: sub type   (ObjectKind for versions, 0 for commits)
// bits 15..0:  record type (1 = ObjectVersion, 2 = MetaCommit)
// ```
//
// ## Usage
//
// ```no_run
// use atelia_journal::{Journal, JournalOptions, ObjectKind};
// use atelia_rbf::SizedPtr;
//
// let mut journal = Journal::open_dir("/tmp/atelia-journal", JournalOptions::default()).unwrap();
// let base = journal.append_version(ObjectKind::Dict, SizedPtr::NULL, b"a=1").unwrap();
// let head = journal.append_version(ObjectKind::Dict, base, b"b=2").unwrap();
// journal.commit(1, head, 2).unwrap();
//
// for version in journal.walk_chain(head) {
//     println!("{:?}", version.unwrap().diff());
// }
// ```

pub mod commit;
pub mod data;
pub mod error;
pub mod journal;
pub mod meta;
pub mod tags;
pub mod version;
pub mod version_index;

// Re-export the primary public API for ergonomic imports.
pub use commit::{CommitRecord, COMMIT_RECORD_LEN};
pub use data::{DataRecord, DataRecordReader, DataRecordScan, DataRecordWriter, VersionChain};
pub use error::{JournalError, JournalResult};
pub use journal::{Journal, JournalOptions, DATA_FILE_NAME, META_FILE_NAME};
pub use meta::{MetaRecord, MetaRecordReader, MetaRecordScan, MetaRecordWriter};
pub use tags::{
    data_kind, is_meta_tag, object_version_tag, parse_tag, ObjectKind, ParsedTag, RecordType,
    META_COMMIT_TAG,
};
pub use version::{ObjectVersionRecord, PREV_VERSION_PTR_SIZE};
pub use version_index::{
    VersionIndex, INDEX_ENTRY_LEN, MIN_USER_OBJECT_ID, VERSION_INDEX_OBJECT_ID,
};
