// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - Reversible Binary Framing crate
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// An append-only, crash-safe binary log of tagged frames that can be
// enumerated from the tail backwards and resynchronized after torn writes
// or bit rot. Higher layers store records as frames and address them by
// the `(offset, length)` ticket each append returns.
//
// # Architecture
//
// A log starts with the 4-byte genesis fence `RBF1`. Every frame is
// followed by another fence, so a reader that starts at the tail can find
// frame boundaries without a forward index. Each frame carries two length
// copies (head and trailer), a checksummed trailer codeword that a reverse
// scan can trust on its own, and a CRC32C over the payload for full reads.
//
// ## On-disk frame format (all integers little-endian unless noted)
//
// ```text
// [4 bytes: head_len (u32)]      -- frame length, fences excluded
// [4 bytes: tag (u32)]           -- opaque to RBF
// [N bytes: payload]
// [M bytes: tail_meta]           -- readable without the payload
// [0-3 bytes: zero padding]      -- to 4-byte alignment
// [4 bytes: payload crc32c]      -- over tag..padding
// [4 bytes: trailer crc32c (BE)] -- over the next 12 bytes
// [4 bytes: descriptor]          -- tombstone, padding, tail_meta_len
// [4 bytes: tag copy]
// [4 bytes: frame_len copy]
// [4 bytes: fence "RBF1"]
// ```
//
// ## Usage
//
// ```no_run
// use atelia_rbf::{FrameTag, RbfFile, RbfOptions};
//
// let mut log = RbfFile::open_or_create_path("/tmp/atelia.rbf", RbfOptions::default()).unwrap();
// let ticket = log.append(FrameTag(1), b"hello").unwrap();
// log.durable_flush().unwrap();
//
// for info in log.scan_reverse(false) {
//     let info = info.unwrap();
//     println!("frame at {} tag={}", info.ticket.offset(), info.tag);
// }
// let frame = log.read_pooled_frame(ticket).unwrap();
// assert_eq!(frame.payload(), b"hello");
// ```

pub mod builder;
pub mod cache;
pub mod config;
pub mod crc;
pub mod error;
pub mod file;
pub mod frame;
pub mod layout;
pub mod pool;
pub mod ptr;
pub mod reader;
pub mod scan;
pub mod storage;
pub mod writer;

// Re-export the primary public API for ergonomic imports.
pub use builder::{BuilderState, FrameBuilder};
pub use cache::{ReadStats, ReverseReadCache};
pub use config::{RbfOptions, SyncMode};
pub use error::{RbfError, RbfResult};
pub use file::RbfFile;
pub use frame::{Frame, FrameInfo, FrameStatus, FrameTag, TrailerCodeword};
pub use pool::{
    BufferPool, PoolStats, PooledBuffer, PooledFrame, PooledTailMeta, DEFAULT_MAX_BUFFER_BYTES,
};
pub use ptr::{Address, SizedPtr};
pub use reader::{FrameSource, RbfReader};
pub use scan::{ReverseScan, ScanOutcome};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use writer::{ReservableWriter, ReservationToken};
