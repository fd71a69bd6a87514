// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for reverse scanning and recovery of arbitrary log bytes

#![no_main]

use atelia_rbf::layout::FENCE_BYTES;
use atelia_rbf::{MemoryStorage, RbfFile, RbfOptions, RbfReader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut bytes = FENCE_BYTES.to_vec();
    bytes.extend_from_slice(data);
    let storage = MemoryStorage::from_bytes(bytes);

    // Every frame the scan yields must also pass a full verified read,
    // or fail it with a payload checksum error.
    if let Ok(reader) = RbfReader::open_for_recovery(storage.clone(), RbfOptions::default()) {
        for info in reader.scan_reverse(true).flatten() {
            assert!(info.ticket.end() <= reader.tail_offset());
            let _ = reader.read_pooled_frame(info.ticket);
            let _ = reader.read_pooled_tail_meta(info.ticket);
        }
    }

    // Recovery must leave a log that opens cleanly.
    if let Ok(log) = RbfFile::recover(storage, RbfOptions::default()) {
        let tail = log.tail_offset();
        let storage = log.into_storage().unwrap();
        let reopened = RbfFile::open(storage, RbfOptions::default()).unwrap();
        assert_eq!(reopened.tail_offset(), tail);
    }
});
