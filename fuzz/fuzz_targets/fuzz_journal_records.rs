// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for journal record parsing over arbitrary frame payloads

#![no_main]

use atelia_journal::{parse_tag, CommitRecord, ObjectVersionRecord};
use atelia_rbf::FrameTag;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() >= 4 {
        let tag = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let _ = parse_tag(FrameTag(tag));
    }

    // Test payload parsing doesn't panic
    let _ = ObjectVersionRecord::parse(data, 0);
    if let Ok(commit) = CommitRecord::decode(data, 0) {
        assert_eq!(&commit.encode()[..], &data[..40]);
    }
});
