// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia Journal - Frame tag partition
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The journal reads a frame tag as two 16-bit fields:
//
// ```text
// bits 31..16  sub-type   (ObjectKind when record type is ObjectVersion)
// bits 15..0   record type
// ```
//
// so `tag = (sub_type << 16) | record_type`. Record types without sub-types
// must carry zero in the high half.

use std::fmt;

use atelia_rbf::FrameTag;
use serde::{Deserialize, Serialize};

use crate::error::{JournalError, JournalResult};

/// Top-level record type (low 16 bits of the tag). Zero is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum RecordType {
    /// A version of a durable object (data log).
    ObjectVersion = 0x0001,
    /// A commit checkpoint (meta log).
    MetaCommit = 0x0002,
}

impl RecordType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(RecordType::ObjectVersion),
            0x0002 => Some(RecordType::MetaCommit),
            _ => None,
        }
    }
}

/// Kind of durable object a version record belongs to. Zero is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ObjectKind {
    Dict = 0x0001,
    Array = 0x0002,
}

impl ObjectKind {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(ObjectKind::Dict),
            0x0002 => Some(ObjectKind::Array),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Dict => write!(f, "dict"),
            ObjectKind::Array => write!(f, "array"),
        }
    }
}

/// Tag of every commit record.
pub const META_COMMIT_TAG: FrameTag = FrameTag::new(RecordType::MetaCommit as u32);

/// Tag of a version record for `kind`.
pub const fn object_version_tag(kind: ObjectKind) -> FrameTag {
    FrameTag::new(((kind as u32) << 16) | RecordType::ObjectVersion as u32)
}

pub fn record_type_bits(tag: FrameTag) -> u16 {
    (tag.value() & 0xFFFF) as u16
}

pub fn sub_type_bits(tag: FrameTag) -> u16 {
    (tag.value() >> 16) as u16
}

/// A validated journal tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTag {
    ObjectVersion(ObjectKind),
    MetaCommit,
}

impl ParsedTag {
    pub fn record_type(self) -> RecordType {
        match self {
            ParsedTag::ObjectVersion(_) => RecordType::ObjectVersion,
            ParsedTag::MetaCommit => RecordType::MetaCommit,
        }
    }
}

/// Validate a frame tag against the journal's partition.
pub fn parse_tag(tag: FrameTag) -> JournalResult<ParsedTag> {
    let raw = tag.value();
    let record_type = RecordType::from_u16(record_type_bits(tag))
        .ok_or(JournalError::UnknownRecordType { tag: raw })?;
    let sub_type = sub_type_bits(tag);
    match record_type {
        RecordType::ObjectVersion => ObjectKind::from_u16(sub_type)
            .map(ParsedTag::ObjectVersion)
            .ok_or(JournalError::UnknownObjectKind { tag: raw }),
        RecordType::MetaCommit if sub_type != 0 => Err(JournalError::InvalidSubType { tag: raw }),
        RecordType::MetaCommit => Ok(ParsedTag::MetaCommit),
    }
}

/// The object kind of a data-class tag, `None` for anything else.
pub fn data_kind(tag: FrameTag) -> Option<ObjectKind> {
    match parse_tag(tag) {
        Ok(ParsedTag::ObjectVersion(kind)) => Some(kind),
        _ => None,
    }
}

pub fn is_meta_tag(tag: FrameTag) -> bool {
    tag == META_COMMIT_TAG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_values() {
        assert_eq!(object_version_tag(ObjectKind::Dict), FrameTag(0x0001_0001));
        assert_eq!(object_version_tag(ObjectKind::Array), FrameTag(0x0002_0001));
        assert_eq!(META_COMMIT_TAG, FrameTag(0x0000_0002));
        assert_eq!(object_version_tag(ObjectKind::Dict).to_le_bytes(), [1, 0, 1, 0]);
    }

    #[test]
    fn test_parse_known_tags() {
        assert_eq!(
            parse_tag(FrameTag(0x0001_0001)).unwrap(),
            ParsedTag::ObjectVersion(ObjectKind::Dict)
        );
        assert_eq!(parse_tag(META_COMMIT_TAG).unwrap(), ParsedTag::MetaCommit);
        assert_eq!(ParsedTag::MetaCommit.record_type(), RecordType::MetaCommit);
    }

    #[test]
    fn test_parse_rejects_reserved_and_unknown() {
        assert!(matches!(
            parse_tag(FrameTag(0)),
            Err(JournalError::UnknownRecordType { .. })
        ));
        assert!(matches!(
            parse_tag(FrameTag(0x0000_0007)),
            Err(JournalError::UnknownRecordType { .. })
        ));
        assert!(matches!(
            parse_tag(FrameTag(0x0000_0001)),
            Err(JournalError::UnknownObjectKind { .. })
        ));
        assert!(matches!(
            parse_tag(FrameTag(0x0001_0002)),
            Err(JournalError::InvalidSubType { .. })
        ));
    }

    #[test]
    fn test_class_predicates() {
        assert_eq!(data_kind(FrameTag(0x0002_0001)), Some(ObjectKind::Array));
        assert_eq!(data_kind(META_COMMIT_TAG), None);
        assert!(is_meta_tag(META_COMMIT_TAG));
        assert!(!is_meta_tag(object_version_tag(ObjectKind::Dict)));
    }
}
