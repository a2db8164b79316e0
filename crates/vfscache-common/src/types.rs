//! Core type definitions for vfscache
//!
//! Identifiers read from the cache tables, the record flag bitset and the
//! field descriptors of the fixed-width record layout.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! cache_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
            Deserialize, From, Into, Display,
        )]
        #[display("{_0}")]
        pub struct $name(u32);

        impl $name {
            /// Wrap a raw on-disk id
            #[must_use]
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            /// Get the raw id
            #[must_use]
            pub const fn get(self) -> u32 {
                self.0
            }

            /// Zero marks an absent reference in every table
            #[must_use]
            pub const fn is_none(self) -> bool {
                self.0 == 0
            }
        }
    };
}

cache_id!(
    /// Index of a file-system entry in the record table
    RecordId
);
cache_id!(
    /// Id of an interned name in the name table
    NameId
);
cache_id!(
    /// Page holding a record's attribute stream
    AttributeRecordId
);
cache_id!(
    /// Key of a blob in the content store
    ContentId
);
cache_id!(
    /// Stable 1-based id of an attribute name
    AttributeId
);

/// Independent flag bits of a record
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct RecordFlags(u32);

impl RecordFlags {
    pub const CHILDREN_CACHED: Self = Self(0x01);
    pub const IS_DIRECTORY: Self = Self(0x02);
    pub const IS_READ_ONLY: Self = Self(0x04);
    pub const MUST_RELOAD_CONTENT: Self = Self(0x08);
    pub const IS_SYMLINK: Self = Self(0x10);
    pub const IS_SPECIAL: Self = Self(0x20);
    pub const IS_HIDDEN: Self = Self(0x40);
    pub const FREE_RECORD: Self = Self(0x100);

    /// Every known flag with its display name
    pub const ALL: [(&'static str, Self); 8] = [
        ("childrenCached", Self::CHILDREN_CACHED),
        ("isDirectory", Self::IS_DIRECTORY),
        ("isReadOnly", Self::IS_READ_ONLY),
        ("mustReloadContent", Self::MUST_RELOAD_CONTENT),
        ("isSymlink", Self::IS_SYMLINK),
        ("isSpecial", Self::IS_SPECIAL),
        ("isHidden", Self::IS_HIDDEN),
        ("isFreeRecord", Self::FREE_RECORD),
    ];

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when every bit of `flag` is set
    #[must_use]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }
}

impl std::ops::BitOr for RecordFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for RecordFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::ALL
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "RecordFlags({:#x} [{}])", self.0, names.join(" | "))
    }
}

/// Fields of the fixed 40-byte record, in on-disk order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordField {
    ParentId,
    NameId,
    Flags,
    AttributeRecordId,
    ContentId,
    Timestamp,
    ModCount,
    Length,
}

impl RecordField {
    pub const ALL: [Self; 8] = [
        Self::ParentId,
        Self::NameId,
        Self::Flags,
        Self::AttributeRecordId,
        Self::ContentId,
        Self::Timestamp,
        Self::ModCount,
        Self::Length,
    ];

    /// Byte offset of the field within a record
    #[must_use]
    pub const fn offset(self) -> usize {
        match self {
            Self::ParentId => 0,
            Self::NameId => 4,
            Self::Flags => 8,
            Self::AttributeRecordId => 12,
            Self::ContentId => 16,
            Self::Timestamp => 20,
            Self::ModCount => 28,
            Self::Length => 32,
        }
    }

    /// Width of the field in bytes
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::Timestamp | Self::Length => 8,
            _ => 4,
        }
    }
}
