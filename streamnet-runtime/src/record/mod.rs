//! Records: the unit of data and control flowing on streams
//!
//! A record is either a [`DataRecord`] produced by boxes, or one of the
//! control records entities use to reshape and order the network:
//!
//! - `Sync` hands a consumer a replacement input stream
//! - `Collect` announces a new branch stream to a collector
//! - `SortEnd` marks the end of an ordering round
//! - `Terminate` shuts down whatever reads it
//! - `TriggerInit` fires an initialiser-only branch once
//!
//! Forwarding a record moves it; duplicating a data record goes through
//! [`DataRecord::try_copy`].

mod data;
pub(crate) mod field;
mod variant;

pub use data::{DataMode, DataRecord, NameMap};
pub use field::{CloneInterface, Field, Interface, Opaque};
pub use variant::{best_match, Guard, Pattern, Variant, VariantList};

use crate::stream::Stream;
use std::fmt;

/// Discriminant of a [`Record`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Data,
    Sync,
    Collect,
    SortEnd,
    Terminate,
    TriggerInit,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Data => "data",
            RecordKind::Sync => "sync",
            RecordKind::Collect => "collect",
            RecordKind::SortEnd => "sort-end",
            RecordKind::Terminate => "terminate",
            RecordKind::TriggerInit => "trigger-init",
        };
        f.write_str(name)
    }
}

/// Ordering barrier `(level, num)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortEnd {
    pub level: i32,
    pub num: i32,
}

impl SortEnd {
    pub fn new(level: i32, num: i32) -> Self {
        Self { level, num }
    }

    /// The same barrier one nesting level deeper
    pub fn deeper(self) -> Self {
        Self {
            level: self.level + 1,
            num: self.num,
        }
    }

    /// The same barrier one nesting level up, or `None` at level zero
    pub fn shallower(self) -> Option<Self> {
        (self.level > 0).then(|| Self {
            level: self.level - 1,
            num: self.num,
        })
    }
}

/// Shutdown signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Terminate {
    /// Set when garbage collection produced this record
    pub obsolete: bool,
}

impl Terminate {
    pub fn obsolete() -> Self {
        Self { obsolete: true }
    }
}

/// Replacement input for whoever reads this record
#[derive(Debug)]
pub struct SyncRecord {
    pub stream: Stream,
    /// Union of the patterns of the sync cell that produced this record
    pub merged_type: Option<Variant>,
}

#[derive(Debug)]
pub enum Record {
    Data(DataRecord),
    Sync(SyncRecord),
    Collect(Stream),
    SortEnd(SortEnd),
    Terminate(Terminate),
    TriggerInit,
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Data(_) => RecordKind::Data,
            Record::Sync(_) => RecordKind::Sync,
            Record::Collect(_) => RecordKind::Collect,
            Record::SortEnd(_) => RecordKind::SortEnd,
            Record::Terminate(_) => RecordKind::Terminate,
            Record::TriggerInit => RecordKind::TriggerInit,
        }
    }

    pub fn sync(stream: Stream) -> Self {
        Record::Sync(SyncRecord {
            stream,
            merged_type: None,
        })
    }

    pub fn collect(stream: Stream) -> Self {
        Record::Collect(stream)
    }

    pub fn sort_end(level: i32, num: i32) -> Self {
        Record::SortEnd(SortEnd::new(level, num))
    }

    pub fn terminate() -> Self {
        Record::Terminate(Terminate::default())
    }

    pub fn is_terminate(&self) -> bool {
        matches!(self, Record::Terminate(_))
    }
}

impl From<DataRecord> for Record {
    fn from(record: DataRecord) -> Self {
        Record::Data(record)
    }
}

impl From<SortEnd> for Record {
    fn from(sort: SortEnd) -> Self {
        Record::SortEnd(sort)
    }
}

impl From<Terminate> for Record {
    fn from(term: Terminate) -> Self {
        Record::Terminate(term)
    }
}
