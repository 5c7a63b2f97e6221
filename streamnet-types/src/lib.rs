//! Shared types for streamnet
//!
//! This crate provides the plain value types used across the streamnet
//! workspace: record name identifiers, entity kinds and the location vectors
//! that address entity instances inside nested combinators.

mod locvec;

pub use locvec::{LocItem, LocKind, LocationVector, BORDER_BEGIN, BORDER_END};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a field, tag or binding tag inside a data record.
///
/// Names are plain integers assigned by whoever builds the network; the
/// runtime only compares them.
pub type Name = i32;

/// Identifier of the external type system that owns a record's field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct InterfaceId(pub i32);

impl InterfaceId {
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl From<i32> for InterfaceId {
    fn from(id: i32) -> Self {
        InterfaceId(id)
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if{}", self.0)
    }
}

/// The kinds of entity a running network is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Box,
    Parallel,
    Split,
    Star,
    Sync,
    Collector,
    FeedbackCollector,
    FeedbackDispatcher,
    Filter,
    NameShift,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Box => "box",
            EntityKind::Parallel => "parallel",
            EntityKind::Split => "split",
            EntityKind::Star => "star",
            EntityKind::Sync => "sync",
            EntityKind::Collector => "collector",
            EntityKind::FeedbackCollector => "fbcoll",
            EntityKind::FeedbackDispatcher => "fbdisp",
            EntityKind::Filter => "filter",
            EntityKind::NameShift => "nameshift",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
