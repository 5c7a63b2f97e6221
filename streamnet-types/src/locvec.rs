//! Location vectors
//!
//! A location vector is the structural address of an entity instance: the
//! path of combinator scopes (serial, parallel, split, star, feedback) that
//! were entered to construct it, each with the index of the branch or
//! iteration taken. Construction code mutates the top item in place while it
//! walks a combinator; dynamically created instances get their own copy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top index of a scope that has been entered but not advanced yet.
pub const BORDER_BEGIN: i32 = -1;

/// Top index marking the end border of a scope.
pub const BORDER_END: i32 = -2;

/// Combinator scope kind of one location item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocKind {
    Serial,
    Parallel,
    Split,
    Star,
    Feedback,
}

impl LocKind {
    /// Single-letter code used in the textual form.
    pub fn code(&self) -> char {
        match self {
            LocKind::Serial => 'S',
            LocKind::Parallel => 'P',
            LocKind::Split => 'I',
            LocKind::Star => 'R',
            LocKind::Feedback => 'F',
        }
    }
}

/// One `(kind, index)` step of a location vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocItem {
    pub kind: LocKind,
    pub index: i32,
}

/// Path of combinator scopes leading to an entity instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationVector {
    items: Vec<LocItem>,
}

impl LocationVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[LocItem] {
        &self.items
    }

    pub fn top(&self) -> Option<&LocItem> {
        self.items.last()
    }

    pub fn top_kind(&self) -> Option<LocKind> {
        self.items.last().map(|item| item.kind)
    }

    pub fn top_index(&self) -> Option<i32> {
        self.items.last().map(|item| item.index)
    }

    fn push(&mut self, kind: LocKind, index: i32) {
        self.items.push(LocItem { kind, index });
    }

    fn pop(&mut self) {
        self.items.pop();
    }

    fn top_add(&mut self, delta: i32) {
        if let Some(item) = self.items.last_mut() {
            item.index += delta;
        }
    }

    fn top_set(&mut self, index: i32) {
        if let Some(item) = self.items.last_mut() {
            item.index = index;
        }
    }

    /// True when `self` and `other` address consecutive generations of the
    /// same scope: equal length, equal prefix, same top kind, and a strictly
    /// smaller top index on `self`.
    pub fn is_parent_of(&self, other: &LocationVector) -> bool {
        if self.items.len() != other.items.len() {
            return false;
        }
        let Some((mine, prefix)) = self.items.split_last() else {
            return true;
        };
        let Some((theirs, other_prefix)) = other.items.split_last() else {
            return false;
        };
        prefix == other_prefix && mine.kind == theirs.kind && mine.index < theirs.index
    }

    /// Enter a serial scope unless already inside one.
    ///
    /// Returns whether a new item was pushed; pass the result to
    /// [`serial_leave`](Self::serial_leave).
    pub fn serial_enter(&mut self) -> bool {
        if self.top_kind() != Some(LocKind::Serial) {
            self.push(LocKind::Serial, 1);
            return true;
        }
        false
    }

    pub fn serial_next(&mut self) {
        debug_assert_eq!(self.top_kind(), Some(LocKind::Serial));
        self.top_add(1);
    }

    pub fn serial_leave(&mut self, entered: bool) {
        debug_assert_eq!(self.top_kind(), Some(LocKind::Serial));
        if entered {
            self.pop();
        }
    }

    pub fn parallel_enter(&mut self) {
        self.push(LocKind::Parallel, BORDER_BEGIN);
    }

    pub fn parallel_next(&mut self) {
        debug_assert_eq!(self.top_kind(), Some(LocKind::Parallel));
        self.top_add(1);
    }

    pub fn parallel_leave(&mut self) {
        debug_assert_eq!(self.top_kind(), Some(LocKind::Parallel));
        self.pop();
    }

    pub fn parallel_reset(&mut self) {
        self.parallel_leave();
        self.parallel_enter();
    }

    pub fn split_enter(&mut self) {
        self.push(LocKind::Split, BORDER_BEGIN);
    }

    pub fn split_leave(&mut self) {
        debug_assert_eq!(self.top_kind(), Some(LocKind::Split));
        self.pop();
    }

    /// Location of the split instance serving tag value `index`.
    pub fn split_spawn(&self, index: i32) -> LocationVector {
        debug_assert_eq!(self.top_kind(), Some(LocKind::Split));
        let mut copy = self.clone();
        copy.pop();
        copy.push(LocKind::Split, index);
        copy
    }

    pub fn star_within(&self) -> bool {
        self.top_kind() == Some(LocKind::Star)
    }

    pub fn star_enter(&mut self) {
        debug_assert_ne!(self.top_kind(), Some(LocKind::Star));
        self.push(LocKind::Star, BORDER_BEGIN);
    }

    /// Advance to the next star iteration.
    pub fn star_spawn(&mut self) {
        debug_assert_eq!(self.top_kind(), Some(LocKind::Star));
        self.top_add(1);
    }

    /// Undo [`star_spawn`](Self::star_spawn) once the iteration is built.
    pub fn star_spawn_ret(&mut self) {
        debug_assert_eq!(self.top_kind(), Some(LocKind::Star));
        self.top_add(-1);
    }

    pub fn star_leave(&mut self) {
        debug_assert_eq!(self.top_kind(), Some(LocKind::Star));
        debug_assert_eq!(self.top_index(), Some(BORDER_BEGIN));
        self.pop();
    }

    pub fn feedback_enter(&mut self) {
        self.push(LocKind::Feedback, BORDER_BEGIN);
    }

    pub fn feedback_leave(&mut self) {
        debug_assert_eq!(self.top_kind(), Some(LocKind::Feedback));
        self.pop();
    }

    /// Mark the top scope as closed by its end border.
    pub fn end_border(&mut self) {
        debug_assert!(matches!(self.top_kind(), Some(kind) if kind != LocKind::Serial));
        self.top_set(BORDER_END);
    }

    pub fn reset_border(&mut self) {
        debug_assert!(matches!(self.top_kind(), Some(kind) if kind != LocKind::Serial));
        self.top_set(BORDER_BEGIN);
    }
}

impl fmt::Display for LocationVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            if item.index >= 0 {
                write!(f, ":{}{}", item.kind.code(), item.index)?;
            } else {
                write!(f, ":{}", item.kind.code())?;
            }
        }
        Ok(())
    }
}
