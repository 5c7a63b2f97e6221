//! Data records

use super::{Field, Variant};
use crate::error::RecordResult;
use serde::{Deserialize, Serialize};
use streamnet_types::{InterfaceId, Name};

/// Name-keyed slots that keep their order when a value is taken
///
/// Taking a value leaves the name behind in a consumed state, so positions
/// of the remaining names never shift.
#[derive(Debug)]
pub struct NameMap<V> {
    entries: Vec<(Name, Option<V>)>,
}

impl<V> Default for NameMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> NameMap<V> {
    fn position(&self, name: Name) -> Option<usize> {
        self.entries.iter().position(|(n, _)| *n == name)
    }

    /// True when the name has a slot, consumed or not
    pub fn contains(&self, name: Name) -> bool {
        self.position(name).is_some()
    }

    pub fn is_consumed(&self, name: Name) -> bool {
        self.position(name)
            .is_some_and(|i| self.entries[i].1.is_none())
    }

    pub fn get(&self, name: Name) -> Option<&V> {
        self.position(name).and_then(|i| self.entries[i].1.as_ref())
    }

    /// Store a value, reviving a consumed slot. Returns the replaced value.
    pub fn set(&mut self, name: Name, value: V) -> Option<V> {
        match self.position(name) {
            Some(i) => self.entries[i].1.replace(value),
            None => {
                self.entries.push((name, Some(value)));
                None
            }
        }
    }

    /// Read and mark consumed
    pub fn take(&mut self, name: Name) -> Option<V> {
        self.position(name).and_then(|i| self.entries[i].1.take())
    }

    /// Drop the slot entirely
    pub fn remove(&mut self, name: Name) -> Option<V> {
        self.position(name)
            .and_then(|i| self.entries.remove(i).1)
    }

    /// Rename a slot in place; fails when `to` is already taken
    pub fn rename(&mut self, from: Name, to: Name) -> bool {
        if from != to && self.contains(to) {
            return false;
        }
        match self.position(from) {
            Some(i) => {
                self.entries[i].0 = to;
                true
            }
            None => false,
        }
    }

    /// Every name with a slot, in order
    pub fn names(&self) -> Vec<Name> {
        self.entries.iter().map(|(n, _)| *n).collect()
    }

    /// Names whose value has not been taken, in order
    pub fn unconsumed(&self) -> Vec<Name> {
        self.entries
            .iter()
            .filter(|(_, v)| v.is_some())
            .map(|(n, _)| *n)
            .collect()
    }

    /// Present values in order
    pub fn iter(&self) -> impl Iterator<Item = (Name, &V)> {
        self.entries
            .iter()
            .filter_map(|(n, v)| v.as_ref().map(|v| (*n, v)))
    }

    /// Number of slots, consumed ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Copy> NameMap<V> {
    fn copied(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

/// How field values of a record are meant to be serialised
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    #[default]
    Binary,
    Textual,
}

/// A record carrying field values and integer tags
#[derive(Debug, Default)]
pub struct DataRecord {
    fields: NameMap<Field>,
    tags: NameMap<i32>,
    btags: NameMap<i32>,
    interface: InterfaceId,
    mode: DataMode,
}

impl DataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: Name, field: Field) -> Self {
        self.set_field(name, field);
        self
    }

    pub fn with_tag(mut self, name: Name, value: i32) -> Self {
        self.set_tag(name, value);
        self
    }

    pub fn with_btag(mut self, name: Name, value: i32) -> Self {
        self.set_btag(name, value);
        self
    }

    // Fields

    pub fn field(&self, name: Name) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: Name, field: Field) -> Option<Field> {
        self.fields.set(name, field)
    }

    /// Take ownership of a field value, leaving the name consumed
    pub fn take_field(&mut self, name: Name) -> Option<Field> {
        self.fields.take(name)
    }

    pub fn remove_field(&mut self, name: Name) -> Option<Field> {
        self.fields.remove(name)
    }

    pub fn rename_field(&mut self, from: Name, to: Name) -> bool {
        self.fields.rename(from, to)
    }

    pub fn has_field(&self, name: Name) -> bool {
        self.fields.contains(name)
    }

    pub fn fields(&self) -> &NameMap<Field> {
        &self.fields
    }

    pub fn unconsumed_fields(&self) -> Vec<Name> {
        self.fields.unconsumed()
    }

    // Tags

    pub fn tag(&self, name: Name) -> Option<i32> {
        self.tags.get(name).copied()
    }

    pub fn set_tag(&mut self, name: Name, value: i32) -> Option<i32> {
        self.tags.set(name, value)
    }

    pub fn take_tag(&mut self, name: Name) -> Option<i32> {
        self.tags.take(name)
    }

    pub fn remove_tag(&mut self, name: Name) -> Option<i32> {
        self.tags.remove(name)
    }

    pub fn rename_tag(&mut self, from: Name, to: Name) -> bool {
        self.tags.rename(from, to)
    }

    pub fn has_tag(&self, name: Name) -> bool {
        self.tags.contains(name)
    }

    pub fn tags(&self) -> &NameMap<i32> {
        &self.tags
    }

    pub fn unconsumed_tags(&self) -> Vec<Name> {
        self.tags.unconsumed()
    }

    // Binding tags

    pub fn btag(&self, name: Name) -> Option<i32> {
        self.btags.get(name).copied()
    }

    pub fn set_btag(&mut self, name: Name, value: i32) -> Option<i32> {
        self.btags.set(name, value)
    }

    pub fn take_btag(&mut self, name: Name) -> Option<i32> {
        self.btags.take(name)
    }

    pub fn remove_btag(&mut self, name: Name) -> Option<i32> {
        self.btags.remove(name)
    }

    pub fn rename_btag(&mut self, from: Name, to: Name) -> bool {
        self.btags.rename(from, to)
    }

    pub fn has_btag(&self, name: Name) -> bool {
        self.btags.contains(name)
    }

    pub fn btags(&self) -> &NameMap<i32> {
        &self.btags
    }

    pub fn unconsumed_btags(&self) -> Vec<Name> {
        self.btags.unconsumed()
    }

    // Metadata

    pub fn interface_id(&self) -> InterfaceId {
        self.interface
    }

    pub fn set_interface_id(&mut self, id: InterfaceId) {
        self.interface = id;
    }

    pub fn mode(&self) -> DataMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: DataMode) {
        self.mode = mode;
    }

    /// Every name this record has a slot for
    pub fn variant(&self) -> Variant {
        let mut variant = Variant::new();
        for name in self.fields.names() {
            variant.add_field(name);
        }
        for name in self.tags.names() {
            variant.add_tag(name);
        }
        for name in self.btags.names() {
            variant.add_btag(name);
        }
        variant
    }

    /// Deep copy; field values are copied through their interfaces
    pub fn try_copy(&self) -> RecordResult<DataRecord> {
        let mut fields = NameMap::default();
        for (name, slot) in &self.fields.entries {
            let copy = match slot {
                Some(field) => Some(field.try_clone()?),
                None => None,
            };
            fields.entries.push((*name, copy));
        }
        Ok(DataRecord {
            fields,
            tags: self.tags.copied(),
            btags: self.btags.copied(),
            interface: self.interface,
            mode: self.mode,
        })
    }

    /// Copy the unconsumed fields and tags of `from` that neither `exclude`
    /// names nor this record already has
    pub fn flow_inherit(&mut self, exclude: &Variant, from: &DataRecord) -> RecordResult<()> {
        for (name, field) in from.fields.iter() {
            if !exclude.has_field(name) && !self.has_field(name) {
                self.set_field(name, field.try_clone()?);
            }
        }
        for (name, &value) in from.tags.iter() {
            if !exclude.has_tag(name) && !self.has_tag(name) {
                self.set_tag(name, value);
            }
        }
        Ok(())
    }
}
