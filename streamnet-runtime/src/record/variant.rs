//! Variants: the field, tag and binding-tag names a record carries or a
//! pattern requires

use super::DataRecord;
use std::fmt;
use std::sync::Arc;
use streamnet_types::Name;

/// Ordered sets of field, tag and binding-tag names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variant {
    fields: Vec<Name>,
    tags: Vec<Name>,
    btags: Vec<Name>,
}

fn insert(names: &mut Vec<Name>, name: Name) {
    if !names.contains(&name) {
        names.push(name);
    }
}

impl Variant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: Name) -> Self {
        self.add_field(name);
        self
    }

    pub fn with_tag(mut self, name: Name) -> Self {
        self.add_tag(name);
        self
    }

    pub fn with_btag(mut self, name: Name) -> Self {
        self.add_btag(name);
        self
    }

    pub fn add_field(&mut self, name: Name) {
        insert(&mut self.fields, name);
    }

    pub fn add_tag(&mut self, name: Name) {
        insert(&mut self.tags, name);
    }

    pub fn add_btag(&mut self, name: Name) {
        insert(&mut self.btags, name);
    }

    pub fn fields(&self) -> &[Name] {
        &self.fields
    }

    pub fn tags(&self) -> &[Name] {
        &self.tags
    }

    pub fn btags(&self) -> &[Name] {
        &self.btags
    }

    pub fn has_field(&self, name: Name) -> bool {
        self.fields.contains(&name)
    }

    pub fn has_tag(&self, name: Name) -> bool {
        self.tags.contains(&name)
    }

    pub fn has_btag(&self, name: Name) -> bool {
        self.btags.contains(&name)
    }

    /// Total number of names
    pub fn len(&self) -> usize {
        self.fields.len() + self.tags.len() + self.btags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True iff every name of this pattern is present in `record`, consumed
    /// or not. Extra names in the record are ignored.
    pub fn matches(&self, record: &DataRecord) -> bool {
        self.fields.iter().all(|&n| record.has_field(n))
            && self.tags.iter().all(|&n| record.has_tag(n))
            && self.btags.iter().all(|&n| record.has_btag(n))
    }

    /// Number of names shared with `record` when the pattern matches
    pub fn match_count(&self, record: &DataRecord) -> Option<usize> {
        self.matches(record).then(|| self.len())
    }

    pub fn is_subset_of(&self, other: &Variant) -> bool {
        self.fields.iter().all(|&n| other.has_field(n))
            && self.tags.iter().all(|&n| other.has_tag(n))
            && self.btags.iter().all(|&n| other.has_btag(n))
    }

    /// Add every name of `other` not already present
    pub fn merge(&mut self, other: &Variant) {
        for &n in &other.fields {
            self.add_field(n);
        }
        for &n in &other.tags {
            self.add_tag(n);
        }
        for &n in &other.btags {
            self.add_btag(n);
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = Vec::with_capacity(self.len());
        names.extend(self.fields.iter().map(|n| n.to_string()));
        names.extend(self.tags.iter().map(|n| format!("<{}>", n)));
        names.extend(self.btags.iter().map(|n| format!("<#{}>", n)));
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Alternative variants accepted by one parallel branch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantList(Vec<Variant>);

impl VariantList {
    pub fn new(variants: Vec<Variant>) -> Self {
        Self(variants)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Variant> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Highest match count among the variants matching `record`
    pub fn best_count(&self, record: &DataRecord) -> Option<usize> {
        self.0.iter().filter_map(|v| v.match_count(record)).max()
    }
}

impl From<Vec<Variant>> for VariantList {
    fn from(variants: Vec<Variant>) -> Self {
        Self(variants)
    }
}

/// Index of the list with the highest match count; the first declared wins
/// ties.
pub fn best_match<'a>(
    lists: impl IntoIterator<Item = &'a VariantList>,
    record: &DataRecord,
) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (index, list) in lists.into_iter().enumerate() {
        if let Some(count) = list.best_count(record) {
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((index, count));
            }
        }
    }
    best.map(|(index, _)| index)
}

/// Predicate over a data record, evaluated after its variant matched
#[derive(Clone)]
pub struct Guard(Arc<dyn Fn(&DataRecord) -> bool + Send + Sync>);

impl Guard {
    pub fn new(predicate: impl Fn(&DataRecord) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    pub fn always() -> Self {
        Self::new(|_| true)
    }

    pub fn eval(&self, record: &DataRecord) -> bool {
        (self.0)(record)
    }
}

impl Default for Guard {
    fn default() -> Self {
        Self::always()
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard")
    }
}

/// A variant with a guard
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    pub variant: Variant,
    pub guard: Guard,
}

impl Pattern {
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            guard: Guard::always(),
        }
    }

    pub fn guarded(variant: Variant, guard: Guard) -> Self {
        Self { variant, guard }
    }

    pub fn matches(&self, record: &DataRecord) -> bool {
        self.variant.matches(record) && self.guard.eval(record)
    }
}

impl From<Variant> for Pattern {
    fn from(variant: Variant) -> Self {
        Pattern::new(variant)
    }
}
