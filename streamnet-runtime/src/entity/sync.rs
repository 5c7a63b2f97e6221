//! Sync: synchrocell
//!
//! Stores the first record matching each pattern. Once every pattern is
//! matched the stored records are merged into one, the merged record is
//! written, and the cell hands its input to the consumer with a `Sync`
//! record.

use super::{protocol_violation, spawn_entity};
use crate::error::Result;
use crate::network::Info;
use crate::record::{DataRecord, Pattern, Record, SyncRecord, Variant};
use crate::stream::{Stream, StreamReader, StreamWriter};
use std::sync::Arc;
use streamnet_types::{EntityKind, LocationVector};

pub fn create_sync(input: Stream, info: &mut Info, patterns: Arc<Vec<Pattern>>) -> Stream {
    let input = info.route_update(input, info.location);
    if !info.is_local() {
        return input;
    }
    let output = info.create_stream();
    let cell = SyncCell {
        input: input.open_read(),
        output: output.open_write(),
        slots: std::iter::repeat_with(|| Slot::Empty)
            .take(patterns.len())
            .collect(),
        matched: 0,
        patterns,
        gc: info.config().gc.enabled,
        locvec: info.locvec.clone(),
    };
    spawn_entity(EntityKind::Sync, &info.locvec, cell.run());
    output
}

#[derive(Debug)]
enum Slot {
    Empty,
    Stored(DataRecord),
    /// Matched by a record stored in an earlier slot
    Covered,
}

struct SyncCell {
    input: StreamReader,
    output: StreamWriter,
    slots: Vec<Slot>,
    matched: usize,
    patterns: Arc<Vec<Pattern>>,
    gc: bool,
    locvec: LocationVector,
}

impl SyncCell {
    async fn run(mut self) -> Result<()> {
        loop {
            match self.input.read().await? {
                Record::Data(rec) => {
                    if let Some(rec) = self.store(rec) {
                        self.output.write(rec).await?;
                    } else if self.matched == self.patterns.len() {
                        return self.fire().await;
                    }
                }
                Record::Sync(sync) => self.input.replace(sync.stream),
                Record::SortEnd(sort) => self.output.write(sort).await?,
                Record::Terminate(term) => {
                    if self.matched > 0 {
                        tracing::warn!(
                            "Sync '{}' terminated with {} of {} patterns matched; discarding them",
                            self.locvec,
                            self.matched,
                            self.patterns.len()
                        );
                    }
                    self.slots.clear();
                    self.output.write(term).await?;
                    self.output.close();
                    self.input.close(true);
                    return Ok(());
                }
                other => {
                    return Err(protocol_violation(EntityKind::Sync, &self.locvec, &other))
                }
            }
        }
    }

    /// Store `rec` in the first empty slot it matches and mark the other
    /// empty slots it matches. Returns the record when it matches none.
    fn store(&mut self, rec: DataRecord) -> Option<DataRecord> {
        let hits: Vec<usize> = self
            .patterns
            .iter()
            .enumerate()
            .filter(|(i, pattern)| matches!(self.slots[*i], Slot::Empty) && pattern.matches(&rec))
            .map(|(i, _)| i)
            .collect();
        let Some((&first, rest)) = hits.split_first() else {
            return Some(rec);
        };
        for &i in rest {
            self.slots[i] = Slot::Covered;
        }
        self.slots[first] = Slot::Stored(rec);
        self.matched += hits.len();
        None
    }

    /// Merge the stored records. The first stored record is the base; every
    /// later one contributes the names its pattern declares.
    fn merge(&mut self) -> Option<DataRecord> {
        let mut merged: Option<DataRecord> = None;
        for (slot, pattern) in self.slots.iter_mut().zip(self.patterns.iter()) {
            let Slot::Stored(rec) = std::mem::replace(slot, Slot::Empty) else {
                continue;
            };
            match merged.as_mut() {
                Some(base) => absorb(base, rec, &pattern.variant),
                None => merged = Some(rec),
            }
        }
        merged
    }

    fn merged_type(&self) -> Variant {
        let mut union = Variant::new();
        for pattern in self.patterns.iter() {
            union.merge(&pattern.variant);
        }
        union
    }

    async fn fire(mut self) -> Result<()> {
        if let Some(merged) = self.merge() {
            self.output.write(merged).await?;
        }
        let stream = self.input.stream().clone();
        let merged_type = (self.gc && stream.source().is_some()).then(|| self.merged_type());
        tracing::debug!("Sync '{}' matched; handing over {}", self.locvec, stream.id());
        self.output
            .write(Record::Sync(SyncRecord {
                stream,
                merged_type,
            }))
            .await?;
        self.output.close();
        self.input.close(false);
        Ok(())
    }
}

/// Move the names `variant` declares from `from` into `base`
fn absorb(base: &mut DataRecord, mut from: DataRecord, variant: &Variant) {
    for &name in variant.fields() {
        if let Some(field) = from.take_field(name) {
            base.set_field(name, field);
        }
    }
    for &name in variant.tags() {
        if let Some(value) = from.take_tag(name) {
            base.set_tag(name, value);
        }
    }
    for &name in variant.btags() {
        if let Some(value) = from.take_btag(name) {
            base.set_btag(name, value);
        }
    }
}
