//! Split: one body instance per tag value
//!
//! A record carrying the tag range `lo..=hi` goes to the instances for every
//! value in the range, created on first use. New instances are announced to
//! the dynamic collector with a `Collect` record on the initial stream
//! before anything is written to them.

use super::{collector, protocol_violation, spawn_entity};
use crate::error::{RecordError, Result};
use crate::network::{Info, Net};
use crate::record::{DataRecord, Record, SortEnd};
use crate::stream::{SetKey, Stream, StreamReader, StreamSet, StreamWriter};
use std::collections::HashMap;
use streamnet_types::{EntityKind, Name};

#[derive(Clone)]
pub struct SplitSpec {
    pub body: Net,
    pub ltag: Name,
    pub utag: Name,
    /// Place the instance for tag value `i` at location `i`
    pub by_location: bool,
    pub deterministic: bool,
}

pub fn create_split(input: Stream, info: &mut Info, spec: SplitSpec) -> Stream {
    let input = info.route_update(input, info.location);
    if !info.is_local() {
        return input;
    }
    info.locvec.split_enter();
    let initial = info.create_stream();
    let scope = info.clone();
    info.locvec.split_leave();

    let output = collector::create_dynamic(initial.clone(), info);
    spawn_split(input, initial, scope, spec);
    output
}

fn spawn_split(input: Stream, initial: Stream, info: Info, spec: SplitSpec) {
    let split = Split {
        input: input.open_read(),
        initial: initial.open_write(),
        instances: HashMap::new(),
        writers: StreamSet::new(),
        spec,
        counter: 0,
        info,
    };
    let locvec = split.info.locvec.clone();
    spawn_entity(EntityKind::Split, &locvec, split.run());
}

struct Split {
    input: StreamReader,
    initial: StreamWriter,
    instances: HashMap<i32, SetKey>,
    writers: StreamSet<StreamWriter>,
    spec: SplitSpec,
    counter: i32,
    info: Info,
}

impl Split {
    async fn run(mut self) -> Result<()> {
        loop {
            match self.input.read().await? {
                Record::Data(rec) => self.dispatch(rec).await?,
                Record::Sync(sync) => self.input.replace(sync.stream),
                Record::SortEnd(sort) => self.broadcast(sort.deeper()).await?,
                Record::Terminate(term) => {
                    for mut writer in self.writers.drain() {
                        writer.write(term).await?;
                        writer.close();
                    }
                    self.initial.write(term).await?;
                    self.initial.close();
                    self.input.close(true);
                    return Ok(());
                }
                other => {
                    return Err(protocol_violation(
                        EntityKind::Split,
                        &self.info.locvec,
                        &other,
                    ))
                }
            }
        }
    }

    async fn dispatch(&mut self, rec: DataRecord) -> Result<()> {
        let lo = rec
            .tag(self.spec.ltag)
            .ok_or(RecordError::MissingTag(self.spec.ltag))?;
        let hi = rec
            .tag(self.spec.utag)
            .ok_or(RecordError::MissingTag(self.spec.utag))?;
        if lo > hi {
            tracing::warn!(
                "Split '{}' got empty range {}..={}; dropping record",
                self.info.locvec,
                lo,
                hi
            );
            return Ok(());
        }

        for index in lo..hi {
            let copy = rec.try_copy()?;
            self.send(index, copy).await?;
        }
        self.send(hi, rec).await?;

        if self.spec.deterministic {
            self.broadcast(SortEnd::new(0, self.counter)).await?;
            self.counter = self.counter.wrapping_add(1);
        }
        Ok(())
    }

    async fn send(&mut self, index: i32, rec: DataRecord) -> Result<()> {
        let key = match self.instances.get(&index) {
            Some(&key) => key,
            None => self.instantiate(index).await?,
        };
        if let Some(writer) = self.writers.get_mut(key) {
            writer.write(rec).await?;
        }
        Ok(())
    }

    /// Build the body instance for `index` and announce its output
    async fn instantiate(&mut self, index: i32) -> Result<SetKey> {
        let mut info = self.info.clone();
        info.locvec = self.info.locvec.split_spawn(index);
        if self.spec.by_location {
            info.location = index;
        }
        let stream = info.create_stream();
        let output = (self.spec.body)(stream.clone(), &mut info);
        let output = self.info.route_update(output, self.info.location);
        tracing::debug!(
            "Split '{}' creates instance {} at '{}'",
            self.info.locvec,
            index,
            info.locvec
        );
        self.initial.write(Record::collect(output)).await?;

        let key = self.writers.put(stream.open_write());
        self.instances.insert(index, key);
        Ok(key)
    }

    async fn broadcast(&mut self, sort: SortEnd) -> Result<()> {
        let mut cursor = self.writers.cursor();
        while let Some(writer) = cursor.move_next() {
            writer.write(sort).await?;
        }
        self.initial.write(sort).await?;
        Ok(())
    }
}
