//! Box: wraps one external computation
//!
//! The box function runs once per data record (and once per trigger for
//! initialiser boxes) and emits any number of output records through its
//! [`BoxContext`]. Emitted records inherit the input's unconsumed fields and
//! tags they do not name themselves.

use super::{protocol_violation, spawn_entity};
use crate::error::{BoxError, RecordError, RecordResult, Result};
use crate::network::Info;
use crate::record::{DataMode, DataRecord, Field, Record, Variant};
use crate::stream::{Stream, StreamReader, StreamWriter};
use std::sync::Arc;
use streamnet_types::{EntityKind, LocationVector, Name};

/// External computation run by a box
pub type BoxFn =
    Arc<dyn Fn(&mut BoxContext<'_>) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Handle passed to a box function for one invocation
pub struct BoxContext<'a> {
    name: &'a str,
    input: Option<&'a mut DataRecord>,
    emitted: Vec<DataRecord>,
}

impl<'a> BoxContext<'a> {
    pub fn new(name: &'a str, input: Option<&'a mut DataRecord>) -> Self {
        Self {
            name,
            input,
            emitted: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// The input record; `None` when the box was triggered as initialiser
    pub fn input(&self) -> Option<&DataRecord> {
        self.input.as_deref()
    }

    pub fn input_mut(&mut self) -> Option<&mut DataRecord> {
        self.input.as_deref_mut()
    }

    pub fn is_trigger(&self) -> bool {
        self.input.is_none()
    }

    pub fn tag(&self, name: Name) -> Option<i32> {
        self.input().and_then(|rec| rec.tag(name))
    }

    /// Take a field from the input, leaving its name consumed
    pub fn take_field(&mut self, name: Name) -> RecordResult<Field> {
        self.input_mut()
            .and_then(|rec| rec.take_field(name))
            .ok_or(RecordError::MissingField(name))
    }

    /// Emit a record of type `variant`, with values given in the variant's
    /// name order
    pub fn emit(
        &mut self,
        variant: &Variant,
        fields: Vec<Field>,
        tags: Vec<i32>,
        btags: Vec<i32>,
    ) -> RecordResult<()> {
        check_arity("fields", variant.fields().len(), fields.len())?;
        check_arity("tags", variant.tags().len(), tags.len())?;
        check_arity("binding tags", variant.btags().len(), btags.len())?;

        let mut record = DataRecord::new();
        if let Some(first) = fields.first() {
            record.set_interface_id(first.interface_id());
        }
        for (&name, field) in variant.fields().iter().zip(fields) {
            record.set_field(name, field);
        }
        for (&name, value) in variant.tags().iter().zip(tags) {
            record.set_tag(name, value);
        }
        for (&name, value) in variant.btags().iter().zip(btags) {
            record.set_btag(name, value);
        }
        self.emit_record(record)
    }

    /// Emit a prepared record
    pub fn emit_record(&mut self, mut record: DataRecord) -> RecordResult<()> {
        match self.input.as_deref() {
            Some(input) => {
                let own = record.variant();
                record.flow_inherit(&own, input)?;
                record.set_mode(input.mode());
                if record.fields().is_empty() {
                    record.set_interface_id(input.interface_id());
                }
            }
            None => record.set_mode(DataMode::Textual),
        }
        self.emitted.push(record);
        Ok(())
    }

    pub fn into_emitted(self) -> Vec<DataRecord> {
        self.emitted
    }
}

fn check_arity(what: &'static str, expected: usize, actual: usize) -> RecordResult<()> {
    if expected != actual {
        return Err(RecordError::ArityMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Spawn a box reading `input`
pub fn create_box(input: Stream, info: &mut Info, name: Arc<str>, fun: BoxFn) -> Stream {
    let input = info.route_update(input, info.location);
    if !info.is_local() {
        return input;
    }
    let output = info.create_stream();
    let entity = BoxEntity {
        name,
        fun,
        input: input.open_read(),
        output: output.open_write(),
        locvec: info.locvec.clone(),
    };
    spawn_entity(EntityKind::Box, &info.locvec, entity.run());
    output
}

struct BoxEntity {
    name: Arc<str>,
    fun: BoxFn,
    input: StreamReader,
    output: StreamWriter,
    locvec: LocationVector,
}

impl BoxEntity {
    async fn run(mut self) -> Result<()> {
        loop {
            match self.input.read().await? {
                Record::Data(mut rec) => self.invoke(Some(&mut rec)).await?,
                Record::TriggerInit => self.invoke(None).await?,
                Record::Sync(sync) => self.input.replace(sync.stream),
                Record::SortEnd(sort) => self.output.write(sort).await?,
                Record::Terminate(term) => {
                    self.output.write(term).await?;
                    self.input.close(true);
                    self.output.close();
                    return Ok(());
                }
                other => {
                    return Err(protocol_violation(EntityKind::Box, &self.locvec, &other))
                }
            }
        }
    }

    async fn invoke(&mut self, input: Option<&mut DataRecord>) -> Result<()> {
        let emitted = {
            let mut ctx = BoxContext::new(&self.name, input);
            if let Err(err) = (self.fun)(&mut ctx) {
                tracing::error!("Box '{}' at '{}' failed: {}", self.name, self.locvec, err);
            }
            ctx.into_emitted()
        };
        for rec in emitted {
            self.output.write(rec).await?;
        }
        Ok(())
    }
}
