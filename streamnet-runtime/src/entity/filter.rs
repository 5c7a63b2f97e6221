//! Filters: stateless record rewriting without a box function
//!
//! A filter picks the first rule whose guard holds for an incoming record
//! and builds one output record per instruction list of that rule. Output
//! records start empty with the input's interface and mode, get their tags
//! and fields from the instructions, and then inherit whatever the input
//! carries beyond the filter's declared input variant.
//!
//! A name shift renames every label outside its untouched variant by a
//! fixed offset.

use super::{protocol_violation, spawn_entity};
use crate::error::{RecordError, RecordResult, Result};
use crate::network::Info;
use crate::record::{DataRecord, Guard, Record, Variant};
use crate::stream::{Stream, StreamReader, StreamWriter};
use std::sync::Arc;
use streamnet_types::{EntityKind, LocationVector, Name};

/// Integer expression over the incoming record
#[derive(Clone)]
pub struct Expr(Arc<dyn Fn(&DataRecord) -> i32 + Send + Sync>);

impl Expr {
    pub fn new(fun: impl Fn(&DataRecord) -> i32 + Send + Sync + 'static) -> Self {
        Self(Arc::new(fun))
    }

    pub fn constant(value: i32) -> Self {
        Self::new(move |_| value)
    }

    /// Value of tag `name`, zero when absent
    pub fn tag(name: Name) -> Self {
        Self::new(move |rec| rec.tag(name).unwrap_or_default())
    }

    pub fn eval(&self, record: &DataRecord) -> i32 {
        (self.0)(record)
    }
}

/// One step building an output record
#[derive(Clone)]
pub enum FilterInstr {
    Tag(Name, Expr),
    BTag(Name, Expr),
    /// Copy field `from` of the input into `to`
    Field { to: Name, from: Name },
}

#[derive(Clone, Default)]
pub struct FilterRule {
    pub guard: Guard,
    /// One instruction list per output record; empty drops the input
    pub outputs: Vec<Vec<FilterInstr>>,
}

impl FilterRule {
    pub fn new(guard: Guard, outputs: Vec<Vec<FilterInstr>>) -> Self {
        Self { guard, outputs }
    }
}

#[derive(Clone, Default)]
pub struct FilterSpec {
    /// Labels the filter consumes; everything else flows through
    pub input: Variant,
    pub rules: Vec<FilterRule>,
}

impl FilterSpec {
    fn rewrite(&self, input: &DataRecord) -> Option<Vec<RecordResult<DataRecord>>> {
        let rule = self.rules.iter().find(|rule| rule.guard.eval(input))?;
        Some(
            rule.outputs
                .iter()
                .map(|instrs| self.build(input, instrs))
                .collect(),
        )
    }

    fn build(&self, input: &DataRecord, instrs: &[FilterInstr]) -> RecordResult<DataRecord> {
        let mut out = DataRecord::new();
        out.set_interface_id(input.interface_id());
        out.set_mode(input.mode());
        for instr in instrs {
            match instr {
                FilterInstr::Tag(name, expr) => {
                    out.set_tag(*name, expr.eval(input));
                }
                FilterInstr::BTag(name, expr) => {
                    out.set_btag(*name, expr.eval(input));
                }
                FilterInstr::Field { to, from } => {
                    let field = input
                        .field(*from)
                        .ok_or(RecordError::MissingField(*from))?
                        .try_clone()?;
                    out.set_field(*to, field);
                }
            }
        }
        out.flow_inherit(&self.input, input)?;
        Ok(out)
    }
}

/// Spawn a filter reading `input`
pub fn create_filter(input: Stream, info: &mut Info, spec: Arc<FilterSpec>) -> Stream {
    spawn_filter(input, info, spec, "filter")
}

/// Spawn a translate: a filter mapping records between box interfaces
pub fn create_translate(input: Stream, info: &mut Info, spec: Arc<FilterSpec>) -> Stream {
    spawn_filter(input, info, spec, "translate")
}

fn spawn_filter(
    input: Stream,
    info: &mut Info,
    spec: Arc<FilterSpec>,
    label: &'static str,
) -> Stream {
    let input = info.route_update(input, info.location);
    if !info.is_local() {
        return input;
    }
    let output = info.create_stream();
    let entity = FilterEntity {
        label,
        spec,
        input: input.open_read(),
        output: output.open_write(),
        locvec: info.locvec.clone(),
    };
    spawn_entity(EntityKind::Filter, &info.locvec, entity.run());
    output
}

struct FilterEntity {
    label: &'static str,
    spec: Arc<FilterSpec>,
    input: StreamReader,
    output: StreamWriter,
    locvec: LocationVector,
}

impl FilterEntity {
    async fn run(mut self) -> Result<()> {
        loop {
            match self.input.read().await? {
                Record::Data(rec) => self.apply(rec).await?,
                Record::Sync(sync) => self.input.replace(sync.stream),
                Record::SortEnd(sort) => self.output.write(sort).await?,
                Record::Terminate(term) => {
                    self.output.write(term).await?;
                    self.output.close();
                    self.input.close(true);
                    return Ok(());
                }
                other => {
                    return Err(protocol_violation(EntityKind::Filter, &self.locvec, &other))
                }
            }
        }
    }

    async fn apply(&mut self, rec: DataRecord) -> Result<()> {
        let Some(outputs) = self.spec.rewrite(&rec) else {
            tracing::warn!(
                "No guard of {} '{}' holds for {}, dropping record",
                self.label,
                self.locvec,
                rec.variant()
            );
            return Ok(());
        };
        for out in outputs {
            match out {
                Ok(out) => self.output.write(out).await?,
                Err(err) => {
                    tracing::error!("{} '{}' skipped an output: {}", self.label, self.locvec, err)
                }
            }
        }
        Ok(())
    }
}

/// Renames applied by a name shift
#[derive(Debug, Clone, Default)]
pub struct NameShiftSpec {
    pub offset: i32,
    /// Labels left as they are
    pub untouched: Variant,
}

impl NameShiftSpec {
    /// Shift every label of `rec` outside the untouched variant
    pub fn shift(&self, rec: &mut DataRecord) -> RecordResult<()> {
        let fields = self.shifted(rec.fields().names(), |name| self.untouched.has_field(name));
        for name in fields {
            self.rename(name, |from, to| rec.rename_field(from, to))?;
        }
        let tags = self.shifted(rec.tags().names(), |name| self.untouched.has_tag(name));
        for name in tags {
            self.rename(name, |from, to| rec.rename_tag(from, to))?;
        }
        let btags = self.shifted(rec.btags().names(), |name| self.untouched.has_btag(name));
        for name in btags {
            self.rename(name, |from, to| rec.rename_btag(from, to))?;
        }
        Ok(())
    }

    /// Names to move, ordered so no name lands on one still to be moved
    fn shifted(&self, mut names: Vec<Name>, keep: impl Fn(Name) -> bool) -> Vec<Name> {
        names.retain(|&name| !keep(name));
        names.sort_unstable();
        if self.offset > 0 {
            names.reverse();
        }
        names
    }

    fn rename(&self, name: Name, mut rename: impl FnMut(Name, Name) -> bool) -> RecordResult<()> {
        let to = name.wrapping_add(self.offset);
        if rename(name, to) {
            Ok(())
        } else {
            Err(RecordError::NameTaken(to))
        }
    }
}

/// Spawn a name shift reading `input`
pub fn create_name_shift(input: Stream, info: &mut Info, spec: Arc<NameShiftSpec>) -> Stream {
    let input = info.route_update(input, info.location);
    if !info.is_local() {
        return input;
    }
    let output = info.create_stream();
    let entity = NameShiftEntity {
        spec,
        input: input.open_read(),
        output: output.open_write(),
        locvec: info.locvec.clone(),
    };
    spawn_entity(EntityKind::NameShift, &info.locvec, entity.run());
    output
}

struct NameShiftEntity {
    spec: Arc<NameShiftSpec>,
    input: StreamReader,
    output: StreamWriter,
    locvec: LocationVector,
}

impl NameShiftEntity {
    async fn run(mut self) -> Result<()> {
        loop {
            match self.input.read().await? {
                Record::Data(mut rec) => match self.spec.shift(&mut rec) {
                    Ok(()) => self.output.write(rec).await?,
                    Err(err) => {
                        tracing::error!("Name shift '{}' dropped a record: {}", self.locvec, err)
                    }
                },
                Record::Sync(sync) => self.input.replace(sync.stream),
                Record::SortEnd(sort) => self.output.write(sort).await?,
                Record::Terminate(term) => {
                    self.output.write(term).await?;
                    self.output.close();
                    self.input.close(true);
                    return Ok(());
                }
                other => {
                    return Err(protocol_violation(
                        EntityKind::NameShift,
                        &self.locvec,
                        &other,
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{filter, name_shift};
    use crate::record::{CloneInterface, RecordKind, SortEnd};
    use crate::testing::{data, drain, kinds, tag_of, TAG};

    fn add(amount: i32) -> Vec<FilterInstr> {
        vec![FilterInstr::Tag(
            TAG,
            Expr::new(move |rec| rec.tag(TAG).unwrap_or_default() + amount),
        )]
    }

    #[tokio::test]
    async fn test_filter_builds_records_from_instructions() {
        let iface = CloneInterface::<i64>::new(3);
        let spec = FilterSpec {
            input: Variant::new().with_field(10).with_tag(TAG),
            rules: vec![FilterRule::new(
                Guard::always(),
                vec![vec![
                    FilterInstr::Tag(2, Expr::new(|rec| rec.tag(TAG).unwrap_or_default() * 2)),
                    FilterInstr::BTag(4, Expr::constant(1)),
                    FilterInstr::Field { to: 11, from: 10 },
                ]],
            )],
        };
        let input = Stream::new();
        let output = filter(spec)(input.clone(), &mut Info::default());
        let mut writer = input.open_write();
        let rec = data(4).with_field(10, iface.field(42)).with_tag(7, 9);
        writer.write(rec).await.unwrap();
        writer.write(Record::terminate()).await.unwrap();

        let records = drain(output).await;
        let Record::Data(out) = &records[0] else {
            panic!("expected data, got {:?}", records[0].kind());
        };
        assert_eq!(out.tag(2), Some(8));
        assert_eq!(out.btag(4), Some(1));
        assert_eq!(out.tag(7), Some(9));
        assert!(!out.has_tag(TAG));
        assert!(!out.has_field(10));
        assert_eq!(out.field(11).and_then(|f| f.downcast_ref::<i64>()), Some(&42));
    }

    #[tokio::test]
    async fn test_first_true_guard_selects_outputs() {
        let spec = FilterSpec {
            input: Variant::new().with_tag(TAG),
            rules: vec![
                FilterRule::new(Guard::new(|rec| rec.tag(TAG) == Some(0)), vec![add(100)]),
                FilterRule::new(Guard::always(), vec![add(1), add(2)]),
                FilterRule::new(Guard::always(), vec![add(50)]),
            ],
        };
        let input = Stream::new();
        let output = filter(spec)(input.clone(), &mut Info::default());
        let mut writer = input.open_write();
        writer.write(data(5)).await.unwrap();
        writer.write(data(0)).await.unwrap();
        writer.write(Record::terminate()).await.unwrap();

        let records = drain(output).await;
        assert_eq!(records.iter().filter_map(tag_of).collect::<Vec<_>>(), vec![6, 7, 100]);
    }

    #[tokio::test]
    async fn test_unmatched_record_is_dropped() {
        let spec = FilterSpec {
            input: Variant::new().with_tag(TAG),
            rules: vec![FilterRule::new(Guard::new(|rec| rec.tag(TAG) == Some(1)), vec![add(0)])],
        };
        let input = Stream::new();
        let output = filter(spec)(input.clone(), &mut Info::default());
        let mut writer = input.open_write();
        writer.write(data(2)).await.unwrap();
        writer.write(SortEnd::new(0, 3)).await.unwrap();
        writer.write(Record::terminate()).await.unwrap();

        let records = drain(output).await;
        assert_eq!(kinds(&records), vec![RecordKind::SortEnd, RecordKind::Terminate]);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(input.is_destroyed());
    }

    #[test]
    fn test_missing_field_fails_only_that_output() {
        let spec = FilterSpec {
            input: Variant::new().with_tag(TAG),
            rules: vec![FilterRule::new(
                Guard::always(),
                vec![vec![FilterInstr::Field { to: 2, from: 3 }], add(1)],
            )],
        };
        let outputs = spec.rewrite(&data(1)).unwrap();
        assert!(matches!(outputs[0], Err(RecordError::MissingField(3))));
        assert_eq!(outputs[1].as_ref().ok().and_then(|r| r.tag(TAG)), Some(2));
    }

    #[test]
    fn test_shift_moves_overlapping_names() {
        let spec = NameShiftSpec {
            offset: 1,
            untouched: Variant::new().with_tag(5),
        };
        let mut rec = DataRecord::new()
            .with_tag(1, 10)
            .with_tag(2, 20)
            .with_tag(5, 50)
            .with_btag(8, 80);
        spec.shift(&mut rec).unwrap();
        assert_eq!((rec.tag(2), rec.tag(3), rec.tag(5)), (Some(10), Some(20), Some(50)));
        assert!(!rec.has_tag(1));
        assert_eq!(rec.btag(9), Some(80));

        let back = NameShiftSpec {
            offset: -1,
            untouched: Variant::new().with_tag(5),
        };
        back.shift(&mut rec).unwrap();
        assert_eq!((rec.tag(1), rec.tag(2)), (Some(10), Some(20)));
    }

    #[test]
    fn test_shift_onto_untouched_name_fails() {
        let spec = NameShiftSpec {
            offset: 1,
            untouched: Variant::new().with_tag(2),
        };
        let mut rec = DataRecord::new().with_tag(1, 10).with_tag(2, 20);
        assert!(matches!(spec.shift(&mut rec), Err(RecordError::NameTaken(2))));
    }

    #[tokio::test]
    async fn test_name_shift_entity_forwards_shifted_records() {
        let input = Stream::new();
        let output = name_shift(10, Variant::new())(input.clone(), &mut Info::default());
        let mut writer = input.open_write();
        writer.write(data(3)).await.unwrap();
        writer.write(Record::terminate()).await.unwrap();

        let records = drain(output).await;
        let Record::Data(out) = &records[0] else {
            panic!("expected data, got {:?}", records[0].kind());
        };
        assert_eq!(out.tag(TAG + 10), Some(3));
        assert!(records[1].is_terminate());
    }
}
