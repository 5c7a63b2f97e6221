//! Collector: fan-in of branch streams
//!
//! Branches start in the `ready` set. A branch that delivers a `SortEnd`
//! moves to `waiting` and is not read again until every other branch has
//! delivered the same barrier; then the sets swap and the barrier is
//! forwarded one level up. Data records are forwarded as they arrive.
//!
//! A static collector merges a fixed set of branches and splices itself out
//! with a `Sync` once a single branch is left, unless a real (non-obsolete)
//! `Terminate` already arrived: then it drains the last branch and forwards
//! that one. A dynamic collector starts from one initial stream and grows
//! with every `Collect` record.

use super::{protocol_violation, spawn_entity};
use crate::error::Result;
use crate::network::Info;
use crate::record::{Record, RecordKind, SortEnd, Terminate};
use crate::stream::{SetKey, Stream, StreamReader, StreamSet, StreamWriter};
use streamnet_types::{EntityKind, LocationVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Static,
    Dynamic,
}

/// Merge a fixed set of streams
pub fn create_static(streams: Vec<Stream>, info: &Info) -> Stream {
    if streams.is_empty() {
        tracing::warn!(
            "Collector '{}' created without branches; its output only terminates",
            info.locvec
        );
    }
    let readers = streams.iter().map(Stream::open_read).collect();
    spawn(readers, Mode::Static, info)
}

/// Merge `initial` and every stream announced on it or on its branches
pub fn create_dynamic(initial: Stream, info: &Info) -> Stream {
    spawn(vec![initial.open_read()], Mode::Dynamic, info)
}

fn spawn(readers: Vec<StreamReader>, mode: Mode, info: &Info) -> Stream {
    let output = info.create_stream();
    let mut ready = StreamSet::new();
    for reader in readers {
        ready.put(reader);
    }
    let collector = Collector {
        output: output.open_write(),
        ready,
        waiting: StreamSet::new(),
        current: None,
        sort_end: None,
        terminate: None,
        mode,
        scan_waiting: info.config().gc.scan_waiting_on_collect,
        locvec: info.locvec.clone(),
    };
    tracing::debug!(
        "Collector '{}' ({:?}) over {} streams",
        info.locvec,
        mode,
        collector.ready.len()
    );
    spawn_entity(EntityKind::Collector, &info.locvec, collector.run());
    output
}

struct Collector {
    output: StreamWriter,
    ready: StreamSet,
    waiting: StreamSet,
    current: Option<SetKey>,
    sort_end: Option<SortEnd>,
    terminate: Option<Terminate>,
    mode: Mode,
    scan_waiting: bool,
    locvec: LocationVector,
}

impl Collector {
    fn live_branches(&self) -> usize {
        self.ready.len() + self.waiting.len()
    }

    /// A real Terminate arrived on some branch; the rest will follow
    fn shutting_down(&self) -> bool {
        self.terminate.is_some_and(|term| !term.obsolete)
    }

    async fn run(mut self) -> Result<()> {
        loop {
            if self.settle().await? {
                return Ok(());
            }
            let Some((key, record)) = self.next_record().await? else {
                continue;
            };
            match record {
                Record::Data(rec) => self.output.write(rec).await?,
                Record::SortEnd(sort) => self.on_sort_end(key, sort),
                Record::Sync(sync) => {
                    if let Some(reader) = self.ready.get_mut(key) {
                        reader.replace(sync.stream);
                    }
                }
                Record::Collect(stream) if self.mode == Mode::Dynamic => {
                    if self.scan_waiting {
                        self.close_terminated_waiting()?;
                    }
                    tracing::trace!("Collector '{}' adds {}", self.locvec, stream.id());
                    self.ready.put(stream.open_read());
                }
                Record::Terminate(term) => {
                    if let Some(reader) = self.ready.remove(key) {
                        reader.close(true);
                    }
                    self.current = None;
                    // a real shutdown outranks one produced by gc
                    if self.terminate.map_or(true, |kept| kept.obsolete) {
                        self.terminate = Some(term);
                    }
                }
                other => {
                    return Err(protocol_violation(
                        EntityKind::Collector,
                        &self.locvec,
                        &other,
                    ))
                }
            }
        }
    }

    /// Next record from the current branch while it has data, else from
    /// whichever ready branch has one
    async fn next_record(&mut self) -> Result<Option<(SetKey, Record)>> {
        let key = match self.current {
            Some(key) if self.ready.get(key).is_some_and(StreamReader::has_data) => key,
            _ => match self.ready.poll().await {
                Some(key) => key,
                None => return Ok(None),
            },
        };
        self.current = Some(key);
        let Some(reader) = self.ready.get_mut(key) else {
            return Ok(None);
        };
        Ok(Some((key, reader.read().await?)))
    }

    fn on_sort_end(&mut self, key: SetKey, sort: SortEnd) {
        if let Some(reader) = self.ready.remove(key) {
            self.waiting.put(reader);
        }
        self.current = None;
        match self.sort_end {
            Some(buffered) if buffered != sort => {
                tracing::warn!(
                    "Collector '{}' got sort-end ({}, {}) while holding ({}, {}); dropping it",
                    self.locvec,
                    sort.level,
                    sort.num,
                    buffered.level,
                    buffered.num
                );
            }
            Some(_) => {}
            None => self.sort_end = Some(sort),
        }
    }

    /// Drop waiting branches whose next record is a Terminate
    fn close_terminated_waiting(&mut self) -> Result<()> {
        let mut cursor = self.waiting.cursor();
        while let Some(reader) = cursor.move_next() {
            if reader.peek_kind() != Some(RecordKind::Terminate) {
                continue;
            }
            let _ = reader.try_read()?;
            if let Some(reader) = cursor.remove() {
                reader.close(true);
            }
        }
        Ok(())
    }

    /// Advance rounds, collapse or finish as the branch sets dictate.
    /// Returns `true` once the collector is done.
    async fn settle(&mut self) -> Result<bool> {
        loop {
            if self.mode == Mode::Static && self.live_branches() == 1 && !self.shutting_down() {
                self.collapse().await?;
                return Ok(true);
            }
            if !self.ready.is_empty() {
                return Ok(false);
            }
            if self.waiting.is_empty() {
                let term = self.terminate.take().unwrap_or_default();
                self.output.write(term).await?;
                return Ok(true);
            }
            std::mem::swap(&mut self.ready, &mut self.waiting);
            self.current = None;
            self.flush_sort_end().await?;
        }
    }

    async fn flush_sort_end(&mut self) -> Result<()> {
        if let Some(sort) = self.sort_end.take().and_then(SortEnd::shallower) {
            self.output.write(sort).await?;
        }
        Ok(())
    }

    /// Hand the last branch directly to the consumer
    async fn collapse(&mut self) -> Result<()> {
        let reader = match self.ready.first_key() {
            Some(key) => self.ready.remove(key),
            None => {
                self.flush_sort_end().await?;
                self.waiting.first_key().and_then(|key| self.waiting.remove(key))
            }
        };
        if let Some(reader) = reader {
            let stream = reader.stream().clone();
            tracing::debug!(
                "Collector '{}' collapses onto {}",
                self.locvec,
                stream.id()
            );
            reader.close(false);
            self.output.write(Record::sync(stream)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::testing::{data, drain, kinds, read_next, tag_of};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sort_end_barrier_orders_rounds() {
        let info = Info::default();
        let a = Stream::new();
        let b = Stream::new();
        let output = create_static(vec![a.clone(), b.clone()], &info);
        let mut reader = output.open_read();

        let mut wa = a.open_write();
        let mut wb = b.open_write();
        wa.write(data(1)).await.unwrap();
        wa.write(SortEnd::new(1, 0)).await.unwrap();
        wa.write(data(10)).await.unwrap();

        assert_eq!(tag_of(&read_next(&mut reader).await), Some(1));

        // a is waiting; its round-two record must not appear yet
        wb.write(data(2)).await.unwrap();
        wb.write(data(3)).await.unwrap();
        assert_eq!(tag_of(&read_next(&mut reader).await), Some(2));
        assert_eq!(tag_of(&read_next(&mut reader).await), Some(3));
        wb.write(SortEnd::new(1, 0)).await.unwrap();

        match read_next(&mut reader).await {
            Record::SortEnd(sort) => assert_eq!(sort, SortEnd::new(0, 0)),
            other => panic!("expected sort-end, got {:?}", other.kind()),
        }
        assert_eq!(tag_of(&read_next(&mut reader).await), Some(10));
    }

    #[tokio::test]
    async fn test_level_zero_sort_end_is_absorbed() {
        let info = Info::default();
        let a = Stream::new();
        let b = Stream::new();
        let output = create_static(vec![a.clone(), b.clone()], &info);

        let mut wa = a.open_write();
        let mut wb = b.open_write();
        wa.write(data(1)).await.unwrap();
        wa.write(SortEnd::new(0, 0)).await.unwrap();
        wb.write(data(2)).await.unwrap();
        wb.write(data(3)).await.unwrap();
        wb.write(SortEnd::new(0, 0)).await.unwrap();
        wa.write(Record::terminate()).await.unwrap();
        wb.write(Record::terminate()).await.unwrap();

        let records = drain(output).await;
        let mut tags: Vec<i32> = records.iter().filter_map(tag_of).collect();
        tags.sort();
        assert!(records.iter().all(|r| r.kind() != RecordKind::SortEnd));
        assert_eq!(tags, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_static_collapses_onto_last_branch() {
        let info = Info::default();
        let a = Stream::new();
        let b = Stream::new();
        let output = create_static(vec![a.clone(), b.clone()], &info);
        let mut reader = output.open_read();

        a.open_write().write(Terminate::obsolete()).await.unwrap();
        match read_next(&mut reader).await {
            Record::Sync(sync) => assert!(sync.stream.same_stream(&b)),
            other => panic!("expected sync, got {:?}", other.kind()),
        }
        assert!(a.is_destroyed());
        assert!(!b.is_destroyed());
    }

    #[tokio::test]
    async fn test_collapse_onto_waiting_branch_flushes_sort_end() {
        let info = Info::default();
        let a = Stream::new();
        let b = Stream::new();
        let output = create_static(vec![a.clone(), b.clone()], &info);
        let mut reader = output.open_read();

        a.open_write().write(SortEnd::new(1, 0)).await.unwrap();
        // let `a` reach the waiting set before `b` leaves
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        b.open_write().write(Terminate::obsolete()).await.unwrap();

        match read_next(&mut reader).await {
            Record::SortEnd(sort) => assert_eq!(sort, SortEnd::new(0, 0)),
            other => panic!("expected sort-end, got {:?}", other.kind()),
        }
        match read_next(&mut reader).await {
            Record::Sync(sync) => assert!(sync.stream.same_stream(&a)),
            other => panic!("expected sync, got {:?}", other.kind()),
        }
        assert!(b.is_destroyed());
        assert!(!a.is_destroyed());
    }

    #[tokio::test]
    async fn test_no_collapse_after_real_terminate() {
        let info = Info::default();
        let a = Stream::new();
        let b = Stream::new();
        let output = create_static(vec![a.clone(), b.clone()], &info);

        a.open_write().write(Record::terminate()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let mut wb = b.open_write();
        wb.write(data(3)).await.unwrap();
        wb.write(Terminate::obsolete()).await.unwrap();

        let mut reader = output.open_read();
        assert_eq!(tag_of(&read_next(&mut reader).await), Some(3));
        match read_next(&mut reader).await {
            Record::Terminate(term) => assert!(!term.obsolete),
            other => panic!("expected terminate, got {:?}", other.kind()),
        }
        assert!(b.is_destroyed());
    }

    #[tokio::test]
    async fn test_static_without_branches_terminates() {
        let output = create_static(Vec::new(), &Info::default());
        let records = drain(output).await;
        assert_eq!(kinds(&records), vec![RecordKind::Terminate]);
    }

    #[tokio::test]
    async fn test_single_stream_collapses_immediately() {
        let info = Info::default();
        let a = Stream::new();
        let output = create_static(vec![a.clone()], &info);
        let mut reader = output.open_read();
        assert_eq!(read_next(&mut reader).await.kind(), RecordKind::Sync);
    }

    #[tokio::test]
    async fn test_mismatched_sort_end_keeps_first() {
        let info = Info::default();
        let a = Stream::new();
        let b = Stream::new();
        let c = Stream::new();
        let output = create_static(vec![a.clone(), b.clone(), c.clone()], &info);
        let mut reader = output.open_read();

        a.open_write().write(SortEnd::new(2, 5)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        b.open_write().write(SortEnd::new(2, 9)).await.unwrap();
        c.open_write().write(SortEnd::new(2, 5)).await.unwrap();
        match read_next(&mut reader).await {
            Record::SortEnd(sort) => assert_eq!(sort, SortEnd::new(1, 5)),
            other => panic!("expected sort-end, got {:?}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_dynamic_grows_and_terminates_once() {
        let info = Info::default();
        let initial = Stream::new();
        let output = create_dynamic(initial.clone(), &info);
        let branch_a = Stream::new();
        let branch_b = Stream::new();

        let mut init = initial.open_write();
        init.write(Record::collect(branch_a.clone())).await.unwrap();
        init.write(Record::collect(branch_b.clone())).await.unwrap();
        branch_a.open_write().write(data(1)).await.unwrap();
        branch_b.open_write().write(data(2)).await.unwrap();
        branch_a.open_write().write(Record::terminate()).await.unwrap();
        branch_b.open_write().write(Record::terminate()).await.unwrap();
        init.write(Record::terminate()).await.unwrap();

        let records = drain(output).await;
        let mut tags: Vec<i32> = records.iter().filter_map(tag_of).collect();
        tags.sort();
        assert_eq!(tags, vec![1, 2]);
        assert_eq!(records.iter().filter(|r| r.is_terminate()).count(), 1);
        assert!(records.last().is_some_and(Record::is_terminate));
    }

    #[tokio::test]
    async fn test_collect_from_branch_stream() {
        let info = Info::default();
        let initial = Stream::new();
        let output = create_dynamic(initial.clone(), &info);
        let nested = Stream::new();

        let mut init = initial.open_write();
        init.write(Record::collect(nested.clone())).await.unwrap();
        let deeper = Stream::new();
        nested.open_write().write(Record::collect(deeper.clone())).await.unwrap();
        deeper.open_write().write(data(7)).await.unwrap();
        deeper.open_write().write(Record::terminate()).await.unwrap();
        nested.open_write().write(Record::terminate()).await.unwrap();
        init.write(Record::terminate()).await.unwrap();

        let records = drain(output).await;
        assert_eq!(records.iter().filter_map(tag_of).collect::<Vec<_>>(), vec![7]);
    }

    #[tokio::test]
    async fn test_collect_closes_terminated_waiting_branches() {
        let info = Info::default();
        let initial = Stream::new();
        let branch = Stream::new();
        let _output = create_dynamic(initial.clone(), &info);

        let mut init = initial.open_write();
        init.write(Record::collect(branch.clone())).await.unwrap();
        let mut wb = branch.open_write();
        wb.write(SortEnd::new(1, 0)).await.unwrap();
        wb.write(Record::terminate()).await.unwrap();
        // give the collector time to park `branch` in the waiting set
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        init.write(Record::collect(Stream::new())).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(branch.is_destroyed());
    }

    #[tokio::test]
    async fn test_collect_on_static_is_violation() {
        let info = Info::new(Arc::new(RuntimeConfig::default()));
        let a = Stream::new();
        let b = Stream::new();
        let output = create_static(vec![a.clone(), b.clone()], &info);
        a.open_write().write(Record::collect(Stream::new())).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(output.is_empty());
        // the collector task is gone; nothing reads `a` anymore
        a.open_write().write(data(1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(a.len(), 1);
    }
}
