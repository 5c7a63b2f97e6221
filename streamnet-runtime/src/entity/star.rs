//! Star: repeat the body until a record matches an exit pattern
//!
//! The first instance dispatches records from outside; every later
//! iteration is an incarnate instance spawned behind one more copy of the
//! body. All instances feed the same dynamic collector, each announcing
//! the output of the iteration it creates.

use super::{collector, protocol_violation, spawn_entity};
use crate::error::Result;
use crate::network::{Info, Net};
use crate::record::{Pattern, Record, SortEnd, Terminate};
use crate::stream::{Stream, StreamReader, StreamWriter};
use std::sync::Arc;
use streamnet_types::EntityKind;

pub struct StarSpec {
    pub body: Net,
    pub exits: Vec<Pattern>,
    pub deterministic: bool,
}

pub fn create_star(input: Stream, info: &mut Info, spec: Arc<StarSpec>) -> Stream {
    let input = info.route_update(input, info.location);
    if !info.is_local() {
        return input;
    }
    info.locvec.star_enter();
    let out = info.create_stream();
    let scope = info.clone();
    info.locvec.star_leave();

    let output = collector::create_dynamic(out.clone(), info);
    spawn_star(input, out, scope, spec, false);
    output
}

/// Instance serving one generated iteration
fn create_incarnate(input: Stream, info: &Info, spec: Arc<StarSpec>) -> Stream {
    let out = info.create_stream();
    spawn_star(input, out.clone(), info.clone(), spec, true);
    out
}

fn spawn_star(input: Stream, out: Stream, info: Info, spec: Arc<StarSpec>, incarnate: bool) {
    let locvec = info.locvec.clone();
    let star = Star {
        input: input.open_read(),
        out: out.open_write(),
        next: None,
        gc: info.config().gc.enabled,
        spec,
        incarnate,
        sync_cleanup: false,
        counter: 0,
        info,
    };
    spawn_entity(EntityKind::Star, &locvec, star.run());
}

struct Star {
    input: StreamReader,
    out: StreamWriter,
    /// Input of the next iteration, once created
    next: Option<StreamWriter>,
    spec: Arc<StarSpec>,
    incarnate: bool,
    gc: bool,
    /// Splice out as soon as the next iteration exists
    sync_cleanup: bool,
    counter: i32,
    info: Info,
}

impl Star {
    async fn run(mut self) -> Result<()> {
        loop {
            match self.input.read().await? {
                Record::Data(rec) => {
                    if self.spec.exits.iter().any(|exit| exit.matches(&rec)) {
                        self.out.write(rec).await?;
                    } else {
                        if self.next.is_none() {
                            self.instantiate_next().await?;
                        }
                        if let Some(next) = &mut self.next {
                            next.write(rec).await?;
                        }
                        if self.sync_cleanup {
                            let stream = self.input.stream().clone();
                            return self.splice_out(Record::sync(stream)).await;
                        }
                    }
                    if self.spec.deterministic && !self.incarnate {
                        self.send_sort_end(SortEnd::new(0, self.counter)).await?;
                        self.counter = self.counter.wrapping_add(1);
                    }
                }
                Record::Sync(sync) => {
                    let collapsible = self.incarnate
                        && self.gc
                        && sync
                            .stream
                            .source()
                            .is_some_and(|source| source.is_parent_of(&self.info.locvec));
                    if collapsible {
                        if self.next.is_some() {
                            return self.splice_out(Record::Sync(sync)).await;
                        }
                        self.sync_cleanup = true;
                    }
                    self.input.replace(sync.stream);
                }
                Record::SortEnd(sort) => {
                    let sort = if self.incarnate { sort } else { sort.deeper() };
                    self.send_sort_end(sort).await?;
                }
                Record::Terminate(term) => {
                    if let Some(mut next) = self.next.take() {
                        next.write(term).await?;
                        next.close();
                    }
                    self.out.write(term).await?;
                    self.out.close();
                    self.input.close(true);
                    return Ok(());
                }
                other => {
                    return Err(protocol_violation(
                        EntityKind::Star,
                        &self.info.locvec,
                        &other,
                    ))
                }
            }
        }
    }

    /// Build body and star for the next iteration and announce its output
    async fn instantiate_next(&mut self) -> Result<()> {
        let stream = self.info.create_stream();
        stream.set_source(self.info.locvec.clone());

        let mut child = self.info.clone();
        child.locvec.star_spawn();
        let body_out = (self.spec.body)(stream.clone(), &mut child);
        let star_out = create_incarnate(body_out, &child, self.spec.clone());
        let star_out = self.info.route_update(star_out, self.info.location);
        tracing::debug!(
            "Star '{}' creates iteration '{}'",
            self.info.locvec,
            child.locvec
        );

        self.out.write(Record::collect(star_out)).await?;
        self.next = Some(stream.open_write());
        Ok(())
    }

    async fn send_sort_end(&mut self, sort: SortEnd) -> Result<()> {
        if let Some(next) = &mut self.next {
            next.write(sort).await?;
        }
        self.out.write(sort).await?;
        Ok(())
    }

    /// Leave the network: the next iteration takes over `redirect` and the
    /// collector drops this instance's branch. The input stream is destroyed
    /// unless it is the stream being handed over.
    async fn splice_out(mut self, redirect: Record) -> Result<()> {
        tracing::debug!("Star '{}' splices itself out", self.info.locvec);
        let handed_over = match &redirect {
            Record::Sync(sync) => sync.stream.same_stream(self.input.stream()),
            _ => false,
        };
        if let Some(mut next) = self.next.take() {
            next.write(redirect).await?;
            next.close();
        }
        self.out.write(Terminate::obsolete()).await?;
        self.out.close();
        self.input.close(!handed_over);
        Ok(())
    }
}
