//! Parallel: choice dispatcher
//!
//! Each data record goes to the branch whose declared variants match it
//! best. Branches declaring no variant are initialisers: they get a single
//! trigger and a terminate and never see data.

use super::{collector, protocol_violation, spawn_entity};
use crate::error::Result;
use crate::network::{Info, Net};
use crate::record::{best_match, Record, SortEnd, Terminate, Variant, VariantList};
use crate::stream::{Stream, StreamReader, StreamWriter};
use streamnet_types::{EntityKind, LocationVector};

/// One alternative of a parallel composition
#[derive(Clone)]
pub struct Branch {
    pub patterns: VariantList,
    pub net: Net,
}

struct Route {
    patterns: VariantList,
    writer: StreamWriter,
}

/// Instantiate every branch, merge their outputs and dispatch `input`
pub fn create_parallel(
    input: Stream,
    info: &mut Info,
    branches: Vec<Branch>,
    deterministic: bool,
) -> Stream {
    let input = info.route_update(input, info.location);
    if !info.is_local() {
        return input;
    }

    let mut outputs = Vec::with_capacity(branches.len());
    let mut routes = Vec::with_capacity(branches.len());
    info.locvec.parallel_enter();
    for branch in branches {
        info.locvec.parallel_next();
        let stream = info.create_stream();
        let output = (branch.net)(stream.clone(), info);
        outputs.push(info.route_update(output, info.location));
        routes.push(Route {
            patterns: branch.patterns,
            writer: stream.open_write(),
        });
    }
    info.locvec.parallel_leave();

    let output = collector::create_static(outputs, info);
    let dispatcher = Parallel {
        input: input.open_read(),
        routes,
        deterministic,
        counter: 0,
        locvec: info.locvec.clone(),
    };
    spawn_entity(EntityKind::Parallel, &info.locvec, dispatcher.run());
    output
}

struct Parallel {
    input: StreamReader,
    routes: Vec<Route>,
    deterministic: bool,
    counter: i32,
    locvec: LocationVector,
}

impl Parallel {
    async fn run(mut self) -> Result<()> {
        self.fire_initialisers().await?;
        if self.routes.len() <= 1 {
            let stream = self.input.stream().clone();
            return self.hand_off(stream).await;
        }

        loop {
            match self.input.read().await? {
                Record::Data(rec) => {
                    let Some(index) = best_match(self.routes.iter().map(|r| &r.patterns), &rec)
                    else {
                        tracing::warn!(
                            "Parallel '{}' has no branch for a record of type {}; dropping it",
                            self.locvec,
                            rec.variant()
                        );
                        continue;
                    };
                    self.routes[index].writer.write(rec).await?;
                    if self.deterministic {
                        self.next_round().await?;
                    }
                }
                Record::Sync(sync) => {
                    if let Some(marker) = &sync.merged_type {
                        self.prune(marker).await?;
                        if self.routes.len() == 1 {
                            return self.hand_off(sync.stream).await;
                        }
                    }
                    self.input.replace(sync.stream);
                }
                Record::SortEnd(sort) => self.broadcast(sort.deeper()).await?,
                Record::Terminate(term) => {
                    for route in &mut self.routes {
                        route.writer.write(term).await?;
                    }
                    for route in self.routes {
                        route.writer.close();
                    }
                    self.input.close(true);
                    return Ok(());
                }
                Record::Collect(stream) => {
                    tracing::warn!(
                        "Parallel '{}' discards collect of {} on its input",
                        self.locvec,
                        stream.id()
                    );
                }
                other => {
                    return Err(protocol_violation(
                        EntityKind::Parallel,
                        &self.locvec,
                        &other,
                    ))
                }
            }
        }
    }

    /// Trigger and retire every branch without patterns. In deterministic
    /// mode each trigger is its own round, so initialiser output precedes
    /// the first data record on the collector.
    async fn fire_initialisers(&mut self) -> Result<()> {
        let mut index = 0;
        while index < self.routes.len() {
            if !self.routes[index].patterns.is_empty() {
                index += 1;
                continue;
            }
            self.routes[index].writer.write(Record::TriggerInit).await?;
            if self.deterministic {
                self.next_round().await?;
            }
            let mut route = self.routes.remove(index);
            route.writer.write(Terminate::obsolete()).await?;
            route.writer.close();
        }
        Ok(())
    }

    /// Terminate branches that can no longer receive anything the marker
    /// does not already cover
    async fn prune(&mut self, marker: &Variant) -> Result<()> {
        let mut index = 0;
        while index < self.routes.len() {
            let covered = self.routes[index]
                .patterns
                .iter()
                .all(|variant| variant.is_subset_of(marker));
            if !covered {
                index += 1;
                continue;
            }
            let mut route = self.routes.remove(index);
            tracing::debug!(
                "Parallel '{}' prunes a branch covered by {}",
                self.locvec,
                marker
            );
            route.writer.write(Terminate::obsolete()).await?;
            route.writer.close();
        }
        Ok(())
    }

    /// Splice the dispatcher out: the last branch reads `stream` directly.
    /// The input stream is destroyed unless it is `stream` itself.
    async fn hand_off(mut self, stream: Stream) -> Result<()> {
        let destroy = !stream.same_stream(self.input.stream());
        match self.routes.pop() {
            Some(mut last) => {
                tracing::debug!(
                    "Parallel '{}' hands {} to its last branch",
                    self.locvec,
                    stream.id()
                );
                last.writer.write(Record::sync(stream)).await?;
                last.writer.close();
            }
            None => tracing::debug!("Parallel '{}' has no branch left", self.locvec),
        }
        self.input.close(destroy);
        Ok(())
    }

    /// Close the current round on every branch
    async fn next_round(&mut self) -> Result<()> {
        self.broadcast(SortEnd::new(0, self.counter)).await?;
        self.counter = self.counter.wrapping_add(1);
        Ok(())
    }

    async fn broadcast(&mut self, sort: SortEnd) -> Result<()> {
        for route in &mut self.routes {
            route.writer.write(sort).await?;
        }
        Ok(())
    }
}
