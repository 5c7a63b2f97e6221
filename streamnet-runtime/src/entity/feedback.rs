//! Feedback: a loop sending matching records through the body again
//!
//! ```text
//! in ──▶ fbcoll ──▶ body ──▶ fbdisp ──▶ out
//!          ▲                   │
//!          └────── back ───────┘
//! ```
//!
//! The loop is deterministic: one input record circulates at a time. The
//! feedback collector follows each input record with a `SortEnd(0, 1)`
//! marker and then reads only the back channel. The dispatcher sends records
//! matching a back pattern, and every level-0 marker, into the back channel.
//! A marker that comes back without data ahead of it means the loop is
//! empty, and the collector returns to its input.
//!
//! Outer `SortEnd`s enter one level deeper and leave one level shallower, so
//! they never mix with the loop's own markers. The back channel is unbounded
//! so the dispatcher never waits on the collector.

use super::{protocol_violation, spawn_entity};
use crate::error::Result;
use crate::network::{Info, Net};
use crate::record::{Pattern, Record, SortEnd};
use crate::stream::{Stream, StreamReader, StreamWriter};
use std::sync::Arc;
use streamnet_types::{EntityKind, LocationVector};

/// What a feedback combinator loops
pub struct FeedbackSpec {
    pub body: Net,
    /// Records matching one of these go round again
    pub back: Vec<Pattern>,
}

/// Build the loop around one body instance
pub fn create_feedback(input: Stream, info: &mut Info, spec: Arc<FeedbackSpec>) -> Stream {
    info.locvec.feedback_enter();
    let input = info.route_update(input, info.location);
    if !info.is_local() {
        let output = (spec.body)(input, info);
        let output = info.route_update(output, info.location);
        info.locvec.feedback_leave();
        return output;
    }

    let into_body = info.create_stream();
    let back = Stream::new();
    let output = info.create_stream();

    let collector = FeedbackCollector {
        input: input.open_read(),
        back: back.open_read(),
        body: into_body.open_write(),
        mode: Mode::Input,
        locvec: info.locvec.clone(),
    };
    spawn_entity(EntityKind::FeedbackCollector, &info.locvec, collector.run());

    let from_body = (spec.body)(into_body, info);
    let from_body = info.route_update(from_body, info.location);
    let dispatcher = FeedbackDispatcher {
        input: from_body.open_read(),
        output: output.open_write(),
        back: back.open_write(),
        spec,
        locvec: info.locvec.clone(),
    };
    spawn_entity(EntityKind::FeedbackDispatcher, &info.locvec, dispatcher.run());

    info.locvec.feedback_leave();
    output
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Loop empty, next record comes from the input
    Input,
    /// Marker in flight, nothing came back in this round yet
    Round,
    /// Data came back in this round
    Looping,
}

struct FeedbackCollector {
    input: StreamReader,
    back: StreamReader,
    body: StreamWriter,
    mode: Mode,
    locvec: LocationVector,
}

impl FeedbackCollector {
    async fn run(mut self) -> Result<()> {
        loop {
            if self.mode != Mode::Input {
                self.read_back().await?;
                continue;
            }
            match self.input.read().await? {
                Record::Data(rec) => {
                    self.body.write(rec).await?;
                    self.body.write(SortEnd::new(0, 1)).await?;
                    self.mode = Mode::Round;
                }
                Record::SortEnd(sort) => self.body.write(sort.deeper()).await?,
                Record::Sync(sync) => self.input.replace(sync.stream),
                Record::Terminate(term) => {
                    self.body.write(term).await?;
                    self.body.close();
                    self.input.close(true);
                    self.back.close(true);
                    return Ok(());
                }
                other => {
                    return Err(protocol_violation(
                        EntityKind::FeedbackCollector,
                        &self.locvec,
                        &other,
                    ))
                }
            }
        }
    }

    async fn read_back(&mut self) -> Result<()> {
        match self.back.read().await? {
            Record::Data(rec) => {
                self.body.write(rec).await?;
                self.mode = Mode::Looping;
            }
            Record::SortEnd(sort) if sort.level == 0 => {
                if self.mode == Mode::Looping {
                    let next = SortEnd::new(0, sort.num.wrapping_add(1));
                    self.body.write(next).await?;
                    self.mode = Mode::Round;
                } else {
                    tracing::trace!(
                        "Feedback '{}' drained after {} rounds",
                        self.locvec,
                        sort.num
                    );
                    self.mode = Mode::Input;
                }
            }
            Record::Sync(sync) => self.back.replace(sync.stream),
            other => {
                return Err(protocol_violation(
                    EntityKind::FeedbackCollector,
                    &self.locvec,
                    &other,
                ))
            }
        }
        Ok(())
    }
}

struct FeedbackDispatcher {
    input: StreamReader,
    output: StreamWriter,
    back: StreamWriter,
    spec: Arc<FeedbackSpec>,
    locvec: LocationVector,
}

impl FeedbackDispatcher {
    async fn run(mut self) -> Result<()> {
        loop {
            match self.input.read().await? {
                Record::Data(rec) => {
                    if self.spec.back.iter().any(|pattern| pattern.matches(&rec)) {
                        self.back.write(rec).await?;
                    } else {
                        self.output.write(rec).await?;
                    }
                }
                Record::SortEnd(sort) => match sort.shallower() {
                    Some(outer) => self.output.write(outer).await?,
                    None => self.back.write(sort).await?,
                },
                Record::Sync(sync) => self.input.replace(sync.stream),
                Record::Terminate(term) => {
                    self.output.write(term).await?;
                    self.output.close();
                    self.back.close();
                    self.input.close(true);
                    return Ok(());
                }
                other => {
                    return Err(protocol_violation(
                        EntityKind::FeedbackDispatcher,
                        &self.locvec,
                        &other,
                    ))
                }
            }
        }
    }
}
