//! Network construction
//!
//! A network is described as a tree of [`Net`] values, each a function
//! that instantiates its part of the graph on an input stream and returns
//! the output stream. Building a `Net` does nothing; calling it spawns the
//! entity tasks, so a `Net` can be called again whenever a combinator grows
//! a new branch at runtime.
//!
//! ```text
//! serial(a, b):      in ──▶ a ──▶ b ──▶ out
//!
//! parallel([a, b]):  in ──▶ dispatch ─┬─▶ a ─┬─▶ collector ──▶ out
//!                                     └─▶ b ─┘
//!
//! feedback(body, back): in ──▶ fbcoll ──▶ body ──▶ fbdisp ──▶ out
//!                              ▲                   │
//!                              └────── back ───────┘
//!
//! star(body, exits): in ──▶ star ─┬──────────────────────────▶ collector ──▶ out
//!                                 └─▶ body ──▶ star ─┬─────────────▲
//!                                                    └─▶ body ...  │
//! ```

mod info;
mod output;

pub use info::{Info, LocalRouter, Location, Router};
pub use output::Output;

use crate::config::RuntimeConfig;
use crate::entity::boxed::{create_box, BoxContext, BoxFn};
use crate::entity::feedback::{create_feedback, FeedbackSpec};
use crate::entity::filter::{
    create_filter, create_name_shift, create_translate, FilterSpec, NameShiftSpec,
};
use crate::entity::parallel::{create_parallel, Branch};
use crate::entity::split::{create_split, SplitSpec};
use crate::entity::star::{create_star, StarSpec};
use crate::entity::sync::create_sync;
use crate::error::BoxError;
use crate::record::{Pattern, Variant, VariantList};
use crate::stream::{Stream, StreamWriter};
use std::sync::Arc;
use streamnet_types::Name;

/// Sub-network constructor
pub type Net = Arc<dyn Fn(Stream, &mut Info) -> Stream + Send + Sync>;

/// A box running `fun` on every data record
pub fn boxed<F>(name: impl Into<String>, fun: F) -> Net
where
    F: Fn(&mut BoxContext<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
{
    let name: Arc<str> = name.into().into();
    let fun: BoxFn = Arc::new(fun);
    Arc::new(move |input: Stream, info: &mut Info| {
        create_box(input, info, name.clone(), fun.clone())
    })
}

/// `a` followed by `b`
pub fn serial(a: Net, b: Net) -> Net {
    Arc::new(move |input: Stream, info: &mut Info| {
        let entered = info.locvec.serial_enter();
        let middle = a(input, info);
        info.locvec.serial_next();
        let output = b(middle, info);
        info.locvec.serial_leave(entered);
        output
    })
}

/// Route each record to the best matching branch
pub fn parallel(branches: Vec<(VariantList, Net)>) -> Net {
    parallel_with(branches, false)
}

/// [`parallel`] keeping the input order on the output
pub fn parallel_det(branches: Vec<(VariantList, Net)>) -> Net {
    parallel_with(branches, true)
}

fn parallel_with(branches: Vec<(VariantList, Net)>, deterministic: bool) -> Net {
    let branches: Arc<Vec<Branch>> = Arc::new(
        branches
            .into_iter()
            .map(|(patterns, net)| Branch { patterns, net })
            .collect(),
    );
    Arc::new(move |input: Stream, info: &mut Info| {
        create_parallel(input, info, branches.as_ref().clone(), deterministic)
    })
}

/// One instance of `body` per value of the tag range `ltag..=utag`
pub fn split(body: Net, ltag: Name, utag: Name) -> Net {
    split_with(body, ltag, utag, false, false)
}

/// [`split`] keeping the input order on the output
pub fn split_det(body: Net, ltag: Name, utag: Name) -> Net {
    split_with(body, ltag, utag, false, true)
}

/// [`split`] placing the instance for tag value `i` at location `i`
pub fn split_by_location(body: Net, ltag: Name, utag: Name) -> Net {
    split_with(body, ltag, utag, true, false)
}

fn split_with(body: Net, ltag: Name, utag: Name, by_location: bool, deterministic: bool) -> Net {
    Arc::new(move |input: Stream, info: &mut Info| {
        create_split(
            input,
            info,
            SplitSpec {
                body: body.clone(),
                ltag,
                utag,
                by_location,
                deterministic,
            },
        )
    })
}

/// Repeat `body` until a record matches one of `exits`
pub fn star(body: Net, exits: Vec<Pattern>) -> Net {
    star_with(body, exits, false)
}

/// [`star`] keeping the input order on the output
pub fn star_det(body: Net, exits: Vec<Pattern>) -> Net {
    star_with(body, exits, true)
}

fn star_with(body: Net, exits: Vec<Pattern>, deterministic: bool) -> Net {
    let spec = Arc::new(StarSpec {
        body,
        exits,
        deterministic,
    });
    Arc::new(move |input: Stream, info: &mut Info| {
        create_star(input, info, spec.clone())
    })
}

/// Send records matching one of `back` through `body` again
pub fn feedback(body: Net, back: Vec<Pattern>) -> Net {
    let spec = Arc::new(FeedbackSpec { body, back });
    Arc::new(move |input: Stream, info: &mut Info| {
        create_feedback(input, info, spec.clone())
    })
}

/// Rewrite records by the first rule whose guard holds
pub fn filter(spec: FilterSpec) -> Net {
    let spec = Arc::new(spec);
    Arc::new(move |input: Stream, info: &mut Info| {
        create_filter(input, info, spec.clone())
    })
}

/// [`filter`] between the interfaces of two boxes
pub fn translate(spec: FilterSpec) -> Net {
    let spec = Arc::new(spec);
    Arc::new(move |input: Stream, info: &mut Info| {
        create_translate(input, info, spec.clone())
    })
}

/// Add `offset` to every label not named by `untouched`
pub fn name_shift(offset: i32, untouched: Variant) -> Net {
    let spec = Arc::new(NameShiftSpec { offset, untouched });
    Arc::new(move |input: Stream, info: &mut Info| {
        create_name_shift(input, info, spec.clone())
    })
}

/// Wait for one record per pattern and merge them
pub fn sync(patterns: Vec<Pattern>) -> Net {
    let patterns = Arc::new(patterns);
    Arc::new(move |input: Stream, info: &mut Info| {
        create_sync(input, info, patterns.clone())
    })
}

/// A complete network ready to be instantiated
pub struct Network {
    net: Net,
    config: Arc<RuntimeConfig>,
    router: Arc<dyn Router>,
}

impl Network {
    pub fn new(net: Net) -> Self {
        Self {
            net,
            config: Arc::new(RuntimeConfig::default()),
            router: Arc::new(LocalRouter),
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = router;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn info(&self) -> Info {
        Info::new(self.config.clone()).with_router(self.router.clone())
    }

    /// Spawn the network on `input` and return its output stream
    pub fn instantiate(&self, input: Stream) -> Stream {
        let mut info = self.info();
        (self.net)(input, &mut info)
    }

    /// Spawn the network on a fresh input stream
    pub fn start(&self) -> (StreamWriter, Output) {
        let input = self.info().create_stream();
        let writer = input.open_write();
        let output = self.instantiate(input);
        (writer, Output::new(output))
    }
}
