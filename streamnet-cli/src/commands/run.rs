//! Run a demonstration network and print what comes out.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use streamnet_runtime::{
    boxed, feedback, serial, split_det, star, star_det, sync, CloneInterface, DataRecord, Guard, Net,
    Network, Pattern, Record, RuntimeConfig, StreamError, Variant,
};
use streamnet_types::Name;

const X: Name = 1;
const ID: Name = 2;
const LO: Name = 3;
const HI: Name = 4;
const COUNT: Name = 5;
const LEFT: Name = 6;
const RIGHT: Name = 7;

fn label(name: Name) -> String {
    match name {
        X => "x".into(),
        ID => "id".into(),
        LO => "lo".into(),
        HI => "hi".into(),
        COUNT => "count".into(),
        LEFT => "left".into(),
        RIGHT => "right".into(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// x -> 2x + 1 through two boxes in series
    Pipeline,
    /// Squares, fanned out over three instances by tag value
    Split,
    /// Counts each record's `count` tag down to zero
    Star,
    /// Pairs `left` and `right` records inside a star
    Sync,
    /// Doubles x, looping back while it stays below 100
    Feedback,
}

type Values = Arc<CloneInterface<i64>>;

impl Demo {
    fn net(self, values: &Values) -> Net {
        match self {
            Demo::Pipeline => serial(
                map_x("double", values, |x| x * 2),
                map_x("inc", values, |x| x + 1),
            ),
            Demo::Split => split_det(map_x("square", values, |x| x * x), LO, HI),
            Demo::Star => {
                let done = Pattern::guarded(
                    Variant::new().with_tag(COUNT),
                    Guard::new(|rec| rec.tag(COUNT).is_some_and(|n| n <= 0)),
                );
                star_det(countdown(), vec![done])
            }
            Demo::Sync => {
                let pair = Variant::new().with_field(LEFT).with_field(RIGHT);
                let cell = sync(vec![
                    Pattern::new(Variant::new().with_field(LEFT)),
                    Pattern::new(Variant::new().with_field(RIGHT)),
                ]);
                star(cell, vec![Pattern::new(pair)])
            }
            Demo::Feedback => {
                let small = Pattern::guarded(
                    Variant::new().with_field(X),
                    Guard::new(|rec| {
                        rec.field(X)
                            .and_then(|field| field.downcast_ref::<i64>())
                            .is_some_and(|&x| x < 100)
                    }),
                );
                feedback(map_x("double", values, |x| x * 2), vec![small])
            }
        }
    }

    fn input(self, values: &Values, index: usize) -> DataRecord {
        let i = index as i64;
        let id = index as i32;
        let rec = DataRecord::new().with_tag(ID, id);
        match self {
            Demo::Pipeline => rec.with_field(X, values.field(i)),
            Demo::Split => rec
                .with_field(X, values.field(i))
                .with_tag(LO, id % 3)
                .with_tag(HI, id % 3),
            Demo::Star => rec.with_field(X, values.field(i)).with_tag(COUNT, id % 4),
            Demo::Sync if index % 2 == 0 => rec.with_field(LEFT, values.field(i / 2)),
            Demo::Sync => rec.with_field(RIGHT, values.field(i / 2)),
            Demo::Feedback => rec.with_field(X, values.field(i + 1)),
        }
    }
}

/// Box replacing field `x` by `f(x)`
fn map_x(name: &str, values: &Values, f: fn(i64) -> i64) -> Net {
    let values = values.clone();
    let output = Variant::new().with_field(X);
    boxed(name, move |ctx| {
        let field = ctx.take_field(X)?;
        let x = field.downcast_ref::<i64>().copied().unwrap_or_default();
        ctx.emit(&output, vec![values.field(f(x))], vec![], vec![])?;
        Ok(())
    })
}

fn countdown() -> Net {
    boxed("countdown", |ctx| {
        let count = ctx.tag(COUNT).unwrap_or_default();
        ctx.emit_record(DataRecord::new().with_tag(COUNT, count - 1))?;
        Ok(())
    })
}

#[derive(Serialize)]
struct RecordView {
    fields: BTreeMap<String, Option<i64>>,
    tags: BTreeMap<String, i32>,
}

impl RecordView {
    fn new(rec: &DataRecord) -> Self {
        Self {
            fields: rec
                .fields()
                .iter()
                .map(|(name, field)| (label(name), field.downcast_ref::<i64>().copied()))
                .collect(),
            tags: rec
                .tags()
                .iter()
                .map(|(name, &value)| (label(name), value))
                .collect(),
        }
    }

    fn plain(&self) -> String {
        let fields = self.fields.iter().map(|(name, value)| match value {
            Some(value) => format!("{}={}", name, value),
            None => format!("{}=?", name),
        });
        let tags = self.tags.iter().map(|(name, value)| format!("<{}>={}", name, value));
        fields.chain(tags).collect::<Vec<_>>().join(" ")
    }
}

/// Build `demo`, feed it `records` generated inputs and print the output
pub async fn run_demo(config: RuntimeConfig, demo: Demo, records: usize, json: bool) -> Result<()> {
    let values = CloneInterface::<i64>::new(1);
    let network = Network::new(demo.net(&values)).with_config(config);
    let (mut input, mut output) = network.start();

    let inputs: Vec<DataRecord> = (0..records).map(|i| demo.input(&values, i)).collect();
    let feeder = tokio::spawn(async move {
        for rec in inputs {
            input.write(rec).await?;
        }
        input.write(Record::terminate()).await?;
        Ok::<_, StreamError>(())
    });

    let mut count = 0;
    while let Some(rec) = output
        .next_record()
        .await
        .context("Failed to read network output")?
    {
        let view = RecordView::new(&rec);
        if json {
            println!("{}", serde_json::to_string(&view)?);
        } else {
            println!("{}", view.plain());
        }
        count += 1;
    }

    feeder
        .await
        .context("Input task failed")?
        .context("Failed to feed the network")?;

    tracing::info!("{:?} demo: {} in, {} out", demo, records, count);
    if !json {
        println!("Received {} records", count);
    }
    Ok(())
}
