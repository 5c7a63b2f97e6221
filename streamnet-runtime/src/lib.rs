//! Streamnet runtime - a stream network combinator engine
//!
//! A network is a graph of entities connected by streams of records. Boxes
//! wrap user computations; the combinators around them route records by
//! type (parallel), by tag value (split), by repetition (star or feedback),
//! rewrite them (filter) or join them (sync). Every entity runs as its own
//! tokio task.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     Network (Net tree)                         │
//! │  serial / parallel / split / star / sync / boxed constructors  │
//! ├────────────────────────────────────────────────────────────────┤
//! │                                                                │
//! │   input ──▶ ┌──────────┐      ┌──────┐      ┌───────────┐      │
//! │             │ Parallel │ ───▶ │ Box  │ ───▶ │ Collector │ ──▶ output
//! │             │  Split   │ ───▶ │ ...  │ ───▶ │ (static / │      │
//! │             │  Star    │      └──────┘      │  dynamic) │      │
//! │             └──────────┘                    └───────────┘      │
//! │                                                                │
//! ├────────────────────────────────────────────────────────────────┤
//! │  Streams: FIFO record queues, readers, writers, stream sets    │
//! ├────────────────────────────────────────────────────────────────┤
//! │  Records: data | sync | collect | sort-end | terminate | init  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Control records
//!
//! - `Sync` redirects a reader to another stream. Entities that have become
//!   redundant send one and exit, splicing themselves out of the network.
//! - `Collect` announces a new branch to a dynamic collector.
//! - `SortEnd` is a barrier that keeps deterministic combinators ordered.
//! - `Terminate` shuts the network down, edge by edge.
//!
//! # Example
//!
//! ```rust
//! use streamnet_runtime::{boxed, serial, DataRecord, Network, Record};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let double = boxed("double", |ctx| {
//!     let value = ctx.tag(1).unwrap_or_default();
//!     ctx.emit_record(DataRecord::new().with_tag(1, value * 2))?;
//!     Ok(())
//! });
//!
//! let network = Network::new(serial(double.clone(), double));
//! let (mut input, mut output) = network.start();
//! input.write(DataRecord::new().with_tag(1, 3)).await?;
//! input.write(Record::terminate()).await?;
//!
//! let record = output.next_record().await?;
//! assert_eq!(record.and_then(|r| r.tag(1)), Some(12));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod network;
pub mod record;
pub mod stream;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::{GcConfig, RuntimeConfig, StreamConfig};
pub use entity::boxed::{BoxContext, BoxFn};
pub use error::{BoxError, ConfigError, EntityError, RecordError, Result, StreamError};
pub use entity::filter::{Expr, FilterInstr, FilterRule, FilterSpec};
pub use network::{
    boxed, feedback, filter, name_shift, parallel, parallel_det, serial, split,
    split_by_location, split_det, star, star_det, sync, translate, Info, LocalRouter, Location, Net, Network, Output, Router,
};
pub use record::{
    CloneInterface, DataMode, DataRecord, Field, Guard, Interface, Pattern, Record, RecordKind,
    SortEnd, SyncRecord, Terminate, Variant, VariantList,
};
pub use stream::{Stream, StreamId, StreamReader, StreamSet, StreamWriter};
pub use streamnet_types::{EntityKind, InterfaceId, LocationVector, Name};
