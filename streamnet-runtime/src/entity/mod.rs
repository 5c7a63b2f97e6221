//! Entities: the tasks a running network is made of
//!
//! Every entity owns its input descriptor and its output descriptors and
//! runs as one tokio task, reading a record, reacting, and looping until it
//! forwards a `Terminate` or splices itself out of the network.
//!
//! | entity      | reads                         | writes                          |
//! |-------------|-------------------------------|---------------------------------|
//! | Box         | data, trigger-init            | data emitted by the box fn      |
//! | Parallel    | data routed by best match     | one stream per branch           |
//! | Split       | data routed by tag range      | one stream per tag value        |
//! | Star        | data tested against exits     | next iteration or the collector |
//! | Sync        | data until every pattern hit  | merged record and a `Sync`      |
//! | Collector   | a set of branch streams       | one merged stream               |
//! | Feedback    | input, then the back channel  | the body or the back channel    |
//! | Filter      | data matched by guards        | records built from instructions |
//! | Name shift  | data                          | data with labels renumbered     |

pub mod boxed;
pub mod collector;
pub mod feedback;
pub mod filter;
pub mod parallel;
pub mod split;
pub mod star;
pub mod sync;

use crate::error::{EntityError, Result};
use crate::record::Record;
use std::future::Future;
use streamnet_types::{EntityKind, LocationVector};
use tracing::Instrument;

/// Run an entity loop as its own task
///
/// A failing loop ends only its own task; the error is logged.
pub(crate) fn spawn_entity<F>(kind: EntityKind, locvec: &LocationVector, task: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let span = tracing::debug_span!("entity", kind = %kind, loc = %locvec);
    let locvec = locvec.clone();
    tokio::spawn(
        async move {
            match task.await {
                Ok(()) => tracing::trace!("{} '{}' finished", kind, locvec),
                Err(err) => tracing::error!("{} '{}' stopped: {}", kind, locvec, err),
            }
        }
        .instrument(span),
    );
}

pub(crate) fn protocol_violation(
    entity: EntityKind,
    locvec: &LocationVector,
    record: &Record,
) -> EntityError {
    EntityError::ProtocolViolation {
        entity,
        location: locvec.clone(),
        kind: record.kind(),
    }
}
