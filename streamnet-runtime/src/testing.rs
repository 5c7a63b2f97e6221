//! Helpers shared by unit tests

use crate::network::{Info, Net};
use crate::record::{DataRecord, Record, RecordKind};
use crate::stream::{Stream, StreamReader};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use streamnet_types::Name;

/// Tag carrying the test payload
pub(crate) const TAG: Name = 1;

const WAIT: Duration = Duration::from_secs(2);

pub(crate) fn data(value: i32) -> DataRecord {
    DataRecord::new().with_tag(TAG, value)
}

pub(crate) fn tag_of(record: &Record) -> Option<i32> {
    match record {
        Record::Data(rec) => rec.tag(TAG),
        _ => None,
    }
}

pub(crate) fn kinds(records: &[Record]) -> Vec<RecordKind> {
    records.iter().map(Record::kind).collect()
}

pub(crate) async fn read_next(reader: &mut StreamReader) -> Record {
    match tokio::time::timeout(WAIT, reader.read()).await {
        Ok(Ok(record)) => record,
        Ok(Err(err)) => panic!("read failed: {}", err),
        Err(_) => panic!("timed out waiting on {}", reader.stream().id()),
    }
}

/// Records up to and including the first Terminate, following Sync
/// redirects (the Sync records themselves are not returned)
pub(crate) async fn drain(stream: Stream) -> Vec<Record> {
    let mut reader = stream.open_read();
    let mut records = Vec::new();
    loop {
        match read_next(&mut reader).await {
            Record::Sync(sync) => reader.replace(sync.stream),
            record => {
                let done = record.is_terminate();
                records.push(record);
                if done {
                    return records;
                }
            }
        }
    }
}

/// Net that passes its input straight through
pub(crate) fn passthrough() -> Net {
    Arc::new(|input: Stream, _info: &mut Info| input)
}

/// Net that records its input stream and returns a stream nobody writes
pub(crate) fn capture(into: Arc<Mutex<Vec<Stream>>>) -> Net {
    Arc::new(move |input: Stream, info: &mut Info| {
        into.lock().push(input);
        info.create_stream()
    })
}

/// Net counting how often it is instantiated, passing input through
pub(crate) fn counting(counter: Arc<Mutex<usize>>) -> Net {
    Arc::new(move |input: Stream, _info: &mut Info| {
        *counter.lock() += 1;
        input
    })
}
