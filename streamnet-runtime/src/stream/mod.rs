//! Streams: FIFO queues of records between entities
//!
//! A [`Stream`] is a shared handle to the queue. Entities access it through
//! descriptors: one [`StreamWriter`] for the producer and a [`StreamReader`]
//! for the consumer. A reader can be redirected to another stream with
//! [`StreamReader::replace`], which is how a `Sync` record splices an entity
//! out of the network.
//!
//! Reading parks the task on a [`Notify`] owned by the reader (or by the
//! [`StreamSet`] the reader belongs to); every write wakes whichever notifier
//! is currently installed on the stream.

mod set;

pub use set::{Cursor, Descriptor, SetKey, StreamSet};

use crate::error::StreamError;
use crate::record::{Record, RecordKind};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use streamnet_types::LocationVector;
use tokio::sync::Notify;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Stream identifier, used in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

struct State {
    queue: VecDeque<Record>,
    waker: Option<Arc<Notify>>,
    source: Option<LocationVector>,
    destroyed: bool,
}

struct Inner {
    id: StreamId,
    capacity: Option<usize>,
    state: Mutex<State>,
    space: Notify,
}

/// Shared handle to a record queue
#[derive(Clone)]
pub struct Stream {
    inner: Arc<Inner>,
}

impl Stream {
    /// Create an unbounded stream
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Create a stream whose writer waits once `capacity` records are queued
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: StreamId(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed)),
                capacity,
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    waker: None,
                    source: None,
                    destroyed: false,
                }),
                space: Notify::new(),
            }),
        }
    }

    pub fn id(&self) -> StreamId {
        self.inner.id
    }

    pub fn capacity(&self) -> Option<usize> {
        self.inner.capacity
    }

    /// Location of the entity that created this stream, when recorded
    pub fn source(&self) -> Option<LocationVector> {
        self.inner.state.lock().source.clone()
    }

    pub fn set_source(&self, source: LocationVector) {
        self.inner.state.lock().source = Some(source);
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    pub fn same_stream(&self, other: &Stream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn open_read(&self) -> StreamReader {
        StreamReader::attach(self.clone(), Arc::new(Notify::new()))
    }

    pub fn open_write(&self) -> StreamWriter {
        StreamWriter {
            stream: self.clone(),
        }
    }

    fn install_waker(&self, waker: Arc<Notify>) {
        let has_data = {
            let mut state = self.inner.state.lock();
            state.waker = Some(waker.clone());
            !state.queue.is_empty()
        };
        if has_data {
            waker.notify_one();
        }
    }

    fn destroy(&self) {
        let dropped = {
            let mut state = self.inner.state.lock();
            state.destroyed = true;
            state.waker = None;
            std::mem::take(&mut state.queue)
        };
        if !dropped.is_empty() {
            tracing::debug!("Stream {} destroyed with {} unread records", self.id(), dropped.len());
        }
        self.inner.space.notify_waiters();
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").field("id", &self.id()).finish()
    }
}

/// Read descriptor
pub struct StreamReader {
    stream: Stream,
    waker: Arc<Notify>,
}

impl StreamReader {
    fn attach(stream: Stream, waker: Arc<Notify>) -> Self {
        stream.install_waker(waker.clone());
        Self { stream, waker }
    }

    /// The stream currently read from
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Next record, waiting while the stream is empty
    pub async fn read(&mut self) -> Result<Record, StreamError> {
        loop {
            if let Some(record) = self.try_read()? {
                return Ok(record);
            }
            self.waker.notified().await;
        }
    }

    /// Next record if one is queued
    pub fn try_read(&mut self) -> Result<Option<Record>, StreamError> {
        let record = {
            let mut state = self.stream.inner.state.lock();
            if state.destroyed {
                return Err(StreamError::Destroyed(self.stream.id()));
            }
            state.queue.pop_front()
        };
        if record.is_some() && self.stream.inner.capacity.is_some() {
            self.stream.inner.space.notify_one();
        }
        Ok(record)
    }

    /// Head record without consuming it. The stream stays locked while the
    /// guard is alive, so writers and readers of this stream wait on it.
    pub fn peek(&self) -> Option<MappedMutexGuard<'_, Record>> {
        MutexGuard::try_map(self.stream.inner.state.lock(), |state| {
            state.queue.front_mut()
        })
        .ok()
    }

    /// Kind of the head record without consuming it
    pub fn peek_kind(&self) -> Option<RecordKind> {
        self.peek().map(|record| record.kind())
    }

    pub fn has_data(&self) -> bool {
        !self.stream.is_empty()
    }

    /// Read from `stream` from now on, keeping this descriptor's notifier
    pub fn replace(&mut self, stream: Stream) {
        tracing::trace!("Reader switched from {} to {}", self.stream.id(), stream.id());
        stream.install_waker(self.waker.clone());
        self.stream = stream;
    }

    /// Release the descriptor; `destroy` also destroys the stream
    pub fn close(self, destroy: bool) {
        if destroy {
            self.stream.destroy();
        }
    }

    fn set_waker(&mut self, waker: Arc<Notify>) {
        self.stream.install_waker(waker.clone());
        self.waker = waker;
    }
}

impl fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamReader")
            .field("stream", &self.stream.id())
            .finish()
    }
}

/// Write descriptor
pub struct StreamWriter {
    stream: Stream,
}

impl StreamWriter {
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Append a record; waits for space on a full bounded stream
    pub async fn write(&mut self, record: impl Into<Record>) -> Result<(), StreamError> {
        let mut pending = Some(record.into());
        let inner = &self.stream.inner;
        loop {
            let space = inner.space.notified();
            let waker = {
                let mut state = inner.state.lock();
                if state.destroyed {
                    return Err(StreamError::Destroyed(inner.id));
                }
                if inner.capacity.map_or(true, |cap| state.queue.len() < cap) {
                    state.queue.extend(pending.take());
                    Some(state.waker.clone())
                } else {
                    None
                }
            };
            match waker {
                Some(waker) => {
                    if let Some(waker) = waker {
                        waker.notify_one();
                    }
                    return Ok(());
                }
                None => space.await,
            }
        }
    }

    pub fn close(self) {}
}

impl fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamWriter")
            .field("stream", &self.stream.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DataRecord, SortEnd};
    use std::time::Duration;
    use tokio::time::timeout;

    fn tagged(value: i32) -> Record {
        DataRecord::new().with_tag(1, value).into()
    }

    fn tag_of(record: &Record) -> Option<i32> {
        match record {
            Record::Data(rec) => rec.tag(1),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let stream = Stream::new();
        let mut writer = stream.open_write();
        let mut reader = stream.open_read();
        for i in 0..5 {
            writer.write(tagged(i)).await.unwrap();
        }
        for i in 0..5 {
            let record = reader.read().await.unwrap();
            assert_eq!(tag_of(&record), Some(i));
        }
        assert!(reader.try_read().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_waits_for_writer() {
        let stream = Stream::new();
        let mut reader = stream.open_read();
        let mut writer = stream.open_write();
        let handle = tokio::spawn(async move { reader.read().await.map(|r| r.kind()) });
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer.write(Record::terminate()).await.unwrap();
        let kind = timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(kind, RecordKind::Terminate);
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let stream = Stream::new();
        let mut reader = stream.open_read();
        assert_eq!(reader.peek_kind(), None);
        stream.open_write().write(SortEnd::new(0, 1)).await.unwrap();
        assert_eq!(reader.peek_kind(), Some(RecordKind::SortEnd));
        assert_eq!(reader.peek_kind(), Some(RecordKind::SortEnd));
        assert!(matches!(reader.read().await.unwrap(), Record::SortEnd(_)));
        assert_eq!(reader.peek_kind(), None);
    }

    #[tokio::test]
    async fn test_peek_shows_head_record() {
        let stream = Stream::new();
        let reader = stream.open_read();
        assert!(reader.peek().is_none());
        let mut writer = stream.open_write();
        writer.write(tagged(4)).await.unwrap();
        writer.write(tagged(5)).await.unwrap();
        assert_eq!(reader.peek().as_deref().and_then(tag_of), Some(4));
        assert_eq!(stream.len(), 2);
    }

    #[tokio::test]
    async fn test_blocked_writer_fails_on_destroy() {
        let stream = Stream::bounded(1);
        let mut writer = stream.open_write();
        writer.write(tagged(0)).await.unwrap();
        let handle = tokio::spawn(async move { writer.write(tagged(1)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        stream.open_read().close(true);
        let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(StreamError::Destroyed(_))));
    }

    #[tokio::test]
    async fn test_replace_redirects_reads() {
        let first = Stream::new();
        let second = Stream::new();
        let mut reader = first.open_read();
        first.open_write().write(tagged(1)).await.unwrap();
        second.open_write().write(tagged(2)).await.unwrap();

        reader.replace(second.clone());
        assert!(reader.stream().same_stream(&second));
        let record = reader.read().await.unwrap();
        assert_eq!(tag_of(&record), Some(2));
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn test_replace_keeps_waiting_reader_awake() {
        let first = Stream::new();
        let second = Stream::new();
        let mut reader = first.open_read();
        reader.replace(second.clone());
        let handle = tokio::spawn(async move { reader.read().await.map(|r| r.kind()) });
        tokio::time::sleep(Duration::from_millis(10)).await;
        second.open_write().write(Record::terminate()).await.unwrap();
        let kind = timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(kind, RecordKind::Terminate);
    }

    #[tokio::test]
    async fn test_destroyed_stream_rejects_access() {
        let stream = Stream::new();
        let mut writer = stream.open_write();
        writer.write(tagged(1)).await.unwrap();
        let reader = stream.open_read();
        reader.close(true);
        assert!(stream.is_destroyed());
        assert!(stream.is_empty());
        assert!(matches!(
            writer.write(tagged(2)).await,
            Err(StreamError::Destroyed(_))
        ));
        let mut late = stream.open_read();
        assert!(late.try_read().is_err());
    }

    #[tokio::test]
    async fn test_close_without_destroy_keeps_stream() {
        let stream = Stream::new();
        stream.open_write().write(tagged(1)).await.unwrap();
        stream.open_read().close(false);
        assert!(!stream.is_destroyed());
        assert_eq!(stream.len(), 1);
    }

    #[tokio::test]
    async fn test_bounded_writer_waits_for_space() {
        let stream = Stream::bounded(2);
        let mut writer = stream.open_write();
        let mut reader = stream.open_read();
        writer.write(tagged(0)).await.unwrap();
        writer.write(tagged(1)).await.unwrap();

        let blocked = timeout(Duration::from_millis(20), writer.write(tagged(2))).await;
        assert!(blocked.is_err());
        assert_eq!(stream.len(), 2);

        let handle = tokio::spawn(async move {
            writer.write(tagged(2)).await.unwrap();
            writer
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(tag_of(&reader.read().await.unwrap()), Some(0));
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(tag_of(&reader.read().await.unwrap()), Some(1));
        assert_eq!(tag_of(&reader.read().await.unwrap()), Some(2));
    }

    #[test]
    fn test_source_location() {
        let stream = Stream::new();
        assert_eq!(stream.source(), None);
        let mut loc = LocationVector::new();
        loc.star_enter();
        stream.set_source(loc.clone());
        assert_eq!(stream.source(), Some(loc));
    }
}
