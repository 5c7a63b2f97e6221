//! Output sink of a running network

use crate::error::Result;
use crate::record::{DataRecord, Record};
use crate::stream::{Stream, StreamReader};

/// Reads the data records a network produces
///
/// `Sync` redirects are followed and `SortEnd` barriers skipped; the sink
/// is exhausted once the network forwards its `Terminate`.
pub struct Output {
    reader: Option<StreamReader>,
}

impl Output {
    pub fn new(stream: Stream) -> Self {
        Self {
            reader: Some(stream.open_read()),
        }
    }

    /// Next data record, or `None` after termination
    pub async fn next_record(&mut self) -> Result<Option<DataRecord>> {
        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };
            match reader.read().await? {
                Record::Data(rec) => return Ok(Some(rec)),
                Record::Sync(sync) => reader.replace(sync.stream),
                Record::SortEnd(_) => {}
                Record::Terminate(_) => {
                    if let Some(reader) = self.reader.take() {
                        reader.close(true);
                    }
                }
                other => {
                    tracing::warn!("Network output ignores {} record", other.kind());
                }
            }
        }
    }

    /// Every remaining data record
    pub async fn collect_all(mut self) -> Result<Vec<DataRecord>> {
        let mut records = Vec::new();
        while let Some(rec) = self.next_record().await? {
            records.push(rec);
        }
        Ok(records)
    }

    pub fn is_finished(&self) -> bool {
        self.reader.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SortEnd;
    use crate::testing::data;

    #[tokio::test]
    async fn test_follows_sync_and_skips_sort_end() {
        let first = Stream::new();
        let second = Stream::new();
        let mut output = Output::new(first.clone());

        let mut w1 = first.open_write();
        w1.write(data(1)).await.unwrap();
        w1.write(SortEnd::new(0, 0)).await.unwrap();
        w1.write(Record::sync(second.clone())).await.unwrap();
        let mut w2 = second.open_write();
        w2.write(data(2)).await.unwrap();
        w2.write(Record::terminate()).await.unwrap();

        let first_rec = output.next_record().await.unwrap();
        assert_eq!(first_rec.and_then(|r| r.tag(crate::testing::TAG)), Some(1));
        let tags: Vec<i32> = output
            .collect_all()
            .await
            .unwrap()
            .iter()
            .filter_map(|r| r.tag(crate::testing::TAG))
            .collect();
        assert_eq!(tags, vec![2]);
        assert!(second.is_destroyed());
    }
}
