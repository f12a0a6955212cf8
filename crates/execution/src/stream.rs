//! Record-batch stream abstractions, channel adapters and the blocking bridge.

use std::pin::Pin;
use std::task::{Context, Poll};

use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use fdset_common::{DatasetError, Result};
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

/// Blocking, finite sequence of batches.
pub type RecordBatchIterator = Box<dyn Iterator<Item = Result<RecordBatch>> + Send>;

/// Lazily produced batches that never occupy the polling thread while the
/// underlying work runs.
pub type RecordBatchGenerator = BoxStream<'static, Result<RecordBatch>>;

/// A stream of RecordBatches that also knows its output schema.
pub trait RecordBatchStream: Stream<Item = Result<RecordBatch>> + Send {
    /// Output schema for every batch yielded by this stream.
    fn schema(&self) -> SchemaRef;
}

pub type SendableRecordBatchStream = Pin<Box<dyn RecordBatchStream>>;

/// Adapter that attaches a schema to any `Stream<Item = Result<RecordBatch>>`.
pub struct StreamAdapter<S> {
    schema: SchemaRef,
    inner: S,
}

impl<S> StreamAdapter<S> {
    pub fn new(schema: SchemaRef, inner: S) -> Self {
        Self { schema, inner }
    }
}

impl<S> RecordBatchStream for StreamAdapter<S>
where
    S: Stream<Item = Result<RecordBatch>> + Send + Unpin + 'static,
{
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}

impl<S> Stream for StreamAdapter<S>
where
    S: Stream<Item = Result<RecordBatch>> + Unpin,
{
    type Item = Result<RecordBatch>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Create a stream backed by a bounded channel.
///
/// Backpressure: when the receiver is slow and the buffer fills up,
/// `sender.send_batch(..).await` waits until there is capacity again.
pub fn bounded_batch_channel(
    schema: SchemaRef,
    capacity: usize,
) -> (BatchSender, SendableRecordBatchStream) {
    let (tx, rx) = mpsc::channel::<Result<RecordBatch>>(capacity);
    let stream = Box::pin(StreamAdapter::new(schema, rx));
    (BatchSender { tx }, stream)
}

/// Sender side for `bounded_batch_channel`.
#[derive(Clone)]
pub struct BatchSender {
    tx: mpsc::Sender<Result<RecordBatch>>,
}

impl BatchSender {
    /// Send a batch (awaits if the channel buffer is full).
    pub async fn send_batch(&mut self, batch: RecordBatch) -> Result<()> {
        use futures::SinkExt;
        self.tx
            .send(Ok(batch))
            .await
            .map_err(|e| DatasetError::Execution(format!("batch channel closed: {e}")))
    }

    /// Send an error and terminate downstream consumption.
    pub async fn send_error(&mut self, err: DatasetError) -> Result<()> {
        use futures::SinkExt;
        self.tx
            .send(Err(err))
            .await
            .map_err(|e| DatasetError::Execution(format!("batch channel closed: {e}")))
    }
}

/// Wraps a blocking iterator as a generator. Polling it runs the iterator on
/// the polling thread, so only use it where blocking is acceptable.
pub fn iter_generator(iter: RecordBatchIterator) -> RecordBatchGenerator {
    futures::stream::iter(iter).boxed()
}

/// The one place a generator is consumed synchronously.
pub fn blocking_iter(generator: RecordBatchGenerator) -> RecordBatchIterator {
    Box::new(futures::executor::block_on_stream(generator))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::Int32Array;
    use arrow::record_batch::RecordBatch;
    use arrow_schema::{DataType, Field, Schema};

    use super::{blocking_iter, bounded_batch_channel, iter_generator};

    fn batch(values: Vec<i32>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int32, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(values))]).expect("batch")
    }

    #[test]
    fn generator_round_trips_through_blocking_bridge() {
        let batches = vec![Ok(batch(vec![1, 2])), Ok(batch(vec![3]))];
        let out = blocking_iter(iter_generator(Box::new(batches.into_iter())))
            .collect::<Result<Vec<_>, _>>()
            .expect("batches");
        assert_eq!(out.iter().map(|b| b.num_rows()).sum::<usize>(), 3);
    }

    #[test]
    fn channel_delivers_batches_then_error() {
        let schema = batch(vec![]).schema();
        let (mut tx, rx) = bounded_batch_channel(schema, 1);
        std::thread::spawn(move || {
            futures::executor::block_on(async move {
                tx.send_batch(batch(vec![1])).await.expect("send");
                tx.send_error(fdset_common::DatasetError::Scan("boom".to_string()))
                    .await
                    .expect("send error");
            })
        });
        let items = futures::executor::block_on_stream(rx).collect::<Vec<_>>();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].as_ref().is_err());
    }
}
