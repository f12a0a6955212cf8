use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use fdset_common::{DatasetConfig, DatasetError, Result, global_metrics};
use fdset_execution::{
    BatchSender, Executor, Expr, RecordBatchGenerator, RecordBatchIterator, bounded_batch_channel,
    iter_generator, lit,
};
use futures::future::ready;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tracing::{debug, info};

use super::options::project_schema;
use super::projector::{FilterAndProjectScanTask, Projector};
use super::{ScanOptions, ScanTaskIterator, ScanTaskRef};
use crate::dataset::{DatasetRef, FragmentDataset, FragmentIterator};
use crate::fragment::FragmentRef;

/// A value with its zero-based position in the enclosing sequence.
#[derive(Debug, Clone)]
pub struct Enumerated<T> {
    pub value: T,
    pub index: usize,
    /// True exactly for the final element of the sequence.
    pub last: bool,
}

/// A scanned batch tagged with its position in the fragment and the
/// fragment's position in the scan.
#[derive(Debug, Clone)]
pub struct EnumeratedRecordBatch {
    pub fragment: Enumerated<FragmentRef>,
    pub record_batch: Enumerated<RecordBatch>,
}

pub type EnumeratedRecordBatchIterator =
    Box<dyn Iterator<Item = Result<EnumeratedRecordBatch>> + Send>;

pub type EnumeratedRecordBatchStream = BoxStream<'static, Result<EnumeratedRecordBatch>>;

/// Materialized scan result in fragment-major order.
#[derive(Debug, Clone)]
pub struct Table {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl Table {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    /// All batches concatenated into one.
    pub fn combine(&self) -> Result<RecordBatch> {
        concat_batches(&self.schema, &self.batches)
            .map_err(|e| DatasetError::Execution(format!("combining table batches: {e}")))
    }
}

pub struct ScannerBuilder {
    dataset: DatasetRef,
    projection: Option<Vec<String>>,
    filter: Expr,
    config: DatasetConfig,
    executor: Option<Executor>,
}

impl ScannerBuilder {
    pub fn new(dataset: DatasetRef) -> Self {
        Self {
            dataset,
            projection: None,
            filter: lit(true),
            config: DatasetConfig::default(),
            executor: None,
        }
    }

    /// Scans a single fragment as if it were a dataset with `schema`.
    pub fn from_fragment(schema: SchemaRef, fragment: FragmentRef) -> Self {
        Self::new(Arc::new(FragmentDataset::new(schema, vec![fragment])))
    }

    pub fn project<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Conjoined with any filter set before.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = std::mem::replace(&mut self.filter, lit(true)).and(predicate);
        self
    }

    pub fn batch_size(mut self, rows: usize) -> Self {
        self.config.batch_size_rows = rows;
        self
    }

    pub fn use_threads(mut self, use_threads: bool) -> Self {
        self.config.use_threads = use_threads;
        self
    }

    /// Pool used when threads are enabled; otherwise one is built from the config.
    pub fn executor(mut self, executor: Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn fragment_readahead(mut self, fragments: usize) -> Self {
        self.config.fragment_readahead = fragments;
        self
    }

    pub fn config(mut self, config: &DatasetConfig) -> Self {
        self.config = config.clone();
        self
    }

    pub fn finish(self) -> Result<Scanner> {
        let dataset_schema = Arc::clone(self.dataset.schema());
        if self.config.batch_size_rows == 0 {
            return Err(DatasetError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        let projected_schema = match &self.projection {
            Some(names) => project_schema(&dataset_schema, names)?,
            None => Arc::clone(&dataset_schema),
        };
        let filter = self.filter.bind(&dataset_schema)?;
        let executor = if !self.config.use_threads {
            Executor::serial()
        } else {
            match self.executor {
                Some(executor) => executor,
                None => Executor::from_config(&self.config)?,
            }
        };
        let options = ScanOptions {
            dataset_schema,
            projected_schema,
            filter,
            batch_size: self.config.batch_size_rows,
            use_threads: self.config.use_threads,
            fragment_readahead: self.config.fragment_readahead.max(1),
            batch_readahead: self.config.batch_readahead.max(1),
        };
        Ok(Scanner {
            dataset: self.dataset,
            options: Arc::new(options),
            executor,
        })
    }
}

/// Configured scan over the fragments of one dataset.
#[derive(Clone)]
pub struct Scanner {
    dataset: DatasetRef,
    options: Arc<ScanOptions>,
    executor: Executor,
}

impl Scanner {
    pub fn options(&self) -> &Arc<ScanOptions> {
        &self.options
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.options.projected_schema
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Fragments that may hold rows matching the filter.
    pub fn get_fragments(&self) -> Result<FragmentIterator> {
        self.dataset.get_fragments(&self.options.filter)
    }

    /// Scan tasks of every surviving fragment, in fragment order.
    pub fn scan(&self) -> Result<ScanTaskIterator> {
        let scanner = self.clone();
        let tasks = self.get_fragments()?.flat_map(move |fragment| {
            match fragment.and_then(|f| scanner.fragment_tasks(&f)) {
                Ok(tasks) => tasks,
                Err(e) => Box::new(std::iter::once(Err(e))) as ScanTaskIterator,
            }
        });
        Ok(Box::new(tasks))
    }

    /// Tagged batches in fragment-major, batch-minor order.
    pub fn scan_batches(&self) -> Result<EnumeratedRecordBatchIterator> {
        Ok(Box::new(futures::executor::block_on_stream(
            self.scan_batches_async()?,
        )))
    }

    pub fn scan_batches_async(&self) -> Result<EnumeratedRecordBatchStream> {
        let fragments = enumerate_with_last(self.get_fragments()?);
        info!(
            dataset = self.dataset.type_name(),
            ordered = true,
            serial = self.executor.is_serial(),
            "starting scan"
        );
        let scanner = self.clone();
        let batches = stream::iter(fragments)
            .map(move |fragment| ready(scanner.fragment_stream(fragment)))
            .buffered(self.options.fragment_readahead)
            .flatten();
        Ok(stop_after_error(batches.boxed()))
    }

    /// Tagged batches in completion order.
    pub fn scan_batches_unordered(&self) -> Result<EnumeratedRecordBatchIterator> {
        Ok(Box::new(futures::executor::block_on_stream(
            self.scan_batches_unordered_async()?,
        )))
    }

    pub fn scan_batches_unordered_async(&self) -> Result<EnumeratedRecordBatchStream> {
        let fragments = enumerate_with_last(self.get_fragments()?);
        info!(
            dataset = self.dataset.type_name(),
            ordered = false,
            serial = self.executor.is_serial(),
            "starting scan"
        );
        let scanner = self.clone();
        let batches = stream::iter(fragments)
            .map(move |fragment| scanner.fragment_stream(fragment))
            .flatten_unordered(self.options.fragment_readahead);
        Ok(stop_after_error(batches.boxed()))
    }

    pub fn to_table(&self) -> Result<Table> {
        let batches = self
            .scan_batches()?
            .map(|tagged| tagged.map(|t| t.record_batch.value))
            .collect::<Result<Vec<_>>>()?;
        Ok(Table {
            schema: Arc::clone(&self.options.projected_schema),
            batches,
        })
    }

    fn fragment_tasks(&self, fragment: &FragmentRef) -> Result<ScanTaskIterator> {
        let projector = Arc::new(Projector::new(
            &self.options,
            fragment.partition_expression(),
        )?);
        debug!(
            fragment = ?fragment,
            filtered = projector.has_filter(),
            "scanning fragment"
        );
        let tasks = Arc::clone(fragment).scan(Arc::clone(&self.options))?;
        Ok(Box::new(tasks.map(move |task| {
            task.map(|t| {
                Arc::new(FilterAndProjectScanTask::new(t, Arc::clone(&projector))) as ScanTaskRef
            })
        })))
    }

    fn fragment_stream(&self, fragment: Enumerated<Result<FragmentRef>>) -> EnumeratedRecordBatchStream {
        let Enumerated { value, index, last } = fragment;
        let started = value.and_then(|fragment| {
            let tasks = self.fragment_tasks(&fragment)?;
            let batches = if self.executor.is_serial() {
                serial_batches(tasks)
            } else {
                self.spawn_producer(tasks)?
            };
            Ok(tag_batches(
                Enumerated {
                    value: fragment,
                    index,
                    last,
                },
                batches,
                self.dataset.type_name(),
            ))
        });
        match started {
            Ok(batches) => batches,
            Err(e) => stream::once(ready(Err(e))).boxed(),
        }
    }

    /// Runs a fragment's tasks on the pool, feeding a bounded channel.
    fn spawn_producer(&self, tasks: ScanTaskIterator) -> Result<RecordBatchGenerator> {
        let (mut tx, rx) = bounded_batch_channel(
            Arc::clone(&self.options.projected_schema),
            self.options.batch_readahead,
        );
        let executor = self.executor.clone();
        self.executor.spawn(async move {
            if let Err(e) = produce(&executor, tasks, &mut tx).await {
                let _ = tx.send_error(e).await;
            }
        })?;
        Ok(rx.boxed())
    }
}

async fn produce(executor: &Executor, tasks: ScanTaskIterator, tx: &mut BatchSender) -> Result<()> {
    for task in tasks {
        let task = task?;
        if task.supports_async() {
            let mut batches = task.execute_async(executor)?;
            while let Some(batch) = batches.next().await {
                if tx.send_batch(batch?).await.is_err() {
                    return Ok(());
                }
            }
        } else {
            let batches = executor
                .submit(move || task.execute()?.collect::<Result<Vec<_>>>())
                .await?;
            for batch in batches {
                if tx.send_batch(batch).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

fn serial_batches(tasks: ScanTaskIterator) -> RecordBatchGenerator {
    let batches = tasks.flat_map(|task| match task.and_then(|t| t.execute()) {
        Ok(batches) => batches,
        Err(e) => Box::new(std::iter::once(Err(e))) as RecordBatchIterator,
    });
    iter_generator(Box::new(batches))
}

fn tag_batches(
    fragment: Enumerated<FragmentRef>,
    batches: RecordBatchGenerator,
    dataset: &'static str,
) -> EnumeratedRecordBatchStream {
    stream::unfold((batches.peekable(), 0usize), move |(mut batches, index)| {
        let fragment = fragment.clone();
        async move {
            let batch = batches.next().await?;
            let last = std::pin::Pin::new(&mut batches).peek().await.is_none();
            let tagged = batch.map(|value| {
                global_metrics().record_batch_scanned(dataset, value.num_rows() as u64);
                EnumeratedRecordBatch {
                    fragment,
                    record_batch: Enumerated { value, index, last },
                }
            });
            Some((tagged, (batches, index + 1)))
        }
    })
    .boxed()
}

fn stop_after_error(batches: EnumeratedRecordBatchStream) -> EnumeratedRecordBatchStream {
    batches
        .scan(false, |failed, item| {
            if *failed {
                return ready(None);
            }
            *failed = item.is_err();
            ready(Some(item))
        })
        .boxed()
}

fn enumerate_with_last<I: Iterator>(iter: I) -> impl Iterator<Item = Enumerated<I::Item>> {
    let mut iter = iter.peekable();
    let mut index = 0;
    std::iter::from_fn(move || {
        let value = iter.next()?;
        let item = Enumerated {
            value,
            index,
            last: iter.peek().is_none(),
        };
        index += 1;
        Some(item)
    })
}
