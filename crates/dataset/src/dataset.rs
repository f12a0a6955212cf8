//! Datasets: immutable fragment collections with a logical schema.

use std::fmt::Debug;
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use fdset_common::{DatasetError, Result, global_metrics};
use fdset_execution::{Expr, is_satisfiable, lit};
use fdset_storage::FileSystemRef;
use tracing::debug;

use crate::format::FileFormatRef;
use crate::fragment::{FileFragment, Fragment, FragmentRef, InMemoryFragment};
use crate::scan::ScannerBuilder;

pub type FragmentIterator = Box<dyn Iterator<Item = Result<FragmentRef>> + Send>;

pub trait Dataset: Send + Sync + Debug {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> &SchemaRef;

    /// Predicate holding for every row of the dataset.
    fn partition_expression(&self) -> &Expr;

    /// Every fragment, in construction order.
    fn fragments(&self) -> Vec<FragmentRef>;

    /// Fragments whose partition expression is not provably disjoint from
    /// `predicate`. Never drops a fragment that could hold matching rows.
    fn get_fragments(&self, predicate: &Expr) -> Result<FragmentIterator> {
        let predicate = predicate.bind(self.schema())?;
        let dataset = self.type_name();
        let fragments = self.fragments().into_iter().filter(move |fragment| {
            let keep = is_satisfiable(&fragment.partition_expression().clone().and(predicate.clone()));
            if keep {
                global_metrics().record_pruning(dataset, 1, 0);
            } else {
                debug!(fragment = ?fragment, "pruned fragment");
                global_metrics().record_pruning(dataset, 0, 1);
            }
            keep
        });
        Ok(Box::new(fragments.map(Ok)))
    }
}

pub type DatasetRef = Arc<dyn Dataset>;

/// Starts a scan configuration over a shared dataset.
pub trait DatasetExt {
    fn new_scan(&self) -> ScannerBuilder;
}

impl DatasetExt for DatasetRef {
    fn new_scan(&self) -> ScannerBuilder {
        ScannerBuilder::new(Arc::clone(self))
    }
}

/// Files on one filesystem read through one format.
#[derive(Debug)]
pub struct FileSystemDataset {
    schema: SchemaRef,
    root_partition: Expr,
    format: FileFormatRef,
    filesystem: FileSystemRef,
    fragments: Vec<Arc<FileFragment>>,
}

impl FileSystemDataset {
    /// Rejects fragments whose partition expression contradicts `root_partition`.
    pub fn try_new(
        schema: SchemaRef,
        root_partition: Expr,
        format: FileFormatRef,
        filesystem: FileSystemRef,
        fragments: Vec<Arc<FileFragment>>,
    ) -> Result<Self> {
        for fragment in &fragments {
            let joint = root_partition
                .clone()
                .and(fragment.partition_expression().clone());
            if !is_satisfiable(&joint) {
                return Err(DatasetError::Discovery(format!(
                    "fragment '{}' with partition {} contradicts root partition {}",
                    fragment.source().path(),
                    fragment.partition_expression(),
                    root_partition
                )));
            }
        }
        Ok(Self {
            schema,
            root_partition,
            format,
            filesystem,
            fragments,
        })
    }

    /// Paths of every fragment, in fragment order.
    pub fn files(&self) -> Vec<String> {
        self.fragments
            .iter()
            .map(|f| f.source().path().to_string())
            .collect()
    }

    pub fn file_fragments(&self) -> &[Arc<FileFragment>] {
        &self.fragments
    }

    pub fn format(&self) -> &FileFormatRef {
        &self.format
    }

    pub fn filesystem(&self) -> &FileSystemRef {
        &self.filesystem
    }
}

impl Dataset for FileSystemDataset {
    fn type_name(&self) -> &'static str {
        "filesystem"
    }

    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn partition_expression(&self) -> &Expr {
        &self.root_partition
    }

    fn fragments(&self) -> Vec<FragmentRef> {
        self.fragments
            .iter()
            .map(|f| Arc::clone(f) as FragmentRef)
            .collect()
    }
}

/// Batches held in memory, one fragment per batch.
#[derive(Debug)]
pub struct InMemoryDataset {
    schema: SchemaRef,
    root_partition: Expr,
    fragments: Vec<FragmentRef>,
}

impl InMemoryDataset {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        let fragments = batches
            .into_iter()
            .map(|batch| {
                Arc::new(InMemoryFragment::new(Arc::clone(&schema), vec![batch])) as FragmentRef
            })
            .collect();
        Self {
            schema,
            root_partition: lit(true),
            fragments,
        }
    }
}

impl Dataset for InMemoryDataset {
    fn type_name(&self) -> &'static str {
        "in-memory"
    }

    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn partition_expression(&self) -> &Expr {
        &self.root_partition
    }

    fn fragments(&self) -> Vec<FragmentRef> {
        self.fragments.clone()
    }
}

/// Arbitrary fragments presented under one schema.
#[derive(Debug)]
pub struct FragmentDataset {
    schema: SchemaRef,
    root_partition: Expr,
    fragments: Vec<FragmentRef>,
}

impl FragmentDataset {
    pub fn new(schema: SchemaRef, fragments: Vec<FragmentRef>) -> Self {
        Self {
            schema,
            root_partition: lit(true),
            fragments,
        }
    }
}

impl Dataset for FragmentDataset {
    fn type_name(&self) -> &'static str {
        "fragment"
    }

    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn partition_expression(&self) -> &Expr {
        &self.root_partition
    }

    fn fragments(&self) -> Vec<FragmentRef> {
        self.fragments.clone()
    }
}
