//! Building a [`FileSystemDataset`] from a directory tree or a path list.
//!
//! Discovery lists files, strips the partition base directory from each
//! path, parses the remaining directory segments into a partition
//! expression and unifies every file's physical schema with the partition
//! schema into the dataset schema.

use std::sync::Arc;
use std::time::Instant;

use arrow_schema::{Schema, SchemaRef};
use fdset_common::{DatasetConfig, DatasetError, Result, global_metrics};
use fdset_execution::{Expr, lit};
use fdset_storage::path::{has_ignored_prefix, parent_segments, strip_base_dir};
use fdset_storage::{FileSelector, FileSystemRef};
use tracing::{debug, info};

use crate::dataset::FileSystemDataset;
use crate::format::{FileFormatRef, FileSource};
use crate::fragment::FileFragment;
use crate::partitioning::{PartitioningOrFactory, PartitioningRef, reconcile_partition_schema};
use crate::schema::unify_schemas;

#[derive(Debug, Clone)]
pub struct FileSystemFactoryOptions {
    pub partitioning: PartitioningOrFactory,
    /// Prefix stripped before partition parsing; defaults to the selector's
    /// base directory.
    pub partition_base_dir: Option<String>,
    /// Drop files the format does not recognise instead of failing.
    pub exclude_invalid_files: bool,
    /// Files with any path component below the base directory starting with
    /// one of these are skipped.
    pub selector_ignore_prefixes: Vec<String>,
    pub root_partition: Expr,
}

impl Default for FileSystemFactoryOptions {
    fn default() -> Self {
        Self::from_config(&DatasetConfig::default())
    }
}

impl FileSystemFactoryOptions {
    pub fn from_config(config: &DatasetConfig) -> Self {
        Self {
            partitioning: PartitioningOrFactory::default(),
            partition_base_dir: None,
            exclude_invalid_files: false,
            selector_ignore_prefixes: config.selector_ignore_prefixes.clone(),
            root_partition: lit(true),
        }
    }

    pub fn with_partitioning(mut self, partitioning: impl Into<PartitioningOrFactory>) -> Self {
        self.partitioning = partitioning.into();
        self
    }
}

pub struct FileSystemDatasetFactory {
    filesystem: FileSystemRef,
    format: FileFormatRef,
    options: FileSystemFactoryOptions,
    files: Vec<String>,
    partition_base_dir: String,
    started: Instant,
}

impl FileSystemDatasetFactory {
    /// Lists every file under `selector`.
    pub fn make(
        filesystem: FileSystemRef,
        selector: &FileSelector,
        format: FileFormatRef,
        options: FileSystemFactoryOptions,
    ) -> Result<Self> {
        let started = Instant::now();
        let base_dir = filesystem.normalize_path(&selector.base_dir)?;
        let listed = filesystem.get_file_info(selector)?;
        let files = listed
            .into_iter()
            .filter(|info| info.is_file())
            .map(|info| info.path)
            .filter(|path| match strip_base_dir(path, &base_dir) {
                Some(rel) => !has_ignored_prefix(&rel, &options.selector_ignore_prefixes),
                None => true,
            })
            .collect::<Vec<_>>();
        let partition_base_dir = match &options.partition_base_dir {
            Some(dir) => filesystem.normalize_path(dir)?,
            None => base_dir.clone(),
        };
        info!(
            filesystem = filesystem.type_name(),
            base_dir = %base_dir,
            files = files.len(),
            "listed dataset files"
        );
        Self::with_files(filesystem, format, options, files, partition_base_dir, started)
    }

    /// Uses exactly `paths`; partitions are parsed only below
    /// `options.partition_base_dir`.
    pub fn from_paths(
        filesystem: FileSystemRef,
        paths: Vec<String>,
        format: FileFormatRef,
        options: FileSystemFactoryOptions,
    ) -> Result<Self> {
        let started = Instant::now();
        let files = paths
            .iter()
            .map(|p| {
                let info = filesystem.get_file_info_for(p)?;
                if !info.is_file() {
                    return Err(DatasetError::Discovery(format!("'{p}' is not a file")));
                }
                Ok(info.path)
            })
            .collect::<Result<Vec<_>>>()?;
        let partition_base_dir = match &options.partition_base_dir {
            Some(dir) => filesystem.normalize_path(dir)?,
            None => String::new(),
        };
        Self::with_files(filesystem, format, options, files, partition_base_dir, started)
    }

    fn with_files(
        filesystem: FileSystemRef,
        format: FileFormatRef,
        options: FileSystemFactoryOptions,
        files: Vec<String>,
        partition_base_dir: String,
        started: Instant,
    ) -> Result<Self> {
        let files = if options.exclude_invalid_files {
            let mut supported = Vec::with_capacity(files.len());
            for path in files {
                if format.is_supported(&FileSource::new(path.as_str(), Arc::clone(&filesystem)))? {
                    supported.push(path);
                } else {
                    debug!(path = %path, format = format.type_name(), "excluding invalid file");
                }
            }
            supported
        } else {
            files
        };
        Ok(Self {
            filesystem,
            format,
            options,
            files,
            partition_base_dir,
            started,
        })
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    fn source(&self, path: &str) -> FileSource {
        FileSource::new(path, Arc::clone(&self.filesystem))
    }

    fn segments(&self, path: &str) -> Vec<String> {
        if self.partition_base_dir.is_empty() {
            return Vec::new();
        }
        strip_base_dir(path, &self.partition_base_dir)
            .map(|rel| parent_segments(&rel))
            .unwrap_or_default()
    }

    /// Explicit path lists are not filtered up front, so parse failures
    /// below an ignored prefix are checked here.
    fn is_ignored(&self, path: &str) -> bool {
        strip_base_dir(path, &self.partition_base_dir)
            .is_some_and(|rel| has_ignored_prefix(&rel, &self.options.selector_ignore_prefixes))
    }

    fn partitioning(&self, reference: Option<&Schema>) -> Result<PartitioningRef> {
        match &self.options.partitioning {
            PartitioningOrFactory::Partitioning(p) => Ok(Arc::clone(p)),
            PartitioningOrFactory::Factory(factory) => {
                let segments = self
                    .files
                    .iter()
                    .map(|f| self.segments(f))
                    .collect::<Vec<_>>();
                let inspected = factory.inspect(&segments)?;
                let schema = match reference {
                    Some(reference) => reconcile_partition_schema(&inspected, reference),
                    None => inspected,
                };
                factory.finish(&schema)
            }
        }
    }

    /// Physical schema of every file followed by the partition schema.
    pub fn inspect_schemas(&self) -> Result<Vec<SchemaRef>> {
        let mut schemas = self
            .files
            .iter()
            .map(|path| self.format.inspect(&self.source(path)))
            .collect::<Result<Vec<_>>>()?;
        schemas.push(Arc::clone(self.partitioning(None)?.schema()));
        Ok(schemas)
    }

    /// Unified dataset schema.
    pub fn inspect(&self) -> Result<SchemaRef> {
        unify_schemas(&self.inspect_schemas()?)
    }

    /// Builds the dataset with the unified schema. Fragments keep the
    /// physical schema inspected here instead of reading it again.
    pub fn finish(&self) -> Result<FileSystemDataset> {
        let mut schemas = self.inspect_schemas()?;
        let schema = unify_schemas(&schemas)?;
        schemas.pop();
        self.build(schema, &schemas)
    }

    /// Builds the dataset with a caller-provided schema; partition field
    /// types discovered by a factory follow that schema.
    pub fn finish_with_schema(&self, schema: SchemaRef) -> Result<FileSystemDataset> {
        self.build(schema, &[])
    }

    fn build(&self, schema: SchemaRef, physical: &[SchemaRef]) -> Result<FileSystemDataset> {
        let partitioning = self.partitioning(Some(&schema))?;
        let mut fragments = Vec::with_capacity(self.files.len());
        for (i, path) in self.files.iter().enumerate() {
            let expr = match partitioning.parse(&self.segments(path)) {
                Ok(expr) => expr.bind(partitioning.schema())?,
                Err(DatasetError::PartitionParse(reason)) if self.is_ignored(path) => {
                    debug!(path = %path, reason = %reason, "skipping file under ignored prefix");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let fragment = FileFragment::new(self.source(path), Arc::clone(&self.format), expr);
            let fragment = match physical.get(i) {
                Some(known) => fragment.with_physical_schema(Arc::clone(known)),
                None => fragment,
            };
            fragments.push(Arc::new(fragment));
        }
        let count = fragments.len();
        let dataset = FileSystemDataset::try_new(
            schema,
            self.options.root_partition.clone(),
            Arc::clone(&self.format),
            Arc::clone(&self.filesystem),
            fragments,
        )?;
        let elapsed = self.started.elapsed().as_secs_f64();
        global_metrics().record_discovery(self.format.type_name(), count as u64, elapsed);
        info!(
            format = self.format.type_name(),
            partitioning = partitioning.type_name(),
            fragments = count,
            "discovered dataset"
        );
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_schema::{DataType, Field, Schema};
    use fdset_storage::{FileSelector, FileSystemRef, MockFileSystem};

    use super::{FileSystemDatasetFactory, FileSystemFactoryOptions};
    use crate::format::{CsvFileFormat, FileFormatRef};
    use crate::fragment::Fragment;
    use crate::partitioning::{DirectoryPartitioning, HivePartitioning, ParseMode, PartitioningRef};

    fn fs() -> FileSystemRef {
        let fs = MockFileSystem::new();
        fs.create_file("/data/2018/a.csv", "v\n1\n");
        fs.create_file("/data/2019/b.csv", "v\n2\n");
        fs.create_file("/data/_SUCCESS", "");
        fs.create_file("/data/.hidden/c.csv", "v\n3\n");
        Arc::new(fs)
    }

    #[test]
    fn ignores_prefixed_files_and_infers_partition_types() {
        let format: FileFormatRef = Arc::new(CsvFileFormat::new());
        let options = FileSystemFactoryOptions::default()
            .with_partitioning(DirectoryPartitioning::discover(vec!["year".to_string()]));
        let factory =
            FileSystemDatasetFactory::make(fs(), &FileSelector::new("/data"), format, options)
                .expect("factory");
        assert_eq!(factory.files(), ["/data/2018/a.csv", "/data/2019/b.csv"]);

        let schema = factory.inspect().expect("inspect");
        assert_eq!(
            schema.as_ref(),
            &Schema::new(vec![
                Field::new("v", DataType::Int64, true),
                Field::new("year", DataType::Int32, true),
            ])
        );
        let dataset = factory.finish().expect("dataset");
        assert_eq!(dataset.files().len(), 2);
    }

    #[test]
    fn unparsable_files_fail_unless_excluded() {
        let mock = MockFileSystem::new();
        mock.create_file("/d/ok.csv", "v\n1\n");
        mock.create_file("/d/empty.csv", "");
        let fs: FileSystemRef = Arc::new(mock);
        let format: FileFormatRef = Arc::new(CsvFileFormat::new());

        let strict = FileSystemDatasetFactory::make(
            Arc::clone(&fs),
            &FileSelector::new("/d"),
            Arc::clone(&format),
            FileSystemFactoryOptions::default(),
        )
        .expect("factory");
        let err = strict.inspect().expect_err("empty csv");
        assert!(err.to_string().starts_with("unsupported format"));

        let options = FileSystemFactoryOptions {
            exclude_invalid_files: true,
            ..FileSystemFactoryOptions::default()
        };
        let lenient =
            FileSystemDatasetFactory::make(fs, &FileSelector::new("/d"), format, options)
                .expect("factory");
        assert_eq!(lenient.files(), ["/d/ok.csv"]);
    }

    #[test]
    fn explicit_paths_parse_partitions_below_base_dir() {
        let format: FileFormatRef = Arc::new(CsvFileFormat::new());
        let options = FileSystemFactoryOptions {
            partition_base_dir: Some("/data".to_string()),
            ..FileSystemFactoryOptions::default()
        }
        .with_partitioning(HivePartitioning::discover());
        let factory = FileSystemDatasetFactory::from_paths(
            fs(),
            vec!["/data/2019/b.csv".to_string()],
            format,
            options,
        )
        .expect("factory");
        assert_eq!(factory.files(), ["/data/2019/b.csv"]);
        // "2019" is not a key=value segment, so the hive schema stays empty.
        assert_eq!(factory.inspect().expect("inspect").fields().len(), 1);
        assert!(FileSystemDatasetFactory::from_paths(
            fs(),
            vec!["/data/missing.csv".to_string()],
            Arc::new(CsvFileFormat::new()),
            FileSystemFactoryOptions::default(),
        )
        .is_err());
    }

    #[test]
    fn fragments_reuse_the_schemas_inspected_during_discovery() {
        let mock = Arc::new(MockFileSystem::new());
        mock.create_file("/d/a.csv", "v\n1\n");
        let fs: FileSystemRef = mock.clone();
        let dataset = FileSystemDatasetFactory::make(
            fs,
            &FileSelector::new("/d"),
            Arc::new(CsvFileFormat::new()),
            FileSystemFactoryOptions::default(),
        )
        .expect("factory")
        .finish()
        .expect("dataset");

        mock.create_file("/d/a.csv", "w\n2\n");
        let fragment = &dataset.file_fragments()[0];
        assert_eq!(fragment.source().path(), "/d/a.csv");
        let physical = fragment.read_physical_schema().expect("schema");
        assert_eq!(physical.field(0).name(), "v");
    }

    fn strict_years() -> FileSystemFactoryOptions {
        let years = Arc::new(Schema::new(vec![Field::new("year", DataType::Int32, true)]));
        FileSystemFactoryOptions::default().with_partitioning(
            Arc::new(DirectoryPartitioning::new(years).with_parse_mode(ParseMode::Strict))
                as PartitioningRef,
        )
    }

    #[test]
    fn strict_parse_errors_surface_outside_ignored_prefixes() {
        let mock = MockFileSystem::new();
        mock.create_file("/ds/2018/a.csv", "v\n1\n");
        mock.create_file("/ds/_tmp/b.csv", "v\n2\n");
        let fs: FileSystemRef = Arc::new(mock);
        let format: FileFormatRef = Arc::new(CsvFileFormat::new());

        let dataset = FileSystemDatasetFactory::make(
            Arc::clone(&fs),
            &FileSelector::new("/ds"),
            Arc::clone(&format),
            strict_years(),
        )
        .expect("factory")
        .finish()
        .expect("ignored segment is never parsed");
        assert_eq!(dataset.files(), ["/ds/2018/a.csv"]);

        let explicit = FileSystemFactoryOptions {
            partition_base_dir: Some("/ds".to_string()),
            ..strict_years()
        };
        let dataset = FileSystemDatasetFactory::from_paths(
            Arc::clone(&fs),
            vec!["/ds/2018/a.csv".to_string(), "/ds/_tmp/b.csv".to_string()],
            Arc::clone(&format),
            explicit,
        )
        .expect("factory")
        .finish()
        .expect("ignored parse failure is swallowed");
        assert_eq!(dataset.files(), ["/ds/2018/a.csv"]);

        let mock = MockFileSystem::new();
        mock.create_file("/ds/2018/a.csv", "v\n1\n");
        mock.create_file("/ds/xyz/c.csv", "v\n3\n");
        let err = FileSystemDatasetFactory::make(
            Arc::new(mock),
            &FileSelector::new("/ds"),
            format,
            strict_years(),
        )
        .expect("factory")
        .finish()
        .expect_err("bad segment");
        assert!(err.to_string().starts_with("partition parse error"));
    }
}
