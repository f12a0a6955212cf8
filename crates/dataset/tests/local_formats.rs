mod support;

use std::sync::Arc;

use fdset_dataset::{
    CsvFileFormat, DatasetExt, DatasetRef, DirectoryPartitioning, FileFormatRef,
    FileSystemDataset, FileSystemDatasetFactory, FileSystemDatasetWriteOptions,
    FileSystemFactoryOptions, FileWriteOptions, HivePartitioning, ParquetFileFormat,
    PartitioningRef, Table,
};
use fdset_storage::{FileSelector, FileSystemRef, LocalFileSystem};

use support::{
    floats, init_tracing, sales_dataset, sales_filesystem, schema_of, unique_dir,
};

const TOTAL_SALES: f64 = 3372.625;

fn write_sales(
    fs: &FileSystemRef,
    base_dir: &str,
    format: FileFormatRef,
    partitioning: PartitioningRef,
) -> Vec<String> {
    let source: DatasetRef = Arc::new(sales_dataset(Arc::new(sales_filesystem())));
    let scanner = source.new_scan().finish().expect("source scanner");
    let options = FileSystemDatasetWriteOptions::new(
        FileWriteOptions::new(format),
        Arc::clone(fs),
        base_dir,
        partitioning,
    );
    FileSystemDataset::write(&options, &scanner).expect("write")
}

fn scan_all(dataset: FileSystemDataset) -> Table {
    let dataset: DatasetRef = Arc::new(dataset);
    dataset
        .new_scan()
        .finish()
        .expect("scanner")
        .to_table()
        .expect("table")
}

fn total_sales(table: &Table) -> f64 {
    let combined = table.combine().expect("combine");
    floats(&combined, "sales").iter().sum()
}

#[test]
fn parquet_round_trip_on_local_disk() {
    init_tracing();
    let dir = unique_dir("fdset_parquet");
    let base_dir = dir.to_string_lossy().to_string();
    let fs: FileSystemRef = Arc::new(LocalFileSystem::new());

    let written = write_sales(
        &fs,
        &base_dir,
        Arc::new(ParquetFileFormat::new()),
        Arc::new(HivePartitioning::new(schema_of(&["year"]))),
    );
    assert_eq!(written.len(), 2);
    assert!(written[0].ends_with("year=2018/part-0"));

    let dataset = FileSystemDatasetFactory::make(
        Arc::clone(&fs),
        &FileSelector::new(base_dir.as_str()),
        Arc::new(ParquetFileFormat::new()),
        FileSystemFactoryOptions::default().with_partitioning(HivePartitioning::discover()),
    )
    .expect("factory")
    .finish()
    .expect("dataset");
    assert_eq!(dataset.files(), written);

    let table = scan_all(dataset);
    assert_eq!(table.num_rows(), 16);
    assert_eq!(total_sales(&table), TOTAL_SALES);

    std::fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn csv_round_trip_on_local_disk() {
    init_tracing();
    let dir = unique_dir("fdset_csv");
    let base_dir = dir.to_string_lossy().to_string();
    let fs: FileSystemRef = Arc::new(LocalFileSystem::new());

    let written = write_sales(
        &fs,
        &base_dir,
        Arc::new(CsvFileFormat::new()),
        Arc::new(DirectoryPartitioning::new(schema_of(&["year"]))),
    );
    assert_eq!(written.len(), 2);

    let dataset = FileSystemDatasetFactory::make(
        Arc::clone(&fs),
        &FileSelector::new(base_dir.as_str()),
        Arc::new(CsvFileFormat::new()),
        FileSystemFactoryOptions::default()
            .with_partitioning(DirectoryPartitioning::discover(vec!["year".to_string()])),
    )
    .expect("factory")
    .finish_with_schema(schema_of(&["region", "model", "sales", "year", "country"]))
    .expect("dataset");

    let table = scan_all(dataset);
    assert_eq!(table.num_rows(), 16);
    assert_eq!(total_sales(&table), TOTAL_SALES);
    let combined = table.combine().expect("combine");
    assert_eq!(
        support::ints(&combined, "year").iter().filter(|y| **y == 2019).count(),
        8
    );

    std::fs::remove_dir_all(&dir).expect("cleanup");
}
