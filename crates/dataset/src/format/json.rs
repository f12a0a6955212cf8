use std::io::{BufReader, Cursor};
use std::sync::Arc;

use arrow::json::reader::infer_json_schema;
use arrow::json::{LineDelimitedWriter, ReaderBuilder};
use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use bytes::Bytes;
use fdset_common::{DatasetError, Result};
use fdset_execution::RecordBatchIterator;
use fdset_storage::OutputStream;

use super::{FileFormat, FileSource, FileWriteOptions, FileWriter};
use crate::fragment::{FileFragment, Fragment, FragmentRef};
use crate::scan::{ScanOptions, ScanTask, ScanTaskIterator, ScanTaskRef};

/// Newline-delimited JSON objects.
#[derive(Debug, Clone, Default)]
pub struct JsonFileFormat {
    schema: Option<SchemaRef>,
}

impl JsonFileFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every file with `schema` instead of inferring one.
    pub fn with_schema(schema: SchemaRef) -> Self {
        Self {
            schema: Some(schema),
        }
    }
}

fn reader_for(source: &FileSource) -> Result<BufReader<Cursor<Bytes>>> {
    Ok(BufReader::new(source.open()?.reader()))
}

impl FileFormat for JsonFileFormat {
    fn type_name(&self) -> &'static str {
        "json"
    }

    fn is_supported(&self, source: &FileSource) -> Result<bool> {
        Ok(infer_json_schema(reader_for(source)?, Some(1))
            .is_ok_and(|(schema, _)| !schema.fields().is_empty()))
    }

    fn inspect(&self, source: &FileSource) -> Result<SchemaRef> {
        if let Some(schema) = &self.schema {
            return Ok(Arc::clone(schema));
        }
        let (schema, _) = infer_json_schema(reader_for(source)?, None).map_err(|e| {
            DatasetError::UnsupportedFormat(format!("'{}' is not a json file: {e}", source.path()))
        })?;
        Ok(Arc::new(schema))
    }

    fn scan_file(
        &self,
        options: Arc<ScanOptions>,
        fragment: Arc<FileFragment>,
    ) -> Result<ScanTaskIterator> {
        let task: ScanTaskRef = Arc::new(JsonScanTask {
            source: fragment.source().clone(),
            options,
            fragment,
        });
        Ok(Box::new(std::iter::once(Ok(task))))
    }

    fn make_writer(
        &self,
        destination: Box<dyn OutputStream>,
        schema: SchemaRef,
        _options: &FileWriteOptions,
    ) -> Result<Box<dyn FileWriter>> {
        Ok(Box::new(JsonFileWriter {
            path: destination.path().to_string(),
            schema,
            writer: LineDelimitedWriter::new(destination),
        }))
    }
}

struct JsonScanTask {
    source: FileSource,
    options: Arc<ScanOptions>,
    fragment: FragmentRef,
}

impl ScanTask for JsonScanTask {
    fn options(&self) -> &Arc<ScanOptions> {
        &self.options
    }

    fn fragment(&self) -> &FragmentRef {
        &self.fragment
    }

    fn execute(&self) -> Result<RecordBatchIterator> {
        let schema = self.fragment.read_physical_schema()?;
        let path = self.source.path().to_string();
        let reader = ReaderBuilder::new(schema)
            .with_batch_size(self.options.batch_size)
            .build(reader_for(&self.source)?)
            .map_err(|e| DatasetError::Scan(format!("opening '{path}': {e}")))?;
        Ok(Box::new(reader.map(move |batch| {
            batch.map_err(|e| DatasetError::Scan(format!("reading '{path}': {e}")))
        })))
    }
}

struct JsonFileWriter {
    path: String,
    schema: SchemaRef,
    writer: LineDelimitedWriter<Box<dyn OutputStream>>,
}

impl FileWriter for JsonFileWriter {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer
            .write(batch)
            .map_err(|e| DatasetError::Write(format!("writing '{}': {e}", self.path)))
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let JsonFileWriter {
            path, mut writer, ..
        } = *self;
        writer
            .finish()
            .map_err(|e| DatasetError::Write(format!("finishing '{path}': {e}")))?;
        writer.into_inner().close()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_schema::{DataType, Field, Schema};
    use fdset_execution::lit;
    use fdset_storage::{FileSystemRef, MockFileSystem};

    use super::JsonFileFormat;
    use crate::format::{FileFormat, FileFormatExt, FileFormatRef, FileSource};
    use crate::fragment::Fragment;
    use crate::scan::ScanOptions;

    #[test]
    fn infers_or_uses_fixed_schema() {
        let fs = MockFileSystem::new();
        fs.create_file(
            "/j/a.json",
            "{\"region\": \"NY\", \"sales\": 3}\n{\"region\": \"QC\", \"sales\": 7}\n",
        );
        let fs: FileSystemRef = Arc::new(fs);
        let source = FileSource::new("/j/a.json", fs);

        let inferred: FileFormatRef = Arc::new(JsonFileFormat::new());
        let schema = inferred.inspect(&source).expect("inspect");
        assert_eq!(schema.field_with_name("sales").expect("sales").data_type(), &DataType::Int64);

        let fixed_schema = Arc::new(Schema::new(vec![
            Field::new("region", DataType::Utf8, true),
            Field::new("sales", DataType::Float64, true),
        ]));
        let fixed: FileFormatRef = Arc::new(JsonFileFormat::with_schema(Arc::clone(&fixed_schema)));
        let fragment = fixed.make_fragment(source, lit(true));
        let task = fragment
            .scan(Arc::new(ScanOptions::new(fixed_schema)))
            .expect("scan")
            .next()
            .expect("one task")
            .expect("task");
        let batches = task
            .execute()
            .expect("execute")
            .collect::<Result<Vec<_>, _>>()
            .expect("batches");
        assert_eq!(batches[0].num_rows(), 2);
        assert_eq!(batches[0].schema().field(1).data_type(), &DataType::Float64);
    }
}
