use thiserror::Error;

/// Canonical error taxonomy shared by every fdset crate.
///
/// Classification guidance:
/// - [`DatasetError::Discovery`]: selector/listing failures while finding files
/// - [`DatasetError::SchemaConflict`]: one field name carrying different types across fragments
/// - [`DatasetError::PartitionParse`]: a path segment matched a partition field but could not be cast
/// - [`DatasetError::UnsupportedFormat`]: a file format rejected a source
/// - [`DatasetError::Scan`]: format-level read or decode failures while producing batches
/// - [`DatasetError::Write`]: writer-level failures while emitting files
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Filesystem selector or listing failure during discovery.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Incompatible field types while unifying fragment schemas.
    #[error("schema conflict: {0}")]
    SchemaConflict(String),

    /// Uncastable partition segment (strict parsing only).
    #[error("partition parse error: {0}")]
    PartitionParse(String),

    /// The file format does not recognise the source.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Read failure mid-stream.
    #[error("scan error: {0}")]
    Scan(String),

    /// Failure while creating, writing or finishing an output file.
    #[error("write error: {0}")]
    Write(String),

    /// Invalid or inconsistent options, templates or config values.
    ///
    /// Examples:
    /// - basename template without the `{i}` placeholder
    /// - zero-capacity executor
    /// - projection naming a field missing from the dataset schema
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Expression binding or evaluation failures.
    #[error("expression error: {0}")]
    Expression(String),

    /// Worker pool or channel failures.
    #[error("execution error: {0}")]
    Execution(String),

    /// Valid request for behavior this build does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard fdset result alias.
pub type Result<T> = std::result::Result<T, DatasetError>;
