//! Error types for sv-scatter
//!
//! This module defines the error hierarchy covering:
//! - Configuration and CLI errors (fatal before any worker starts)
//! - Worker and channel errors (fatal to the whole run)
//! - Candidate-container errors (header, index and payload addressing)
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include context about what to do
//! - Nothing is retried: a run either fully succeeds or aborts

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the sv-scatter library and binary
#[derive(Error, Debug)]
pub enum ScatterError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Candidate-container errors
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,

    /// Channel closed unexpectedly
    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

/// Configuration and CLI errors
///
/// All of these are detected at startup, before any worker is spawned,
/// and no partial output is produced.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No input files supplied
    #[error("No input files supplied")]
    NoInputs,

    /// Alignment and serialized inputs mixed in one invocation
    #[error(
        "Ambiguous input set: '{}' is an alignment container but '{}' is a serialized-candidate input; the two kinds cannot be mixed",
        alignment.display(),
        serialized.display()
    )]
    MixedInputTypes {
        alignment: PathBuf,
        serialized: PathBuf,
    },

    /// More than one alignment container supplied
    #[error("Expected a single alignment container, got {count}")]
    MultipleAlignmentInputs { count: usize },

    /// A manifest must be the sole input
    #[error("A sample manifest must be the only input (got {count} inputs)")]
    ManifestNotSole { count: usize },

    /// Input file extension not recognized
    #[error("Unrecognized input type '{}': expected an alignment container (.bam/.cram), a serialized-candidate container (.snf) or a sample manifest (.tsv)", path.display())]
    UnknownInputType { path: PathBuf },

    /// Neither a call output nor a serialization output requested
    #[error("No output destination: supply --vcf-out and/or --snf-out")]
    MissingOutput,

    /// Serialization output requested in a mode that produces calls only
    #[error("--snf-out is not valid in {mode} mode: no candidates are serialized")]
    SnfOutNotApplicable { mode: String },

    /// Genotyping requires an alignment container input
    #[error("--genotype-vcf requires an alignment container input")]
    GenotypeRequiresAlignment,

    /// Pre-existing output without overwrite permission
    #[error("Output '{}' already exists (use --force to overwrite)", path.display())]
    OutputExists { path: PathBuf },

    /// Invalid thread count
    #[error("Invalid thread count {count}: must be between 1 and {max}")]
    InvalidThreadCount { count: usize, max: usize },

    /// Input file missing or unreadable
    #[error("Cannot read input '{}': {reason}", path.display())]
    UnreadableInput { path: PathBuf, reason: String },

    /// Malformed manifest line
    #[error("Invalid manifest '{}' line {line}: {reason}", path.display())]
    ManifestParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Malformed contig table line
    #[error("Invalid contig table '{}' line {line}: {reason}", path.display())]
    ContigTableParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Worker and channel errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The opaque per-task computation reported a fault; fatal to the run
    #[error("Worker {id} fault on task {task_id}: {message}")]
    Fault {
        id: usize,
        task_id: usize,
        message: String,
    },

    /// Worker channel disconnected without a fault message (thread died)
    #[error("Worker {id} disconnected unexpectedly")]
    Disconnected { id: usize },

    /// Worker thread could not be spawned
    #[error("Failed to start worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Dispatch to a worker failed (its request channel is closed)
    #[error("Failed to dispatch task {task_id} to worker {id}")]
    DispatchFailed { id: usize, task_id: usize },
}

/// Candidate-container errors
#[derive(Error, Debug)]
pub enum ContainerError {
    /// Container file has no header line
    #[error("Container '{}' is truncated: missing header record", path.display())]
    HeaderMissing { path: PathBuf },

    /// Header record did not parse
    #[error("Container '{}' has a malformed header: {reason}", path.display())]
    HeaderParse { path: PathBuf, reason: String },

    /// Mixed format versions across a combine input set
    #[error("Container '{}' has format version {found}, expected {expected}", path.display())]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    /// An indexed block falls outside the payload region
    #[error("Block ({contig}, {key}) at offset {offset}+{length} is outside the payload ({payload_len} bytes)")]
    BlockOutOfRange {
        contig: String,
        key: String,
        offset: u64,
        length: u64,
        payload_len: u64,
    },

    /// A block key is not present in the index
    #[error("No block ({contig}, {key}) in container index")]
    BlockNotFound { contig: String, key: String },

    /// A partial file's on-disk size disagrees with its declared length
    #[error("Partial file '{}' is {actual} bytes, expected {expected}", path.display())]
    PartSizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// I/O error while reading or writing a container
    #[error("Container I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ScatterError
pub type Result<T> = std::result::Result<T, ScatterError>;

/// Result type alias for ConfigError
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for ContainerError
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;
