//! Continuous benchmark history and regression detection
//!
//! benchtrail folds each CI benchmark run into a long-lived history document
//! and tells whether the new numbers regressed:
//! - Tool adapters turning `cargo bench`, `go test -bench`, pytest-benchmark
//!   and custom JSON output into measurement batches
//! - A history document stored as `window.BENCHMARK_DATA = {...}`, readable
//!   by existing chart dashboards
//! - Optimistic concurrency on persist, so racing CI jobs never lose a run
//! - Z-score (or ratio) regression detection against a trailing window
//! - Console and markdown summaries with CI-friendly exit codes

pub mod cli;
pub mod config;
pub mod detector;
pub mod emitter;
pub mod error;
pub mod history;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod retry;

pub use config::{Settings, StoreConfig};
pub use detector::{
    evaluate, Evaluation, Method, RegressionConfig, RegressionDetector, RegressionModel,
    RegressionReport, Verdict,
};
pub use emitter::{emit, EmitConfig, EmitOutcome, SummarySink};
pub use error::{
    AppendError, ConfigError, ConflictError, ParseError, PersistError, PipelineError,
    PipelineResult, StorageError,
};
pub use history::{
    BenchmarkSeries, FileBackend, HistoryDocument, HistoryStore, MemoryBackend, RevisionToken,
    StorageBackend,
};
pub use ingest::{parse, BenchmarkParser, ParserRegistry};
pub use models::{Commit, Direction, Identity, Measurement, MeasurementBatch};
pub use pipeline::{IngestOutcome, IngestRequest, Pipeline};
pub use retry::RetryPolicy;
