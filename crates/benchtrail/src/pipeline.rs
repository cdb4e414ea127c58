//! One ingest invocation: parse, evaluate, append, persist, emit
//!
//! Parsing happens once. The load, evaluate, append and persist cycle is
//! repeated on revision conflicts, bounded by the retry policy's attempt
//! count; each attempt evaluates against the freshest document so the report
//! reflects what was actually persisted.

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::detector::{RegressionDetector, RegressionReport};
use crate::emitter::{emit, EmitConfig, EmitOutcome, SummarySink};
use crate::error::{AppendError, ParseError, PersistError, PipelineError, PipelineResult};
use crate::history::{DocumentCodec, HistoryStore, RevisionToken, StorageBackend};
use crate::ingest::{parse_with, ParserRegistry};
use crate::models::Commit;
use crate::retry::RetryPolicy;

/// Input of one pipeline run
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub tool: String,
    pub raw: Vec<u8>,
    pub commit: Commit,
    /// Run date in epoch milliseconds
    pub date: i64,
    /// Suite the run is filed under; the tool name when unset
    pub suite: Option<String>,
    /// Repository URL recorded in the document, replacing any stored one
    pub repo_url: Option<String>,
}

/// What a completed run did
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub outcome: EmitOutcome,
    pub report: RegressionReport,
    /// False when the commit was already recorded
    pub appended: bool,
    pub attempts: u32,
    /// Revision after the write, if one happened
    pub token: Option<RevisionToken>,
}

/// Ingestion pipeline bound to one store
pub struct Pipeline<B> {
    store: HistoryStore<B>,
    registry: ParserRegistry,
    settings: Settings,
    sinks: Vec<Box<dyn SummarySink>>,
}

impl<B: StorageBackend> Pipeline<B> {
    pub fn new(backend: B, settings: Settings) -> Self {
        let store = HistoryStore::new(backend)
            .with_codec(DocumentCodec::new(settings.store.global_name.clone()))
            .with_max_items(settings.store.max_items);
        Self {
            store,
            registry: ParserRegistry::default(),
            settings,
            sinks: Vec::new(),
        }
    }

    pub fn with_registry(mut self, registry: ParserRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn SummarySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn store(&self) -> &HistoryStore<B> {
        &self.store
    }

    pub fn emit_config(&self) -> &EmitConfig {
        &self.settings.emit
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.settings.retry
    }

    pub async fn run(&self, request: IngestRequest) -> PipelineResult<IngestOutcome> {
        let parser = self
            .registry
            .get(&request.tool)
            .ok_or_else(|| ParseError::UnknownTool(request.tool.clone()))?;

        let mut batch = parse_with(parser, &request.raw, request.commit, request.date)?;
        if let Some(suite) = request.suite {
            batch = batch.with_suite(suite);
        }

        let mut regression = self.settings.regression.clone();
        if regression.default_direction.is_none() {
            regression.default_direction = Some(parser.default_direction());
        }
        let detector = RegressionDetector::new(regression);

        let retry = &self.settings.retry;
        let mut attempt = 0;
        let (report, appended, token) = loop {
            attempt += 1;
            debug!(attempt, commit = %batch.commit.short_id(), "Starting ingest attempt");

            let (mut doc, expected) = self.store.load().await?;
            if let Some(url) = &request.repo_url {
                doc.repo_url = url.clone();
            }

            let report = detector.evaluate(&batch, &doc);

            match self.store.append(&mut doc, batch.clone()) {
                Ok(_) => {}
                Err(AppendError::DuplicateCommit { suite, commit }) => {
                    info!(suite = %suite, commit = %commit, "Commit already recorded, nothing to persist");
                    break (report, false, None);
                }
                Err(e) => return Err(e.into()),
            }

            match self.store.persist(&doc, &expected).await {
                Ok(token) => break (report, true, Some(token)),
                Err(PersistError::Conflict(conflict)) => {
                    if !retry.should_retry(attempt) {
                        return Err(PipelineError::ConflictExhausted {
                            attempts: attempt,
                            last: conflict,
                        });
                    }
                    warn!(
                        attempt,
                        max_attempts = retry.max_attempts,
                        expected = %conflict.expected,
                        actual = %conflict.actual,
                        "History changed while ingesting, retrying"
                    );
                    retry.sleep(attempt).await;
                }
                Err(PersistError::Storage(e)) => return Err(e.into()),
            }
        };

        let outcome = emit(&report, &self.settings.emit);
        info!(
            suite = %report.suite,
            commit = %batch.commit.short_id(),
            attempts = attempt,
            outcome = %outcome,
            "Ingest finished"
        );

        for sink in &self.sinks {
            if let Err(e) = sink.publish(&outcome, &report).await {
                warn!(sink = sink.name(), error = %e, "Failed to publish summary");
            }
        }

        Ok(IngestOutcome {
            outcome,
            report,
            appended,
            attempts: attempt,
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Verdict;
    use crate::history::MemoryBackend;
    use crate::models::fixtures;

    fn cargo_output(value: u64) -> Vec<u8> {
        format!(
            "running 1 test\ntest parse ... bench: {} ns/iter (+/- 10)\n\ntest result: ok.\n",
            value
        )
        .into_bytes()
    }

    fn request(commit: &str, date: i64, value: u64) -> IngestRequest {
        IngestRequest {
            tool: "cargo".to_string(),
            raw: cargo_output(value),
            commit: fixtures::commit(commit),
            date,
            suite: None,
            repo_url: None,
        }
    }

    fn quick_settings() -> Settings {
        let mut settings = Settings::default();
        settings.retry = RetryPolicy::immediate(3);
        settings
    }

    #[tokio::test]
    async fn test_first_run_creates_history() {
        let backend = MemoryBackend::new();
        let pipeline = Pipeline::new(backend.clone(), quick_settings());

        let result = pipeline.run(request("a1", 1000, 500)).await.unwrap();
        assert!(result.appended);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.outcome, EmitOutcome::Pass);
        assert_eq!(result.report.evaluations[0].verdict, Verdict::NewBenchmark);

        let content = String::from_utf8(backend.content().unwrap()).unwrap();
        assert!(content.starts_with("window.BENCHMARK_DATA = {"));
        assert!(content.contains("\"repoUrl\": \"https://github.com/acme/widgets\""));
    }

    #[tokio::test]
    async fn test_duplicate_commit_is_noop() {
        let backend = MemoryBackend::new();
        let pipeline = Pipeline::new(backend.clone(), quick_settings());

        pipeline.run(request("a1", 1000, 500)).await.unwrap();
        let before = backend.content();

        let result = pipeline.run(request("a1", 2000, 500)).await.unwrap();
        assert!(!result.appended);
        assert!(result.token.is_none());
        assert_eq!(backend.content(), before);
    }

    #[tokio::test]
    async fn test_out_of_order_is_fatal() {
        let pipeline = Pipeline::new(MemoryBackend::new(), quick_settings());
        pipeline.run(request("a1", 2000, 500)).await.unwrap();

        let err = pipeline.run(request("a2", 1000, 500)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Append(AppendError::OutOfOrder { .. })));
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_parse_failure_writes_nothing() {
        let backend = MemoryBackend::new();
        let pipeline = Pipeline::new(backend.clone(), quick_settings());
        let mut req = request("a1", 1000, 500);
        req.raw = b"no benchmarks here".to_vec();

        let err = pipeline.run(req).await.unwrap_err();
        assert!(matches!(err, PipelineError::Parse(ParseError::Malformed { .. })));
        assert!(backend.content().is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let pipeline = Pipeline::new(MemoryBackend::new(), quick_settings());
        let mut req = request("a1", 1000, 500);
        req.tool = "jmh".to_string();
        let err = pipeline.run(req).await.unwrap_err();
        assert!(matches!(err, PipelineError::Parse(ParseError::UnknownTool(_))));
    }

    #[tokio::test]
    async fn test_regression_fails_when_configured() {
        let mut settings = quick_settings();
        settings.emit.fail_on_any_regression = true;
        let pipeline = Pipeline::new(MemoryBackend::new(), settings);

        for (i, value) in [7000, 7100, 6900, 7050, 6950].iter().enumerate() {
            let id = format!("c{}", i);
            pipeline
                .run(request(&id, (i as i64 + 1) * 1000, *value))
                .await
                .unwrap();
        }

        let result = pipeline.run(request("c9", 10_000, 9000)).await.unwrap();
        assert!(result.appended);
        assert_eq!(result.outcome, EmitOutcome::Fail(vec!["parse".to_string()]));
    }

    #[tokio::test]
    async fn test_suite_and_repo_url_overrides() {
        let backend = MemoryBackend::new();
        let pipeline = Pipeline::new(backend.clone(), quick_settings());
        let mut req = request("a1", 1000, 500);
        req.suite = Some("Rust Benchmark".to_string());
        req.repo_url = Some("https://example.com/repo".to_string());

        let result = pipeline.run(req).await.unwrap();
        assert_eq!(result.report.suite, "Rust Benchmark");

        let (doc, _) = pipeline.store().load().await.unwrap();
        assert_eq!(doc.repo_url, "https://example.com/repo");
        assert_eq!(doc.runs("Rust Benchmark").len(), 1);
        assert_eq!(doc.runs("Rust Benchmark")[0].tool, "cargo");

        // A later run with a different URL replaces it; one without leaves it
        let mut req = request("a2", 2000, 500);
        req.repo_url = Some("https://example.com/moved".to_string());
        pipeline.run(req).await.unwrap();
        pipeline.run(request("a3", 3000, 500)).await.unwrap();

        let (doc, _) = pipeline.store().load().await.unwrap();
        assert_eq!(doc.repo_url, "https://example.com/moved");
    }
}
