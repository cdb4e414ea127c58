//! Command-line interface

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;

use crate::config::Settings;
use crate::detector::Method;
use crate::emitter::{FileSink, OutputStyle, StdoutSink};
use crate::error::{PipelineError, PipelineResult};
use crate::history::{DocumentCodec, FileBackend, HistoryStore};
use crate::logging::{init_logging, VerbosityLevel};
use crate::models::{Commit, Direction};
use crate::pipeline::{IngestRequest, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "benchtrail")]
#[command(about = "Continuous benchmark history with regression alerts")]
#[command(version)]
pub struct Cli {
    /// More log output on stderr (repeat for debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (toml, yaml or json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record one benchmark run and check it for regressions
    Ingest(IngestArgs),

    /// Print the history of one benchmark
    Series {
        /// History document
        #[arg(long)]
        store: PathBuf,

        /// Suite the benchmark is filed under
        #[arg(long)]
        name: String,

        /// Benchmark name
        #[arg(long)]
        bench: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Validate the invariants of a history document
    Check {
        /// History document
        #[arg(long)]
        store: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Benchmark tool that produced the output (cargo, go, pytest, ...)
    #[arg(long)]
    pub tool: String,

    /// Raw tool output
    #[arg(long)]
    pub input: PathBuf,

    /// Commit metadata as JSON
    #[arg(long)]
    pub commit_json: PathBuf,

    /// History document to update
    #[arg(long)]
    pub store: PathBuf,

    /// Suite name (defaults to the tool name)
    #[arg(long)]
    pub name: Option<String>,

    /// Run date in epoch milliseconds (defaults to now)
    #[arg(long)]
    pub date: Option<i64>,

    /// Repository URL recorded in the document
    #[arg(long)]
    pub repo_url: Option<String>,

    /// Significance threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Baseline window size
    #[arg(long)]
    pub window: Option<usize>,

    /// Regression model (zscore or ratio)
    #[arg(long)]
    pub method: Option<Method>,

    /// Benchmarks whose regression fails the run
    #[arg(long, value_delimiter = ',', conflicts_with = "fail_on_any_regression")]
    pub fail_on: Vec<String>,

    /// Fail on any regression
    #[arg(long)]
    pub fail_on_any_regression: bool,

    /// Per-benchmark direction, e.g. `throughput=higher,latency=lower`
    #[arg(long, value_delimiter = ',', value_parser = parse_direction)]
    pub direction: Vec<(String, Direction)>,

    /// Keep only the newest runs per suite
    #[arg(long)]
    pub max_items: Option<usize>,

    /// Append a markdown summary to this file
    #[arg(long)]
    pub summary_file: Option<PathBuf>,

    /// Persist attempts before giving up on conflicts
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

fn parse_direction(s: &str) -> Result<(String, Direction), String> {
    let (name, direction) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected <name>=lower|higher, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing benchmark name in '{}'", s));
    }
    Ok((name.to_string(), direction.parse()?))
}

impl IngestArgs {
    /// Layer the flags on top of file and environment settings
    pub fn apply(&self, settings: &mut Settings) {
        let regression = &mut settings.regression;
        if let Some(threshold) = self.threshold {
            regression.threshold = threshold;
        }
        if let Some(window) = self.window {
            regression.window_size = window;
        }
        if let Some(method) = self.method {
            regression.method = method;
        }
        for (name, direction) in &self.direction {
            regression.directions.insert(name.clone(), *direction);
        }

        if !self.fail_on.is_empty() {
            settings.emit.fail_on = Some(self.fail_on.iter().cloned().collect());
        }
        if self.fail_on_any_regression {
            settings.emit.fail_on_any_regression = true;
        }
        if let Some(max_items) = self.max_items {
            settings.store.max_items = Some(max_items);
        }
        if let Some(max_attempts) = self.max_attempts {
            settings.retry.max_attempts = max_attempts;
        }
    }
}

async fn read_input(path: &Path) -> PipelineResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|source| PipelineError::Input {
            path: path.to_path_buf(),
            source,
        })
}

async fn read_commit(path: &Path) -> PipelineResult<Commit> {
    let raw = read_input(path).await?;
    serde_json::from_slice(&raw).map_err(|source| PipelineError::CommitMetadata {
        path: path.to_path_buf(),
        source,
    })
}

/// Run the CLI and return the process exit code
pub async fn run_cli(cli: Cli) -> PipelineResult<i32> {
    init_logging(VerbosityLevel::from_flags(cli.verbose, cli.quiet));

    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest(args) => {
            args.apply(&mut settings);
            settings.validate()?;

            let raw = read_input(&args.input).await?;
            let commit = read_commit(&args.commit_json).await?;
            let date = args.date.unwrap_or_else(|| Utc::now().timestamp_millis());

            let mut pipeline = Pipeline::new(FileBackend::new(&args.store), settings)
                .with_sink(Box::new(StdoutSink::new(OutputStyle::default())));
            if let Some(path) = &args.summary_file {
                pipeline = pipeline.with_sink(Box::new(FileSink::new(path)));
            }

            let result = pipeline
                .run(IngestRequest {
                    tool: args.tool,
                    raw,
                    commit,
                    date,
                    suite: args.name,
                    repo_url: args.repo_url,
                })
                .await?;
            Ok(result.outcome.exit_code())
        }

        Commands::Series {
            store,
            name,
            bench,
            json,
        } => {
            let store = open_store(&store, &settings);
            let (doc, _) = store.load().await?;
            let series = doc.series(&name, &bench, None);

            if json {
                let points: Vec<serde_json::Value> = series
                    .points
                    .iter()
                    .map(|p| {
                        serde_json::json!({
                            "commit": p.commit.id,
                            "date": p.date,
                            "value": p.value,
                            "range": p.range,
                            "unit": p.unit,
                        })
                    })
                    .collect();
                let text = serde_json::to_string_pretty(&points)
                    .map_err(crate::error::StorageError::from)?;
                println!("{}", text);
            } else if series.is_empty() {
                println!("No history for '{}' in '{}'", bench, name);
            } else {
                for p in &series.points {
                    println!(
                        "{}  {}  {} ± {} {}",
                        p.date,
                        p.commit.short_id(),
                        crate::history::wire::format_number(p.value),
                        crate::history::wire::format_number(p.range),
                        p.unit
                    );
                }
            }
            Ok(0)
        }

        Commands::Check { store } => {
            let store = open_store(&store, &settings);
            let (doc, _) = store.load().await?;
            let findings = doc.check();
            let style = OutputStyle::default();

            let mut violations = 0;
            for finding in &findings {
                if finding.is_violation() {
                    violations += 1;
                    println!("{}", style.error(&finding.to_string()));
                } else {
                    println!("{}", style.warning(&finding.to_string()));
                }
            }
            let runs: usize = doc.entries.values().map(Vec::len).sum();
            info!(suites = doc.entries.len(), runs, findings = findings.len(), "Checked history");

            if violations == 0 {
                println!(
                    "{}",
                    style.success(&format!(
                        "{} suites, {} runs, no violations",
                        doc.entries.len(),
                        runs
                    ))
                );
                Ok(0)
            } else {
                Ok(1)
            }
        }
    }
}

fn open_store(path: &Path, settings: &Settings) -> HistoryStore<FileBackend> {
    HistoryStore::new(FileBackend::new(path))
        .with_codec(DocumentCodec::new(settings.store.global_name.clone()))
}
