//! Destinations for the rendered summary

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{render_console, render_markdown, EmitOutcome, OutputStyle};
use crate::detector::RegressionReport;
use crate::error::{StorageError, StorageResult};

/// Receives the outcome of a run together with its report
#[async_trait]
pub trait SummarySink: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, outcome: &EmitOutcome, report: &RegressionReport) -> StorageResult<()>;
}

/// Prints the console rendering to stdout
#[derive(Debug, Clone, Default)]
pub struct StdoutSink {
    style: OutputStyle,
}

impl StdoutSink {
    pub fn new(style: OutputStyle) -> Self {
        Self { style }
    }
}

#[async_trait]
impl SummarySink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn publish(&self, outcome: &EmitOutcome, report: &RegressionReport) -> StorageResult<()> {
        println!("{}", render_console(report, outcome, &self.style));
        Ok(())
    }
}

/// Appends the markdown rendering to a file, e.g. `$GITHUB_STEP_SUMMARY`
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SummarySink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn publish(&self, outcome: &EmitOutcome, report: &RegressionReport) -> StorageResult<()> {
        let mut content = render_markdown(report, outcome);
        content.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;
        Ok(())
    }
}
