//! Core value types shared by ingestion, storage and detection

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Person attached to a commit (author or committer)
///
/// Field order mirrors the persisted document so unaffected entries
/// serialize back byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Identity {
    /// Create an identity with only a display name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            email: None,
            name: name.into(),
            username: None,
        }
    }
}

/// The code revision a benchmark run was executed against
///
/// Supplied by the CI environment and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub author: Identity,
    pub committer: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct: Option<bool>,
    /// Content hash of the revision
    pub id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_id: Option<String>,
    pub url: String,
}

impl Commit {
    /// Abbreviated commit id for log lines and reports
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(7)
            .map(|(idx, _)| idx)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }

    /// Best-effort repository URL derived from the commit URL
    pub fn repo_url(&self) -> Option<&str> {
        ["/commit/", "/pull/", "/commits/"]
            .iter()
            .filter_map(|marker| self.url.find(marker))
            .min()
            .map(|idx| &self.url[..idx])
    }
}

/// A single named metric produced by one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub name: String,
    pub value: f64,
    /// Noise of `value` (standard deviation or interval half-width), never negative
    pub range: f64,
    pub unit: String,
    /// Free-form tool output kept alongside the metric
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl Measurement {
    pub fn new(name: impl Into<String>, value: f64, range: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            range,
            unit: unit.into(),
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }
}

/// One run's output for one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementBatch {
    /// Harness that produced the numbers (`cargo`, `go`, ...)
    pub tool: String,
    /// Key under which the run is filed in the history document
    pub suite: String,
    pub commit: Commit,
    /// Wall-clock time of the run in epoch milliseconds
    pub date: i64,
    pub measurements: Vec<Measurement>,
}

impl MeasurementBatch {
    /// Create a batch filed under its own tool name
    pub fn new(tool: impl Into<String>, commit: Commit, date: i64) -> Self {
        let tool = tool.into();
        Self {
            suite: tool.clone(),
            tool,
            commit,
            date,
            measurements: Vec::new(),
        }
    }

    /// File the batch under a different suite name
    pub fn with_suite(mut self, suite: impl Into<String>) -> Self {
        self.suite = suite.into();
        self
    }

    pub fn measurement(&self, name: &str) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.name == name)
    }
}

/// Which way a metric should move to count as an improvement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Durations, latencies, bytes
    #[default]
    #[serde(alias = "smaller")]
    Lower,
    /// Throughput, operations per second
    #[serde(alias = "bigger")]
    Higher,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Lower => write!(f, "lower"),
            Direction::Higher => write!(f, "higher"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lower" | "smaller" => Ok(Direction::Lower),
            "higher" | "bigger" => Ok(Direction::Higher),
            other => Err(format!("unknown direction '{}', expected lower or higher", other)),
        }
    }
}
