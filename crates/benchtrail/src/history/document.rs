//! The persisted history aggregate and views derived from it

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::wire;
use crate::error::AppendError;
use crate::ingest::{format_range, parse_range_text};
use crate::models::{Commit, Measurement, MeasurementBatch};

/// One measurement as stored in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchRecord {
    pub name: String,
    #[serde(with = "wire::number")]
    pub value: f64,
    /// Display form of the error range (`± 802`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl BenchRecord {
    /// Numeric error range, zero when absent or unreadable
    pub fn range_value(&self) -> f64 {
        self.range
            .as_deref()
            .and_then(|text| parse_range_text(text, self.value))
            .unwrap_or(0.0)
    }
}

impl From<Measurement> for BenchRecord {
    fn from(m: Measurement) -> Self {
        Self {
            name: m.name,
            value: m.value,
            range: Some(format_range(m.range)),
            unit: m.unit,
            extra: m.extra,
        }
    }
}

/// The stored record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    pub commit: Commit,
    pub date: i64,
    pub tool: String,
    pub benches: Vec<BenchRecord>,
}

impl RunEntry {
    pub fn bench(&self, name: &str) -> Option<&BenchRecord> {
        self.benches.iter().find(|b| b.name == name)
    }
}

impl From<MeasurementBatch> for RunEntry {
    fn from(batch: MeasurementBatch) -> Self {
        Self {
            commit: batch.commit,
            date: batch.date,
            tool: batch.tool,
            benches: batch.measurements.into_iter().map(BenchRecord::from).collect(),
        }
    }
}

/// Root of the persisted history: suite name to runs, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDocument {
    /// Epoch milliseconds of the last successful append
    pub last_update: i64,
    pub repo_url: String,
    pub entries: IndexMap<String, Vec<RunEntry>>,
}

/// One point of a benchmark series
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint<'a> {
    pub commit: &'a Commit,
    pub date: i64,
    pub value: f64,
    pub range: f64,
    pub unit: &'a str,
}

/// Ordered history of one benchmark within one suite
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkSeries<'a> {
    pub suite: &'a str,
    pub name: &'a str,
    pub points: Vec<SeriesPoint<'a>>,
}

impl<'a> BenchmarkSeries<'a> {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn last(&self) -> Option<&SeriesPoint<'a>> {
        self.points.last()
    }
}

/// A unit differing from the one previously recorded for a benchmark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitChange {
    pub name: String,
    pub previous: String,
    pub current: String,
}

/// What a successful append did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReceipt {
    pub suite: String,
    /// Number of runs recorded for the suite after the append
    pub runs: usize,
    pub unit_changes: Vec<UnitChange>,
}

/// Invariant violation found in a stored document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// Run at `index` is not strictly newer than its predecessor
    OutOfOrder { suite: String, index: usize },
    DuplicateCommit { suite: String, commit: String },
    UnitChanged {
        suite: String,
        bench: String,
        previous: String,
        current: String,
        commit: String,
    },
}

impl Finding {
    /// Unit changes are surfaced but do not make a document invalid
    pub fn is_violation(&self) -> bool {
        !matches!(self, Finding::UnitChanged { .. })
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Finding::OutOfOrder { suite, index } => {
                write!(f, "{}: run #{} is not newer than the run before it", suite, index)
            }
            Finding::DuplicateCommit { suite, commit } => {
                write!(f, "{}: commit {} recorded more than once", suite, commit)
            }
            Finding::UnitChanged {
                suite,
                bench,
                previous,
                current,
                commit,
            } => write!(
                f,
                "{}: '{}' changed unit from {} to {} at {}",
                suite, bench, previous, current, commit
            ),
        }
    }
}

impl HistoryDocument {
    /// Create the document for the very first run
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            last_update: 0,
            repo_url: repo_url.into(),
            entries: IndexMap::new(),
        }
    }

    pub fn runs(&self, suite: &str) -> &[RunEntry] {
        self.entries.get(suite).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_commit(&self, suite: &str, commit_id: &str) -> bool {
        self.runs(suite).iter().any(|run| run.commit.id == commit_id)
    }

    /// Project the series of one benchmark, optionally leaving out one commit
    pub fn series<'a>(
        &'a self,
        suite: &'a str,
        name: &'a str,
        exclude_commit: Option<&str>,
    ) -> BenchmarkSeries<'a> {
        let points = self
            .runs(suite)
            .iter()
            .filter(|run| exclude_commit != Some(run.commit.id.as_str()))
            .filter_map(|run| {
                run.bench(name).map(|bench| SeriesPoint {
                    commit: &run.commit,
                    date: run.date,
                    value: bench.value,
                    range: bench.range_value(),
                    unit: bench.unit.as_str(),
                })
            })
            .collect();

        BenchmarkSeries {
            suite,
            name,
            points,
        }
    }

    /// Names of every benchmark recorded for a suite, in first-seen order
    pub fn bench_names(&self, suite: &str) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for run in self.runs(suite) {
            for bench in &run.benches {
                if !names.contains(&bench.name.as_str()) {
                    names.push(bench.name.as_str());
                }
            }
        }
        names
    }

    /// Record a run at the end of its suite
    ///
    /// A commit already present for the suite is rejected with
    /// [`AppendError::DuplicateCommit`] and leaves the document untouched.
    pub fn append(&mut self, batch: MeasurementBatch) -> Result<AppendReceipt, AppendError> {
        let suite = batch.suite.clone();
        let runs = self.runs(&suite);

        if runs.iter().any(|run| run.commit.id == batch.commit.id) {
            return Err(AppendError::DuplicateCommit {
                suite,
                commit: batch.commit.id,
            });
        }
        if let Some(last) = runs.last() {
            if batch.date <= last.date {
                return Err(AppendError::OutOfOrder {
                    suite,
                    date: batch.date,
                    last_date: last.date,
                });
            }
        }

        let unit_changes = batch
            .measurements
            .iter()
            .filter_map(|m| {
                let previous = runs.iter().rev().find_map(|run| run.bench(&m.name))?;
                (previous.unit != m.unit).then(|| UnitChange {
                    name: m.name.clone(),
                    previous: previous.unit.clone(),
                    current: m.unit.clone(),
                })
            })
            .collect();

        if self.repo_url.is_empty() {
            if let Some(url) = batch.commit.repo_url() {
                self.repo_url = url.to_string();
            }
        }

        let runs = self.entries.entry(suite.clone()).or_default();
        runs.push(RunEntry::from(batch));

        Ok(AppendReceipt {
            suite,
            runs: runs.len(),
            unit_changes,
        })
    }

    /// Keep only the newest `max_items` runs of a suite; returns how many were dropped
    pub fn truncate(&mut self, suite: &str, max_items: usize) -> usize {
        match self.entries.get_mut(suite) {
            Some(runs) if runs.len() > max_items => {
                let dropped = runs.len() - max_items;
                runs.drain(..dropped);
                dropped
            }
            _ => 0,
        }
    }

    /// Scan every suite for ordering, uniqueness and unit stability problems
    pub fn check(&self) -> Vec<Finding> {
        let mut findings = Vec::new();

        for (suite, runs) in &self.entries {
            let mut seen = std::collections::HashSet::new();
            let mut units: std::collections::HashMap<&str, &str> = std::collections::HashMap::new();

            for (index, run) in runs.iter().enumerate() {
                if index > 0 && run.date <= runs[index - 1].date {
                    findings.push(Finding::OutOfOrder {
                        suite: suite.clone(),
                        index,
                    });
                }
                if !seen.insert(run.commit.id.as_str()) {
                    findings.push(Finding::DuplicateCommit {
                        suite: suite.clone(),
                        commit: run.commit.id.clone(),
                    });
                }
                for bench in &run.benches {
                    if let Some(previous) = units.insert(bench.name.as_str(), bench.unit.as_str()) {
                        if previous != bench.unit {
                            findings.push(Finding::UnitChanged {
                                suite: suite.clone(),
                                bench: bench.name.clone(),
                                previous: previous.to_string(),
                                current: bench.unit.clone(),
                                commit: run.commit.id.clone(),
                            });
                        }
                    }
                }
            }
        }

        findings
    }
}

impl Default for HistoryDocument {
    fn default() -> Self {
        Self::new(String::new())
    }
}
