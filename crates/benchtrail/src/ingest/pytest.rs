//! pytest-benchmark JSON reports (`--benchmark-json`)

use serde::Deserialize;

use super::BenchmarkParser;
use crate::error::ParseError;
use crate::models::{Direction, Measurement};

#[derive(Debug, Deserialize)]
struct Report {
    benchmarks: Vec<Bench>,
}

#[derive(Debug, Deserialize)]
struct Bench {
    #[serde(default)]
    fullname: Option<String>,
    name: String,
    stats: Stats,
}

#[derive(Debug, Deserialize)]
struct Stats {
    mean: f64,
    stddev: f64,
    ops: f64,
    #[serde(default)]
    rounds: Option<u64>,
}

/// Adapter reporting operations per second for each pytest benchmark
///
/// The range is the timing standard deviation propagated onto the ops
/// figure (`ops * stddev / mean`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PytestParser;

impl BenchmarkParser for PytestParser {
    fn tool(&self) -> &str {
        "pytest"
    }

    fn default_direction(&self) -> Direction {
        Direction::Higher
    }

    fn parse_measurements(&self, raw: &str) -> Result<Vec<Measurement>, ParseError> {
        let report: Report = serde_json::from_str(raw)
            .map_err(|e| ParseError::malformed(self.tool(), e.to_string()))?;

        report
            .benchmarks
            .into_iter()
            .map(|bench| {
                let name = bench.fullname.unwrap_or(bench.name);
                let stats = bench.stats;
                if !stats.ops.is_finite() || !stats.mean.is_finite() || !stats.stddev.is_finite() {
                    return Err(ParseError::non_finite(self.tool(), &name));
                }
                let range = if stats.mean > 0.0 {
                    stats.ops * stats.stddev / stats.mean
                } else {
                    0.0
                };
                let mut extra = format!("mean: {} sec", stats.mean);
                if let Some(rounds) = stats.rounds {
                    extra.push_str(&format!("\nrounds: {}", rounds));
                }
                Ok(Measurement::new(name, stats.ops, range, "iter/sec").with_extra(extra))
            })
            .collect()
    }
}
