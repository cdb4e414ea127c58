//! Normalization of benchmark tool output into measurement batches
//!
//! Every supported harness gets an adapter implementing [`BenchmarkParser`].
//! Adapters only extract name/value/range/unit tuples; [`parse`] applies the
//! shared validation rules so all tools are held to the same contract.

mod cargo;
mod custom;
mod go;
mod pytest;

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::ParseError;
use crate::models::{Commit, Direction, Measurement, MeasurementBatch};

pub use cargo::CargoParser;
pub use custom::CustomJsonParser;
pub use go::GoParser;
pub use pytest::PytestParser;

/// Capability shared by all tool adapters
pub trait BenchmarkParser: Send + Sync {
    /// Tool identifier as passed on the command line
    fn tool(&self) -> &str;

    /// Direction assumed for metrics of this tool unless configured otherwise
    fn default_direction(&self) -> Direction {
        Direction::Lower
    }

    /// Extract raw measurements; validation happens in [`parse`]
    fn parse_measurements(&self, raw: &str) -> Result<Vec<Measurement>, ParseError>;
}

/// Lookup table from tool name to adapter
pub struct ParserRegistry {
    parsers: HashMap<String, Box<dyn BenchmarkParser>>,
}

impl ParserRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Register an adapter, replacing any adapter with the same tool name
    pub fn register(&mut self, parser: Box<dyn BenchmarkParser>) {
        self.parsers.insert(parser.tool().to_string(), parser);
    }

    pub fn get(&self, tool: &str) -> Option<&dyn BenchmarkParser> {
        self.parsers.get(tool).map(|p| p.as_ref())
    }

    /// Registered tool names, sorted
    pub fn tools(&self) -> Vec<&str> {
        let mut tools: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        tools.sort_unstable();
        tools
    }

    /// Parse one run's output into a batch
    pub fn parse(
        &self,
        tool: &str,
        raw: &[u8],
        commit: Commit,
        date: i64,
    ) -> Result<MeasurementBatch, ParseError> {
        let parser = self
            .get(tool)
            .ok_or_else(|| ParseError::UnknownTool(tool.to_string()))?;
        parse_with(parser, raw, commit, date)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(CargoParser));
        registry.register(Box::new(GoParser));
        registry.register(Box::new(PytestParser));
        registry.register(Box::new(CustomJsonParser::smaller_is_better()));
        registry.register(Box::new(CustomJsonParser::bigger_is_better()));
        registry
    }
}

/// Parse output of a built-in tool
pub fn parse(
    tool: &str,
    raw: &[u8],
    commit: Commit,
    date: i64,
) -> Result<MeasurementBatch, ParseError> {
    ParserRegistry::default().parse(tool, raw, commit, date)
}

/// Parse with a specific adapter and enforce the measurement contract
pub fn parse_with(
    parser: &dyn BenchmarkParser,
    raw: &[u8],
    commit: Commit,
    date: i64,
) -> Result<MeasurementBatch, ParseError> {
    let tool = parser.tool();
    let text = std::str::from_utf8(raw)
        .map_err(|e| ParseError::malformed(tool, format!("output is not UTF-8: {}", e)))?;

    let measurements = parser.parse_measurements(text)?;
    if measurements.is_empty() {
        return Err(ParseError::malformed(tool, "no benchmark results found"));
    }

    let mut seen = HashSet::new();
    for m in &measurements {
        validate(tool, m)?;
        if !seen.insert(m.name.as_str()) {
            return Err(ParseError::malformed(
                tool,
                format!("benchmark '{}' reported more than once", m.name),
            ));
        }
    }

    debug!(tool, count = measurements.len(), commit = %commit.short_id(), "Parsed benchmark output");

    let mut batch = MeasurementBatch::new(tool, commit, date);
    batch.measurements = measurements;
    Ok(batch)
}

fn validate(tool: &str, m: &Measurement) -> Result<(), ParseError> {
    if m.name.trim().is_empty() {
        return Err(ParseError::malformed(tool, "benchmark with empty name"));
    }
    if !m.value.is_finite() || !m.range.is_finite() {
        return Err(ParseError::non_finite(tool, &m.name));
    }
    if m.range < 0.0 {
        return Err(ParseError::malformed(
            tool,
            format!("negative range for benchmark '{}'", m.name),
        ));
    }
    if m.unit.trim().is_empty() {
        return Err(ParseError::malformed(
            tool,
            format!("missing unit for benchmark '{}'", m.name),
        ));
    }
    Ok(())
}

/// Parse a number as printed by benchmark harnesses (`1,234.5`)
pub(crate) fn parse_number(tool: &str, name: &str, text: &str) -> Result<f64, ParseError> {
    let cleaned: String = text.chars().filter(|c| *c != ',' && *c != '_').collect();
    let value: f64 = cleaned.trim().parse().map_err(|_| {
        ParseError::malformed(tool, format!("invalid number '{}' for benchmark '{}'", text, name))
    })?;
    if !value.is_finite() {
        return Err(ParseError::non_finite(tool, name));
    }
    Ok(value)
}

static RANGE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<num>[0-9][0-9,_]*(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?)\s*(?P<pct>%)?")
        .expect("valid range regex")
});

/// Numeric error range from its display form (`± 802`, `+/- 3.1`, `stddev: 0.2`, `± 1.5%`)
///
/// Percentages are resolved against `value`. Returns `None` when no number
/// can be found.
pub fn parse_range_text(text: &str, value: f64) -> Option<f64> {
    let caps = RANGE_NUMBER.captures(text)?;
    let cleaned: String = caps["num"].chars().filter(|c| *c != ',' && *c != '_').collect();
    let number: f64 = cleaned.parse().ok()?;
    let range = if caps.name("pct").is_some() {
        value.abs() * number / 100.0
    } else {
        number
    };
    range.is_finite().then_some(range)
}

/// Display form used when persisting a numeric range
pub fn format_range(range: f64) -> String {
    format!("± {}", crate::history::wire::format_number(range))
}
