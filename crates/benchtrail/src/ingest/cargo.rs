//! `cargo bench` output (libtest and criterion's bencher format)

use once_cell::sync::Lazy;
use regex::Regex;

use super::{parse_number, BenchmarkParser};
use crate::error::ParseError;
use crate::models::Measurement;

static BENCH_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^test\s+(?P<name>.+?)\s+\.\.\.\s+bench:\s+(?P<value>\S+)\s+(?P<unit>\S+)\s+\(\+/-\s*(?P<range>[^)]+?)\s*\)",
    )
    .expect("valid cargo bench regex")
});

/// Adapter for `test <name> ... bench: <value> <unit> (+/- <range>)` lines
#[derive(Debug, Clone, Copy, Default)]
pub struct CargoParser;

impl BenchmarkParser for CargoParser {
    fn tool(&self) -> &str {
        "cargo"
    }

    fn parse_measurements(&self, raw: &str) -> Result<Vec<Measurement>, ParseError> {
        let mut measurements = Vec::new();

        for line in raw.lines() {
            let line = line.trim();
            if !line.starts_with("test ") || !line.contains("bench:") {
                continue;
            }
            let caps = BENCH_LINE.captures(line).ok_or_else(|| {
                ParseError::malformed(self.tool(), format!("unrecognized bench line: {}", line))
            })?;

            let name = caps["name"].trim();
            let value = parse_number(self.tool(), name, &caps["value"])?;
            let range = parse_number(self.tool(), name, &caps["range"])?;
            measurements.push(Measurement::new(name, value, range, &caps["unit"]));
        }

        Ok(measurements)
    }
}
