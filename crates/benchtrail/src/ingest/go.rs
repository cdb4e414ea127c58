//! `go test -bench` output

use once_cell::sync::Lazy;
use regex::Regex;

use super::{parse_number, BenchmarkParser};
use crate::error::ParseError;
use crate::models::Measurement;

static BENCH_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>Benchmark\S+?)(?:-(?P<procs>\d+))?\s+(?P<times>\d+)\s+(?P<rest>.+)$")
        .expect("valid go bench regex")
});

/// Adapter for `BenchmarkFoo-8  1000000  1234 ns/op  16 B/op` lines
///
/// Go does not report variance, so every range is zero. Lines carrying
/// several metrics yield one measurement per metric, named `<bench> - <unit>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoParser;

impl BenchmarkParser for GoParser {
    fn tool(&self) -> &str {
        "go"
    }

    fn parse_measurements(&self, raw: &str) -> Result<Vec<Measurement>, ParseError> {
        let mut measurements = Vec::new();

        for line in raw.lines() {
            let Some(caps) = BENCH_LINE.captures(line.trim()) else {
                continue;
            };

            let full_name = match caps.name("procs") {
                Some(procs) => format!("{}-{}", &caps["name"], procs.as_str()),
                None => caps["name"].to_string(),
            };
            let tokens: Vec<&str> = caps["rest"].split_whitespace().collect();
            if tokens.len() < 2 || tokens.len() % 2 != 0 {
                return Err(ParseError::malformed(
                    self.tool(),
                    format!("expected value/unit pairs after iteration count: {}", line),
                ));
            }

            let mut extra = format!("{} times", &caps["times"]);
            if let Some(procs) = caps.name("procs") {
                extra.push_str(&format!("\n{} procs", procs.as_str()));
            }

            let multi = tokens.len() > 2;
            for pair in tokens.chunks(2) {
                let unit = pair[1];
                let name = if multi {
                    format!("{} - {}", full_name, unit)
                } else {
                    full_name.clone()
                };
                let value = parse_number(self.tool(), &name, pair[0])?;
                measurements.push(Measurement::new(name, value, 0.0, unit).with_extra(extra.clone()));
            }
        }

        Ok(measurements)
    }
}
