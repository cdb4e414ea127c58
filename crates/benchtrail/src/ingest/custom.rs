//! Tool-agnostic JSON input
//!
//! A JSON array of `{ "name", "value", "unit", "range"?, "extra"? }` objects
//! for harnesses without a dedicated adapter.

use serde::Deserialize;
use serde_json::Value;

use super::{parse_range_text, BenchmarkParser};
use crate::error::ParseError;
use crate::models::{Direction, Measurement};

#[derive(Debug, Deserialize)]
struct Record {
    name: String,
    value: Value,
    unit: String,
    #[serde(default)]
    range: Option<Value>,
    #[serde(default)]
    extra: Option<String>,
}

/// Adapter for hand-rolled JSON results
#[derive(Debug, Clone)]
pub struct CustomJsonParser {
    tool: &'static str,
    direction: Direction,
}

impl CustomJsonParser {
    pub fn smaller_is_better() -> Self {
        Self {
            tool: "customSmallerIsBetter",
            direction: Direction::Lower,
        }
    }

    pub fn bigger_is_better() -> Self {
        Self {
            tool: "customBiggerIsBetter",
            direction: Direction::Higher,
        }
    }

    fn number(&self, name: &str, value: &Value) -> Result<f64, ParseError> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ParseError::non_finite(self.tool, name)),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                Ok(_) => Err(ParseError::non_finite(self.tool, name)),
                Err(_) => Err(ParseError::malformed(
                    self.tool,
                    format!("value of '{}' is not a number", name),
                )),
            },
            _ => Err(ParseError::malformed(
                self.tool,
                format!("value of '{}' is not a number", name),
            )),
        }
    }
}

impl BenchmarkParser for CustomJsonParser {
    fn tool(&self) -> &str {
        self.tool
    }

    fn default_direction(&self) -> Direction {
        self.direction
    }

    fn parse_measurements(&self, raw: &str) -> Result<Vec<Measurement>, ParseError> {
        let records: Vec<Record> = serde_json::from_str(raw)
            .map_err(|e| ParseError::malformed(self.tool, e.to_string()))?;

        records
            .into_iter()
            .map(|record| {
                let value = self.number(&record.name, &record.value)?;
                let range = match &record.range {
                    None | Some(Value::Null) => 0.0,
                    Some(Value::String(text)) => parse_range_text(text, value).unwrap_or(0.0),
                    Some(other) => self.number(&record.name, other)?,
                };
                let mut measurement = Measurement::new(record.name, value, range, record.unit);
                measurement.extra = record.extra;
                Ok(measurement)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_records() {
        let raw = r#"[
            {"name": "request latency", "value": 12.5, "unit": "ms", "range": "± 0.4"},
            {"name": "heap", "value": 1024, "unit": "KiB", "extra": "peak"},
            {"name": "startup", "value": "300", "unit": "ms", "range": 7}
        ]"#;
        let parser = CustomJsonParser::smaller_is_better();
        let measurements = parser.parse_measurements(raw).unwrap();
        assert_eq!(measurements.len(), 3);
        assert_eq!(measurements[0].range, 0.4);
        assert_eq!(measurements[1].range, 0.0);
        assert_eq!(measurements[1].extra.as_deref(), Some("peak"));
        assert_eq!(measurements[2].value, 300.0);
        assert_eq!(measurements[2].range, 7.0);
    }

    #[test]
    fn test_infinite_string_value() {
        let raw = r#"[{"name": "x", "value": "inf", "unit": "ops"}]"#;
        let err = CustomJsonParser::bigger_is_better()
            .parse_measurements(raw)
            .unwrap_err();
        assert!(matches!(err, ParseError::NonFinite { .. }));
    }

    #[test]
    fn test_not_an_array() {
        let err = CustomJsonParser::smaller_is_better()
            .parse_measurements(r#"{"name": "x"}"#)
            .unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_directions() {
        assert_eq!(CustomJsonParser::smaller_is_better().default_direction(), Direction::Lower);
        assert_eq!(CustomJsonParser::bigger_is_better().default_direction(), Direction::Higher);
    }
}
