//! Script-loadable wire format of the history document
//!
//! The file is a JavaScript assignment (`window.BENCHMARK_DATA = {...}`) so a
//! static dashboard can include it with a `<script>` tag. The JSON payload is
//! pretty-printed with two-space indentation and integral numbers are written
//! without a fractional part, which keeps untouched entries byte-identical
//! across a load/append/store cycle.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::document::HistoryDocument;
use crate::error::{StorageError, StorageResult};

/// Default global identifier the document is bound to
pub const DEFAULT_GLOBAL_NAME: &str = "BENCHMARK_DATA";

/// Largest integer a JavaScript number represents exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Encoder/decoder for the persisted document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentCodec {
    global_name: String,
}

impl DocumentCodec {
    pub fn new(global_name: impl Into<String>) -> Self {
        Self {
            global_name: global_name.into(),
        }
    }

    pub fn global_name(&self) -> &str {
        &self.global_name
    }

    fn prefix(&self) -> String {
        format!("window.{} = ", self.global_name)
    }

    /// Serialize a document into script form
    pub fn encode(&self, doc: &HistoryDocument) -> StorageResult<Vec<u8>> {
        let json = serde_json::to_string_pretty(doc)?;
        let mut out = self.prefix();
        out.push_str(&json);
        Ok(out.into_bytes())
    }

    /// Parse script form (or bare JSON) back into a document
    pub fn decode(&self, content: &[u8]) -> StorageResult<HistoryDocument> {
        let text = std::str::from_utf8(content)
            .map_err(|e| StorageError::Decode(format!("document is not UTF-8: {}", e)))?;
        let payload = self.strip_assignment(text)?;
        serde_json::from_str(payload).map_err(|e| StorageError::Decode(e.to_string()))
    }

    fn strip_assignment<'a>(&self, text: &'a str) -> StorageResult<&'a str> {
        let text = text.trim_start_matches('\u{feff}').trim();
        if text.starts_with('{') {
            return Ok(text.trim_end_matches(';'));
        }

        let rest = text.strip_prefix("window.").unwrap_or(text);
        let rest = rest
            .strip_prefix(self.global_name.as_str())
            .ok_or_else(|| {
                StorageError::Decode(format!(
                    "expected assignment to {}, found '{}'",
                    self.global_name,
                    text.chars().take(40).collect::<String>()
                ))
            })?;
        let rest = rest
            .trim_start()
            .strip_prefix('=')
            .ok_or_else(|| StorageError::Decode("missing '=' after global name".to_string()))?;

        Ok(rest.trim().trim_end_matches(';').trim_end())
    }
}

impl Default for DocumentCodec {
    fn default() -> Self {
        Self::new(DEFAULT_GLOBAL_NAME)
    }
}

/// Render a number the way a JavaScript engine would print it
/// (`Number.prototype.toString`)
pub fn format_number(value: f64) -> String {
    if is_safe_integer(value) {
        format!("{}", value as i64)
    } else {
        ryu_js::Buffer::new().format(value).to_string()
    }
}

fn is_safe_integer(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER
}

/// Serde adapter writing numbers in JavaScript's textual form
///
/// Integral values go out as JSON integers; other finite values are written
/// verbatim from [`format_number`] so `0.0000015` stays `0.0000015` rather
/// than `1.5e-6`.
pub mod number {
    use serde::ser::Error as _;
    use serde_json::value::RawValue;

    use super::*;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if is_safe_integer(*value) {
            serializer.serialize_i64(*value as i64)
        } else if value.is_finite() {
            let raw = RawValue::from_string(format_number(*value)).map_err(S::Error::custom)?;
            raw.serialize(serializer)
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        f64::deserialize(deserializer)
    }
}
