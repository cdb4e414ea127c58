//! Turning a regression report into an actionable outcome
//!
//! [`emit`] decides `Pass`/`Warn`/`Fail` from the verdicts. The console and
//! markdown renderers format the same report for people; sinks deliver the
//! rendered summary somewhere (stdout, a CI step summary file).

mod console;
mod markdown;
mod sink;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::detector::{Evaluation, RegressionReport, Verdict};

pub use console::{render_console, OutputStyle};
pub use markdown::render_markdown;
pub use sink::{FileSink, StdoutSink, SummarySink};

/// Which regressions fail the run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitConfig {
    /// Benchmarks whose regression fails the run; takes precedence when set
    pub fail_on: Option<BTreeSet<String>>,
    /// Fail on any regression when `fail_on` is unset
    pub fail_on_any_regression: bool,
}

impl EmitConfig {
    pub fn fails_on(&self, name: &str) -> bool {
        match &self.fail_on {
            Some(names) => names.contains(name),
            None => self.fail_on_any_regression,
        }
    }
}

/// Final status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "benchmarks", rename_all = "lowercase")]
pub enum EmitOutcome {
    Pass,
    /// Regressions or unit changes that do not fail the run
    Warn(Vec<String>),
    /// Regressions selected by [`EmitConfig`]
    Fail(Vec<String>),
}

impl EmitOutcome {
    pub fn is_fail(&self) -> bool {
        matches!(self, EmitOutcome::Fail(_))
    }

    /// Process exit code: warnings are non-fatal
    pub fn exit_code(&self) -> i32 {
        match self {
            EmitOutcome::Pass | EmitOutcome::Warn(_) => 0,
            EmitOutcome::Fail(_) => 1,
        }
    }

    pub fn names(&self) -> &[String] {
        match self {
            EmitOutcome::Pass => &[],
            EmitOutcome::Warn(names) | EmitOutcome::Fail(names) => names,
        }
    }
}

impl fmt::Display for EmitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitOutcome::Pass => write!(f, "PASS"),
            EmitOutcome::Warn(names) => write!(f, "WARN ({})", names.join(", ")),
            EmitOutcome::Fail(names) => write!(f, "FAIL ({})", names.join(", ")),
        }
    }
}

/// Decide the outcome of a report
pub fn emit(report: &RegressionReport, config: &EmitConfig) -> EmitOutcome {
    let mut failed = Vec::new();
    let mut warned = Vec::new();

    for evaluation in &report.evaluations {
        match evaluation.verdict {
            Verdict::Regressed if config.fails_on(&evaluation.name) => {
                failed.push(evaluation.name.clone())
            }
            Verdict::Regressed | Verdict::UnitChanged => warned.push(evaluation.name.clone()),
            Verdict::Ok | Verdict::Improved | Verdict::NewBenchmark => {}
        }
    }

    if !failed.is_empty() {
        EmitOutcome::Fail(failed)
    } else if !warned.is_empty() {
        EmitOutcome::Warn(warned)
    } else {
        EmitOutcome::Pass
    }
}

/// Number for display: integers stay integral, others get two decimals
pub(crate) fn display_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

/// Model output with its notation (`+1.26σ` or `1.60x`)
pub(crate) fn display_delta(report: &RegressionReport, evaluation: &Evaluation) -> String {
    match evaluation.delta {
        Some(delta) if report.method == "ratio" => format!("{:.2}x", delta),
        Some(delta) => format!("{:+.2}σ", delta),
        None => "-".to_string(),
    }
}

/// `mean ± σ (n=N)` of the baseline, if one was used
pub(crate) fn display_baseline(evaluation: &Evaluation) -> String {
    match &evaluation.baseline {
        Some(stats) => format!(
            "{} ± {} (n={})",
            display_number(stats.mean),
            display_number(stats.sigma),
            stats.sample_size
        ),
        None => "-".to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{evaluation, report};
    use super::*;

    fn names(list: &[&str]) -> Option<BTreeSet<String>> {
        Some(list.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_pass_when_nothing_regressed() {
        let report = report(vec![
            evaluation("a", Verdict::Ok),
            evaluation("b", Verdict::Improved),
            evaluation("c", Verdict::NewBenchmark),
        ]);
        let config = EmitConfig {
            fail_on_any_regression: true,
            ..Default::default()
        };
        assert_eq!(emit(&report, &config), EmitOutcome::Pass);
    }

    #[test]
    fn test_regression_warns_by_default() {
        let report = report(vec![
            evaluation("a", Verdict::Regressed),
            evaluation("b", Verdict::UnitChanged),
        ]);
        let outcome = emit(&report, &EmitConfig::default());
        assert_eq!(outcome, EmitOutcome::Warn(vec!["a".into(), "b".into()]));
        assert_eq!(outcome.exit_code(), 0);
    }

    #[test]
    fn test_fail_on_any_regression() {
        let report = report(vec![
            evaluation("a", Verdict::Regressed),
            evaluation("b", Verdict::UnitChanged),
        ]);
        let config = EmitConfig {
            fail_on_any_regression: true,
            ..Default::default()
        };
        let outcome = emit(&report, &config);
        assert_eq!(outcome, EmitOutcome::Fail(vec!["a".into()]));
        assert_eq!(outcome.exit_code(), 1);
    }

    #[test]
    fn test_fail_on_list_takes_precedence() {
        let report = report(vec![
            evaluation("a", Verdict::Regressed),
            evaluation("b", Verdict::Regressed),
        ]);
        let config = EmitConfig {
            fail_on: names(&["b"]),
            fail_on_any_regression: true,
        };
        assert_eq!(emit(&report, &config), EmitOutcome::Fail(vec!["b".into()]));

        let config = EmitConfig {
            fail_on: names(&["zzz"]),
            fail_on_any_regression: true,
        };
        assert_eq!(
            emit(&report, &config),
            EmitOutcome::Warn(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_outcome_display_and_serde() {
        let outcome = EmitOutcome::Fail(vec!["a".into(), "b".into()]);
        assert_eq!(outcome.to_string(), "FAIL (a, b)");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "fail");
        assert_eq!(json["benchmarks"][1], "b");
    }

    #[test]
    fn test_display_helpers() {
        assert_eq!(display_number(7000.0), "7000");
        assert_eq!(display_number(79.0569), "79.06");
        let report = report(vec![evaluation("a", Verdict::Regressed)]);
        assert_eq!(display_delta(&report, &report.evaluations[0]), "+25.30σ");
        assert_eq!(display_baseline(&report.evaluations[0]), "7000 ± 79.06 (n=5)");
    }
}
