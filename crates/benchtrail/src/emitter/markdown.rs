//! Markdown summary for CI comments and step summaries.

use std::fmt::{self, Write};

use super::{display_baseline, display_delta, display_number, EmitOutcome};
use crate::detector::{RegressionReport, Verdict};

/// Generate a markdown summary table for one report.
pub fn render_markdown(report: &RegressionReport, outcome: &EmitOutcome) -> String {
    let mut output = String::new();
    // Writing into a String cannot fail
    let _ = write_summary(&mut output, report, outcome);
    output
}

fn write_summary(
    output: &mut String,
    report: &RegressionReport,
    outcome: &EmitOutcome,
) -> fmt::Result {
    let commit: String = report.commit.chars().take(7).collect();

    writeln!(output, "## Benchmark results: {}", report.suite)?;
    writeln!(output)?;
    writeln!(
        output,
        "Commit `{}`, method `{}`, outcome **{}**",
        commit, report.method, outcome
    )?;
    writeln!(output)?;
    writeln!(output, "| Benchmark | Verdict | Value | Baseline | Delta |")?;
    writeln!(output, "|-----------|---------|-------|----------|-------|")?;

    for e in &report.evaluations {
        let verdict = match e.verdict {
            Verdict::Regressed if outcome.is_fail() && outcome.names().contains(&e.name) => {
                format!("**{}**", e.verdict)
            }
            Verdict::UnitChanged => format!(
                "{} (was {})",
                e.verdict,
                e.previous_unit.as_deref().unwrap_or("?")
            ),
            _ => e.verdict.to_string(),
        };
        writeln!(
            output,
            "| `{}` | {} | {} {} | {} | {} |",
            e.name,
            verdict,
            display_number(e.value),
            e.unit,
            display_baseline(e),
            display_delta(report, e)
        )?;
    }

    writeln!(output)?;
    writeln!(output, "Total benchmarks: {}", report.evaluations.len())?;
    Ok(())
}
