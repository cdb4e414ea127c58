// Terminal rendering of a regression report

use std::io::IsTerminal;

use colored::Colorize;

use super::{display_baseline, display_delta, display_number, EmitOutcome};
use crate::detector::{RegressionReport, Verdict};

/// Output styling configuration
#[derive(Debug, Clone)]
pub struct OutputStyle {
    pub use_colors: bool,
}

impl Default for OutputStyle {
    fn default() -> Self {
        Self {
            use_colors: std::io::stdout().is_terminal(),
        }
    }
}

impl OutputStyle {
    pub fn plain() -> Self {
        Self { use_colors: false }
    }

    /// Format success message
    pub fn success(&self, msg: &str) -> String {
        if self.use_colors {
            format!("{} {}", "✓".green().bold(), msg)
        } else {
            format!("✓ {}", msg)
        }
    }

    /// Format error message
    pub fn error(&self, msg: &str) -> String {
        if self.use_colors {
            format!("{} {}", "✗".red().bold(), msg)
        } else {
            format!("✗ {}", msg)
        }
    }

    /// Format warning message
    pub fn warning(&self, msg: &str) -> String {
        if self.use_colors {
            format!("{} {}", "⚠".yellow(), msg)
        } else {
            format!("⚠ {}", msg)
        }
    }

    /// Format info message
    pub fn info(&self, msg: &str) -> String {
        if self.use_colors {
            format!("{} {}", "ℹ".blue(), msg)
        } else {
            format!("ℹ {}", msg)
        }
    }

    pub fn header(&self, msg: &str) -> String {
        if self.use_colors {
            msg.bold().to_string()
        } else {
            msg.to_string()
        }
    }
}

/// One line per measurement, then the regressed details and the outcome
pub fn render_console(
    report: &RegressionReport,
    outcome: &EmitOutcome,
    style: &OutputStyle,
) -> String {
    let mut lines = Vec::with_capacity(report.evaluations.len() + 4);
    let commit: String = report.commit.chars().take(7).collect();
    lines.push(style.header(&format!(
        "{} @ {} ({})",
        report.suite, commit, report.method
    )));

    let width = report
        .evaluations
        .iter()
        .map(|e| e.name.len())
        .max()
        .unwrap_or(0);

    for e in &report.evaluations {
        let text = format!(
            "{:<width$}  {} {}  {}  {}",
            e.name,
            display_number(e.value),
            e.unit,
            e.verdict,
            display_delta(report, e),
            width = width
        );
        let line = match e.verdict {
            Verdict::Ok | Verdict::Improved => style.success(&text),
            Verdict::NewBenchmark => style.info(&text),
            Verdict::UnitChanged => style.warning(&format!(
                "{}  (was {})",
                text,
                e.previous_unit.as_deref().unwrap_or("?")
            )),
            Verdict::Regressed if outcome.names().contains(&e.name) && outcome.is_fail() => {
                style.error(&text)
            }
            Verdict::Regressed => style.warning(&text),
        };
        lines.push(line);
    }

    let regressed: Vec<_> = report.with_verdict(Verdict::Regressed).collect();
    if !regressed.is_empty() {
        lines.push(String::new());
        lines.push(style.header("Regressions:"));
        for e in regressed {
            lines.push(format!(
                "  {}: baseline {} {} -> {} {} (delta {})",
                e.name,
                display_baseline(e),
                e.unit,
                display_number(e.value),
                e.unit,
                display_delta(report, e)
            ));
        }
    }

    lines.push(String::new());
    let summary = format!("Result: {}", outcome);
    lines.push(match outcome {
        EmitOutcome::Pass => style.success(&summary),
        EmitOutcome::Warn(_) => style.warning(&summary),
        EmitOutcome::Fail(_) => style.error(&summary),
    });

    lines.join("\n")
}
