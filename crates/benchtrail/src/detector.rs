//! Regression detection against a trailing baseline window
//!
//! For every measurement of an incoming batch the detector projects the
//! benchmark's series from the history, takes the newest `window_size`
//! points recorded in the same unit and asks a [`RegressionModel`] whether
//! the new value moved significantly. The direction configured for the
//! metric turns that movement into `improved` or `regressed`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::history::{HistoryDocument, SeriesPoint};
use crate::models::{Direction, Measurement, MeasurementBatch};

/// Statistical test used to judge a new value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Distance from the window mean in units of its standard deviation
    #[default]
    Zscore,
    /// Ratio of the new value to the previous one
    Ratio,
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zscore" | "z-score" => Ok(Method::Zscore),
            "ratio" => Ok(Method::Ratio),
            other => Err(format!("unknown method '{}', expected zscore or ratio", other)),
        }
    }
}

/// Regression detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    /// Significance threshold (z-score, or ratio for [`Method::Ratio`])
    pub threshold: f64,
    /// Number of trailing runs forming the baseline
    pub window_size: usize,
    /// Absolute lower bound for the standard deviation
    pub epsilon: f64,
    /// Lower bound for the standard deviation relative to the baseline mean
    pub relative_floor: f64,
    pub method: Method,
    /// Per-metric direction overrides
    pub directions: BTreeMap<String, Direction>,
    /// Direction for metrics without an override; the tool's default when unset
    pub default_direction: Option<Direction>,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            window_size: 5,
            epsilon: 1e-9,
            relative_floor: 0.0,
            method: Method::Zscore,
            directions: BTreeMap::new(),
            default_direction: None,
        }
    }
}

impl RegressionConfig {
    pub fn direction_for(&self, name: &str) -> Direction {
        self.directions
            .get(name)
            .copied()
            .or(self.default_direction)
            .unwrap_or_default()
    }

    /// Build the model selected by `method`
    pub fn model(&self) -> Box<dyn RegressionModel> {
        match self.method {
            Method::Zscore => Box::new(ZScoreModel {
                threshold: self.threshold,
                epsilon: self.epsilon,
                relative_floor: self.relative_floor,
            }),
            Method::Ratio => Box::new(RatioModel {
                threshold: self.threshold,
            }),
        }
    }
}

/// Outcome for one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Ok,
    Improved,
    Regressed,
    NewBenchmark,
    UnitChanged,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verdict::Ok => "ok",
            Verdict::Improved => "improved",
            Verdict::Regressed => "regressed",
            Verdict::NewBenchmark => "new-benchmark",
            Verdict::UnitChanged => "unit-changed",
        };
        f.write_str(label)
    }
}

/// Summary of the baseline window a value was compared against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineStats {
    pub mean: f64,
    /// Sample standard deviation; `None` for a single-point window
    pub std_dev: Option<f64>,
    /// Spread actually used as the denominator
    pub sigma: f64,
    pub sample_size: usize,
    /// Most recent baseline value
    pub previous: f64,
}

/// Which way a model saw the value move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Up,
    Down,
    Steady,
}

/// A model's judgement of one value
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub stats: BaselineStats,
    pub delta: f64,
    pub shift: Shift,
}

/// Pluggable significance test
pub trait RegressionModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Judge `value` against a non-empty baseline, oldest first
    ///
    /// Returns `None` when the inputs cannot be meaningfully compared.
    fn assess(&self, baseline: &[SeriesPoint<'_>], value: f64) -> Option<Assessment>;
}

fn baseline_stats(baseline: &[SeriesPoint<'_>]) -> Option<(f64, Option<f64>, f64)> {
    let last = baseline.last()?;
    let n = baseline.len() as f64;
    let mean = baseline.iter().map(|p| p.value).sum::<f64>() / n;
    let std_dev = (baseline.len() >= 2).then(|| {
        let ss: f64 = baseline.iter().map(|p| (p.value - mean).powi(2)).sum();
        (ss / (n - 1.0)).sqrt()
    });
    Some((mean, std_dev, last.value))
}

/// `d = (value - μ) / max(σ, ε)` over the baseline window
#[derive(Debug, Clone)]
pub struct ZScoreModel {
    pub threshold: f64,
    pub epsilon: f64,
    pub relative_floor: f64,
}

impl RegressionModel for ZScoreModel {
    fn name(&self) -> &'static str {
        "zscore"
    }

    fn assess(&self, baseline: &[SeriesPoint<'_>], value: f64) -> Option<Assessment> {
        let (mean, std_dev, previous) = baseline_stats(baseline)?;
        // A lone point has no spread of its own; use its reported range
        let spread = std_dev.unwrap_or_else(|| baseline[baseline.len() - 1].range);
        let sigma = spread
            .max(self.epsilon)
            .max(self.relative_floor * mean.abs());

        let delta = (value - mean) / sigma;
        if !delta.is_finite() {
            return None;
        }

        let shift = if delta > self.threshold {
            Shift::Up
        } else if delta < -self.threshold {
            Shift::Down
        } else {
            Shift::Steady
        };

        Some(Assessment {
            stats: BaselineStats {
                mean,
                std_dev,
                sigma,
                sample_size: baseline.len(),
                previous,
            },
            delta,
            shift,
        })
    }
}

/// `value / previous` compared against `threshold` and its inverse
#[derive(Debug, Clone)]
pub struct RatioModel {
    pub threshold: f64,
}

impl RegressionModel for RatioModel {
    fn name(&self) -> &'static str {
        "ratio"
    }

    fn assess(&self, baseline: &[SeriesPoint<'_>], value: f64) -> Option<Assessment> {
        let (mean, std_dev, previous) = baseline_stats(baseline)?;
        if previous == 0.0 {
            return None;
        }
        let delta = value / previous;
        if !delta.is_finite() {
            return None;
        }

        let shift = if delta > self.threshold {
            Shift::Up
        } else if delta < 1.0 / self.threshold {
            Shift::Down
        } else {
            Shift::Steady
        };

        Some(Assessment {
            stats: BaselineStats {
                mean,
                std_dev,
                sigma: std_dev.unwrap_or(0.0),
                sample_size: baseline.len(),
                previous,
            },
            delta,
            shift,
        })
    }
}

/// Verdict and supporting numbers for one measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub name: String,
    pub verdict: Verdict,
    pub value: f64,
    pub range: f64,
    pub unit: String,
    pub direction: Direction,
    /// Model output (z-score or ratio); absent when nothing was compared
    pub delta: Option<f64>,
    pub baseline: Option<BaselineStats>,
    /// Unit recorded before a unit change
    pub previous_unit: Option<String>,
}

/// Per-measurement verdicts for one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub suite: String,
    pub tool: String,
    pub commit: String,
    pub method: String,
    pub evaluations: Vec<Evaluation>,
}

impl RegressionReport {
    pub fn with_verdict(&self, verdict: Verdict) -> impl Iterator<Item = &Evaluation> {
        self.evaluations.iter().filter(move |e| e.verdict == verdict)
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.with_verdict(verdict).count()
    }

    pub fn get(&self, name: &str) -> Option<&Evaluation> {
        self.evaluations.iter().find(|e| e.name == name)
    }
}

/// Evaluates batches against the stored history
pub struct RegressionDetector {
    config: RegressionConfig,
    model: Box<dyn RegressionModel>,
}

impl RegressionDetector {
    pub fn new(config: RegressionConfig) -> Self {
        let model = config.model();
        Self { config, model }
    }

    /// Use a custom significance test
    pub fn with_model(config: RegressionConfig, model: Box<dyn RegressionModel>) -> Self {
        Self { config, model }
    }

    pub fn config(&self) -> &RegressionConfig {
        &self.config
    }

    /// Judge every measurement of `batch`; never fails and never mutates `doc`
    pub fn evaluate(&self, batch: &MeasurementBatch, doc: &HistoryDocument) -> RegressionReport {
        let evaluations = batch
            .measurements
            .iter()
            .map(|m| self.evaluate_one(batch, m, doc))
            .collect();

        RegressionReport {
            suite: batch.suite.clone(),
            tool: batch.tool.clone(),
            commit: batch.commit.id.clone(),
            method: self.model.name().to_string(),
            evaluations,
        }
    }

    fn evaluate_one(
        &self,
        batch: &MeasurementBatch,
        m: &Measurement,
        doc: &HistoryDocument,
    ) -> Evaluation {
        let direction = self.config.direction_for(&m.name);
        let mut evaluation = Evaluation {
            name: m.name.clone(),
            verdict: Verdict::Ok,
            value: m.value,
            range: m.range,
            unit: m.unit.clone(),
            direction,
            delta: None,
            baseline: None,
            previous_unit: None,
        };

        let series = doc.series(&batch.suite, &m.name, Some(&batch.commit.id));
        let Some(last) = series.last() else {
            evaluation.verdict = Verdict::NewBenchmark;
            return evaluation;
        };
        if last.unit != m.unit {
            evaluation.verdict = Verdict::UnitChanged;
            evaluation.previous_unit = Some(last.unit.to_string());
            return evaluation;
        }

        let window = self.config.window_size.max(1);
        let same_unit = series
            .points
            .iter()
            .rev()
            .take_while(|p| p.unit == m.unit)
            .count();
        let start = series.points.len() - same_unit.min(window);
        let baseline = &series.points[start..];

        match self.model.assess(baseline, m.value) {
            Some(assessment) => {
                evaluation.verdict = match (assessment.shift, direction) {
                    (Shift::Steady, _) => Verdict::Ok,
                    (Shift::Up, Direction::Lower) | (Shift::Down, Direction::Higher) => {
                        Verdict::Regressed
                    }
                    (Shift::Down, Direction::Lower) | (Shift::Up, Direction::Higher) => {
                        Verdict::Improved
                    }
                };
                evaluation.delta = Some(assessment.delta);
                evaluation.baseline = Some(assessment.stats);
            }
            None => {
                debug!(bench = %m.name, "Baseline not comparable, treating as ok");
            }
        }

        evaluation
    }
}

/// Evaluate with the model selected by `config`
pub fn evaluate(
    batch: &MeasurementBatch,
    doc: &HistoryDocument,
    config: &RegressionConfig,
) -> RegressionReport {
    RegressionDetector::new(config.clone()).evaluate(batch, doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;

    fn ns(name: &str, value: f64) -> Measurement {
        Measurement::new(name, value, 50.0, "ns/iter")
    }

    fn history(values: &[f64]) -> HistoryDocument {
        let mut doc = HistoryDocument::default();
        for (i, value) in values.iter().enumerate() {
            doc.append(fixtures::batch(
                &format!("c{}", i),
                (i as i64 + 1) * 1000,
                vec![ns("parse", *value)],
            ))
            .unwrap();
        }
        doc
    }

    fn incoming(value: f64) -> MeasurementBatch {
        fixtures::batch("new", 1_000_000, vec![ns("parse", value)])
    }

    const BASELINE: [f64; 5] = [7000.0, 7100.0, 6900.0, 7050.0, 6950.0];

    #[test]
    fn test_threshold_arithmetic() {
        let doc = history(&BASELINE);
        let config = RegressionConfig::default();

        let report = evaluate(&incoming(9000.0), &doc, &config);
        let eval = report.get("parse").unwrap();
        assert_eq!(eval.verdict, Verdict::Regressed);
        let stats = eval.baseline.as_ref().unwrap();
        assert!((stats.mean - 7000.0).abs() < 1e-9);
        assert!((stats.std_dev.unwrap() - 79.0569).abs() < 1e-3);
        assert_eq!(stats.sample_size, 5);
        assert!((eval.delta.unwrap() - 25.298).abs() < 1e-2);

        let report = evaluate(&incoming(6200.0), &doc, &config);
        assert_eq!(report.get("parse").unwrap().verdict, Verdict::Improved);

        let report = evaluate(&incoming(7100.0), &doc, &config);
        let eval = report.get("parse").unwrap();
        assert_eq!(eval.verdict, Verdict::Ok);
        assert!(eval.delta.unwrap() > 1.0 && eval.delta.unwrap() < 2.0);
    }

    #[test]
    fn test_higher_is_better_mirrors() {
        let doc = history(&BASELINE);
        let mut config = RegressionConfig::default();
        config.directions.insert("parse".to_string(), Direction::Higher);

        let report = evaluate(&incoming(9000.0), &doc, &config);
        assert_eq!(report.get("parse").unwrap().verdict, Verdict::Improved);

        let report = evaluate(&incoming(6200.0), &doc, &config);
        assert_eq!(report.get("parse").unwrap().verdict, Verdict::Regressed);
    }

    #[test]
    fn test_window_uses_trailing_entries() {
        let mut values = vec![1_000_000.0; 3];
        values.extend_from_slice(&BASELINE);
        let doc = history(&values);

        let report = evaluate(&incoming(7100.0), &doc, &RegressionConfig::default());
        let eval = report.get("parse").unwrap();
        assert_eq!(eval.verdict, Verdict::Ok);
        assert_eq!(eval.baseline.as_ref().unwrap().sample_size, 5);
    }

    #[test]
    fn test_new_benchmark() {
        let doc = history(&BASELINE);
        let batch = fixtures::batch("new", 1_000_000, vec![ns("emit", 10.0)]);
        let report = evaluate(&batch, &doc, &RegressionConfig::default());
        assert_eq!(report.get("emit").unwrap().verdict, Verdict::NewBenchmark);
        assert!(report.get("emit").unwrap().delta.is_none());
    }

    #[test]
    fn test_unit_change_takes_precedence() {
        let doc = history(&BASELINE);
        let batch = fixtures::batch(
            "new",
            1_000_000,
            vec![Measurement::new("parse", 7000.0, 0.0, "ms/iter")],
        );
        let report = evaluate(&batch, &doc, &RegressionConfig::default());
        let eval = report.get("parse").unwrap();
        assert_eq!(eval.verdict, Verdict::UnitChanged);
        assert_eq!(eval.previous_unit.as_deref(), Some("ns/iter"));
    }

    #[test]
    fn test_single_point_uses_reported_range() {
        let doc = history(&[1000.0]);
        // range 50 => d = (1120 - 1000) / 50 = 2.4
        let report = evaluate(&incoming(1120.0), &doc, &RegressionConfig::default());
        let eval = report.get("parse").unwrap();
        assert_eq!(eval.verdict, Verdict::Regressed);
        assert!((eval.delta.unwrap() - 2.4).abs() < 1e-9);
        assert!(eval.baseline.as_ref().unwrap().std_dev.is_none());
    }

    #[test]
    fn test_epsilon_floor_on_flat_series() {
        let doc = history(&[100.0, 100.0, 100.0]);
        let mut config = RegressionConfig::default();
        config.epsilon = 1.0;

        let report = evaluate(&incoming(101.0), &doc, &config);
        assert_eq!(report.get("parse").unwrap().verdict, Verdict::Ok);

        config.relative_floor = 0.05;
        let report = evaluate(&incoming(108.0), &doc, &config);
        assert_eq!(report.get("parse").unwrap().verdict, Verdict::Ok);
    }

    #[test]
    fn test_reingested_commit_excluded_from_baseline() {
        let doc = history(&BASELINE);
        let mut batch = incoming(6950.0);
        batch.commit = fixtures::commit("c4");
        let report = evaluate(&batch, &doc, &RegressionConfig::default());
        assert_eq!(report.get("parse").unwrap().baseline.as_ref().unwrap().sample_size, 4);
    }

    #[test]
    fn test_ratio_method() {
        let doc = history(&[100.0, 100.0]);
        let config = RegressionConfig {
            method: Method::Ratio,
            threshold: 1.5,
            ..RegressionConfig::default()
        };

        let report = evaluate(&incoming(160.0), &doc, &config);
        assert_eq!(report.method, "ratio");
        let eval = report.get("parse").unwrap();
        assert_eq!(eval.verdict, Verdict::Regressed);
        assert!((eval.delta.unwrap() - 1.6).abs() < 1e-9);

        let report = evaluate(&incoming(60.0), &doc, &config);
        assert_eq!(report.get("parse").unwrap().verdict, Verdict::Improved);
    }

    #[test]
    fn test_incomparable_baseline_is_ok() {
        let doc = history(&[0.0]);
        let config = RegressionConfig {
            method: Method::Ratio,
            ..RegressionConfig::default()
        };
        let eval = evaluate(&incoming(5.0), &doc, &config).evaluations.remove(0);
        assert_eq!(eval.verdict, Verdict::Ok);
        assert!(eval.delta.is_none());
    }

    #[test]
    fn test_default_direction_fallback() {
        let mut config = RegressionConfig::default();
        assert_eq!(config.direction_for("x"), Direction::Lower);
        config.default_direction = Some(Direction::Higher);
        assert_eq!(config.direction_for("x"), Direction::Higher);
        config.directions.insert("x".to_string(), Direction::Lower);
        assert_eq!(config.direction_for("x"), Direction::Lower);
    }
}
