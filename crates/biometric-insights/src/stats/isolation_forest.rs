//! Isolation forest anomaly detection over a handful of record features.

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::table::RecordTable;
use crate::utils::{is_text_dtype, mean, population_std, quantile};
use polars::prelude::*;
use rand::prelude::*;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Output column holding -1 (anomaly), 1 (normal) or 0 (not scored).
pub const ANOMALY_COLUMN: &str = "Anomaly";
/// Output column holding the raw score; lower is more anomalous.
pub const ANOMALY_SCORE_COLUMN: &str = "Anomaly_Score";

const MAX_SAMPLES: usize = 256;
const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Forest size, contamination and seed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsolationForestParams {
    /// Expected anomaly fraction, in (0, 0.5].
    pub contamination: f64,
    pub n_estimators: usize,
    pub random_state: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            contamination: 0.05,
            n_estimators: 100,
            random_state: 42,
        }
    }
}

impl IsolationForestParams {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            contamination: config.contamination,
            n_estimators: config.n_estimators,
            random_state: config.random_state,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(AnalysisError::InvalidConfig(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if self.n_estimators == 0 {
            return Err(AnalysisError::InvalidConfig(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Counts from an isolation forest run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IsolationForestStats {
    pub total_records: usize,
    pub records_analyzed: usize,
    pub n_anomalies: usize,
    /// Share of analysed records, in percent.
    pub anomaly_rate: f64,
    /// Contamination expressed as a percentage.
    pub contamination_pct: f64,
    pub features_used: Vec<String>,
}

impl IsolationForestStats {
    pub fn summary(&self) -> String {
        format!(
            "Features: {}\nTotal Records: {}\nRecords Analyzed: {}\n\
             Anomalies Detected: {} ({:.2}%)\nExpected Contamination: {:.1}%",
            self.features_used.join(", "),
            self.total_records,
            self.records_analyzed,
            self.n_anomalies,
            self.anomaly_rate,
            self.contamination_pct
        )
    }
}

// ============================================================================
// Trees
// ============================================================================

/// Average path length of an unsuccessful binary search tree lookup.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One isolation tree stored as an arena of nodes; index 0 is the root.
#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn fit(data: &[Vec<f64>], rows: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(data, rows, 0, max_depth, rng);
        tree
    }

    fn grow(
        &mut self,
        data: &[Vec<f64>],
        rows: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if depth >= max_depth || rows.len() <= 1 {
            return id;
        }

        let n_features = data[rows[0]].len();
        let mut candidates: Vec<usize> = (0..n_features).collect();
        candidates.shuffle(rng);
        let split = candidates.into_iter().find_map(|feature| {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                (lo.min(data[r][feature]), hi.max(data[r][feature]))
            });
            (hi > lo).then_some((feature, lo, hi))
        });
        // Every feature is constant in this node.
        let Some((feature, lo, hi)) = split else {
            return id;
        };

        let threshold = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[r][feature] <= threshold);
        let left = self.grow(data, left_rows, depth + 1, max_depth, rng);
        let right = self.grow(data, right_rows, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    /// Depth of the leaf reached by `point`, plus the expected remaining
    /// depth for the samples sharing that leaf.
    fn path_length(&self, point: &[f64]) -> f64 {
        let mut id = 0;
        let mut depth = 0usize;
        loop {
            match &self.nodes[id] {
                Node::Leaf { size } => return depth as f64 + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if point[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                    depth += 1;
                }
            }
        }
    }
}

struct IsolationForest {
    trees: Vec<IsolationTree>,
    max_samples: usize,
}

impl IsolationForest {
    fn fit(data: &[Vec<f64>], params: &IsolationForestParams) -> Self {
        let n = data.len();
        let max_samples = n.min(MAX_SAMPLES);
        let max_depth = (max_samples.max(2) as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(params.random_state);

        let trees = (0..params.n_estimators)
            .map(|_| {
                let rows = index::sample(&mut rng, n, max_samples).into_vec();
                IsolationTree::fit(data, rows, max_depth, &mut rng)
            })
            .collect();
        Self { trees, max_samples }
    }

    /// `-2^(-E[h(x)] / c(max_samples))`; lower means more anomalous.
    fn score(&self, point: &[f64]) -> f64 {
        let normalizer = average_path_length(self.max_samples);
        if normalizer <= 0.0 {
            return -1.0;
        }
        let mean_depth = self
            .trees
            .iter()
            .map(|tree| tree.path_length(point))
            .sum::<f64>()
            / self.trees.len() as f64;
        -(2f64.powf(-mean_depth / normalizer))
    }
}

// ============================================================================
// Feature preparation
// ============================================================================

/// Column values as floats; text columns get sorted-unique integer codes.
fn feature_values(table: &RecordTable, name: &str) -> Result<Vec<Option<f64>>> {
    if !is_text_dtype(&table.dtype(name)?) {
        return table.f64_values(name);
    }
    let text = table.str_values(name)?;
    let categories: BTreeSet<&str> = text.iter().flatten().map(String::as_str).collect();
    let codes: Vec<&str> = categories.into_iter().collect();
    Ok(text
        .iter()
        .map(|v| {
            v.as_deref()
                .and_then(|s| codes.binary_search(&s).ok())
                .map(|code| code as f64)
        })
        .collect())
}

/// Standardize each feature to zero mean and unit population variance.
fn standardize(rows: &mut [Vec<f64>]) {
    let Some(width) = rows.first().map(Vec::len) else {
        return;
    };
    for j in 0..width {
        let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
        let center = mean(&column).unwrap_or(0.0);
        let scale = population_std(&column)
            .filter(|s| *s > 0.0)
            .unwrap_or(1.0);
        for row in rows.iter_mut() {
            row[j] = (row[j] - center) / scale;
        }
    }
}

/// Flag anomalous records with an isolation forest.
///
/// Missing feature columns are skipped. Rows with a missing value in any
/// remaining feature are left unscored (`Anomaly` 0, null score). When no
/// feature remains the table is returned unchanged with empty statistics.
pub fn isolation_forest_anomaly_detection(
    table: &RecordTable,
    features: &[&str],
    params: &IsolationForestParams,
) -> Result<(RecordTable, IsolationForestStats)> {
    params.validate()?;

    let missing = table.missing_columns(features);
    if !missing.is_empty() {
        warn!("Isolation forest skipping missing features: {}", missing.join(", "));
    }
    let available: Vec<&str> = features
        .iter()
        .copied()
        .filter(|f| table.has_column(f))
        .collect();
    if available.is_empty() {
        warn!("No valid features for isolation forest");
        return Ok((table.clone(), IsolationForestStats::default()));
    }
    info!("Isolation forest using features: {}", available.join(", "));

    let columns: Vec<Vec<Option<f64>>> = available
        .iter()
        .map(|name| feature_values(table, name))
        .collect::<Result<_>>()?;

    let mut complete_rows = Vec::new();
    let mut matrix = Vec::new();
    for row in 0..table.height() {
        let point: Option<Vec<f64>> = columns.iter().map(|c| c[row]).collect();
        if let Some(point) = point {
            complete_rows.push(row);
            matrix.push(point);
        }
    }
    debug!(
        "Isolation forest: {} of {} rows complete",
        matrix.len(),
        table.height()
    );

    let mut labels: Vec<i32> = vec![0; table.height()];
    let mut scores: Vec<Option<f64>> = vec![None; table.height()];
    let mut n_anomalies = 0;

    if !matrix.is_empty() {
        standardize(&mut matrix);
        let forest = IsolationForest::fit(&matrix, params);
        let row_scores: Vec<f64> = matrix.iter().map(|p| forest.score(p)).collect();
        let offset = quantile(&row_scores, params.contamination).unwrap_or(f64::NEG_INFINITY);

        for (&row, &score) in complete_rows.iter().zip(&row_scores) {
            scores[row] = Some(score);
            labels[row] = if score < offset {
                n_anomalies += 1;
                -1
            } else {
                1
            };
        }
    }

    let result = table
        .with_column(Series::new(ANOMALY_COLUMN.into(), labels))?
        .with_column(Series::new(ANOMALY_SCORE_COLUMN.into(), scores))?;

    let stats = IsolationForestStats {
        total_records: table.height(),
        records_analyzed: matrix.len(),
        n_anomalies,
        anomaly_rate: if matrix.is_empty() {
            0.0
        } else {
            n_anomalies as f64 / matrix.len() as f64 * 100.0
        },
        contamination_pct: params.contamination * 100.0,
        features_used: available.iter().map(|s| s.to_string()).collect(),
    };
    info!(
        "Isolation forest flagged {} of {} records ({:.2}%)",
        stats.n_anomalies, stats.records_analyzed, stats.anomaly_rate
    );

    Ok((result, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn clustered() -> RecordTable {
        let mut age: Vec<Option<f64>> = (0..50).map(|i| Some(30.0 + (i % 10) as f64)).collect();
        let mut score: Vec<Option<f64>> =
            (0..50).map(|i| Some(60.0 + (i * 7 % 13) as f64)).collect();
        age.push(Some(95.0));
        score.push(Some(5.0));
        age.push(None);
        score.push(Some(61.0));
        df! { "Age" => age, "Score" => score }.unwrap().into()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert_relative_eq!(average_path_length(256), 10.244_770, epsilon = 1e-4);
    }

    #[test]
    fn test_flags_isolated_point() {
        let table = clustered();
        let (result, stats) = isolation_forest_anomaly_detection(
            &table,
            &["Age", "Score"],
            &IsolationForestParams::default(),
        )
        .unwrap();

        assert_eq!(stats.total_records, 52);
        assert_eq!(stats.records_analyzed, 51);
        assert!((1..=3).contains(&stats.n_anomalies));
        assert_eq!(stats.contamination_pct, 5.0);

        let labels: Vec<Option<i32>> = result
            .series(ANOMALY_COLUMN)
            .unwrap()
            .i32()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(labels[50], Some(-1));
        assert_eq!(labels[51], Some(0));

        let scores = result.f64_values(ANOMALY_SCORE_COLUMN).unwrap();
        assert_eq!(scores[51], None);
        let outlier = scores[50].unwrap();
        assert!(scores[..50].iter().all(|s| s.unwrap() > outlier));
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let table = clustered();
        let params = IsolationForestParams {
            random_state: 7,
            ..Default::default()
        };
        let (a, _) = isolation_forest_anomaly_detection(&table, &["Age", "Score"], &params).unwrap();
        let (b, _) = isolation_forest_anomaly_detection(&table, &["Age", "Score"], &params).unwrap();
        assert_eq!(
            a.f64_values(ANOMALY_SCORE_COLUMN).unwrap(),
            b.f64_values(ANOMALY_SCORE_COLUMN).unwrap()
        );
    }

    #[test]
    fn test_no_available_features() {
        let table = clustered();
        let (result, stats) = isolation_forest_anomaly_detection(
            &table,
            &["Nope"],
            &IsolationForestParams::default(),
        )
        .unwrap();
        assert_eq!(stats, IsolationForestStats::default());
        assert!(!result.has_column(ANOMALY_COLUMN));
    }

    #[test]
    fn test_text_features_are_encoded() {
        let table: RecordTable = df! {
            "Age_Group" => &["0-5 (Child)", "6-18 (Youth)", "0-5 (Child)", "6-18 (Youth)"],
            "Score" => &[40.0, 70.0, 42.0, 71.0],
        }
        .unwrap()
        .into();
        let (_, stats) = isolation_forest_anomaly_detection(
            &table,
            &["Age_Group", "Score"],
            &IsolationForestParams::default(),
        )
        .unwrap();
        assert_eq!(stats.records_analyzed, 4);
        assert_eq!(stats.features_used, vec!["Age_Group", "Score"]);
    }

    #[test]
    fn test_invalid_contamination() {
        let params = IsolationForestParams {
            contamination: 0.8,
            ..Default::default()
        };
        let err = isolation_forest_anomaly_detection(&clustered(), &["Age"], &params).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }
}
