//! Statistical testing and anomaly detection.
//!
//! - Chi-square, one-way ANOVA and Kruskal-Wallis tests across age groups
//! - Isolation forest scoring of multi-feature anomalies
//! - Per-group z-score flags for unusually high or low quality
//! - A plain-text report combining all of the above

mod hypothesis;
mod isolation_forest;
mod report;
mod zscore;

pub use hypothesis::{
    AnovaResult, ChiSquareResult, GroupValue, HypothesisTest, KruskalWallisResult, anova_test,
    chi_square_test, eta_squared, kruskal_wallis_test,
};
pub use isolation_forest::{
    ANOMALY_COLUMN, ANOMALY_SCORE_COLUMN, IsolationForestParams, IsolationForestStats,
    average_path_length, isolation_forest_anomaly_detection,
};
pub use report::generate_statistical_report;
pub use zscore::{
    ANOMALY_TYPE_COLUMN, GroupAnomalyCount, HIGH_QUALITY_LABEL, LOW_QUALITY_LABEL, NORMAL_LABEL, ZScoreStats,
    detect_age_quality_anomalies,
};
