//! Duplicate row removal.

use crate::config::KeepPolicy;
use crate::error::Result;
use crate::table::RecordTable;
use polars::prelude::UniqueKeepStrategy;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Counts from a deduplication pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupOutcome {
    pub original_records: usize,
    pub duplicates_removed: usize,
    pub remaining_records: usize,
}

impl From<KeepPolicy> for UniqueKeepStrategy {
    fn from(keep: KeepPolicy) -> Self {
        match keep {
            KeepPolicy::First => UniqueKeepStrategy::First,
            KeepPolicy::Last => UniqueKeepStrategy::Last,
            KeepPolicy::None => UniqueKeepStrategy::None,
        }
    }
}

/// Remove duplicate rows, comparing `subset` columns (all when `None`).
///
/// Row order is preserved.
pub fn remove_duplicates(
    table: &RecordTable,
    subset: Option<&[&str]>,
    keep: KeepPolicy,
) -> Result<(RecordTable, DedupOutcome)> {
    let result = table.unique_rows(subset, keep.into())?;
    let removed = table.height() - result.height();

    if removed == 0 {
        info!("No duplicate rows found");
    } else {
        info!(
            "Removed {} duplicate records ({:.2}%)",
            removed,
            removed as f64 / table.height() as f64 * 100.0
        );
    }

    let outcome = DedupOutcome {
        original_records: table.height(),
        duplicates_removed: removed,
        remaining_records: result.height(),
    };
    Ok((result, outcome))
}
