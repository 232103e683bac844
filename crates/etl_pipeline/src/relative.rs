//! Relative-time axis and row filters over the reconciled table.

use chrono::{Duration, NaiveDate};
use polars::prelude::*;

use crate::columns;
use crate::config::ThresholdRule;
use crate::error::EtlResult;
use crate::metrics;

/// Rows at or past the threshold, with `days_since_threshold` counted from
/// the first qualifying date of their series.
///
/// Series that never reach the threshold contribute no rows; null and `NaN`
/// values never qualify.
pub fn build_relevant_subset(df: &DataFrame, threshold: &ThresholdRule) -> EtlResult<DataFrame> {
    let value = col(threshold.column.as_str()).cast(DataType::Float64);
    let qualifies = value.clone().gt_eq(lit(threshold.value)).and(value.is_not_nan());
    let day = col(columns::DATE).cast(DataType::Int32);
    let offset = (day.clone() - day.min().over(metrics::series_keys())).cast(DataType::Int64);

    let relevant = df
        .clone()
        .lazy()
        .filter(qualifies)
        .with_column(offset.alias(columns::DAYS_SINCE_THRESHOLD))
        .collect()?;
    log::debug!(
        "Relevant subset: {} of {} rows at {} >= {}",
        relevant.height(),
        df.height(),
        threshold.column,
        threshold.value
    );
    Ok(relevant)
}

/// Rows dated on or after `reference_date - (n + 1)` days.
pub fn last_n_days(df: &DataFrame, reference_date: NaiveDate, n: u32) -> EtlResult<DataFrame> {
    let cutoff = shared::to_epoch_days(reference_date - Duration::days(i64::from(n) + 1));
    Ok(df
        .clone()
        .lazy()
        .filter(col(columns::DATE).cast(DataType::Int32).gt_eq(lit(cutoff)))
        .collect()?)
}

/// Rows of the states in the named macro-region.
pub fn filter_region(df: &DataFrame, region: &str) -> EtlResult<DataFrame> {
    let states = shared::get_states_by_region(region).map_err(shared::SharedError::from)?;
    let in_region = states
        .iter()
        .map(|state| col(columns::STATE_CODE).eq(lit(i64::from(state.code))))
        .reduce(|acc, matches| acc.or(matches))
        .unwrap_or(lit(false));
    Ok(df.clone().lazy().filter(in_region).collect()?)
}
