//! Time-series indicators computed per series.
//!
//! A series is one `(state, municipality name, municipality code)` key, so
//! municipalities published without a name stay apart by code. Every step
//! evaluates its window expressions with each series in date order and
//! hands the table back in the row order it came in.

use polars::prelude::*;

use crate::columns;
use crate::error::EtlResult;
use crate::table;

pub const WEEK: usize = 7;
const PER_MILLION: f64 = 1_000_000.0;
const PER_100K: f64 = 100_000.0;

/// Partition of the table into time series.
pub fn series_keys() -> [Expr; 3] {
    [
        col(columns::STATE_NAME),
        col(columns::MUNICIPALITY_NAME),
        col(columns::MUNICIPALITY_CODE),
    ]
}

/// Evaluate `exprs` with every series ordered by date; rows without a date
/// sort last within their series.
fn with_series_columns(df: DataFrame, exprs: Vec<Expr>) -> EtlResult<DataFrame> {
    let [state, municipality, code] = series_keys();
    let ordered = table::indexed(df).sort_by_exprs(
        [state, municipality, code, col(columns::DATE)],
        SortMultipleOptions::default()
            .with_nulls_last(true)
            .with_maintain_order(true),
    );
    table::restore_order(ordered.with_columns(exprs))
}

fn fixed_window(size: usize) -> RollingOptionsFixedWindow {
    RollingOptionsFixedWindow {
        window_size: size,
        min_periods: size,
        ..Default::default()
    }
}

/// Day offset of every row from the earliest date of the whole table.
pub fn add_days_since_start(df: DataFrame) -> EtlResult<DataFrame> {
    let day = col(columns::DATE).cast(DataType::Int32);
    Ok(df
        .lazy()
        .with_column((day.clone() - day.min()).cast(DataType::Int64).alias(columns::DAYS_SINCE_START))
        .collect()?)
}

/// First difference of a cumulative column within its series; the first
/// row and any step touching a missing value count as zero.
fn derived_increment(cumulative: &str) -> Expr {
    let total = col(cumulative).cast(DataType::Int64);
    (total.clone() - total.shift(lit(1)))
        .over(series_keys())
        .fill_null(lit(0i64))
}

/// Daily new cases and deaths.
///
/// Reported increments are used when the source carries them; cells it left
/// empty, and sources without increments, are derived from the cumulative
/// counts. The result has no nulls.
pub fn add_increments(df: DataFrame, reports_increments: bool) -> EtlResult<DataFrame> {
    let mut exprs = Vec::with_capacity(2);
    for (cumulative, reported) in [
        (columns::CUMULATIVE_CASES, columns::NEW_CASES),
        (columns::CUMULATIVE_DEATHS, columns::NEW_DEATHS),
    ] {
        let derived = derived_increment(cumulative);
        let increment = if reports_increments && table::has_values(&df, reported)? {
            col(reported).cast(DataType::Int64).fill_null(derived)
        } else {
            derived
        };
        exprs.push(increment.alias(reported));
    }
    with_series_columns(df, exprs)
}

/// Trailing 7-day sums of the daily increments, null for the first six
/// rows of every series.
pub fn add_weekly_sums(df: DataFrame) -> EtlResult<DataFrame> {
    let exprs = [
        (columns::NEW_CASES, columns::CASES_7D),
        (columns::NEW_DEATHS, columns::DEATHS_7D),
    ]
    .into_iter()
    .map(|(source, target)| {
        col(source)
            .cast(DataType::Float64)
            .rolling_sum(fixed_window(WEEK))
            .over(series_keys())
            .cast(DataType::Int64)
            .alias(target)
    })
    .collect();
    with_series_columns(df, exprs)
}

/// `value / (population / per)`, null when the population is missing or not positive.
fn per_population(value: &str, per: f64) -> Expr {
    let population = col(columns::POPULATION).cast(DataType::Float64);
    when(population.clone().gt(lit(0.0)))
        .then(col(value).cast(DataType::Float64) / (population / lit(per)))
        .otherwise(lit(NULL).cast(DataType::Float64))
}

/// Counts per million inhabitants.
pub fn add_per_million(df: DataFrame) -> EtlResult<DataFrame> {
    let exprs: Vec<Expr> = [
        (columns::NEW_CASES, columns::NEW_CASES_PER_MILLION),
        (columns::NEW_DEATHS, columns::NEW_DEATHS_PER_MILLION),
        (columns::CUMULATIVE_CASES, columns::CUMULATIVE_CASES_PER_MILLION),
        (columns::CUMULATIVE_DEATHS, columns::CUMULATIVE_DEATHS_PER_MILLION),
        (columns::CASES_7D, columns::CASES_7D_PER_MILLION),
        (columns::DEATHS_7D, columns::DEATHS_7D_PER_MILLION),
    ]
    .into_iter()
    .map(|(source, target)| per_population(source, PER_MILLION).alias(target))
    .collect();
    Ok(df.lazy().with_columns(exprs).collect()?)
}

/// Incidence and mortality per 100k inhabitants, and the case fatality ratio.
///
/// The fatality ratio of a row without cases is `NaN`.
pub fn add_rates(df: DataFrame) -> EtlResult<DataFrame> {
    let cases = col(columns::CUMULATIVE_CASES).cast(DataType::Float64);
    let deaths = col(columns::CUMULATIVE_DEATHS).cast(DataType::Float64);
    let fatality = when(cases.clone().eq(lit(0.0)))
        .then(lit(f64::NAN))
        .otherwise(deaths / cases);

    Ok(df
        .lazy()
        .with_columns([
            per_population(columns::CUMULATIVE_CASES, PER_100K).alias(columns::INCIDENCE),
            per_population(columns::CUMULATIVE_DEATHS, PER_100K).alias(columns::MORTALITY),
            fatality.alias(columns::CASE_FATALITY_RATIO),
        ])
        .collect()?)
}

/// One rolling-mean column per smoothed field and window.
pub fn add_smoothing(df: DataFrame, windows: &[u32]) -> EtlResult<DataFrame> {
    let mut exprs = Vec::with_capacity(columns::SMOOTHED_FIELDS.len() * windows.len());
    for field in columns::SMOOTHED_FIELDS {
        for &window in windows {
            let values = col(field).cast(DataType::Float64);
            let smoothed = if window <= 1 {
                values
            } else {
                values
                    .rolling_mean(fixed_window(window as usize))
                    .over(series_keys())
            };
            exprs.push(smoothed.alias(columns::smoothed(field, window)));
        }
    }
    log::debug!(
        "Smoothing: {} fields x {} windows",
        columns::SMOOTHED_FIELDS.len(),
        windows.len()
    );
    with_series_columns(df, exprs)
}
