//! Column access and frame plumbing on top of Polars DataFrames.
//!
//! Transformations are lazy expressions over whole columns. The typed
//! readers below serve diagnostics, the per-cell parsers of the schema
//! layer and the tests.

use polars::prelude::*;

use crate::error::EtlResult;

/// Position of a row in the frame a lazy plan started from
pub const ROW_INDEX: &str = "__row";
/// Helper index added by [`first_per_key`]
pub const FIRST_INDEX: &str = "__first";

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

pub fn dtype_of(df: &DataFrame, name: &str) -> EtlResult<DataType> {
    Ok(df.column(name)?.dtype().clone())
}

/// True when `name` exists and holds at least one non-null value.
pub fn has_values(df: &DataFrame, name: &str) -> EtlResult<bool> {
    if !has_column(df, name) {
        return Ok(false);
    }
    Ok(df.column(name)?.null_count() < df.height())
}

pub fn i64_values(df: &DataFrame, name: &str) -> EtlResult<Vec<Option<i64>>> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().collect())
}

pub fn f64_values(df: &DataFrame, name: &str) -> EtlResult<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

pub fn str_values(df: &DataFrame, name: &str) -> EtlResult<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Dates as days since the Unix epoch.
pub fn date_values(df: &DataFrame, name: &str) -> EtlResult<Vec<Option<i32>>> {
    let column = df.column(name)?.cast(&DataType::Int32)?;
    Ok(column.i32()?.into_iter().collect())
}

pub fn i64_column(name: &str, values: Vec<Option<i64>>) -> Column {
    Column::new(name.into(), values)
}

pub fn f64_column(name: &str, values: Vec<Option<f64>>) -> Column {
    Column::new(name.into(), values)
}

pub fn str_column(name: &str, values: Vec<Option<String>>) -> Column {
    Column::new(name.into(), values)
}

pub fn date_column(name: &str, days: Vec<Option<i32>>) -> EtlResult<Column> {
    Ok(Column::new(name.into(), days).cast(&DataType::Date)?)
}

/// Adds `column`, replacing an existing column of the same name.
pub fn set_column(df: &mut DataFrame, column: Column) -> EtlResult<()> {
    df.with_column(column)?;
    Ok(())
}

/// Rows at `indices`, in that order.
pub fn take_rows(df: &DataFrame, indices: &[usize]) -> EtlResult<DataFrame> {
    let idx: Vec<IdxSize> = indices.iter().map(|&i| i as IdxSize).collect();
    Ok(df.take(&IdxCa::from_vec("idx".into(), idx))?)
}

/// Rows where `mask` is true.
pub fn filter_rows(df: &DataFrame, mask: &[bool]) -> EtlResult<DataFrame> {
    let indices: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter_map(|(i, keep)| keep.then_some(i))
        .collect();
    take_rows(df, &indices)
}

/// Drop whichever of `names` exist in `df`.
pub fn drop_columns(df: DataFrame, names: &[&str]) -> EtlResult<DataFrame> {
    let mut df = df;
    for name in names {
        if has_column(&df, name) {
            df = df.drop(name)?;
        }
    }
    Ok(df)
}

/// Lazy view of `df` carrying its row positions in [`ROW_INDEX`].
pub fn indexed(df: DataFrame) -> LazyFrame {
    df.lazy().with_row_index(ROW_INDEX, None)
}

/// Collect a plan started by [`indexed`] back into the original row order.
pub fn restore_order(lf: LazyFrame) -> EtlResult<DataFrame> {
    let df = lf
        .sort_by_exprs([col(ROW_INDEX)], SortMultipleOptions::default())
        .collect()?;
    Ok(df.drop(ROW_INDEX)?)
}

/// Every row of `left`, with the columns of its `right` match (null if none).
pub fn left_join(left: LazyFrame, right: LazyFrame, left_on: &str, right_on: &str) -> LazyFrame {
    left.join(
        right,
        [col(left_on)],
        [col(right_on)],
        JoinArgs::new(JoinType::Left),
    )
}

/// First row, in frame order, of every distinct combination of `keys`.
///
/// The plan gains a helper index column; callers select what they keep.
pub fn first_per_key(lf: LazyFrame, keys: &[&str]) -> LazyFrame {
    let partition: Vec<Expr> = keys.iter().map(|key| col(*key)).collect();
    lf.with_row_index(FIRST_INDEX, None)
        .filter(col(FIRST_INDEX).eq(col(FIRST_INDEX).min().over(partition)))
}

/// Floor division of a non-negative integer expression by `divisor`.
pub fn int_div(value: Expr, divisor: i64) -> Expr {
    ((value.clone() - value % lit(divisor)) / lit(divisor)).cast(DataType::Int64)
}
