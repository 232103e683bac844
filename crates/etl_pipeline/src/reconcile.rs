//! Identifier reconciliation: role labels, code repair and attribute
//! backfill from the reference tables.
//!
//! Unmatched lookups never fail; the backfilled column just stays null for
//! that row and an `UnmatchedKeys` diagnostic records how many rows missed.

use polars::prelude::*;
use regex::Regex;
use shared::{NATION_CODE, NO_MUNICIPALITY_STEP, UFS};

use crate::columns::{self, Role};
use crate::error::{Diagnostic, EtlError, EtlResult};
use crate::schema;
use crate::table;

/// Reconciled table plus whatever data-quality findings the step raised
pub type Reconciled = (DataFrame, Vec<Diagnostic>);

const CANDIDATES: &str = "__candidates";
const SHORT_CODE: &str = "__short_code";
const DONOR_CODE: &str = "__donor_code";
const DONOR_HIT: &str = "__donor_hit";
const SUMMARY_STATE: &str = "__summary_state";
const SUMMARY_POPULATION: &str = "__summary_population";
const LEVEL_CODE: &str = "__level_code";
const LEVEL_VALUE: &str = "__level_value";
const LEVEL_STATE: &str = "__level_state";
const SIX_DIGIT_CODE: &str = "__six_digit_code";
const MUNICIPAL_KEY: &str = "__municipal_key";
const MUNICIPAL_VALUE: &str = "__municipal_value";
const STATE_KEY: &str = "__state_key";
const STATE_VALUE: &str = "__state_value";
const LOWER_BOUND: &str = "__lower_bound";
const ELDERLY: &str = "__elderly";
const TOTAL: &str = "__total";
const REGION_KEY: &str = "__region_key";
const REGION_LOOKUP: &str = "__region_lookup";

/// Parsed role of every row; fails if [`label_roles`] has not run.
pub fn role_values(df: &DataFrame) -> EtlResult<Vec<Role>> {
    table::str_values(df, columns::ROLE)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.as_deref().and_then(Role::parse).ok_or_else(|| {
                EtlError::schema(
                    schema::BULLETIN_TABLE,
                    columns::ROLE,
                    format!("row {row}: invalid role {value:?}"),
                )
            })
        })
        .collect()
}

fn is_role(role: Role) -> Expr {
    col(columns::ROLE).eq(lit(role.as_str()))
}

/// Six-digit form of a municipality code; other codes pass through.
fn six_digit(code: Expr) -> Expr {
    when(code.clone().gt(lit(999_999i64)))
        .then(table::int_div(code.clone(), 10))
        .otherwise(code)
}

/// State code of a six-digit municipality code, null for anything else.
fn state_of(code: Expr) -> Expr {
    when(code.clone().gt_eq(lit(100_000i64)).and(code.clone().lt(lit(1_000_000i64))))
        .then(table::int_div(code, 10_000))
        .otherwise(lit(NULL).cast(DataType::Int64))
}

/// The null pattern of a row decides its role.
///
/// A named row is a municipality. An unnamed row is the nation without a
/// state, a state summary without a code, a no-municipality bucket for
/// `SS0000`-style codes, or else a municipality whose name was not published.
fn role_expr() -> Expr {
    let code = col(columns::MUNICIPALITY_CODE).cast(DataType::Int64);
    let bucket = code
        .clone()
        .gt(lit(99_999i64))
        .and(code.clone().lt(lit(999_999i64)))
        .and((code.clone() % lit(NO_MUNICIPALITY_STEP)).eq(lit(0i64)));
    when(col(columns::STATE_NAME).is_null())
        .then(lit(Role::Nation.as_str()))
        .when(col(columns::MUNICIPALITY_NAME).is_not_null())
        .then(lit(Role::Municipality.as_str()))
        .when(code.is_null())
        .then(lit(Role::StateSummary.as_str()))
        .when(bucket)
        .then(lit(Role::NoMunicipality.as_str()))
        .otherwise(lit(Role::Municipality.as_str()))
}

/// Label every row with its [`Role`] and give summary rows display names.
///
/// Tables that already carry a role column are returned unchanged.
pub fn label_roles(df: DataFrame) -> EtlResult<DataFrame> {
    if table::has_column(&df, columns::ROLE) {
        return Ok(df);
    }
    let nation = is_role(Role::Nation);
    let state_code = col(columns::STATE_CODE).cast(DataType::Int64);

    let df = df
        .lazy()
        .with_column(role_expr().alias(columns::ROLE))
        .with_columns([
            when(nation.clone())
                .then(lit(columns::NATION_DISPLAY_NAME))
                .otherwise(col(columns::STATE_NAME))
                .alias(columns::STATE_NAME),
            when(nation.clone())
                .then(lit(columns::NATION_DISPLAY_NAME))
                .when(is_role(Role::StateSummary))
                .then(lit(columns::SUMMARY_DISPLAY_NAME))
                .when(is_role(Role::NoMunicipality))
                .then(lit(columns::NO_MUNICIPALITY_DISPLAY_NAME))
                .otherwise(col(columns::MUNICIPALITY_NAME))
                .alias(columns::MUNICIPALITY_NAME),
            when(nation)
                .then(state_code.clone().fill_null(lit(NATION_CODE)))
                .otherwise(state_code)
                .alias(columns::STATE_CODE),
        ])
        .collect()?;

    if log::log_enabled!(log::Level::Debug) {
        let roles = role_values(&df)?;
        let count = |role: Role| roles.iter().filter(|r| **r == role).count();
        log::debug!(
            "Labeled roles: {} nation, {} state summary, {} municipality, {} no-municipality",
            count(Role::Nation),
            count(Role::StateSummary),
            count(Role::Municipality),
            count(Role::NoMunicipality),
        );
    }
    Ok(df)
}

/// Keys of `counts` (a `(key, __candidates)` frame) seen more than once.
fn ambiguity_diagnostics(step: &str, counts: LazyFrame, key: &str) -> EtlResult<Vec<Diagnostic>> {
    let ambiguous = counts
        .filter(col(CANDIDATES).gt(lit(1)))
        .sort_by_exprs([col(key)], SortMultipleOptions::default())
        .collect()?;
    let keys = table::i64_values(&ambiguous, key)?;
    let candidates = table::i64_values(&ambiguous, CANDIDATES)?;
    Ok(keys
        .into_iter()
        .zip(candidates)
        .filter_map(|(key, count)| key.zip(count))
        .map(|(key, count)| {
            Diagnostic::JoinAmbiguity {
                step: step.to_string(),
                key,
                candidates: count as usize,
            }
            .emit()
        })
        .collect())
}

fn unmatched(step: &str, df: &DataFrame, column: &str) -> EtlResult<Vec<Diagnostic>> {
    let rows = df.column(column)?.null_count();
    Ok(if rows > 0 {
        vec![Diagnostic::UnmatchedKeys { step: step.to_string(), rows }.emit()]
    } else {
        Vec::new()
    })
}

/// Attributes copied from a known municipality onto rows that lack them
const REPAIRED_ATTRIBUTES: [&str; 4] = [
    columns::MUNICIPALITY_NAME,
    columns::HEALTH_REGION_CODE,
    columns::HEALTH_REGION_NAME,
    columns::POPULATION,
];

fn donor_column(attribute: &str) -> String {
    format!("__donor_{attribute}")
}

/// Repair municipality codes published without their last digit.
///
/// Named municipality rows form a lookup keyed by their code; the first row
/// of a code is its donor. Every row is joined on `municipality_code / 10`
/// and attributes it lacks are taken from the donor. Each
/// `(state, municipality)` then keeps the largest code it was recorded under.
pub fn repair_truncated_codes(df: DataFrame) -> EtlResult<Reconciled> {
    let code = col(columns::MUNICIPALITY_CODE);
    let known = df.clone().lazy().filter(
        is_role(Role::Municipality)
            .and(code.clone().is_not_null())
            .and(col(columns::MUNICIPALITY_NAME).is_not_null()),
    );

    let counts = known
        .clone()
        .group_by([code.clone()])
        .agg([col(columns::MUNICIPALITY_NAME).n_unique().alias(CANDIDATES)]);
    let diagnostics = ambiguity_diagnostics("repair_truncated_codes", counts, columns::MUNICIPALITY_CODE)?;

    let attributes: Vec<&str> = REPAIRED_ATTRIBUTES
        .into_iter()
        .filter(|name| table::has_column(&df, name))
        .collect();
    let mut donor_exprs = vec![code.clone().alias(DONOR_CODE), lit(true).alias(DONOR_HIT)];
    donor_exprs.extend(attributes.iter().map(|name| col(*name).alias(donor_column(name))));
    let donors = table::first_per_key(known, &[columns::MUNICIPALITY_CODE]).select(donor_exprs);

    let fills: Vec<Expr> = attributes
        .iter()
        .map(|name| col(*name).fill_null(col(donor_column(name))).alias(*name))
        .collect();
    let named = is_role(Role::Municipality)
        .and(col(columns::STATE_NAME).is_not_null())
        .and(col(columns::MUNICIPALITY_NAME).is_not_null());
    let canonical = when(is_role(Role::Municipality))
        .then(code.clone())
        .otherwise(lit(NULL).cast(DataType::Int64))
        .max()
        .over([col(columns::STATE_NAME), col(columns::MUNICIPALITY_NAME)]);
    let consolidated = when(named)
        .then(canonical.fill_null(code.clone()))
        .otherwise(code.clone())
        .alias(columns::MUNICIPALITY_CODE);

    let original = table::i64_values(&df, columns::MUNICIPALITY_CODE)?;
    let left = table::indexed(df).with_column(table::int_div(code, 10).alias(SHORT_CODE));
    let repaired = table::left_join(left, donors, SHORT_CODE, DONOR_CODE)
        .with_columns(fills)
        .with_column(consolidated);
    let repaired = table::restore_order(repaired)?;

    let joined = repaired.height() - repaired.column(DONOR_HIT)?.null_count();
    let changed = table::i64_values(&repaired, columns::MUNICIPALITY_CODE)?
        .iter()
        .zip(&original)
        .filter(|(after, before)| after != before)
        .count();
    log::debug!("Truncated-code repair: {joined} rows joined, {changed} codes consolidated");

    let donor_names: Vec<String> = attributes.iter().map(|name| donor_column(name)).collect();
    let mut helpers = vec![SHORT_CODE, DONOR_CODE, DONOR_HIT];
    helpers.extend(donor_names.iter().map(String::as_str));
    Ok((table::drop_columns(repaired, &helpers)?, diagnostics))
}

/// Right-aligned population figure in a scraped value: digit groups joined
/// by the thousands separator, or a plain number, with any fractional part
/// ignored.
fn population_pattern(thousands_separator: char) -> EtlResult<Regex> {
    let separator = regex::escape(&thousands_separator.to_string());
    Regex::new(&format!(
        r"(?:^|\D)(\d{{1,3}}(?:{separator}\d{{3}})+|\d+)(?:[.,]\d+)?\D*$"
    ))
    .map_err(|err| EtlError::config(format!("invalid thousands separator: {err}")))
}

/// Parse a population cell such as `"45.919.049"`, `"(*)33.894"` or `"33894.0"`.
pub fn parse_population(value: &str, pattern: &Regex, thousands_separator: char) -> Option<i64> {
    let caps = pattern.captures(value)?;
    let digits: String = caps[1].chars().filter(|c| *c != thousands_separator).collect();
    digits.parse().ok()
}

/// Population as `Int64`, repaired from its scraped text form.
///
/// Rows still missing a population take the one of their state's summary
/// row, joined on state code.
pub fn repair_population(df: DataFrame, thousands_separator: char) -> EtlResult<Reconciled> {
    let mut df = df;
    let dtype = table::dtype_of(&df, columns::POPULATION)?;
    if !(dtype.is_integer() || dtype.is_float()) {
        let pattern = population_pattern(thousands_separator)?;
        let parsed = table::str_values(&df, columns::POPULATION)?
            .iter()
            .map(|value| {
                value
                    .as_deref()
                    .and_then(|v| parse_population(v, &pattern, thousands_separator))
            })
            .collect();
        table::set_column(&mut df, table::i64_column(columns::POPULATION, parsed))?;
    }

    let population = col(columns::POPULATION).cast(DataType::Int64);
    let summaries = df.clone().lazy().filter(
        is_role(Role::StateSummary)
            .and(col(columns::STATE_CODE).is_not_null())
            .and(population.clone().is_not_null()),
    );
    let summaries = table::first_per_key(summaries, &[columns::STATE_CODE]).select([
        col(columns::STATE_CODE).alias(SUMMARY_STATE),
        population.clone().alias(SUMMARY_POPULATION),
    ]);

    let repaired = table::left_join(table::indexed(df), summaries, columns::STATE_CODE, SUMMARY_STATE)
        .with_column(population.fill_null(col(SUMMARY_POPULATION)).alias(columns::POPULATION));
    let repaired = table::drop_columns(table::restore_order(repaired)?, &[SUMMARY_STATE, SUMMARY_POPULATION])?;

    let diagnostics = unmatched("repair_population", &repaired, columns::POPULATION)?;
    Ok((repaired, diagnostics))
}

/// A reference measure by municipality, by state and for the whole country.
///
/// The per-level frames hold one `(code, value)` row per key; municipal
/// codes are in their six-digit form.
#[derive(Debug, Clone)]
pub struct LevelValues {
    pub municipal: DataFrame,
    pub state: DataFrame,
    pub national: Option<f64>,
}

fn value_of(level: &DataFrame, code: i64) -> EtlResult<Option<f64>> {
    let matched = level
        .clone()
        .lazy()
        .filter(col(LEVEL_CODE).eq(lit(code)))
        .collect()?;
    Ok(table::f64_values(&matched, LEVEL_VALUE)?.into_iter().flatten().next())
}

impl LevelValues {
    pub fn municipal_value(&self, code: i64) -> EtlResult<Option<f64>> {
        value_of(&self.municipal, shared::six_digit_code(code))
    }

    pub fn state_value(&self, code: i64) -> EtlResult<Option<f64>> {
        value_of(&self.state, code)
    }
}

/// Sum the municipal `(code, value)` rows of `municipal` up to their states.
fn state_sums(municipal: &DataFrame) -> EtlResult<DataFrame> {
    Ok(municipal
        .clone()
        .lazy()
        .with_column(state_of(col(LEVEL_CODE)).alias(LEVEL_STATE))
        .filter(col(LEVEL_STATE).is_not_null())
        .group_by([col(LEVEL_STATE)])
        .agg([col(LEVEL_VALUE).sum()])
        .select([col(LEVEL_STATE).alias(LEVEL_CODE), col(LEVEL_VALUE)])
        .sort_by_exprs([col(LEVEL_CODE)], SortMultipleOptions::default())
        .collect()?)
}

/// Build area [`LevelValues`] from a normalized area table.
///
/// State areas are the sums of their municipalities and the national area
/// is the sum of the state areas. A code listed twice keeps its first area.
pub fn aggregate_areas(areas: &DataFrame) -> EtlResult<(LevelValues, Vec<Diagnostic>)> {
    let valid = areas
        .clone()
        .lazy()
        .filter(col(columns::CODE).is_not_null().and(col(columns::AREA_KM2).is_not_null()))
        .with_column(six_digit(col(columns::CODE).cast(DataType::Int64)).alias(LEVEL_CODE));

    let counts = valid
        .clone()
        .group_by([col(LEVEL_CODE)])
        .agg([col(columns::AREA_KM2).count().alias(CANDIDATES)]);
    let diagnostics = ambiguity_diagnostics("aggregate_areas", counts, LEVEL_CODE)?;

    let municipal = table::first_per_key(valid, &[LEVEL_CODE])
        .select([
            col(LEVEL_CODE),
            col(columns::AREA_KM2).cast(DataType::Float64).alias(LEVEL_VALUE),
        ])
        .collect()?;
    let state = state_sums(&municipal)?;
    let national = state
        .clone()
        .lazy()
        .select([col(LEVEL_VALUE).sum()])
        .collect()?;
    let national = table::f64_values(&national, LEVEL_VALUE)?.into_iter().flatten().next().unwrap_or(0.0);

    log::debug!(
        "Area index: {} municipalities, {} states, national area {:.1} km2",
        municipal.height(),
        state.height(),
        national
    );
    Ok((LevelValues { municipal, state, national: Some(national) }, diagnostics))
}

/// Join a level measure onto every bulletin row as `target`.
///
/// Municipal matches go through the six-digit code; rows without one fall
/// back to their state. The nation takes the national value.
fn backfill_levels(df: DataFrame, levels: &LevelValues, target: &str, step: &str) -> EtlResult<Reconciled> {
    let municipal = levels
        .municipal
        .clone()
        .lazy()
        .select([col(LEVEL_CODE).alias(MUNICIPAL_KEY), col(LEVEL_VALUE).alias(MUNICIPAL_VALUE)]);
    let state = levels
        .state
        .clone()
        .lazy()
        .select([col(LEVEL_CODE).alias(STATE_KEY), col(LEVEL_VALUE).alias(STATE_VALUE)]);
    let national = match levels.national {
        Some(value) => lit(value),
        None => lit(NULL).cast(DataType::Float64),
    };

    let left = table::indexed(df)
        .with_column(six_digit(col(columns::MUNICIPALITY_CODE).cast(DataType::Int64)).alias(SIX_DIGIT_CODE));
    let joined = table::left_join(left, municipal, SIX_DIGIT_CODE, MUNICIPAL_KEY);
    let joined = table::left_join(joined, state, columns::STATE_CODE, STATE_KEY);
    let value = when(is_role(Role::Nation).or(col(columns::STATE_CODE).eq(lit(NATION_CODE))))
        .then(national)
        .otherwise(col(MUNICIPAL_VALUE).fill_null(col(STATE_VALUE)))
        .alias(target);

    let out = table::restore_order(joined.with_column(value))?;
    let out = table::drop_columns(out, &[SIX_DIGIT_CODE, MUNICIPAL_KEY, MUNICIPAL_VALUE, STATE_KEY, STATE_VALUE])?;
    let diagnostics = unmatched(step, &out, target)?;
    Ok((out, diagnostics))
}

/// Join areas onto every bulletin row.
pub fn backfill_area(df: DataFrame, levels: &LevelValues) -> EtlResult<Reconciled> {
    backfill_levels(df, levels, columns::AREA, "backfill_area")
}

/// Lower bound, in years, of the bands counted as elderly
pub const ELDERLY_AGE: u32 = 60;

/// `df` with the lower bound of its age band in a helper column.
fn with_lower_bound(df: &DataFrame) -> EtlResult<DataFrame> {
    let bounds = table::str_values(df, columns::AGE_BAND)?
        .into_iter()
        .map(|band| band.as_deref().and_then(schema::age_band_lower_bound).map(i64::from))
        .collect();
    let mut df = df.clone();
    table::set_column(&mut df, table::i64_column(LOWER_BOUND, bounds))?;
    Ok(df)
}

/// Elderly over total population, null without population.
fn share() -> Expr {
    when(col(TOTAL).gt(lit(0i64)))
        .then(col(ELDERLY).cast(DataType::Float64) / col(TOTAL).cast(DataType::Float64))
        .otherwise(lit(NULL).cast(DataType::Float64))
}

fn elderly_and_total() -> [Expr; 2] {
    let population = col(columns::POPULATION).cast(DataType::Int64).fill_null(lit(0i64));
    [
        when(col(LOWER_BOUND).gt_eq(lit(i64::from(ELDERLY_AGE))))
            .then(population.clone())
            .otherwise(lit(0i64))
            .alias(ELDERLY),
        population.alias(TOTAL),
    ]
}

fn single_value(lf: LazyFrame) -> EtlResult<Option<f64>> {
    let df = lf.select([share().alias(LEVEL_VALUE)]).collect()?;
    Ok(table::f64_values(&df, LEVEL_VALUE)?.into_iter().flatten().next())
}

/// Build elderly-share [`LevelValues`] from a normalized long age table.
///
/// State and national shares are ratios of summed populations, so each
/// municipality weighs in proportion to its population. Repeated
/// `(code, age_band)` rows keep the first value.
pub fn aggregate_elderly_share(age_structure: &DataFrame) -> EtlResult<LevelValues> {
    let valid = with_lower_bound(age_structure)?
        .lazy()
        .filter(col(columns::CODE).is_not_null().and(col(columns::AGE_BAND).is_not_null()))
        .with_column(six_digit(col(columns::CODE).cast(DataType::Int64)).alias(LEVEL_CODE));
    let [elderly, total] = elderly_and_total();

    let totals = table::first_per_key(valid, &[LEVEL_CODE, columns::AGE_BAND])
        .select([col(LEVEL_CODE), elderly, total])
        .group_by([col(LEVEL_CODE)])
        .agg([col(ELDERLY).sum(), col(TOTAL).sum()])
        .collect()?;

    let municipal = totals
        .clone()
        .lazy()
        .filter(col(TOTAL).gt(lit(0i64)))
        .select([col(LEVEL_CODE), share().alias(LEVEL_VALUE)])
        .sort_by_exprs([col(LEVEL_CODE)], SortMultipleOptions::default())
        .collect()?;
    let state = totals
        .clone()
        .lazy()
        .with_column(state_of(col(LEVEL_CODE)).alias(LEVEL_STATE))
        .filter(col(LEVEL_STATE).is_not_null())
        .group_by([col(LEVEL_STATE)])
        .agg([col(ELDERLY).sum(), col(TOTAL).sum()])
        .filter(col(TOTAL).gt(lit(0i64)))
        .select([col(LEVEL_STATE).alias(LEVEL_CODE), share().alias(LEVEL_VALUE)])
        .sort_by_exprs([col(LEVEL_CODE)], SortMultipleOptions::default())
        .collect()?;
    let national = single_value(totals.lazy().select([col(ELDERLY).sum(), col(TOTAL).sum()]))?;

    Ok(LevelValues { municipal, state, national })
}

/// National elderly share from the single-age national table.
pub fn national_elderly_share(national_age: &DataFrame) -> EtlResult<Option<f64>> {
    let [elderly, total] = elderly_and_total();
    single_value(
        with_lower_bound(national_age)?
            .lazy()
            .select([elderly.sum().alias(ELDERLY), total.sum().alias(TOTAL)]),
    )
}

/// Join the elderly share onto every bulletin row.
pub fn backfill_demographics(df: DataFrame, levels: &LevelValues) -> EtlResult<Reconciled> {
    backfill_levels(df, levels, columns::ELDERLY_SHARE, "backfill_demographics")
}

/// Fill missing region names from the state code.
pub fn backfill_regions(df: DataFrame) -> EtlResult<DataFrame> {
    let mut df = df;
    if !table::has_column(&df, columns::REGION_NAME) {
        let nulls = Column::full_null(columns::REGION_NAME.into(), df.height(), &DataType::String);
        table::set_column(&mut df, nulls)?;
    }

    let mut states: Vec<_> = UFS.values().collect();
    states.sort_by_key(|state| state.code);
    let lookup = DataFrame::new(vec![
        table::i64_column(REGION_KEY, states.iter().map(|state| Some(i64::from(state.code))).collect()),
        table::str_column(
            REGION_LOOKUP,
            states.iter().map(|state| Some(state.region.name().to_string())).collect(),
        ),
    ])?;

    let region = col(columns::REGION_NAME).cast(DataType::String).fill_null(
        when(is_role(Role::Nation))
            .then(lit(columns::NATION_DISPLAY_NAME))
            .otherwise(col(REGION_LOOKUP)),
    );
    let joined = table::left_join(table::indexed(df), lookup.lazy(), columns::STATE_CODE, REGION_KEY)
        .with_column(region.alias(columns::REGION_NAME));
    table::drop_columns(table::restore_order(joined)?, &[REGION_KEY, REGION_LOOKUP])
}

/// Legend name of every row: municipality, state or "Brazil".
pub fn assign_location(df: DataFrame) -> EtlResult<DataFrame> {
    let location = when(is_role(Role::Nation))
        .then(lit(columns::NATION_DISPLAY_NAME))
        .when(is_role(Role::StateSummary))
        .then(col(columns::STATE_NAME))
        .otherwise(col(columns::MUNICIPALITY_NAME));
    Ok(df.lazy().with_column(location.alias(columns::LOCATION)).collect()?)
}

/// Keep the first row of every `(state_code, municipality_code, date)` key
/// and sort by that key.
pub fn deduplicate_and_sort(df: DataFrame) -> EtlResult<Reconciled> {
    let height = df.height();
    let keys = [columns::STATE_CODE, columns::MUNICIPALITY_CODE, columns::DATE];
    let deduplicated = table::first_per_key(df.lazy(), &keys)
        .sort_by_exprs(
            keys.map(col),
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;
    let deduplicated = table::drop_columns(deduplicated, &[table::FIRST_INDEX])?;

    let dropped = height - deduplicated.height();
    let diagnostics = if dropped > 0 {
        vec![Diagnostic::DuplicateKeys { dropped }.emit()]
    } else {
        Vec::new()
    };
    Ok((deduplicated, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled() -> DataFrame {
        let df = df! {
            columns::STATE_NAME => [None, Some("SP"), Some("SP"), Some("SP"), Some("SP")],
            columns::MUNICIPALITY_NAME => [None, None, None, Some("Adamantina"), None],
            columns::STATE_CODE => [Some(76i64), Some(35), Some(35), Some(35), Some(35)],
            columns::MUNICIPALITY_CODE => [None, None, Some(350000i64), Some(350010), Some(3500204)],
        }
        .unwrap();
        label_roles(df).unwrap()
    }

    fn close(value: Option<f64>, expected: f64) -> bool {
        value.is_some_and(|v| (v - expected).abs() < 1e-9)
    }

    #[test]
    fn test_roles_partition_rows() {
        let df = labeled();
        assert_eq!(
            role_values(&df).unwrap(),
            vec![
                Role::Nation,
                Role::StateSummary,
                Role::NoMunicipality,
                Role::Municipality,
                Role::Municipality,
            ]
        );
        assert_eq!(
            table::str_values(&df, columns::MUNICIPALITY_NAME).unwrap(),
            vec![
                Some("Brazil".to_string()),
                Some("SUMMARY".to_string()),
                Some("NO-MUNICIPALITY".to_string()),
                Some("Adamantina".to_string()),
                None,
            ]
        );
        assert_eq!(table::str_values(&df, columns::STATE_NAME).unwrap()[0].as_deref(), Some("Brazil"));
        // only six-digit codes can mark the no-municipality bucket
        let unnamed = df! {
            columns::STATE_NAME => ["SP", "SP"],
            columns::MUNICIPALITY_NAME => [None::<&str>, None],
            columns::STATE_CODE => [35i64, 35],
            columns::MUNICIPALITY_CODE => [3500000i64, 350010],
        }
        .unwrap();
        assert_eq!(
            role_values(&label_roles(unnamed).unwrap()).unwrap(),
            vec![Role::Municipality, Role::Municipality]
        );
        // idempotent
        assert!(label_roles(df.clone()).unwrap().equals_missing(&df));
    }

    #[test]
    fn test_nation_gets_its_code() {
        let df = df! {
            columns::STATE_NAME => [None::<&str>],
            columns::MUNICIPALITY_NAME => [None::<&str>],
            columns::STATE_CODE => [None::<i64>],
            columns::MUNICIPALITY_CODE => [None::<i64>],
        }
        .unwrap();
        let df = label_roles(df).unwrap();
        assert_eq!(table::i64_values(&df, columns::STATE_CODE).unwrap(), vec![Some(NATION_CODE)]);
    }

    #[test]
    fn test_truncated_codes_are_repaired() {
        let df = df! {
            columns::STATE_NAME => ["SP", "SP", "SP"],
            columns::MUNICIPALITY_NAME => [Some("Adamantina"), None, Some("Adamantina")],
            columns::STATE_CODE => [35i64, 35, 35],
            columns::MUNICIPALITY_CODE => [350010i64, 3500105, 350010],
            columns::HEALTH_REGION_CODE => [Some(35091i64), None, Some(35091)],
            columns::POPULATION => [Some("33894"), None, Some("33894")],
        }
        .unwrap();
        let (df, diagnostics) = repair_truncated_codes(label_roles(df).unwrap()).unwrap();

        assert!(diagnostics.is_empty());
        assert_eq!(
            table::i64_values(&df, columns::MUNICIPALITY_CODE).unwrap(),
            vec![Some(3500105); 3]
        );
        assert_eq!(
            table::str_values(&df, columns::MUNICIPALITY_NAME).unwrap()[1].as_deref(),
            Some("Adamantina")
        );
        assert_eq!(table::i64_values(&df, columns::HEALTH_REGION_CODE).unwrap()[1], Some(35091));
        assert_eq!(table::dtype_of(&df, columns::POPULATION).unwrap(), DataType::String);
        assert_eq!(
            table::column_names(&df),
            vec![
                columns::STATE_NAME,
                columns::MUNICIPALITY_NAME,
                columns::STATE_CODE,
                columns::MUNICIPALITY_CODE,
                columns::HEALTH_REGION_CODE,
                columns::POPULATION,
                columns::ROLE,
            ]
        );
        for code in table::i64_values(&df, columns::MUNICIPALITY_CODE).unwrap().into_iter().flatten() {
            assert_eq!(shared::state_prefix(code), Some(35));
        }
    }

    #[test]
    fn test_conflicting_donors_keep_the_first() {
        let df = df! {
            columns::STATE_NAME => ["SP", "SP", "SP"],
            columns::MUNICIPALITY_NAME => [Some("Adamantina"), Some("Adamantina Velha"), None],
            columns::STATE_CODE => [35i64, 35, 35],
            columns::MUNICIPALITY_CODE => [350010i64, 350010, 3500105],
            columns::HEALTH_REGION_CODE => [Some(35091i64), Some(35092), None],
        }
        .unwrap();
        let (df, diagnostics) = repair_truncated_codes(label_roles(df).unwrap()).unwrap();

        assert_eq!(
            diagnostics,
            vec![Diagnostic::JoinAmbiguity {
                step: "repair_truncated_codes".to_string(),
                key: 350010,
                candidates: 2,
            }]
        );
        assert_eq!(df.height(), 3);
        assert_eq!(
            table::str_values(&df, columns::MUNICIPALITY_NAME).unwrap()[2].as_deref(),
            Some("Adamantina")
        );
        assert_eq!(table::i64_values(&df, columns::HEALTH_REGION_CODE).unwrap()[2], Some(35091));
        assert_eq!(
            table::i64_values(&df, columns::MUNICIPALITY_CODE).unwrap(),
            vec![Some(3500105), Some(350010), Some(3500105)]
        );
    }

    #[test]
    fn test_population_is_parsed_and_backfilled() {
        let pattern = population_pattern('.').unwrap();
        assert_eq!(parse_population("45.919.049", &pattern, '.'), Some(45_919_049));
        assert_eq!(parse_population("(*)33.894", &pattern, '.'), Some(33_894));
        assert_eq!(parse_population("n/a", &pattern, '.'), None);

        let df = labeled()
            .hstack(&[Column::new(
                columns::POPULATION.into(),
                [Some("210.147.125"), Some("45.919.049"), None, Some("33.894"), None],
            )])
            .unwrap();
        let (df, diagnostics) = repair_population(df, '.').unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(
            table::i64_values(&df, columns::POPULATION).unwrap(),
            vec![
                Some(210_147_125),
                Some(45_919_049),
                Some(45_919_049),
                Some(33_894),
                Some(45_919_049),
            ]
        );
        assert_eq!(df.width(), 6);
    }

    #[test]
    fn test_population_with_decimal_suffix() {
        let pattern = population_pattern('.').unwrap();
        assert_eq!(parse_population("33894.0", &pattern, '.'), Some(33_894));
        assert_eq!(parse_population("(*)33894.0 ", &pattern, '.'), Some(33_894));
        assert_eq!(parse_population("1.234.567,0", &pattern, '.'), Some(1_234_567));
    }

    #[test]
    fn test_area_sums_roll_up() {
        let areas = df! {
            columns::CODE => [3500105i64, 3500204, 3300100],
            columns::AREA_KM2 => [411.0, 211.0, 100.0],
        }
        .unwrap();
        let (levels, diagnostics) = aggregate_areas(&areas).unwrap();
        assert!(diagnostics.is_empty());
        assert!(close(levels.state_value(35).unwrap(), 622.0));
        assert!(close(levels.national, 722.0));
        assert!(close(levels.municipal_value(3500105).unwrap(), 411.0));

        let (df, _) = backfill_area(labeled(), &levels).unwrap();
        assert_eq!(
            table::f64_values(&df, columns::AREA).unwrap(),
            vec![Some(722.0), Some(622.0), Some(622.0), Some(411.0), Some(211.0)]
        );
        assert_eq!(df.width(), labeled().width() + 1);
    }

    #[test]
    fn test_duplicate_area_codes_keep_the_first() {
        let areas = df! {
            columns::CODE => [3500105i64, 350010, 3300100],
            columns::AREA_KM2 => [411.0, 999.0, 100.0],
        }
        .unwrap();
        let (levels, diagnostics) = aggregate_areas(&areas).unwrap();
        assert_eq!(
            diagnostics,
            vec![Diagnostic::JoinAmbiguity {
                step: "aggregate_areas".to_string(),
                key: 350010,
                candidates: 2,
            }]
        );
        assert!(close(levels.municipal_value(350010).unwrap(), 411.0));
        assert!(close(levels.state_value(35).unwrap(), 411.0));
        assert!(close(levels.national, 511.0));
    }

    #[test]
    fn test_unmatched_area_stays_null() {
        let (levels, _) = aggregate_areas(&df! {
            columns::CODE => [3300100i64],
            columns::AREA_KM2 => [100.0],
        }
        .unwrap())
        .unwrap();
        let (df, diagnostics) = backfill_area(labeled(), &levels).unwrap();
        assert_eq!(table::f64_values(&df, columns::AREA).unwrap()[3], None);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::UnmatchedKeys { step: "backfill_area".to_string(), rows: 4 }]
        );
    }

    #[test]
    fn test_elderly_share_is_population_weighted() {
        let ages = df! {
            columns::CODE => [350010i64, 350010, 350020, 350020],
            columns::AGE_BAND => ["0_59", "60_69", "0_59", "80+"],
            columns::POPULATION => [90i64, 10, 700, 300],
        }
        .unwrap();
        let levels = aggregate_elderly_share(&ages).unwrap();
        assert!(close(levels.municipal_value(350010).unwrap(), 0.1));
        assert!(close(levels.municipal_value(350020).unwrap(), 0.3));
        // (10 + 300) / (100 + 1000), not the mean of 0.1 and 0.3
        let state = levels.state_value(35).unwrap();
        assert!(close(state, 310.0 / 1100.0));
        assert!(close(levels.national, 310.0 / 1100.0));

        let (df, _) = backfill_demographics(labeled(), &levels).unwrap();
        let shares = table::f64_values(&df, columns::ELDERLY_SHARE).unwrap();
        assert!(close(shares[3], 0.1));
        // 7-digit code matched through its 6-digit form
        assert!(close(shares[4], 0.3));
        // summary and no-municipality rows fall back to the state
        assert_eq!(shares[1], state);
        assert_eq!(shares[2], state);
    }

    #[test]
    fn test_repeated_age_bands_keep_the_first() {
        let ages = df! {
            columns::CODE => [350010i64, 350010, 350010],
            columns::AGE_BAND => ["0_59", "60_69", "60_69"],
            columns::POPULATION => [90i64, 10, 500],
        }
        .unwrap();
        let levels = aggregate_elderly_share(&ages).unwrap();
        assert!(close(levels.municipal_value(350010).unwrap(), 0.1));
    }

    #[test]
    fn test_national_elderly_share() {
        let national = df! {
            columns::AGE_BAND => ["0", "59", "60", "100+"],
            columns::POPULATION => [500i64, 300, 150, 50],
        }
        .unwrap();
        assert!(close(national_elderly_share(&national).unwrap(), 0.2));

        let empty = df! {
            columns::AGE_BAND => ["0"],
            columns::POPULATION => [0i64],
        }
        .unwrap();
        assert_eq!(national_elderly_share(&empty).unwrap(), None);
    }

    #[test]
    fn test_regions_and_locations() {
        let df = assign_location(backfill_regions(labeled()).unwrap()).unwrap();
        assert_eq!(
            table::str_values(&df, columns::REGION_NAME).unwrap()[..2],
            [Some("Brazil".to_string()), Some("Sudeste".to_string())]
        );
        assert_eq!(
            table::str_values(&df, columns::LOCATION).unwrap()[..4],
            [
                Some("Brazil".to_string()),
                Some("SP".to_string()),
                Some("NO-MUNICIPALITY".to_string()),
                Some("Adamantina".to_string()),
            ]
        );
    }

    #[test]
    fn test_duplicate_keys_keep_first() {
        let mut df = df! {
            columns::STATE_CODE => [35i64, 35, 35],
            columns::MUNICIPALITY_CODE => [350010i64, 350010, 350010],
            columns::CUMULATIVE_CASES => [2i64, 1, 9],
        }
        .unwrap();
        table::set_column(&mut df, table::date_column(columns::DATE, vec![Some(2), Some(1), Some(2)]).unwrap()).unwrap();
        let (df, diagnostics) = deduplicate_and_sort(df).unwrap();
        assert_eq!(table::i64_values(&df, columns::CUMULATIVE_CASES).unwrap(), vec![Some(1), Some(2)]);
        assert_eq!(diagnostics, vec![Diagnostic::DuplicateKeys { dropped: 1 }]);
        assert_eq!(df.width(), 4);
    }
}
