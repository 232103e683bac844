//! Normalization factors and the catalog of plottable axis columns.
//!
//! Axis selection is a lookup in [`AxisCatalog`]; the normalized variant of
//! every catalog column is materialized by [`resolve`] so nothing is computed
//! when a consumer switches axes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::columns;
use crate::error::{Diagnostic, EtlResult};
use crate::table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NormalizationMode {
    #[serde(rename = "percapita")]
    PerCapita,
    #[serde(rename = "population_density")]
    PopulationDensity,
    #[serde(rename = "demographic_profile")]
    DemographicProfile,
}

impl NormalizationMode {
    /// Factor of every row, null where an input is missing
    pub fn factor(&self) -> Expr {
        let population = col(columns::POPULATION).cast(DataType::Float64);
        match self {
            NormalizationMode::PerCapita => lit(1_000_000.0) / population,
            NormalizationMode::PopulationDensity => {
                col(columns::AREA).cast(DataType::Float64) / (population / lit(1000.0))
            }
            NormalizationMode::DemographicProfile => lit(1.0) / col(columns::ELDERLY_SHARE).cast(DataType::Float64),
        }
    }

    pub fn wording(&self) -> &'static str {
        match self {
            NormalizationMode::PerCapita => "per million inhabitants",
            NormalizationMode::PopulationDensity => "per population density (1000 inhabitants/km²)",
            NormalizationMode::DemographicProfile => "per share of inhabitants aged 60+",
        }
    }
}

/// Human-readable description of a mode combination.
///
/// Per-capita and density wording are exclusive; per-capita wins.
pub fn describe(modes: &BTreeSet<NormalizationMode>) -> String {
    let mut parts = Vec::new();
    if modes.contains(&NormalizationMode::PerCapita) {
        parts.push(NormalizationMode::PerCapita.wording());
    } else if modes.contains(&NormalizationMode::PopulationDensity) {
        parts.push(NormalizationMode::PopulationDensity.wording());
    }
    if modes.contains(&NormalizationMode::DemographicProfile) {
        parts.push(NormalizationMode::DemographicProfile.wording());
    }
    parts.join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    Deaths,
    Cases,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Aggregation {
    Total,
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Temporality {
    /// x is the day offset since the threshold
    Temporal,
    /// x is the complementary count (cumulative against weekly)
    NonTemporal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AxisKey {
    pub metric: Metric,
    pub aggregation: Aggregation,
    pub temporality: Temporality,
    pub window: u32,
}

impl AxisKey {
    /// Short code such as `dtt7`: metric, aggregation, temporality, window
    pub fn code(&self) -> String {
        let metric = match self.metric {
            Metric::Deaths => 'd',
            Metric::Cases => 'c',
        };
        let aggregation = match self.aggregation {
            Aggregation::Total => 't',
            Aggregation::New => 'n',
        };
        let temporality = match self.temporality {
            Temporality::Temporal => 't',
            Temporality::NonTemporal => 'a',
        };
        format!("{metric}{aggregation}{temporality}{}", self.window)
    }
}

impl fmt::Display for AxisKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisEntry {
    pub raw_column: String,
    pub normalized_column: String,
    /// Title without normalization wording
    pub title: String,
    /// Whether a normalization factor applies to this axis at all
    pub normalizable: bool,
}

impl AxisEntry {
    pub fn column(&self, normalized: bool) -> &str {
        if normalized && self.normalizable {
            &self.normalized_column
        } else {
            &self.raw_column
        }
    }

    pub fn title_with(&self, normalized: bool, description: &str) -> String {
        if normalized && self.normalizable && !description.is_empty() {
            format!("{} {description}", self.title)
        } else {
            self.title.clone()
        }
    }
}

/// Every `(axis, key)` combination and its columns, built once per window set
#[derive(Debug, Clone, PartialEq)]
pub struct AxisCatalog {
    entries: BTreeMap<(Axis, AxisKey), AxisEntry>,
}

fn count_columns(metric: Metric) -> (&'static str, &'static str) {
    match metric {
        Metric::Deaths => (columns::CUMULATIVE_DEATHS, columns::DEATHS_7D),
        Metric::Cases => (columns::CUMULATIVE_CASES, columns::CASES_7D),
    }
}

fn count_title(metric: Metric, aggregation: Aggregation, window: u32) -> String {
    let noun = match metric {
        Metric::Deaths => "deaths",
        Metric::Cases => "cases",
    };
    let base = match aggregation {
        Aggregation::Total => format!("Total {noun}"),
        Aggregation::New => format!("New {noun} in the last 7 days"),
    };
    if window > 1 {
        format!("{base} ({window}-day moving average)")
    } else {
        base
    }
}

impl AxisCatalog {
    pub fn build(windows: &[u32], threshold_label: &str) -> Self {
        let mut entries = BTreeMap::new();
        for metric in [Metric::Deaths, Metric::Cases] {
            for aggregation in [Aggregation::Total, Aggregation::New] {
                for temporality in [Temporality::Temporal, Temporality::NonTemporal] {
                    for &window in windows {
                        let key = AxisKey { metric, aggregation, temporality, window };
                        let (cumulative, weekly) = count_columns(metric);
                        let (y_field, x_field, x_aggregation) = match aggregation {
                            Aggregation::Total => (cumulative, weekly, Aggregation::New),
                            Aggregation::New => (weekly, cumulative, Aggregation::Total),
                        };

                        let y_column = columns::smoothed(y_field, window);
                        entries.insert(
                            (Axis::Y, key),
                            AxisEntry {
                                normalized_column: columns::normalized(&y_column),
                                raw_column: y_column,
                                title: count_title(metric, aggregation, window),
                                normalizable: true,
                            },
                        );

                        let x_entry = match temporality {
                            Temporality::Temporal => AxisEntry {
                                raw_column: columns::DAYS_SINCE_THRESHOLD.to_string(),
                                normalized_column: columns::DAYS_SINCE_THRESHOLD.to_string(),
                                title: threshold_label.to_string(),
                                normalizable: false,
                            },
                            Temporality::NonTemporal => {
                                let x_column = columns::smoothed(x_field, window);
                                AxisEntry {
                                    normalized_column: columns::normalized(&x_column),
                                    raw_column: x_column,
                                    title: count_title(metric, x_aggregation, window),
                                    normalizable: true,
                                }
                            }
                        };
                        entries.insert((Axis::X, key), x_entry);
                    }
                }
            }
        }
        Self { entries }
    }

    pub fn get(&self, axis: Axis, key: &AxisKey) -> Option<&AxisEntry> {
        self.entries.get(&(axis, *key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct raw columns that need a normalized variant
    pub fn normalizable_columns(&self) -> BTreeSet<&str> {
        self.entries
            .values()
            .filter(|entry| entry.normalizable)
            .map(|entry| entry.raw_column.as_str())
            .collect()
    }
}

/// Table with `norm_factor` and every normalized axis column added
#[derive(Debug, Clone)]
pub struct NormalizedView {
    pub modes: BTreeSet<NormalizationMode>,
    pub table: DataFrame,
    pub description: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Columns the factors read
const FACTOR_INPUTS: [&str; 3] = [columns::POPULATION, columns::AREA, columns::ELDERLY_SHARE];

/// Per-row product of the requested factors; the empty set is the identity.
pub fn combined_factor(modes: &BTreeSet<NormalizationMode>) -> Expr {
    modes.iter().fold(lit(1.0), |acc, mode| acc * mode.factor())
}

/// Normalize every catalog column of `df` under `modes`.
///
/// Factor inputs the table lacks read as null.
pub fn resolve(df: &DataFrame, catalog: &AxisCatalog, modes: &BTreeSet<NormalizationMode>) -> EtlResult<NormalizedView> {
    let mut diagnostics = Vec::new();
    if modes.contains(&NormalizationMode::PerCapita) && modes.contains(&NormalizationMode::PopulationDensity) {
        diagnostics.push(Diagnostic::DoubleNormalization.emit());
    }

    let absent: Vec<&str> = FACTOR_INPUTS
        .into_iter()
        .filter(|name| !table::has_column(df, name))
        .collect();
    let placeholders: Vec<Expr> = absent
        .iter()
        .map(|name| lit(NULL).cast(DataType::Float64).alias(*name))
        .collect();
    let normalized: Vec<Expr> = catalog
        .normalizable_columns()
        .into_iter()
        .filter(|raw| table::has_column(df, raw))
        .map(|raw| (col(raw).cast(DataType::Float64) * col(columns::NORM_FACTOR)).alias(columns::normalized(raw)))
        .collect();

    let out = df
        .clone()
        .lazy()
        .with_columns(placeholders)
        .with_column(combined_factor(modes).alias(columns::NORM_FACTOR))
        .with_columns(normalized)
        .collect()?;

    Ok(NormalizedView {
        modes: modes.clone(),
        table: table::drop_columns(out, &absent)?,
        description: describe(modes),
        diagnostics,
    })
}

/// Resolve independent requests in parallel over the same read-only table.
pub fn resolve_many(
    df: &DataFrame,
    catalog: &AxisCatalog,
    requests: &[BTreeSet<NormalizationMode>],
) -> Vec<EtlResult<NormalizedView>> {
    requests
        .par_iter()
        .map(|modes| resolve(df, catalog, modes))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modes(list: &[NormalizationMode]) -> BTreeSet<NormalizationMode> {
        list.iter().copied().collect()
    }

    fn base() -> DataFrame {
        df! {
            columns::POPULATION => [Some(2_000_000i64), None],
            columns::AREA => [Some(500.0), Some(10.0)],
            columns::ELDERLY_SHARE => [Some(0.25), Some(0.5)],
            "cumulative_deaths_ma0" => [Some(20.0), Some(4.0)],
        }
        .unwrap()
    }

    fn factors(df: &DataFrame, modes: &BTreeSet<NormalizationMode>) -> Vec<Option<f64>> {
        let out = df
            .clone()
            .lazy()
            .with_column(combined_factor(modes).alias(columns::NORM_FACTOR))
            .collect()
            .unwrap();
        table::f64_values(&out, columns::NORM_FACTOR).unwrap()
    }

    #[test]
    fn test_factors() {
        let df = base();
        assert_eq!(factors(&df, &BTreeSet::new()), vec![Some(1.0), Some(1.0)]);
        assert_eq!(factors(&df, &modes(&[NormalizationMode::PerCapita])), vec![Some(0.5), None]);
        assert_eq!(factors(&df, &modes(&[NormalizationMode::PopulationDensity]))[0], Some(0.25));
        assert_eq!(
            factors(&df, &modes(&[NormalizationMode::DemographicProfile, NormalizationMode::PerCapita]))[0],
            Some(2.0)
        );
    }

    #[test]
    fn test_missing_factor_inputs_read_as_null() {
        let df = df! { "cumulative_deaths_ma0" => [20.0, 4.0] }.unwrap();
        let catalog = AxisCatalog::build(&[0], "days");
        let view = resolve(&df, &catalog, &modes(&[NormalizationMode::DemographicProfile])).unwrap();
        assert_eq!(
            table::f64_values(&view.table, "cumulative_deaths_ma0_norm").unwrap(),
            vec![None, None]
        );
        assert!(!table::has_column(&view.table, columns::ELDERLY_SHARE));
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(describe(&BTreeSet::new()), "");
        assert_eq!(describe(&modes(&[NormalizationMode::PerCapita])), "per million inhabitants");
        let both = modes(&[NormalizationMode::PopulationDensity, NormalizationMode::PerCapita]);
        assert_eq!(describe(&both), "per million inhabitants");
        assert_eq!(
            describe(&modes(&[NormalizationMode::DemographicProfile, NormalizationMode::PopulationDensity])),
            "per population density (1000 inhabitants/km²), per share of inhabitants aged 60+"
        );
    }

    #[test]
    fn test_double_normalization_is_flagged() {
        let catalog = AxisCatalog::build(&[0], "days");
        let both = modes(&[NormalizationMode::PerCapita, NormalizationMode::PopulationDensity]);
        let view = resolve(&base(), &catalog, &both).unwrap();
        assert_eq!(view.diagnostics, vec![Diagnostic::DoubleNormalization]);
        // both factors multiply: 0.5 * 0.25
        assert_eq!(
            table::f64_values(&view.table, columns::NORM_FACTOR).unwrap()[0],
            Some(0.125)
        );
    }

    #[test]
    fn test_resolve_adds_normalized_columns() {
        let catalog = AxisCatalog::build(&[0], "days");
        let view = resolve(&base(), &catalog, &modes(&[NormalizationMode::PerCapita])).unwrap();
        assert_eq!(
            table::f64_values(&view.table, "cumulative_deaths_ma0_norm").unwrap(),
            vec![Some(10.0), None]
        );
        assert!(view.diagnostics.is_empty());
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = AxisCatalog::build(&[0, 7], "Days since threshold");
        assert_eq!(catalog.len(), 2 * 2 * 2 * 2 * 2);

        let key = AxisKey {
            metric: Metric::Deaths,
            aggregation: Aggregation::Total,
            temporality: Temporality::NonTemporal,
            window: 7,
        };
        assert_eq!(key.code(), "dta7");
        let y = catalog.get(Axis::Y, &key).unwrap();
        let x = catalog.get(Axis::X, &key).unwrap();
        assert_eq!(y.raw_column, "cumulative_deaths_ma7");
        assert_eq!(x.raw_column, "deaths_7d_ma7");
        assert_eq!(y.column(true), "cumulative_deaths_ma7_norm");
        assert_eq!(
            y.title_with(true, "per million inhabitants"),
            "Total deaths (7-day moving average) per million inhabitants"
        );

        let temporal = AxisKey { temporality: Temporality::Temporal, ..key };
        let x = catalog.get(Axis::X, &temporal).unwrap();
        assert_eq!(x.column(true), columns::DAYS_SINCE_THRESHOLD);
        assert_eq!(x.title_with(true, "per million inhabitants"), "Days since threshold");
    }

    #[test]
    fn test_resolve_many_matches_sequential() {
        let catalog = AxisCatalog::build(&[0], "days");
        let requests = vec![
            BTreeSet::new(),
            modes(&[NormalizationMode::PerCapita]),
            modes(&[NormalizationMode::DemographicProfile]),
        ];
        let views = resolve_many(&base(), &catalog, &requests);
        assert_eq!(views.len(), 3);
        for (view, request) in views.into_iter().zip(&requests) {
            let view = view.unwrap();
            let sequential = resolve(&base(), &catalog, request).unwrap();
            assert_eq!(&view.modes, request);
            assert!(view.table.equals_missing(&sequential.table));
        }
    }

    #[test]
    fn test_modes_deserialize_from_config_names() {
        let parsed: BTreeSet<NormalizationMode> =
            serde_json::from_str(r#"["population_density", "percapita"]"#).unwrap();
        assert_eq!(parsed, modes(&[NormalizationMode::PerCapita, NormalizationMode::PopulationDensity]));
    }
}
