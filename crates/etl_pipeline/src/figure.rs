//! Seam between the pipeline output and chart-building consumers.

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::columns::{self, Role};
use crate::error::{EtlError, EtlResult};
use crate::normalize::{
    Aggregation, Axis, AxisCatalog, AxisKey, Metric, NormalizationMode, NormalizedView, Temporality,
};
use crate::{reconcile, table};

/// Which axes receive the normalization factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizedAxes {
    X,
    Y,
    Xy,
}

impl NormalizedAxes {
    pub fn includes(&self, axis: Axis) -> bool {
        matches!(
            (self, axis),
            (NormalizedAxes::Xy, _) | (NormalizedAxes::X, Axis::X) | (NormalizedAxes::Y, Axis::Y)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureOptions {
    pub metric: Metric,
    pub aggregation: Aggregation,
    pub temporality: Temporality,
    pub window: u32,
    pub normalization: BTreeSet<NormalizationMode>,
    pub normalized_axes: NormalizedAxes,
}

impl Default for FigureOptions {
    fn default() -> Self {
        Self {
            metric: Metric::Deaths,
            aggregation: Aggregation::Total,
            temporality: Temporality::Temporal,
            window: 7,
            normalization: [NormalizationMode::PerCapita].into_iter().collect(),
            normalized_axes: NormalizedAxes::Y,
        }
    }
}

impl FigureOptions {
    pub fn key(&self) -> AxisKey {
        AxisKey {
            metric: self.metric,
            aggregation: self.aggregation,
            temporality: self.temporality,
            window: self.window,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSelection {
    pub x_column: String,
    pub y_column: String,
    pub x_title: String,
    pub y_title: String,
}

/// Column names and titles for `options`, looked up in `catalog`.
pub fn select_axes(catalog: &AxisCatalog, options: &FigureOptions, description: &str) -> EtlResult<AxisSelection> {
    let key = options.key();
    let entry = |axis| {
        catalog
            .get(axis, &key)
            .ok_or_else(|| EtlError::config(format!("no {axis:?} axis for key '{key}'; is window {} configured?", key.window)))
    };
    let (x, y) = (entry(Axis::X)?, entry(Axis::Y)?);
    let normalize_x = options.normalized_axes.includes(Axis::X);
    let normalize_y = options.normalized_axes.includes(Axis::Y);
    Ok(AxisSelection {
        x_column: x.column(normalize_x).to_string(),
        y_column: y.column(normalize_y).to_string(),
        x_title: x.title_with(normalize_x, description),
        y_title: y.title_with(normalize_y, description),
    })
}

/// Summary rows of the chosen states plus rows of the chosen municipalities.
pub fn select_locations(df: &DataFrame, state_codes: &[i64], municipality_codes: &[i64]) -> EtlResult<DataFrame> {
    let roles = reconcile::role_values(df)?;
    let states = table::i64_values(df, columns::STATE_CODE)?;
    let codes = table::i64_values(df, columns::MUNICIPALITY_CODE)?;
    let keep: Vec<bool> = (0..df.height())
        .map(|row| match roles[row] {
            Role::Nation | Role::StateSummary => states[row].is_some_and(|c| state_codes.contains(&c)),
            Role::Municipality | Role::NoMunicipality => codes[row].is_some_and(|c| municipality_codes.contains(&c)),
        })
        .collect();
    table::filter_rows(df, &keep)
}

/// Turns a normalized table into whatever a charting library draws.
pub trait FigureBuilder {
    type Figure;

    fn build_figure(&self, data: &DataFrame, options: &FigureOptions) -> EtlResult<Self::Figure>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub name: String,
    pub x: Vec<Option<f64>>,
    pub y: Vec<Option<f64>>,
}

/// Library-neutral line chart: one trace per location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineFigure {
    pub axes: AxisSelection,
    pub traces: Vec<Trace>,
}

/// Builds a [`LineFigure`] from a [`NormalizedView`]-shaped table.
#[derive(Debug, Clone)]
pub struct LineFigureBuilder {
    pub catalog: AxisCatalog,
    pub description: String,
}

impl LineFigureBuilder {
    pub fn new(catalog: AxisCatalog, view: &NormalizedView) -> Self {
        Self {
            catalog,
            description: view.description.clone(),
        }
    }
}

impl FigureBuilder for LineFigureBuilder {
    type Figure = LineFigure;

    fn build_figure(&self, data: &DataFrame, options: &FigureOptions) -> EtlResult<LineFigure> {
        let axes = select_axes(&self.catalog, options, &self.description)?;
        let locations = table::str_values(data, columns::LOCATION)?;
        let xs = table::f64_values(data, &axes.x_column)?;
        let ys = table::f64_values(data, &axes.y_column)?;

        let mut by_location: BTreeMap<String, Trace> = BTreeMap::new();
        for row in 0..data.height() {
            let Some(name) = locations[row].as_deref() else {
                continue;
            };
            let trace = by_location.entry(name.to_string()).or_insert_with(|| Trace {
                name: name.to_string(),
                x: Vec::new(),
                y: Vec::new(),
            });
            trace.x.push(xs[row]);
            trace.y.push(ys[row]);
        }
        Ok(LineFigure {
            axes,
            traces: by_location.into_values().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize;

    #[test]
    fn test_select_axes_is_a_lookup() {
        let catalog = AxisCatalog::build(&[0, 7], "Days since 0.1 deaths per million inhabitants");
        let options = FigureOptions::default();
        let axes = select_axes(&catalog, &options, "per million inhabitants").unwrap();
        assert_eq!(axes.x_column, columns::DAYS_SINCE_THRESHOLD);
        assert_eq!(axes.y_column, "cumulative_deaths_ma7_norm");
        assert_eq!(axes.y_title, "Total deaths (7-day moving average) per million inhabitants");

        let options = FigureOptions {
            aggregation: Aggregation::New,
            temporality: Temporality::NonTemporal,
            normalized_axes: NormalizedAxes::Xy,
            window: 0,
            ..FigureOptions::default()
        };
        let axes = select_axes(&catalog, &options, "").unwrap();
        assert_eq!(axes.x_column, "cumulative_deaths_ma0_norm");
        assert_eq!(axes.y_column, "deaths_7d_ma0_norm");
        assert_eq!(axes.x_title, "Total deaths");
    }

    #[test]
    fn test_unknown_window_is_config_error() {
        let catalog = AxisCatalog::build(&[0], "days");
        let options = FigureOptions { window: 5, ..FigureOptions::default() };
        assert!(matches!(select_axes(&catalog, &options, ""), Err(EtlError::Config(_))));
    }

    #[test]
    fn test_line_figure_groups_by_location() {
        let df = df! {
            columns::ROLE => ["STATE_SUMMARY", "STATE_SUMMARY", "MUNICIPALITY", "MUNICIPALITY"],
            columns::STATE_CODE => [33i64, 33, 33, 35],
            columns::MUNICIPALITY_CODE => [None, None, Some(330330i64), Some(355030)],
            columns::LOCATION => ["RJ", "RJ", "Niterói", "São Paulo"],
            columns::POPULATION => [2_000_000i64, 2_000_000, 500_000, 1_000_000],
            columns::DAYS_SINCE_THRESHOLD => [0i64, 1, 0, 0],
            "cumulative_deaths_ma0" => [1.0, 2.0, 3.0, 4.0],
        }
        .unwrap();
        let selected = select_locations(&df, &[33], &[330330]).unwrap();
        assert_eq!(selected.height(), 3);

        let catalog = AxisCatalog::build(&[0], "days");
        let modes: BTreeSet<NormalizationMode> = [NormalizationMode::PerCapita].into_iter().collect();
        let view = normalize::resolve(&selected, &catalog, &modes).unwrap();
        let builder = LineFigureBuilder::new(catalog, &view);
        let options = FigureOptions { window: 0, ..FigureOptions::default() };
        let figure = builder.build_figure(&view.table, &options).unwrap();

        assert_eq!(figure.traces.len(), 2);
        let rj = figure.traces.iter().find(|t| t.name == "RJ").unwrap();
        assert_eq!(rj.x, vec![Some(0.0), Some(1.0)]);
        assert_eq!(rj.y, vec![Some(0.5), Some(1.0)]);
    }
}
