//! Ingestion, reconciliation and derived indicators for the Brazilian
//! COVID-19 bulletins.
//!
//! Stages run in a fixed order (see [`pipeline::STEPS`]):
//! schema normalization, identifier reconciliation, derived metrics and the
//! relative-time subset. [`normalize`] and [`figure`] then serve chart
//! consumers from the finished [`pipeline::PipelineState`].

pub mod columns;
pub mod config;
pub mod error;
pub mod figure;
pub mod loader;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod relative;
pub mod schema;
pub mod snapshot;
pub mod table;

pub use columns::Role;
pub use config::{PipelineSettings, SourceProfile, ThresholdRule};
pub use error::{Diagnostic, EtlError, EtlResult};
pub use figure::{FigureBuilder, FigureOptions, select_axes};
pub use loader::{CsvTableLoader, RawSources, RawTableLoader};
pub use normalize::{AxisCatalog, NormalizationMode, NormalizedView, resolve, resolve_many};
pub use pipeline::{PipelineState, group_index, run_pipeline};
pub use snapshot::{load_snapshot, save_snapshot};
