//! Ordered registry of pipeline steps and the state they produce.
//!
//! Each step takes the context by value and returns the next one; nothing
//! is shared between steps except what the context carries.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use polars::prelude::*;
use shared::NATION_CODE;

use crate::columns;
use crate::config::PipelineSettings;
use crate::error::{Diagnostic, EtlResult};
use crate::loader::{RawSources, RawTableLoader};
use crate::normalize::AxisCatalog;
use crate::{metrics, reconcile, relative, schema, table};

/// Tables and findings threaded through the steps
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub bulletin: DataFrame,
    pub areas: DataFrame,
    pub age_structure: DataFrame,
    pub national_age: Option<DataFrame>,
    pub relevant: Option<DataFrame>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PipelineContext {
    pub fn new(sources: RawSources) -> Self {
        Self {
            bulletin: sources.bulletin,
            areas: sources.areas,
            age_structure: sources.age_structure,
            national_age: sources.national_age,
            relevant: None,
            diagnostics: Vec::new(),
        }
    }

    fn with_bulletin(self, bulletin: DataFrame) -> Self {
        Self { bulletin, ..self }
    }

    /// Replace the bulletin with `f(bulletin)`.
    fn map_bulletin<F>(mut self, f: F) -> EtlResult<Self>
    where
        F: FnOnce(DataFrame) -> EtlResult<DataFrame>,
    {
        let bulletin = std::mem::take(&mut self.bulletin);
        Ok(self.with_bulletin(f(bulletin)?))
    }

    /// Like [`Self::map_bulletin`], also collecting the step's diagnostics.
    fn map_reconciled<F>(mut self, f: F) -> EtlResult<Self>
    where
        F: FnOnce(DataFrame) -> EtlResult<reconcile::Reconciled>,
    {
        let bulletin = std::mem::take(&mut self.bulletin);
        let (bulletin, diagnostics) = f(bulletin)?;
        let mut next = self.with_bulletin(bulletin);
        next.diagnostics.extend(diagnostics);
        Ok(next)
    }
}

pub type StepFn = fn(PipelineContext, &PipelineSettings) -> EtlResult<PipelineContext>;

/// A named transformation and the condition under which it runs
#[derive(Clone, Copy)]
pub struct Step {
    pub name: &'static str,
    pub run: StepFn,
    pub enabled: fn(&PipelineSettings) -> bool,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}

fn always(_: &PipelineSettings) -> bool {
    true
}

fn truncated_vintage(settings: &PipelineSettings) -> bool {
    settings.profile.truncated_codes
}

fn normalize_sources(ctx: PipelineContext, settings: &PipelineSettings) -> EtlResult<PipelineContext> {
    let profile = &settings.profile;
    Ok(PipelineContext {
        bulletin: schema::normalize_bulletin(ctx.bulletin, profile)?,
        areas: schema::normalize_areas(ctx.areas, profile)?,
        age_structure: schema::normalize_age_structure(ctx.age_structure, profile)?,
        national_age: ctx
            .national_age
            .map(|df| schema::normalize_national_age_structure(df, profile))
            .transpose()?,
        ..ctx
    })
}

fn label_roles(ctx: PipelineContext, _: &PipelineSettings) -> EtlResult<PipelineContext> {
    ctx.map_bulletin(reconcile::label_roles)
}

fn repair_truncated_codes(ctx: PipelineContext, _: &PipelineSettings) -> EtlResult<PipelineContext> {
    ctx.map_reconciled(reconcile::repair_truncated_codes)
}

fn repair_population(ctx: PipelineContext, settings: &PipelineSettings) -> EtlResult<PipelineContext> {
    let separator = settings.profile.thousands_separator;
    ctx.map_reconciled(|df| reconcile::repair_population(df, separator))
}

fn backfill_area(ctx: PipelineContext, _: &PipelineSettings) -> EtlResult<PipelineContext> {
    let (levels, diagnostics) = reconcile::aggregate_areas(&ctx.areas)?;
    let mut ctx = ctx.map_reconciled(|df| reconcile::backfill_area(df, &levels))?;
    ctx.diagnostics.extend(diagnostics);
    Ok(ctx)
}

fn backfill_demographics(ctx: PipelineContext, _: &PipelineSettings) -> EtlResult<PipelineContext> {
    let mut levels = reconcile::aggregate_elderly_share(&ctx.age_structure)?;
    if let Some(national_age) = &ctx.national_age {
        levels.national = reconcile::national_elderly_share(national_age)?.or(levels.national);
    }
    ctx.map_reconciled(|df| reconcile::backfill_demographics(df, &levels))
}

fn backfill_regions(ctx: PipelineContext, _: &PipelineSettings) -> EtlResult<PipelineContext> {
    ctx.map_bulletin(reconcile::backfill_regions)
}

fn assign_location(ctx: PipelineContext, _: &PipelineSettings) -> EtlResult<PipelineContext> {
    ctx.map_bulletin(reconcile::assign_location)
}

fn deduplicate(ctx: PipelineContext, _: &PipelineSettings) -> EtlResult<PipelineContext> {
    ctx.map_reconciled(reconcile::deduplicate_and_sort)
}

fn days_since_start(ctx: PipelineContext, _: &PipelineSettings) -> EtlResult<PipelineContext> {
    ctx.map_bulletin(metrics::add_days_since_start)
}

fn increments(ctx: PipelineContext, settings: &PipelineSettings) -> EtlResult<PipelineContext> {
    let reported = settings.profile.reports_increments;
    ctx.map_bulletin(|df| metrics::add_increments(df, reported))
}

fn weekly_sums(ctx: PipelineContext, _: &PipelineSettings) -> EtlResult<PipelineContext> {
    ctx.map_bulletin(metrics::add_weekly_sums)
}

fn per_million(ctx: PipelineContext, _: &PipelineSettings) -> EtlResult<PipelineContext> {
    ctx.map_bulletin(metrics::add_per_million)
}

fn rates(ctx: PipelineContext, _: &PipelineSettings) -> EtlResult<PipelineContext> {
    ctx.map_bulletin(metrics::add_rates)
}

fn smoothing(ctx: PipelineContext, settings: &PipelineSettings) -> EtlResult<PipelineContext> {
    let windows = settings.windows();
    ctx.map_bulletin(|df| metrics::add_smoothing(df, &windows))
}

fn relevant_subset(ctx: PipelineContext, settings: &PipelineSettings) -> EtlResult<PipelineContext> {
    let relevant = relative::build_relevant_subset(&ctx.bulletin, &settings.threshold)?;
    Ok(PipelineContext {
        relevant: Some(relevant),
        ..ctx
    })
}

/// The fixed step sequence of a run
pub const STEPS: &[Step] = &[
    Step { name: "normalize_sources", run: normalize_sources, enabled: always },
    Step { name: "label_roles", run: label_roles, enabled: always },
    Step { name: "repair_truncated_codes", run: repair_truncated_codes, enabled: truncated_vintage },
    Step { name: "repair_population", run: repair_population, enabled: always },
    Step { name: "backfill_area", run: backfill_area, enabled: always },
    Step { name: "backfill_demographics", run: backfill_demographics, enabled: always },
    Step { name: "backfill_regions", run: backfill_regions, enabled: always },
    Step { name: "assign_location", run: assign_location, enabled: always },
    Step { name: "deduplicate", run: deduplicate, enabled: always },
    Step { name: "days_since_start", run: days_since_start, enabled: always },
    Step { name: "increments", run: increments, enabled: always },
    Step { name: "weekly_sums", run: weekly_sums, enabled: always },
    Step { name: "per_million", run: per_million, enabled: always },
    Step { name: "rates", run: rates, enabled: always },
    Step { name: "smoothing", run: smoothing, enabled: always },
    Step { name: "relevant_subset", run: relevant_subset, enabled: always },
];

/// Result of a complete run; read-only from here on
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub settings: PipelineSettings,
    pub table: DataFrame,
    pub relevant: DataFrame,
    pub diagnostics: Vec<Diagnostic>,
}

impl PipelineState {
    pub fn catalog(&self) -> AxisCatalog {
        AxisCatalog::build(&self.settings.windows(), &self.settings.threshold.label)
    }
}

/// Run `steps` in order, skipping the disabled ones.
pub fn run_steps(ctx: PipelineContext, settings: &PipelineSettings, steps: &[Step]) -> EtlResult<PipelineContext> {
    let mut ctx = ctx;
    for step in steps {
        if !(step.enabled)(settings) {
            log::debug!("Skipping step '{}'", step.name);
            continue;
        }
        let started = Instant::now();
        ctx = (step.run)(ctx, settings)?;
        log::debug!(
            "Step '{}' done in {:?}: {} rows, {} columns",
            step.name,
            started.elapsed(),
            ctx.bulletin.height(),
            ctx.bulletin.width()
        );
    }
    Ok(ctx)
}

/// Run the whole pipeline over already-loaded sources.
pub fn run_pipeline(sources: RawSources, settings: &PipelineSettings) -> EtlResult<PipelineState> {
    settings.validate()?;
    let ctx = run_steps(PipelineContext::new(sources), settings, STEPS)?;

    let relevant = match ctx.relevant {
        Some(relevant) => relevant,
        None => relative::build_relevant_subset(&ctx.bulletin, &settings.threshold)?,
    };
    log::info!(
        "Pipeline '{}' finished: {} rows, {} in the relevant subset, {} diagnostics",
        settings.profile.name,
        ctx.bulletin.height(),
        relevant.height(),
        ctx.diagnostics.len()
    );
    Ok(PipelineState {
        settings: settings.clone(),
        table: ctx.bulletin,
        relevant,
        diagnostics: ctx.diagnostics,
    })
}

/// Load the three sources through `loader` and run the pipeline.
pub fn load_and_run<L: RawTableLoader + ?Sized>(
    loader: &L,
    bulletin: &Path,
    areas: &Path,
    age_structure: &Path,
    settings: &PipelineSettings,
) -> EtlResult<PipelineState> {
    let sources = RawSources::load(loader, bulletin, areas, age_structure)?;
    run_pipeline(sources, settings)
}

/// Display names by code for selection widgets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupIndex {
    pub states: BTreeMap<i64, String>,
    pub municipalities: BTreeMap<i64, String>,
}

/// Build the state and municipality lookups from the non-summary rows of
/// `relevant`; the nation is registered as state `76`.
pub fn group_index(relevant: &DataFrame) -> EtlResult<GroupIndex> {
    let roles = reconcile::role_values(relevant)?;
    let state_codes = table::i64_values(relevant, columns::STATE_CODE)?;
    let states = table::str_values(relevant, columns::STATE_NAME)?;
    let codes = table::i64_values(relevant, columns::MUNICIPALITY_CODE)?;
    let locations = table::str_values(relevant, columns::LOCATION)?;

    let mut index = GroupIndex::default();
    for row in 0..relevant.height() {
        if roles[row].is_summary() {
            continue;
        }
        if let (Some(code), Some(name)) = (state_codes[row], &states[row]) {
            index.states.entry(code).or_insert_with(|| name.clone());
        }
        if let (Some(code), Some(name)) = (codes[row], &locations[row]) {
            index.municipalities.entry(code).or_insert_with(|| name.clone());
        }
    }
    index
        .states
        .insert(NATION_CODE, columns::NATION_DISPLAY_NAME.to_string());
    Ok(index)
}
