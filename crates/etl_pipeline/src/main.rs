use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use covid_etl::config::{self, PipelineSettings};
use covid_etl::loader::{CsvTableLoader, RawSources};
use covid_etl::{pipeline, snapshot};

const USAGE: &str =
    "usage: covid-etl <bulletin.csv> <areas.csv> <age_structure.csv> [settings.json] [snapshot path] [national_ages.csv]";

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        bail!(USAGE);
    }
    let settings = match args.get(3) {
        Some(path) => PipelineSettings::from_json_file(path)
            .with_context(|| format!("reading settings from {path}"))?,
        None => PipelineSettings::default(),
    };
    let output = args
        .get(4)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_snapshot_path);

    let loader = CsvTableLoader::from_profile(&settings.profile)?;
    let mut sources = RawSources::load(&loader, Path::new(&args[0]), Path::new(&args[1]), Path::new(&args[2]))?;
    if let Some(path) = args.get(5) {
        sources = sources.with_national_age(&loader, Path::new(path))?;
    }
    let state = pipeline::run_pipeline(sources, &settings)?;

    println!(
        "Processed {} rows ({} in the relevant subset) with profile '{}'",
        state.table.height(),
        state.relevant.height(),
        state.settings.profile.name
    );
    for diagnostic in &state.diagnostics {
        println!("  {diagnostic:?}");
    }

    snapshot::write_snapshot_file(&state, &output)
        .with_context(|| format!("writing snapshot to {}", output.display()))?;
    println!("Snapshot written to {}", output.display());

    Ok(())
}
