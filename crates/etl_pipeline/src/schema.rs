//! Schema normalization: renames heterogeneous source headers onto the
//! canonical names and coerces every declared column to its semantic type.
//!
//! Normalization is idempotent: an already-normalized table has no raw
//! headers left to rename and every declared column already has its target
//! dtype, so a second pass returns the same table.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;

use crate::columns;
use crate::config::SourceProfile;
use crate::error::{EtlError, EtlResult};
use crate::table;

pub const BULLETIN_TABLE: &str = "bulletin";
pub const AREA_TABLE: &str = "areas";
pub const AGE_TABLE: &str = "age_structure";
pub const NATIONAL_AGE_TABLE: &str = "national_age_structure";

/// Declared semantic type of a canonical column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    /// Nullable integer code (`Int64`)
    Identifier,
    /// Nullable integer count (`Int64`)
    Count,
    /// Free text / categorical name (`String`)
    Category,
    /// Calendar date (`Date`), parsed with the profile's format string
    Date,
    /// Floating point measurement (`Float64`)
    Rate,
    /// Kept as delivered; repaired later by the reconciler
    Passthrough,
}

impl SemanticType {
    fn target_dtype(&self) -> Option<DataType> {
        match self {
            SemanticType::Identifier | SemanticType::Count => Some(DataType::Int64),
            SemanticType::Category => Some(DataType::String),
            SemanticType::Date => Some(DataType::Date),
            SemanticType::Rate => Some(DataType::Float64),
            SemanticType::Passthrough => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: SemanticType,
    pub required: bool,
}

const fn required(name: &'static str, kind: SemanticType) -> ColumnSpec {
    ColumnSpec { name, kind, required: true }
}

const fn optional(name: &'static str, kind: SemanticType) -> ColumnSpec {
    ColumnSpec { name, kind, required: false }
}

/// Declared layout of one source table
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table: &'static str,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    /// Daily case/death bulletin
    pub fn bulletin() -> Self {
        use SemanticType::*;
        Self {
            table: BULLETIN_TABLE,
            columns: vec![
                optional(columns::REGION_NAME, Category),
                required(columns::STATE_NAME, Category),
                required(columns::MUNICIPALITY_NAME, Category),
                required(columns::STATE_CODE, Identifier),
                required(columns::MUNICIPALITY_CODE, Identifier),
                optional(columns::HEALTH_REGION_CODE, Identifier),
                optional(columns::HEALTH_REGION_NAME, Category),
                required(columns::DATE, Date),
                optional(columns::EPI_WEEK, Count),
                required(columns::POPULATION, Passthrough),
                required(columns::CUMULATIVE_CASES, Count),
                required(columns::CUMULATIVE_DEATHS, Count),
                optional(columns::NEW_CASES, Count),
                optional(columns::NEW_DEATHS, Count),
            ],
        }
    }

    /// Municipal areas (one row per municipality)
    pub fn areas() -> Self {
        use SemanticType::*;
        Self {
            table: AREA_TABLE,
            columns: vec![
                required(columns::CODE, Identifier),
                optional(columns::NAME, Category),
                optional(columns::STATE_CODE, Identifier),
                optional(columns::STATE_NAME, Category),
                required(columns::AREA_KM2, Rate),
            ],
        }
    }

    /// Population per municipality and age band (long format)
    pub fn age_structure() -> Self {
        use SemanticType::*;
        Self {
            table: AGE_TABLE,
            columns: vec![
                required(columns::CODE, Identifier),
                optional(columns::NAME, Category),
                required(columns::AGE_BAND, Category),
                required(columns::POPULATION, Count),
            ],
        }
    }

    /// National population by single year of age and sex
    pub fn national_age_structure() -> Self {
        use SemanticType::*;
        Self {
            table: NATIONAL_AGE_TABLE,
            columns: vec![
                required(columns::AGE_BAND, Category),
                optional(columns::MALE, Count),
                optional(columns::FEMALE, Count),
                required(columns::POPULATION, Count),
            ],
        }
    }
}

/// Renames raw headers to canonical names.
///
/// A rename applies only when the raw header exists and its canonical target
/// is not present yet; header whitespace and a leading BOM are ignored.
pub fn rename_columns(df: DataFrame, renames: &BTreeMap<String, String>) -> EtlResult<DataFrame> {
    let mut df = df;
    for raw in table::column_names(&df) {
        let cleaned = raw.trim_start_matches('\u{feff}').trim();
        let target = renames
            .get(cleaned)
            .map(String::as_str)
            .unwrap_or(cleaned);
        if target != raw && !table::has_column(&df, target) {
            df.rename(&raw, target.into())?;
        }
    }
    Ok(df)
}

/// Rename, check and retype `df` against `schema`.
///
/// Missing optional columns are added as all-null columns of their target
/// type. Undeclared columns are kept untouched.
pub fn normalize_table(
    df: DataFrame,
    schema: &TableSchema,
    renames: &BTreeMap<String, String>,
    date_format: &str,
) -> EtlResult<DataFrame> {
    let mut df = rename_columns(df, renames)?;

    for spec in &schema.columns {
        if !table::has_column(&df, spec.name) {
            if spec.required {
                return Err(EtlError::missing_column(schema.table, spec.name));
            }
            if let Some(dtype) = spec.kind.target_dtype() {
                let nulls = Column::full_null(spec.name.into(), df.height(), &dtype);
                table::set_column(&mut df, nulls)?;
            }
            continue;
        }

        if let Some(column) = coerce_column(&df, schema.table, spec, date_format)? {
            table::set_column(&mut df, column)?;
        }
    }

    log::debug!(
        "Normalized table '{}': {} rows, {} columns",
        schema.table,
        df.height(),
        df.width()
    );
    Ok(df)
}

/// Coerced replacement for a column, or `None` when it already has its target type.
fn coerce_column(
    df: &DataFrame,
    table_name: &str,
    spec: &ColumnSpec,
    date_format: &str,
) -> EtlResult<Option<Column>> {
    let Some(target) = spec.kind.target_dtype() else {
        return Ok(None);
    };
    let current = table::dtype_of(df, spec.name)?;
    if spec.kind == SemanticType::Category && current == DataType::String {
        return blank_strings_to_null(df, spec.name);
    }
    if current == target {
        return Ok(None);
    }

    let column = match (spec.kind, &current) {
        (SemanticType::Identifier | SemanticType::Count, DataType::String) => {
            let values = table::str_values(df, spec.name)?
                .into_iter()
                .enumerate()
                .map(|(row, value)| parse_integer_cell(value.as_deref(), table_name, spec.name, row))
                .collect::<EtlResult<Vec<_>>>()?;
            table::i64_column(spec.name, values)
        }
        (SemanticType::Rate, DataType::String) => {
            let values = table::str_values(df, spec.name)?
                .into_iter()
                .enumerate()
                .map(|(row, value)| parse_float_cell(value.as_deref(), table_name, spec.name, row))
                .collect::<EtlResult<Vec<_>>>()?;
            table::f64_column(spec.name, values)
        }
        (SemanticType::Date, DataType::String) => {
            let values = table::str_values(df, spec.name)?
                .into_iter()
                .enumerate()
                .map(|(row, value)| parse_date_cell(value.as_deref(), date_format, table_name, spec.name, row))
                .collect::<EtlResult<Vec<_>>>()?;
            table::date_column(spec.name, values)?
        }
        (SemanticType::Date, DataType::Datetime(_, _) | DataType::Null) => {
            df.column(spec.name)?.cast(&DataType::Date)?
        }
        (SemanticType::Date, other) => {
            return Err(EtlError::schema(
                table_name,
                spec.name,
                format!("cannot interpret {other} as a date"),
            ));
        }
        (SemanticType::Category, _) => df.column(spec.name)?.cast(&DataType::String)?,
        (_, dtype) if dtype.is_integer() || dtype.is_float() || dtype == &DataType::Null => {
            df.column(spec.name)?.cast(&target)?
        }
        (_, other) => {
            return Err(EtlError::schema(
                table_name,
                spec.name,
                format!("cannot coerce {other} to {target}"),
            ));
        }
    };
    Ok(Some(column))
}

/// Blank or whitespace-only labels become null.
fn blank_strings_to_null(df: &DataFrame, name: &str) -> EtlResult<Option<Column>> {
    let values = table::str_values(df, name)?;
    if !values.iter().any(|v| v.is_some() && is_blank(v.as_deref())) {
        return Ok(None);
    }
    let cleaned = values
        .into_iter()
        .map(|v| v.filter(|text| !text.trim().is_empty()))
        .collect();
    Ok(Some(table::str_column(name, cleaned)))
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

fn parse_integer_cell(value: Option<&str>, table_name: &str, column: &str, row: usize) -> EtlResult<Option<i64>> {
    if is_blank(value) {
        return Ok(None);
    }
    let text = value.unwrap_or_default().trim();
    if let Ok(parsed) = text.parse::<i64>() {
        return Ok(Some(parsed));
    }
    // spreadsheet exports write integer codes as `3500105.0`
    match text.parse::<f64>() {
        Ok(parsed) if parsed.fract() == 0.0 && parsed.is_finite() => Ok(Some(parsed as i64)),
        _ => Err(EtlError::schema(
            table_name,
            column,
            format!("row {row}: '{text}' is not an integer"),
        )),
    }
}

fn parse_float_cell(value: Option<&str>, table_name: &str, column: &str, row: usize) -> EtlResult<Option<f64>> {
    if is_blank(value) {
        return Ok(None);
    }
    let text = value.unwrap_or_default().trim();
    text.replace(',', ".")
        .parse::<f64>()
        .map(Some)
        .map_err(|_| EtlError::schema(table_name, column, format!("row {row}: '{text}' is not a number")))
}

fn parse_date_cell(
    value: Option<&str>,
    format: &str,
    table_name: &str,
    column: &str,
    row: usize,
) -> EtlResult<Option<i32>> {
    if is_blank(value) {
        return Ok(None);
    }
    let text = value.unwrap_or_default();
    shared::parse_date(text, format)
        .map(|date| Some(shared::to_epoch_days(date)))
        .map_err(|err| EtlError::schema(table_name, column, format!("row {row}: {err}")))
}

/// Normalize the daily bulletin under the given source profile.
pub fn normalize_bulletin(df: DataFrame, profile: &SourceProfile) -> EtlResult<DataFrame> {
    normalize_table(
        df,
        &TableSchema::bulletin(),
        &profile.bulletin_renames,
        &profile.date_format,
    )
}

/// Normalize the municipal area table, dropping rows without a code or area.
///
/// The spreadsheet carries notes and totals outside the table body; those
/// rows come through with empty cells.
pub fn normalize_areas(df: DataFrame, profile: &SourceProfile) -> EtlResult<DataFrame> {
    let df = normalize_table(df, &TableSchema::areas(), &profile.area_renames, &profile.date_format)?;
    let codes = table::i64_values(&df, columns::CODE)?;
    let areas = table::f64_values(&df, columns::AREA_KM2)?;
    let keep: Vec<bool> = codes
        .iter()
        .zip(&areas)
        .map(|(code, area)| code.is_some() && area.is_some())
        .collect();
    if keep.iter().all(|&k| k) {
        return Ok(df);
    }
    table::filter_rows(&df, &keep)
}

/// Normalize the age-structure table, melting the wide census export first
/// when the profile's label column is present.
pub fn normalize_age_structure(df: DataFrame, profile: &SourceProfile) -> EtlResult<DataFrame> {
    let df = if table::has_column(&df, &profile.age_wide_label_column) && !table::has_column(&df, columns::CODE) {
        melt_wide_age_structure(&df, &profile.age_wide_label_column, &profile.age_wide_total_column)?
    } else {
        df
    };
    normalize_table(df, &TableSchema::age_structure(), &profile.age_renames, &profile.date_format)
}

/// Normalize the national single-age table.
///
/// Rows whose label does not start with an age (the total and trailing
/// notes) are dropped. Labels keep only the age; the last, open-ended one
/// is marked with `+`.
pub fn normalize_national_age_structure(df: DataFrame, profile: &SourceProfile) -> EtlResult<DataFrame> {
    let df = rename_columns(df, &profile.national_age_renames)?;
    if !table::has_column(&df, columns::AGE_BAND) {
        return Err(EtlError::missing_column(NATIONAL_AGE_TABLE, columns::AGE_BAND));
    }

    let ages: Vec<Option<String>> = table::str_values(&df, columns::AGE_BAND)?
        .iter()
        .map(|label| {
            label
                .as_deref()
                .and_then(|l| SINGLE_AGE.captures(l))
                .map(|caps| caps[1].to_string())
        })
        .collect();
    let keep: Vec<bool> = ages.iter().map(Option::is_some).collect();
    let mut labels: Vec<Option<String>> = ages.into_iter().filter(Option::is_some).collect();
    if let Some(Some(oldest)) = labels.last_mut() {
        oldest.push('+');
    }

    let mut df = table::filter_rows(&df, &keep)?;
    table::set_column(&mut df, table::str_column(columns::AGE_BAND, labels))?;
    normalize_table(df, &TableSchema::national_age_structure(), &BTreeMap::new(), &profile.date_format)
}

static SINGLE_AGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)").expect("Invalid regex pattern for single ages"));
static MUNICIPALITY_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{6,7})\s+(.+?)\s*$").expect("Invalid regex pattern for municipality labels"));
static BAND_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s*(?:a|-|_)\s*(\d+)").expect("Invalid regex pattern for age ranges"));
static BAND_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s*(?:\+|anos?\s+e\s+mais)").expect("Invalid regex pattern for open age bands"));
static BAND_INFANT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*menor\s+(?:de\s+)?1\s+ano").expect("Invalid regex pattern for infant age band"));

/// Canonical age-band label: `"60 a 69 anos"` -> `"60_69"`, `"80 anos e mais"` -> `"80+"`.
pub fn canonical_age_band(header: &str) -> Option<String> {
    if let Some(caps) = BAND_RANGE.captures(header) {
        return Some(format!("{}_{}", &caps[1], &caps[2]));
    }
    if let Some(caps) = BAND_OPEN.captures(header) {
        return Some(format!("{}+", &caps[1]));
    }
    if BAND_INFANT.is_match(header) {
        return Some("0_0".to_string());
    }
    None
}

/// Lower bound in years of a canonical (or raw) age-band label.
pub fn age_band_lower_bound(band: &str) -> Option<u32> {
    let band = canonical_age_band(band).unwrap_or_else(|| band.to_string());
    let digits: String = band.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Wide census export -> long `(code, name, age_band, population)` table.
///
/// Rows whose label does not start with a municipality code (totals,
/// footnotes) are skipped, `-` cells count as zero, and columns that are not
/// age bands are ignored.
pub fn melt_wide_age_structure(df: &DataFrame, label_column: &str, total_column: &str) -> EtlResult<DataFrame> {
    let labels = table::str_values(df, label_column)?;

    let mut bands = Vec::new();
    for header in table::column_names(df) {
        if header == label_column || header == total_column {
            continue;
        }
        match canonical_age_band(&header) {
            Some(band) => {
                let values = table::str_values(df, &header)?;
                bands.push((header, band, values));
            }
            None => log::debug!("Ignoring non age-band column '{header}'"),
        }
    }

    let mut codes = Vec::new();
    let mut names = Vec::new();
    let mut age_bands = Vec::new();
    let mut populations = Vec::new();

    for (row, label) in labels.iter().enumerate() {
        let Some(caps) = label.as_deref().and_then(|l| MUNICIPALITY_LABEL.captures(l)) else {
            continue;
        };
        let code: i64 = caps[1]
            .parse()
            .map_err(|_| EtlError::schema(AGE_TABLE, label_column, format!("row {row}: bad code")))?;
        let name = caps[2].to_string();

        for (header, band, values) in &bands {
            let cell = values[row].as_deref().map(str::trim).unwrap_or("-");
            let population = if cell == "-" || cell.is_empty() {
                0
            } else {
                parse_integer_cell(Some(cell), AGE_TABLE, header, row)?.unwrap_or(0)
            };
            codes.push(Some(code));
            names.push(Some(name.clone()));
            age_bands.push(Some(band.clone()));
            populations.push(Some(population));
        }
    }

    Ok(DataFrame::new(vec![
        table::i64_column(columns::CODE, codes),
        table::str_column(columns::NAME, names),
        table::str_column(columns::AGE_BAND, age_bands),
        table::i64_column(columns::POPULATION, populations),
    ])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_bulletin() -> DataFrame {
        df! {
            "regiao" => ["Sudeste", "Sudeste"],
            "estado" => ["SP", "SP"],
            "municipio" => [None, Some("Adamantina")],
            "coduf" => ["35", "35"],
            "codmun" => [None, Some("350010.0")],
            "data" => ["2020-05-20", "2020-05-21"],
            "populacaoTCU2019" => ["45919049", "33.894"],
            "casosAcumulado" => ["10", "2"],
            "obitosAcumulado" => ["1", "0"],
        }
        .unwrap()
    }

    #[test]
    fn test_bulletin_rename_and_retype() {
        let profile = SourceProfile::ministry_bulletin();
        let df = normalize_bulletin(raw_bulletin(), &profile).unwrap();

        assert_eq!(table::dtype_of(&df, columns::STATE_CODE).unwrap(), DataType::Int64);
        assert_eq!(table::dtype_of(&df, columns::DATE).unwrap(), DataType::Date);
        assert_eq!(table::dtype_of(&df, columns::CUMULATIVE_CASES).unwrap(), DataType::Int64);
        assert_eq!(
            table::i64_values(&df, columns::MUNICIPALITY_CODE).unwrap(),
            vec![None, Some(350010)]
        );
        // population is repaired by the reconciler, not here
        assert_eq!(table::dtype_of(&df, columns::POPULATION).unwrap(), DataType::String);
        // optional columns are materialized as nulls
        assert_eq!(table::i64_values(&df, columns::NEW_DEATHS).unwrap(), vec![None, None]);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let profile = SourceProfile::ministry_bulletin();
        let once = normalize_bulletin(raw_bulletin(), &profile).unwrap();
        let twice = normalize_bulletin(once.clone(), &profile).unwrap();

        assert_eq!(table::column_names(&once), table::column_names(&twice));
        assert_eq!(once.dtypes(), twice.dtypes());
        assert!(once.equals_missing(&twice));
    }

    #[test]
    fn test_missing_required_column_is_schema_error() {
        let profile = SourceProfile::ministry_bulletin();
        let df = raw_bulletin().drop("obitosAcumulado").unwrap();
        let err = normalize_bulletin(df, &profile).unwrap_err();
        match err {
            EtlError::Schema { table, column, .. } => {
                assert_eq!(table, BULLETIN_TABLE);
                assert_eq!(column, columns::CUMULATIVE_DEATHS);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_date_format_is_per_profile() {
        let mut raw = raw_bulletin();
        raw.with_column(Column::new("data".into(), ["20/05/2020", "21/05/2020"]))
            .unwrap();

        let mut profile = SourceProfile::ministry_bulletin();
        let err = normalize_bulletin(raw.clone(), &profile).unwrap_err();
        assert!(matches!(err, EtlError::Schema { ref column, .. } if column == columns::DATE));

        profile.date_format = "%d/%m/%Y".to_string();
        let df = normalize_bulletin(raw, &profile).unwrap();
        assert_eq!(table::date_values(&df, columns::DATE).unwrap()[0], Some(18402));
    }

    #[test]
    fn test_unparsable_code_is_schema_error() {
        let profile = SourceProfile::ministry_bulletin();
        let df = df! {
            "estado" => ["SP"],
            "municipio" => ["X"],
            "coduf" => ["SP"],
            "codmun" => ["350010"],
            "data" => ["2020-05-20"],
            "populacaoTCU2019" => ["1"],
            "casosAcumulado" => ["1"],
            "obitosAcumulado" => ["0"],
        }
        .unwrap();
        assert!(matches!(
            normalize_bulletin(df, &profile),
            Err(EtlError::Schema { ref column, .. }) if column == columns::STATE_CODE
        ));
    }

    #[test]
    fn test_area_rows_without_values_are_dropped() {
        let profile = SourceProfile::ministry_bulletin();
        let df = df! {
            "ID" => [Some(1i64), Some(2), None],
            "CD_GCUF" => [Some(35i64), Some(35), None],
            "NM_UF_SIGLA" => [Some("SP"), Some("SP"), None],
            "CD_GCMUN" => [Some(3500105i64), Some(3500204), None],
            "NM_MUN_2019" => [Some("Adamantina"), Some("Adolfo"), Some("Fonte: IBGE")],
            "AR_MUN_2019" => [Some(411.987), Some(211.055), None],
        }
        .unwrap();
        let areas = normalize_areas(df, &profile).unwrap();
        assert_eq!(areas.height(), 2);
        assert_eq!(table::f64_values(&areas, columns::AREA_KM2).unwrap()[1], Some(211.055));
    }

    #[test]
    fn test_age_band_labels() {
        assert_eq!(canonical_age_band("60 a 69 anos").as_deref(), Some("60_69"));
        assert_eq!(canonical_age_band("80 anos e mais").as_deref(), Some("80+"));
        assert_eq!(canonical_age_band("Menor 1 ano").as_deref(), Some("0_0"));
        assert_eq!(canonical_age_band("Total"), None);
        assert_eq!(age_band_lower_bound("60_69"), Some(60));
        assert_eq!(age_band_lower_bound("80+"), Some(80));
        assert_eq!(age_band_lower_bound("5 a 9 anos"), Some(5));
    }

    #[test]
    fn test_wide_age_structure_is_melted() {
        let profile = SourceProfile::ministry_bulletin();
        let df = df! {
            "Município" => ["110001 Alta Floresta D'Oeste", "Total"],
            "0 a 59 anos" => ["20000", "1"],
            "60 a 69 anos" => ["2000", "1"],
            "80 anos e mais" => ["-", "1"],
            "Total" => ["22000", "3"],
        }
        .unwrap();
        let long = normalize_age_structure(df, &profile).unwrap();
        assert_eq!(long.height(), 3);
        assert_eq!(table::i64_values(&long, columns::CODE).unwrap(), vec![Some(110001); 3]);
        assert_eq!(
            table::i64_values(&long, columns::POPULATION).unwrap(),
            vec![Some(20000), Some(2000), Some(0)]
        );
        assert_eq!(
            table::str_values(&long, columns::AGE_BAND).unwrap()[2].as_deref(),
            Some("80+")
        );
    }

    #[test]
    fn test_national_single_ages() {
        let profile = SourceProfile::ministry_bulletin();
        let df = df! {
            "Idade simples" => ["0 ano", "1 ano", "100 anos ou mais", "Total", "Fonte: IBGE"],
            "Masculino" => [Some("10"), Some("9"), Some("1"), Some("20"), None],
            "Feminino" => [Some("11"), Some("10"), Some("2"), Some("23"), None],
            "Total" => [Some("21"), Some("19"), Some("3"), Some("43"), None],
        }
        .unwrap();
        let ages = normalize_national_age_structure(df, &profile).unwrap();
        assert_eq!(
            table::str_values(&ages, columns::AGE_BAND).unwrap(),
            vec![Some("0".to_string()), Some("1".to_string()), Some("100+".to_string())]
        );
        assert_eq!(table::dtype_of(&ages, columns::MALE).unwrap(), DataType::Int64);
        assert_eq!(
            table::i64_values(&ages, columns::POPULATION).unwrap(),
            vec![Some(21), Some(19), Some(3)]
        );
        assert_eq!(age_band_lower_bound("100+"), Some(100));

        let again = normalize_national_age_structure(ages.clone(), &profile).unwrap();
        assert!(again.equals_missing(&ages));
    }
}
