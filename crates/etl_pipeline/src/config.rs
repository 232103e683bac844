use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::columns;
use crate::error::{EtlError, EtlResult};

/// Constants
pub const DEFAULT_CACHE_DIR: &str = ".covid_etl";
pub const CACHE_DIR_ENV: &str = "COVID_ETL_CACHE";
pub const SNAPSHOT_FILE_NAME: &str = "snapshot.cvsnap";

/// Snapshot directory: `$COVID_ETL_CACHE`, else `~/.covid_etl`
pub static CACHE_PATH: Lazy<PathBuf> = Lazy::new(|| {
    env::var(CACHE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|home| home.join(DEFAULT_CACHE_DIR))
                .unwrap_or_else(|| PathBuf::from(format!("./{DEFAULT_CACHE_DIR}")))
        })
});

/// Default location of the whole-state snapshot
pub fn default_snapshot_path() -> PathBuf {
    CACHE_PATH.join(SNAPSHOT_FILE_NAME)
}

/// Text encodings the CSV loader can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    Utf8,
    /// Invalid sequences are replaced instead of failing the read
    LossyUtf8,
}

/// Everything that varies between vintages of the upstream files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceProfile {
    pub name: String,
    /// Raw bulletin header -> canonical column
    pub bulletin_renames: BTreeMap<String, String>,
    /// Raw area spreadsheet header -> canonical column
    pub area_renames: BTreeMap<String, String>,
    /// Raw age-structure header -> canonical column (long format)
    pub age_renames: BTreeMap<String, String>,
    /// Raw national single-age header -> canonical column
    pub national_age_renames: BTreeMap<String, String>,
    /// Column of the wide census export holding `"<code> <name>"`
    pub age_wide_label_column: String,
    /// Column of the wide census export holding the row total
    pub age_wide_total_column: String,
    /// `chrono` format of the bulletin date column
    pub date_format: String,
    pub separator: char,
    pub encoding: TextEncoding,
    /// Thousands separator used in scraped population values
    pub thousands_separator: char,
    /// Municipality codes lost their last digit in this vintage
    pub truncated_codes: bool,
    /// The bulletin carries daily increments next to the cumulative counts
    pub reports_increments: bool,
}

fn renames(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
        .collect()
}

impl SourceProfile {
    /// Ministry of Health bulletin as published from late May 2020 on.
    pub fn ministry_bulletin() -> Self {
        Self {
            name: "ministry-bulletin".to_string(),
            bulletin_renames: renames(&[
                ("regiao", columns::REGION_NAME),
                ("estado", columns::STATE_NAME),
                ("municipio", columns::MUNICIPALITY_NAME),
                ("coduf", columns::STATE_CODE),
                ("codmun", columns::MUNICIPALITY_CODE),
                ("codRegiaoSaude", columns::HEALTH_REGION_CODE),
                ("nomeRegiaoSaude", columns::HEALTH_REGION_NAME),
                ("data", columns::DATE),
                ("semanaEpi", columns::EPI_WEEK),
                ("populacaoTCU2019", columns::POPULATION),
                ("casosAcumulado", columns::CUMULATIVE_CASES),
                ("casosNovos", columns::NEW_CASES),
                ("casosNovo", columns::NEW_CASES),
                ("obitosAcumulado", columns::CUMULATIVE_DEATHS),
                ("obitosNovos", columns::NEW_DEATHS),
                ("obitosNovo", columns::NEW_DEATHS),
            ]),
            area_renames: renames(&[
                ("CD_GCUF", columns::STATE_CODE),
                ("NM_UF_SIGLA", columns::STATE_NAME),
                ("CD_GCMUN", columns::CODE),
                ("NM_MUN_2019", columns::NAME),
                ("AR_MUN_2019", columns::AREA_KM2),
            ]),
            age_renames: renames(&[
                ("codmun", columns::CODE),
                ("faixa_etaria", columns::AGE_BAND),
                ("populacao", columns::POPULATION),
            ]),
            national_age_renames: renames(&[
                ("Idade simples", columns::AGE_BAND),
                ("Masculino", columns::MALE),
                ("Feminino", columns::FEMALE),
                ("Total", columns::POPULATION),
            ]),
            age_wide_label_column: "Município".to_string(),
            age_wide_total_column: "Total".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            separator: ';',
            encoding: TextEncoding::Utf8,
            thousands_separator: '.',
            truncated_codes: false,
            reports_increments: true,
        }
    }

    /// The 21-24 May 2020 files, where municipality codes after 20 May were
    /// published without their last digit.
    pub fn ministry_bulletin_truncated() -> Self {
        Self {
            name: "ministry-bulletin-truncated".to_string(),
            truncated_codes: true,
            reports_increments: false,
            ..Self::ministry_bulletin()
        }
    }
}

impl Default for SourceProfile {
    fn default() -> Self {
        Self::ministry_bulletin()
    }
}

/// Rows qualify for the relevant subset once `column >= value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdRule {
    pub column: String,
    pub value: f64,
    /// Axis text for the relative-time axis
    pub label: String,
}

impl Default for ThresholdRule {
    fn default() -> Self {
        Self {
            column: columns::CUMULATIVE_DEATHS_PER_MILLION.to_string(),
            value: 0.1,
            label: "Days since 0.1 deaths per million inhabitants".to_string(),
        }
    }
}

/// Settings of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub profile: SourceProfile,
    /// Rolling-mean windows; `0` means no smoothing
    pub smoothing_windows: Vec<u32>,
    pub threshold: ThresholdRule,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            profile: SourceProfile::default(),
            smoothing_windows: vec![0, 3, 5, 7],
            threshold: ThresholdRule::default(),
        }
    }
}

impl PipelineSettings {
    pub fn with_profile(profile: SourceProfile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> EtlResult<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> EtlResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> EtlResult<()> {
        if self.smoothing_windows.is_empty() {
            return Err(EtlError::config("at least one smoothing window is required"));
        }
        if !self.threshold.value.is_finite() {
            return Err(EtlError::config("threshold value must be finite"));
        }
        if self.profile.date_format.trim().is_empty() {
            return Err(EtlError::config("date format must not be empty"));
        }
        if !self.profile.separator.is_ascii() {
            return Err(EtlError::config("CSV separator must be a single ASCII character"));
        }
        Ok(())
    }

    /// Windows sorted and deduplicated
    pub fn windows(&self) -> Vec<u32> {
        let mut windows = self.smoothing_windows.clone();
        windows.sort_unstable();
        windows.dedup();
        windows
    }
}
