//! Canonical column names shared by every pipeline stage and by the
//! charting consumers.

use serde::{Deserialize, Serialize};

pub const REGION_NAME: &str = "region_name";
pub const STATE_NAME: &str = "state_name";
pub const MUNICIPALITY_NAME: &str = "municipality_name";
pub const STATE_CODE: &str = "state_code";
pub const MUNICIPALITY_CODE: &str = "municipality_code";
pub const HEALTH_REGION_CODE: &str = "health_region_code";
pub const HEALTH_REGION_NAME: &str = "health_region_name";
pub const DATE: &str = "date";
pub const EPI_WEEK: &str = "epi_week";
pub const POPULATION: &str = "population";
pub const CUMULATIVE_CASES: &str = "cumulative_cases";
pub const CUMULATIVE_DEATHS: &str = "cumulative_deaths";
pub const NEW_CASES: &str = "new_cases";
pub const NEW_DEATHS: &str = "new_deaths";

// reconciliation
pub const ROLE: &str = "role";
pub const LOCATION: &str = "location";
pub const AREA: &str = "area";
pub const ELDERLY_SHARE: &str = "elderly_share";

// derived metrics
pub const DAYS_SINCE_START: &str = "days_since_start";
pub const CASES_7D: &str = "cases_7d";
pub const DEATHS_7D: &str = "deaths_7d";
pub const NEW_CASES_PER_MILLION: &str = "new_cases_per_million";
pub const NEW_DEATHS_PER_MILLION: &str = "new_deaths_per_million";
pub const CUMULATIVE_CASES_PER_MILLION: &str = "cumulative_cases_per_million";
pub const CUMULATIVE_DEATHS_PER_MILLION: &str = "cumulative_deaths_per_million";
pub const CASES_7D_PER_MILLION: &str = "cases_7d_per_million";
pub const DEATHS_7D_PER_MILLION: &str = "deaths_7d_per_million";
pub const INCIDENCE: &str = "incidence";
pub const MORTALITY: &str = "mortality";
pub const CASE_FATALITY_RATIO: &str = "case_fatality_ratio";
pub const DAYS_SINCE_THRESHOLD: &str = "days_since_threshold";
pub const NORM_FACTOR: &str = "norm_factor";

// reference tables
pub const CODE: &str = "code";
pub const NAME: &str = "name";
pub const AREA_KM2: &str = "area_km2";
pub const AGE_BAND: &str = "age_band";
pub const MALE: &str = "male";
pub const FEMALE: &str = "female";

/// Fields that receive one rolling-mean column per smoothing window.
pub const SMOOTHED_FIELDS: [&str; 12] = [
    CUMULATIVE_CASES,
    CUMULATIVE_DEATHS,
    NEW_CASES,
    NEW_DEATHS,
    CASES_7D,
    DEATHS_7D,
    CUMULATIVE_CASES_PER_MILLION,
    CUMULATIVE_DEATHS_PER_MILLION,
    NEW_CASES_PER_MILLION,
    NEW_DEATHS_PER_MILLION,
    CASES_7D_PER_MILLION,
    DEATHS_7D_PER_MILLION,
];

/// Name of the rolling mean of `field` over `window` rows (`0` is the identity).
pub fn smoothed(field: &str, window: u32) -> String {
    format!("{field}_ma{window}")
}

/// Name of the normalized variant of an axis column.
pub fn normalized(column: &str) -> String {
    format!("{column}_norm")
}

/// Display names given to summary rows that carry no municipality name.
pub const NATION_DISPLAY_NAME: &str = "Brazil";
pub const SUMMARY_DISPLAY_NAME: &str = "SUMMARY";
pub const NO_MUNICIPALITY_DISPLAY_NAME: &str = "NO-MUNICIPALITY";

/// Semantic role of a bulletin row, inferred from its null pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Nation,
    StateSummary,
    Municipality,
    NoMunicipality,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Nation,
        Role::StateSummary,
        Role::Municipality,
        Role::NoMunicipality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Nation => "NATION",
            Role::StateSummary => "STATE_SUMMARY",
            Role::Municipality => "MUNICIPALITY",
            Role::NoMunicipality => "NO_MUNICIPALITY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Role::ALL.into_iter().find(|role| role.as_str() == value)
    }

    /// Summary rows aggregate other rows of the same table.
    pub fn is_summary(&self) -> bool {
        matches!(self, Role::Nation | Role::StateSummary)
    }
}
