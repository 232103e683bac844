use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// IBGE-style code used by the health ministry for the national total.
pub const NATION_CODE: i64 = 76;

/// Municipality codes ending in this many zeros mark cases registered in a
/// state without an associated municipality (`EE0000`).
pub const NO_MUNICIPALITY_STEP: i64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateNotFoundError {
    pub state: String,
    pub message: String,
}

impl StateNotFoundError {
    pub fn new(state: &str, message: &str) -> Self {
        Self {
            state: state.to_string(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for StateNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: '{}'", self.message, self.state)
    }
}

impl std::error::Error for StateNotFoundError {}

/// Brazilian macro-regions as defined by IBGE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Norte,
    Nordeste,
    Sudeste,
    Sul,
    CentroOeste,
}

impl Region {
    /// Display name as printed in the ministry bulletins.
    pub fn name(&self) -> &'static str {
        match self {
            Region::Norte => "Norte",
            Region::Nordeste => "Nordeste",
            Region::Sudeste => "Sudeste",
            Region::Sul => "Sul",
            Region::CentroOeste => "Centro-Oeste",
        }
    }

    /// Parse a region name, accepting `centro_oeste` and `centro-oeste`
    pub fn from_name(name: &str) -> Result<Self, StateNotFoundError> {
        match name.trim().to_lowercase().as_str() {
            "norte" => Ok(Region::Norte),
            "nordeste" => Ok(Region::Nordeste),
            "sudeste" => Ok(Region::Sudeste),
            "sul" => Ok(Region::Sul),
            "centro_oeste" | "centro-oeste" => Ok(Region::CentroOeste),
            _ => Err(StateNotFoundError::new(name, "Região não encontrada")),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Representation of a Brazilian Federative Unit (State).
///
/// # Fields
/// * `code` - IBGE code of the state
/// * `name` - Full name of the state
/// * `uf` - State abbreviation (2 letters)
/// * `region` - Macro-region the state belongs to
///
/// # Example
/// ```rust
/// use shared::models::geo_utils::{Region, StateBR};
///
/// let sao_paulo = StateBR::new(35, "São Paulo", "SP", Region::Sudeste);
/// assert_eq!(sao_paulo.code, 35);
/// assert_eq!(sao_paulo.uf, "SP");
/// assert_eq!(sao_paulo.region, Region::Sudeste);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBR {
    pub code: u8,
    pub name: String,
    pub uf: String,
    pub region: Region,
}

impl StateBR {
    pub fn new(code: u8, name: &str, uf: &str, region: Region) -> Self {
        Self {
            code,
            name: name.to_string(),
            uf: uf.to_string(),
            region,
        }
    }
}

/// Mapping of UF abbreviations to their complete state data.
pub static UFS: Lazy<HashMap<&'static str, StateBR>> = Lazy::new(|| {
    let mut ufs = HashMap::new();
    ufs.insert("RO", StateBR::new(11, "Rondônia", "RO", Region::Norte));
    ufs.insert("AC", StateBR::new(12, "Acre", "AC", Region::Norte));
    ufs.insert("AM", StateBR::new(13, "Amazonas", "AM", Region::Norte));
    ufs.insert("RR", StateBR::new(14, "Roraima", "RR", Region::Norte));
    ufs.insert("PA", StateBR::new(15, "Pará", "PA", Region::Norte));
    ufs.insert("AP", StateBR::new(16, "Amapá", "AP", Region::Norte));
    ufs.insert("TO", StateBR::new(17, "Tocantins", "TO", Region::Norte));
    ufs.insert("MA", StateBR::new(21, "Maranhão", "MA", Region::Nordeste));
    ufs.insert("PI", StateBR::new(22, "Piauí", "PI", Region::Nordeste));
    ufs.insert("CE", StateBR::new(23, "Ceará", "CE", Region::Nordeste));
    ufs.insert("RN", StateBR::new(24, "Rio Grande do Norte", "RN", Region::Nordeste));
    ufs.insert("PB", StateBR::new(25, "Paraíba", "PB", Region::Nordeste));
    ufs.insert("PE", StateBR::new(26, "Pernambuco", "PE", Region::Nordeste));
    ufs.insert("AL", StateBR::new(27, "Alagoas", "AL", Region::Nordeste));
    ufs.insert("SE", StateBR::new(28, "Sergipe", "SE", Region::Nordeste));
    ufs.insert("BA", StateBR::new(29, "Bahia", "BA", Region::Nordeste));
    ufs.insert("MG", StateBR::new(31, "Minas Gerais", "MG", Region::Sudeste));
    ufs.insert("ES", StateBR::new(32, "Espírito Santo", "ES", Region::Sudeste));
    ufs.insert("RJ", StateBR::new(33, "Rio de Janeiro", "RJ", Region::Sudeste));
    ufs.insert("SP", StateBR::new(35, "São Paulo", "SP", Region::Sudeste));
    ufs.insert("PR", StateBR::new(41, "Paraná", "PR", Region::Sul));
    ufs.insert("SC", StateBR::new(42, "Santa Catarina", "SC", Region::Sul));
    ufs.insert("RS", StateBR::new(43, "Rio Grande do Sul", "RS", Region::Sul));
    ufs.insert("MS", StateBR::new(50, "Mato Grosso do Sul", "MS", Region::CentroOeste));
    ufs.insert("MT", StateBR::new(51, "Mato Grosso", "MT", Region::CentroOeste));
    ufs.insert("GO", StateBR::new(52, "Goiás", "GO", Region::CentroOeste));
    ufs.insert("DF", StateBR::new(53, "Distrito Federal", "DF", Region::CentroOeste));
    ufs
});

/// Get states by region, sorted by code
pub fn get_states_by_region(region: &str) -> Result<Vec<StateBR>, StateNotFoundError> {
    let region = Region::from_name(region)?;
    let mut states: Vec<StateBR> = UFS
        .values()
        .filter(|state| state.region == region)
        .cloned()
        .collect();
    states.sort_by(|a, b| a.code.cmp(&b.code));
    Ok(states)
}

/// Number of decimal digits of a positive code.
fn digit_count(code: i64) -> u32 {
    code.checked_ilog10().map(|log| log + 1).unwrap_or(1)
}

/// Two-digit state prefix of an IBGE code.
///
/// State codes (2 digits) map to themselves; municipality codes with or
/// without the check digit (6 or 7 digits) map to their leading two digits.
///
/// ```rust
/// use shared::models::geo_utils::state_prefix;
///
/// assert_eq!(state_prefix(35), Some(35));
/// assert_eq!(state_prefix(350010), Some(35));
/// assert_eq!(state_prefix(3500105), Some(35));
/// assert_eq!(state_prefix(-1), None);
/// ```
pub fn state_prefix(code: i64) -> Option<i64> {
    if code <= 0 {
        return None;
    }
    match digit_count(code) {
        2 => Some(code),
        digits @ 6..=7 => Some(code / 10_i64.pow(digits - 2)),
        _ => None,
    }
}

/// Drop the IBGE check digit from a 7-digit municipality code.
pub fn six_digit_code(code: i64) -> i64 {
    if digit_count(code) == 7 { code / 10 } else { code }
}
