use thiserror::Error;

use crate::models::date_utils::TimeFormatError;
use crate::models::geo_utils::StateNotFoundError;

/// Centralized error type for shared crate
#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Date error: {0}")]
    TimeFormat(#[from] TimeFormatError),

    #[error("State lookup error: {0}")]
    StateNotFound(#[from] StateNotFoundError),
}
