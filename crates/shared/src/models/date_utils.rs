use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;

/// `1970-01-01`, the origin of the day counts stored in Arrow/Polars date columns.
pub static UNIX_EPOCH_DATE: Lazy<NaiveDate> =
    Lazy::new(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFormatError {
    pub format: String,
    pub value: String,
    pub message: String,
}

impl TimeFormatError {
    pub fn new(format: &str, value: &str, message: &str) -> Self {
        Self {
            format: format.to_string(),
            value: value.to_string(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for TimeFormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: expected format '{}', got '{}'", self.message, self.format, self.value)
    }
}

impl std::error::Error for TimeFormatError {}

/// Parses a bulletin date under a source-specific `chrono` format string.
///
/// Spreadsheet exports sometimes carry a midnight timestamp after the date
/// (`2020-05-21 00:00:00`); when the plain format fails, the value is retried
/// as a datetime and truncated to its date.
///
/// # Arguments
/// * `value` - Raw cell text
/// * `format` - `chrono` format string, e.g. `%Y-%m-%d` or `%d/%m/%Y`
///
/// # Example
/// ```rust
/// use shared::models::date_utils::parse_date;
/// use chrono::NaiveDate;
///
/// let expected = NaiveDate::from_ymd_opt(2020, 5, 21).unwrap();
/// assert_eq!(parse_date("2020-05-21", "%Y-%m-%d").unwrap(), expected);
/// assert_eq!(parse_date("21/05/2020", "%d/%m/%Y").unwrap(), expected);
/// assert_eq!(parse_date("2020-05-21 00:00:00", "%Y-%m-%d").unwrap(), expected);
/// assert!(parse_date("21/05/2020", "%Y-%m-%d").is_err());
/// ```
pub fn parse_date(value: &str, format: &str) -> Result<NaiveDate, TimeFormatError> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
        return Ok(date);
    }

    let datetime_format = format!("{format} %H:%M:%S");
    NaiveDateTime::parse_from_str(trimmed, &datetime_format)
        .map(|datetime| datetime.date())
        .map_err(|_| TimeFormatError::new(format, trimmed, "Data em formato inválido"))
}

/// Days since the Unix epoch, the physical representation of a `Date` column.
pub fn to_epoch_days(date: NaiveDate) -> i32 {
    (date - *UNIX_EPOCH_DATE).num_days() as i32
}

/// Inverse of [`to_epoch_days`].
pub fn from_epoch_days(days: i32) -> Option<NaiveDate> {
    UNIX_EPOCH_DATE.checked_add_signed(chrono::Duration::days(days as i64))
}
