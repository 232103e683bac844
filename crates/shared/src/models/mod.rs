pub mod date_utils;
pub mod geo_utils;

pub use date_utils::{TimeFormatError, from_epoch_days, parse_date, to_epoch_days};
pub use geo_utils::{
    NATION_CODE, NO_MUNICIPALITY_STEP, Region, StateBR, StateNotFoundError, UFS, get_states_by_region,
    six_digit_code, state_prefix,
};
