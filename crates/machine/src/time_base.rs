//! CPU clock for the board: `freq_mhz` turned into a nanoseconds-per-cycle scale.

use crate::config::{ConfigError, MAX_FREQ_MHZ};
pub use armv7m::TimeBase;

pub const NS_PER_SEC: u64 = 1_000_000_000;

/// `ns_per_cycle = 1e9 / (freq_mhz * 1e6)`, truncated. Frequencies outside
/// `1..=MAX_FREQ_MHZ` would divide by zero or round the scale down to 0.
pub fn time_base_for_mhz(freq_mhz: i64) -> Result<TimeBase, ConfigError> {
    if !(1..=MAX_FREQ_MHZ).contains(&freq_mhz) {
        return Err(ConfigError::Frequency(freq_mhz));
    }
    let freq_hz = freq_mhz.unsigned_abs() * 1_000_000;
    Ok(TimeBase::new(freq_hz, NS_PER_SEC / freq_hz))
}
