use std::num::ParseIntError;
use std::time::Duration;

/// Parse a number of milliseconds into a duration
///
/// Used as a `value_parser` for command line arguments and environment
/// variables, all durations are given in milliseconds.
pub fn parse_duration_ms(s: &str) -> Result<Duration, ParseIntError> {
    let millis: u64 = s.trim().parse()?;
    Ok(Duration::from_millis(millis))
}
