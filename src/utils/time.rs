use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use chrono::DateTime;
use chrono::Utc;

pub fn get_duration_since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// return millisecond
pub fn timestamp_millis() -> u128 {
    get_duration_since_epoch().as_millis()
}

/// Wall-clock "now" used for entry metadata
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Elapsed time in fractional milliseconds, rounded to microseconds
pub fn elapsed_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1_000_000.0).round() / 1_000.0
}
