use std::thread::sleep;
use std::time::Duration;

use crate::time::elapsed_ms;
use crate::time::get_duration_since_epoch;
use crate::time::timestamp_millis;

#[test]
fn test_timestamp_millis() {
    let t1 = timestamp_millis();
    sleep(Duration::from_millis(10));
    let t2 = timestamp_millis();

    assert!(t2 > t1);
}

#[test]
fn test_get_duration_since_epoch() {
    let duration = get_duration_since_epoch();
    assert!(duration.as_secs() > 1609459200); // Greater than 2021-01-01
}

#[test]
fn test_elapsed_ms_keeps_sub_millisecond_precision() {
    assert_eq!(elapsed_ms(Duration::from_micros(1500)), 1.5);
    assert_eq!(elapsed_ms(Duration::from_nanos(400)), 0.0);
    assert!(elapsed_ms(Duration::from_micros(1)) > 0.0);
}
