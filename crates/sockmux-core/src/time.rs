//! Wall-clock helper

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
///
/// Does not account for leap seconds.
pub fn now_millis() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        // Clock set before 1970; report negative offset.
        Err(err) => -(err.duration().as_millis() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_monotonic_enough() {
        let a = now_millis();
        // Jan 1 2020 in ms; any sane clock is past this.
        assert!(a > 1_577_836_800_000);
        let b = now_millis();
        assert!(b >= a);
    }
}
