//! Pure backoff-window arithmetic, kept separate from the store so the
//! math can be unit-tested without touching the filesystem.

use chrono::{DateTime, Duration, Utc};

/// Cooldown window for a non-billing failure: `min(1h, 60_000 * 5^min(errorCount-1,3))` ms.
pub fn cooldown_duration_ms(error_count: u32) -> i64 {
    let exponent = error_count.saturating_sub(1).min(3);
    let computed = 60_000i64 * 5i64.pow(exponent);
    computed.min(60 * 60 * 1000)
}

pub fn cooldown_until(now: DateTime<Utc>, error_count: u32) -> DateTime<Utc> {
    now + Duration::milliseconds(cooldown_duration_ms(error_count))
}

/// Disable window for a billing failure: `base_ms * 2^(n-1)` capped at `max_ms`.
pub fn billing_backoff_ms(billing_failure_count: u32, base_ms: i64, max_ms: i64) -> i64 {
    let exponent = billing_failure_count.saturating_sub(1).min(31);
    let computed = base_ms.saturating_mul(1i64 << exponent.min(40));
    computed.min(max_ms)
}

pub fn billing_disabled_until(now: DateTime<Utc>, billing_failure_count: u32, base_ms: i64, max_ms: i64) -> DateTime<Utc> {
    now + Duration::milliseconds(billing_backoff_ms(billing_failure_count, base_ms, max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_grows_then_caps_at_one_hour() {
        assert_eq!(cooldown_duration_ms(1), 60_000);
        assert_eq!(cooldown_duration_ms(2), 300_000);
        assert_eq!(cooldown_duration_ms(3), 1_500_000);
        assert_eq!(cooldown_duration_ms(4), 7_500_000i64.min(3_600_000));
        assert_eq!(cooldown_duration_ms(4), 3_600_000);
        // Exponent clamps at 3 regardless of how high errorCount climbs.
        assert_eq!(cooldown_duration_ms(10), cooldown_duration_ms(4));
    }

    #[test]
    fn billing_backoff_doubles_then_caps() {
        let base = 5 * 60 * 60 * 1000i64;
        let max = 24 * 60 * 60 * 1000i64;
        assert_eq!(billing_backoff_ms(1, base, max), base);
        assert_eq!(billing_backoff_ms(2, base, max), base * 2);
        assert_eq!(billing_backoff_ms(3, base, max), base * 4);
        // 5h * 2^4 = 80h, capped to 24h.
        assert_eq!(billing_backoff_ms(5, base, max), max);
    }
}
