//! Cadence of the periodic driver.

/// Seconds between sync passes in loop mode.
pub const DEFAULT_RUN_EVERY_SECS: u64 = 600;

/// Lower bound accepted for a configured interval.
pub const MIN_RUN_EVERY_SECS: u64 = 1;

/// Clamps a configured interval, falling back to the default when unset.
pub fn run_interval_secs(configured: Option<u64>) -> u64 {
    configured
        .unwrap_or(DEFAULT_RUN_EVERY_SECS)
        .max(MIN_RUN_EVERY_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_defaults_and_clamps() {
        assert_eq!(run_interval_secs(None), 600);
        assert_eq!(run_interval_secs(Some(0)), 1);
        assert_eq!(run_interval_secs(Some(30)), 30);
    }
}
