use std::time::Duration;

/// Renders a duration with a unit that keeps the number readable.
pub fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();
    if micros < 1_000 {
        format!("{micros}µs")
    } else if micros < 1_000_000 {
        format!("{:.2}ms", micros as f64 / 1_000.0)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

/// Renders a per-second rate, e.g. `12.40/s`.
pub fn format_rate(per_second: f64) -> String {
    format!("{per_second:.2}/s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_pick_readable_units() {
        assert_eq!(format_duration(Duration::from_micros(250)), "250µs");
        assert_eq!(format_duration(Duration::from_micros(1_500)), "1.50ms");
        assert_eq!(format_duration(Duration::from_millis(2_250)), "2.25s");
    }

    #[test]
    fn percent_and_rate_round_to_fixed_precision() {
        assert_eq!(format_percent(66.666), "66.7%");
        assert_eq!(format_rate(3.0), "3.00/s");
    }
}
