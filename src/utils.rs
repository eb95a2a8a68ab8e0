use chrono::Duration;

/// Render integer minor units with the configured number of decimal places.
pub fn format_amount(units: i64, precision: u32) -> String {
    if precision == 0 {
        return units.to_string();
    }
    let scale = 10_i64.pow(precision);
    let whole = units / scale;
    let frac = (units % scale).abs();
    format!("{}.{:0width$}", whole, frac, width = precision as usize)
}

/// Seconds left in a wait window, rounded up so one leftover millisecond does
/// not print as zero.
pub fn ceil_seconds(duration: Duration) -> i64 {
    let millis = duration.num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis + 999) / 1000
    }
}
