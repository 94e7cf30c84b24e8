/// Rounds to `digits` decimal places the way a decimal `round(value, digits)`
/// does: the shortest decimal representation decides, exact ties go to even.
///
/// ```ignore
/// assert_eq!(round_decimal(2.675, 2), 2.67);
/// assert_eq!(round_decimal(2.0 / 3.0, 2), 0.67);
/// ```
pub(crate) fn round_decimal(value: f64, digits: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let repr = format!("{:.*}", digits as usize, value);
    repr.parse::<f64>().unwrap_or_else(|_| {
        let scale = 10_f64.powi(digits as i32);
        (value * scale).round_ties_even() / scale
    })
}

/// Formats a rounded value without trailing zeros beyond one decimal place,
/// so `0.9` prints as `0.9` and `1.0` as `1.0`.
pub(crate) fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}
