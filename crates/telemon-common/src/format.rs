/// Renders a value with at most six fractional digits and no trailing zeros.
///
/// # Examples
///
/// ```
/// use telemon_common::format_value;
///
/// assert_eq!(format_value(3.0), "3");
/// assert_eq!(format_value(5.5), "5.5");
/// assert_eq!(format_value(0.1234567), "0.123457");
/// ```
pub fn format_value(value: f64) -> String {
    let text = format!("{value:.6}");
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}
