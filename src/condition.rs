use crate::model::ComparisonMode;

/// Decides whether a realized value meets its target.
///
/// Returns `Some(true)` for pass, `Some(false)` for fail and `None` when either
/// side is missing (or not a number), so callers can leave the cell unshaded.
///
/// # Arguments
/// * `real` - Realized value for the month
/// * `target` - Objective value for the same month
/// * `mode` - Whether higher or lower realized values are favorable
///
/// # Examples
/// ```
/// use scorecard::condition::evaluate;
/// use scorecard::model::ComparisonMode;
///
/// assert_eq!(evaluate(Some(85.0), Some(70.0), ComparisonMode::GreaterIsBetter), Some(true));
/// assert_eq!(evaluate(Some(85.0), None, ComparisonMode::GreaterIsBetter), None);
/// ```
pub fn evaluate(real: Option<f64>, target: Option<f64>, mode: ComparisonMode) -> Option<bool> {
    let (real, target) = (real?, target?);
    if real.is_nan() || target.is_nan() {
        return None;
    }
    Some(match mode {
        ComparisonMode::GreaterIsBetter => real >= target,
        ComparisonMode::LessIsBetter => real <= target,
    })
}

/// Glyph shown next to a Real cell in text renderings.
pub fn status_marker(status: Option<bool>) -> &'static str {
    match status {
        Some(true) => "+",
        Some(false) => "!",
        None => " ",
    }
}
