//! Scalar change measures. Undefined results are NaN, never a panic.

/// `(new - old) / old * 100`. NaN when `old` is zero or not finite.
pub fn percent_change(old: f64, new: f64) -> f64 {
    if old == 0.0 || !old.is_finite() {
        return f64::NAN;
    }
    (new - old) / old * 100.0
}

/// `(new - old) / (new + old) * 100`. NaN when the sum is zero.
pub fn symmetric_percent_change(old: f64, new: f64) -> f64 {
    let sum = new + old;
    if sum == 0.0 || !sum.is_finite() {
        return f64::NAN;
    }
    (new - old) / sum * 100.0
}

/// Compound annual growth rate over `years`.
pub fn cagr(start: f64, end: f64, years: f64) -> f64 {
    if start == 0.0 || years == 0.0 {
        return f64::NAN;
    }
    (end / start).powf(1.0 / years) - 1.0
}

/// Simple annual growth rate over `years`.
pub fn agr(start: f64, end: f64, years: f64) -> f64 {
    if start == 0.0 || years == 0.0 {
        return f64::NAN;
    }
    ((end / start) - 1.0) / years
}
