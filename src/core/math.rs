//! Floating-point comparison predicates.
//!
//! Coalition values and payoffs go through the LP relaxation and through
//! sums accumulated in different orders, so plain `==`/`<` on them is
//! meaningless. All ordering decisions in the analyzer go through the
//! predicates below.

/// Relative tolerance, on the scale of the solver's own tolerances.
pub const EPS: f64 = 1e-9;

/// Returns whether `a` is greater than `b` beyond the relative tolerance.
pub fn definitely_greater(a: f64, b: f64) -> bool {
    a - b > EPS * a.abs().max(b.abs())
}

/// Returns whether `a` is less than `b` beyond the relative tolerance.
pub fn definitely_less(a: f64, b: f64) -> bool {
    b - a > EPS * a.abs().max(b.abs())
}

/// Returns whether `a` and `b` are equal up to the relative tolerance.
pub fn essentially_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPS * a.abs().min(b.abs())
}
