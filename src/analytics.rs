//! Stateless analytics primitives.
//!
//! These functions operate on raw f64 slices and carry the numeric rules for
//! the derived data-node variants: rolling means for warm-up analyses,
//! day-over-day relative change, and element-wise comparison. The node layer
//! applies them column by column.

use serde::{Deserialize, Serialize};

/// Comparison operators supported by the comparator analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    /// Applies the operator to a pair of values, yielding 1.0 or 0.0.
    pub fn apply(&self, left: f64, right: f64) -> f64 {
        let result = match self {
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
        };
        if result {
            1.0
        } else {
            0.0
        }
    }

    /// Parses an operator from its config-file name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gt" => Some(CompareOp::Gt),
            "ge" => Some(CompareOp::Ge),
            "lt" => Some(CompareOp::Lt),
            "le" => Some(CompareOp::Le),
            "eq" => Some(CompareOp::Eq),
            "ne" => Some(CompareOp::Ne),
            _ => None,
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let repr = match self {
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
        };
        write!(f, "{}", repr)
    }
}

/// Calculates a rolling mean over a window of `num_days`.
///
/// The first `num_days - 1` positions have insufficient history and are
/// dropped, so the output has `len - num_days + 1` entries.
///
/// # Behavior
/// - `num_days == 0` or `num_days > values.len()` returns an empty vector
/// - `num_days == 1` returns the input unchanged
pub fn rolling_mean(values: &[f64], num_days: usize) -> Vec<f64> {
    if num_days == 0 || num_days > values.len() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(values.len() - num_days + 1);
    let mut window_sum: f64 = values[..num_days].iter().sum();
    result.push(window_sum / num_days as f64);

    for i in num_days..values.len() {
        window_sum += values[i] - values[i - num_days];
        result.push(window_sum / num_days as f64);
    }

    result
}

/// Calculates day-over-day relative change: `(v[t] - v[t-1]) / v[t-1]`.
///
/// The first position has no previous value and is dropped, so the output
/// has `len - 1` entries. Each entry is multiplied by `scaling_factor`.
///
/// A zero previous value would divide by zero; it yields 0.0 instead since
/// a zero-priced input is a degenerate series, not a fault.
pub fn relative_change(values: &[f64], scaling_factor: f64) -> Vec<f64> {
    if values.len() < 2 {
        return Vec::new();
    }

    values
        .windows(2)
        .map(|pair| {
            let (prev, curr) = (pair[0], pair[1]);
            if prev == 0.0 {
                0.0
            } else {
                (curr - prev) / prev * scaling_factor
            }
        })
        .collect()
}

/// Element-wise comparison of two equal-length slices as 0/1 values.
///
/// Alignment of the two series on a common date index happens at the frame
/// layer; this function assumes the slices already correspond.
pub fn compare(left: &[f64], right: &[f64], op: CompareOp) -> Vec<f64> {
    left.iter()
        .zip(right.iter())
        .map(|(&l, &r)| op.apply(l, r))
        .collect()
}

/// Arithmetic mean; NaN for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divide by N, not N-1); NaN for empty input.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let sum_squared_diff: f64 = values.iter().map(|&v| (v - m).powi(2)).sum();
    (sum_squared_diff / values.len() as f64).sqrt()
}
