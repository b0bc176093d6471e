//! Metrics.
//!
//! Metrics are evaluation helpers (they do not participate in backprop).

use crate::matrix::{Matrix, argmax_row};
use crate::{Error, Result};

/// Fraction of rows whose argmax equals the label.
pub fn accuracy(probs: &Matrix, labels: &[usize]) -> Result<f64> {
    if labels.len() != probs.rows() {
        return Err(Error::DimensionMismatch(format!(
            "{} labels for {} probability rows",
            labels.len(),
            probs.rows()
        )));
    }
    if labels.is_empty() {
        return Err(Error::InvalidData(
            "accuracy needs at least one sample".to_owned(),
        ));
    }

    let correct = probs
        .iter_rows()
        .zip(labels)
        .filter(|&(row, &y)| argmax_row(row) == y)
        .count();
    Ok(correct as f64 / labels.len() as f64)
}
