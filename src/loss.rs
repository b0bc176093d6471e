//! Loss functions.
//!
//! The only loss the network trains against is categorical cross-entropy over
//! softmax probabilities. Its gradient w.r.t. the logits is folded into
//! [`crate::Model::backward`] (`probs - onehot(y)`), so there is no separate
//! backward helper here.

use crate::matrix::Matrix;
use crate::{Error, Result};

/// Lower bound applied to the true-class probability before taking the log.
pub const PROB_CLIP: f64 = 1e-12;

/// Mean over rows of `-ln(max(probs[i][y[i]], PROB_CLIP))`.
///
/// Shape contract:
/// - `labels.len() == probs.rows()`, and at least one row
/// - every label `< probs.cols()`
pub fn categorical_cross_entropy(probs: &Matrix, labels: &[usize]) -> Result<f64> {
    let (n, classes) = probs.shape();
    if n == 0 {
        return Err(Error::InvalidData(
            "cross-entropy needs at least one sample".to_owned(),
        ));
    }
    if labels.len() != n {
        return Err(Error::DimensionMismatch(format!(
            "{} labels for {n} probability rows",
            labels.len()
        )));
    }

    let mut sum = 0.0;
    for (i, &y) in labels.iter().enumerate() {
        if y >= classes {
            return Err(Error::InvalidData(format!(
                "label {y} at row {i} is out of range for {classes} classes"
            )));
        }
        sum -= probs[(i, y)].max(PROB_CLIP).ln();
    }
    Ok(sum / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn single_row_matches_negative_log() {
        let probs = Matrix::from_vec(1, 3, vec![0.7, 0.2, 0.1]).unwrap();
        let loss = categorical_cross_entropy(&probs, &[0]).unwrap();
        assert_abs_diff_eq!(loss, -(0.7_f64).ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(loss, 0.3567, epsilon = 1e-4);
    }

    #[test]
    fn averages_over_rows() {
        let probs = Matrix::from_vec(2, 2, vec![0.5, 0.5, 0.25, 0.75]).unwrap();
        let loss = categorical_cross_entropy(&probs, &[0, 1]).unwrap();
        let expected = (-(0.5_f64).ln() - (0.75_f64).ln()) / 2.0;
        assert_abs_diff_eq!(loss, expected, epsilon = 1e-12);
    }

    #[test]
    fn zero_probability_is_clipped_not_infinite() {
        let probs = Matrix::from_vec(1, 2, vec![1.0, 0.0]).unwrap();
        let loss = categorical_cross_entropy(&probs, &[1]).unwrap();
        assert!(loss.is_finite());
        assert_abs_diff_eq!(loss, -PROB_CLIP.ln(), epsilon = 1e-9);
    }

    #[test]
    fn rejects_bad_labels() {
        let probs = Matrix::from_vec(1, 2, vec![0.5, 0.5]).unwrap();
        assert!(categorical_cross_entropy(&probs, &[2]).is_err());
        assert!(categorical_cross_entropy(&probs, &[0, 1]).is_err());
        assert!(categorical_cross_entropy(&Matrix::zeros(0, 2), &[]).is_err());
    }
}
