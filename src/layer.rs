use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::matrix::{self, Matrix};
use crate::{Error, Result};

/// Fully connected affine transform `z = x W + b`.
///
/// The activation is applied by the model, not the layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    in_dim: usize,
    out_dim: usize,
    /// Shape `(in_dim, out_dim)`.
    weights: Matrix,
    biases: Vec<f64>,
}

impl DenseLayer {
    /// Weights drawn i.i.d. from `N(0, 1) * weight_scale`, biases zero.
    ///
    /// The same `seed` always yields bit-identical weights.
    pub fn new(in_dim: usize, out_dim: usize, weight_scale: f64, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new_with_rng(in_dim, out_dim, weight_scale, &mut rng)
    }

    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        weight_scale: f64,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        if !(weight_scale.is_finite() && weight_scale > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "weight scale must be finite and > 0, got {weight_scale}"
            )));
        }

        let mut weights = Matrix::zeros(in_dim, out_dim);
        for w in weights.as_mut_slice() {
            let z: f64 = rng.sample(StandardNormal);
            *w = z * weight_scale;
        }

        Ok(Self {
            in_dim,
            out_dim,
            weights,
            biases: vec![0.0; out_dim],
        })
    }

    /// Build a layer from existing parameters.
    ///
    /// Dimensions are inferred from `weights`; `biases.len()` must equal
    /// `weights.cols()` and every parameter must be finite.
    pub fn from_parts(weights: Matrix, biases: Vec<f64>) -> Result<Self> {
        let (in_dim, out_dim) = weights.shape();
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::DimensionMismatch(format!(
                "layer weights must be non-empty, got {in_dim}x{out_dim}"
            )));
        }
        if biases.len() != out_dim {
            return Err(Error::DimensionMismatch(format!(
                "biases length {} does not match weight cols {out_dim}",
                biases.len()
            )));
        }
        if weights.as_slice().iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "weights must contain only finite values".to_owned(),
            ));
        }
        if biases.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "biases must contain only finite values".to_owned(),
            ));
        }

        Ok(Self {
            in_dim,
            out_dim,
            weights,
            biases,
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f64] {
        &self.biases
    }

    /// Mutable parameter views. Only the optimizer (and gradient checks) write through these.
    #[inline]
    pub(crate) fn params_mut(&mut self) -> (&mut Matrix, &mut [f64]) {
        (&mut self.weights, &mut self.biases)
    }

    /// Pre-activation output `x W + b` for a batch `x` of shape `(n, in_dim)`.
    pub fn forward(&self, x: &Matrix) -> Result<Matrix> {
        let mut z = matrix::dot(x, &self.weights)?;
        matrix::add_row_vector_mut(&mut z, &self.biases)?;
        Ok(z)
    }
}
