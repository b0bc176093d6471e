//! Optimizer.
//!
//! Full-batch SGD with L2 weight decay on the weights only:
//!
//! - `W -= lr * (dW + l2 * W)`
//! - `b -= lr * db`
//!
//! Updates are applied in place. There is no momentum and no schedule.

use crate::matrix::Matrix;
use crate::{DenseLayer, Error, Gradients, Model, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sgd {
    lr: f64,
    l2: f64,
}

impl Sgd {
    /// Returns an error unless `lr` is finite and `> 0` and `l2` is finite and `>= 0`.
    pub fn new(lr: f64, l2: f64) -> Result<Self> {
        if !(lr.is_finite() && lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {lr}"
            )));
        }
        if !(l2.is_finite() && l2 >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "l2 coefficient must be finite and >= 0, got {l2}"
            )));
        }
        Ok(Self { lr, l2 })
    }

    /// Update one layer from its weight and bias gradients.
    pub fn step_layer(&self, layer: &mut DenseLayer, d_w: &Matrix, d_b: &[f64]) -> Result<()> {
        let (w, b) = layer.params_mut();
        if w.shape() != d_w.shape() {
            return Err(Error::DimensionMismatch(format!(
                "weight gradient shape {:?} does not match weights {:?}",
                d_w.shape(),
                w.shape()
            )));
        }
        if b.len() != d_b.len() {
            return Err(Error::DimensionMismatch(format!(
                "bias gradient len {} does not match biases {}",
                d_b.len(),
                b.len()
            )));
        }

        for (w, &g) in w.as_mut_slice().iter_mut().zip(d_w.as_slice()) {
            *w -= self.lr * (g + self.l2 * *w);
        }
        for (b, &g) in b.iter_mut().zip(d_b) {
            *b -= self.lr * g;
        }
        Ok(())
    }

    /// Update both layers of `model`.
    pub fn step(&self, model: &mut Model, grads: &Gradients) -> Result<()> {
        let (l1, l2) = model.layers_mut();
        self.step_layer(l1, grads.d_w1(), grads.d_b1())?;
        self.step_layer(l2, grads.d_w2(), grads.d_b2())
    }
}
