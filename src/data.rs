//! Synthetic spiral dataset and label helpers.
//!
//! `spiral` draws `classes` interleaved arms in the unit disc. Arm `c` holds
//! points `i = 0..points_per_class` at radius `r = i / points_per_class` and angle
//! `4c + 4r + noise`, `noise ~ N(0, 0.2²)`. Features are stored row-major as
//! `(r sin θ, r cos θ)` and the label of every point in arm `c` is `c`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::matrix::Matrix;
use crate::{Error, Result};

/// Standard deviation of the angular noise added to each spiral point.
pub const SPIRAL_NOISE_STD: f64 = 0.2;

/// Features (X) with integer class labels (y).
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    inputs: Matrix,
    labels: Vec<usize>,
    classes: usize,
}

impl Dataset {
    pub fn new(inputs: Matrix, labels: Vec<usize>, classes: usize) -> Result<Self> {
        if classes == 0 {
            return Err(Error::InvalidData("classes must be > 0".to_owned()));
        }
        if labels.len() != inputs.rows() {
            return Err(Error::InvalidData(format!(
                "{} labels for {} input rows",
                labels.len(),
                inputs.rows()
            )));
        }
        if let Some((i, &y)) = labels.iter().enumerate().find(|&(_, &y)| y >= classes) {
            return Err(Error::InvalidData(format!(
                "label {y} at row {i} is out of range for {classes} classes"
            )));
        }
        Ok(Self {
            inputs,
            labels,
            classes,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.inputs.cols()
    }

    #[inline]
    pub fn classes(&self) -> usize {
        self.classes
    }

    #[inline]
    pub fn inputs(&self) -> &Matrix {
        &self.inputs
    }

    #[inline]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// One-hot targets, shape `(len, classes)`.
    pub fn one_hot(&self) -> Matrix {
        let mut y = Matrix::zeros(self.len(), self.classes);
        for (i, &c) in self.labels.iter().enumerate() {
            y[(i, c)] = 1.0;
        }
        y
    }
}

/// Generate the spiral dataset. The same `seed` always yields identical points.
pub fn spiral(points_per_class: usize, classes: usize, seed: u64) -> Result<Dataset> {
    if points_per_class == 0 || classes == 0 {
        return Err(Error::InvalidConfig(format!(
            "spiral needs points_per_class > 0 and classes > 0, got {points_per_class} and {classes}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let n = points_per_class * classes;
    let mut inputs = Matrix::zeros(n, 2);
    let mut ys = Vec::with_capacity(n);

    for c in 0..classes {
        let t = c as f64 * 4.0;
        for i in 0..points_per_class {
            let ix = points_per_class * c + i;
            let r = i as f64 / points_per_class as f64;
            let z: f64 = rng.sample(StandardNormal);
            let theta = t + r * 4.0 + z * SPIRAL_NOISE_STD;
            inputs[(ix, 0)] = r * theta.sin();
            inputs[(ix, 1)] = r * theta.cos();
            ys.push(c);
        }
    }

    Dataset::new(inputs, ys, classes)
}

/// Labels of a spiral dataset without generating its points.
pub fn labels(points_per_class: usize, classes: usize) -> Vec<usize> {
    (0..classes)
        .flat_map(|c| std::iter::repeat_n(c, points_per_class))
        .collect()
}

/// `(len, classes)` matrix with a single 1 per row at the label's column.
pub fn one_hot(labels: &[usize], classes: usize) -> Result<Matrix> {
    let mut y = Matrix::zeros(labels.len(), classes);
    for (i, &c) in labels.iter().enumerate() {
        if c >= classes {
            return Err(Error::InvalidData(format!(
                "label {c} at row {i} is out of range for {classes} classes"
            )));
        }
        y[(i, c)] = 1.0;
    }
    Ok(y)
}
